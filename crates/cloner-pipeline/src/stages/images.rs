//! Images stage: one generated start image per scene.

use std::sync::Arc;

use tracing::Instrument;

use cloner_jobs::GenerationRequest;
use cloner_models::{GenerationModel, JobKind, SceneRecord};
use cloner_records::SceneStore;

use super::generation::{generate_scenes, SceneJob};
use super::ImageOptions;
use crate::context::ProjectContext;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::StageLogger;
use crate::services::Services;
use crate::stage::{Stage, StageOutcome};

/// Generate images for every scene that has none yet.
pub async fn run(
    ctx: &ProjectContext,
    services: &Services,
    opts: &ImageOptions,
) -> PipelineResult<StageOutcome> {
    let logger = StageLogger::new(ctx.project(), Stage::Images);
    let span = logger.create_span();
    run_inner(ctx, services, opts, &logger).instrument(span).await
}

async fn run_inner(
    ctx: &ProjectContext,
    services: &Services,
    opts: &ImageOptions,
    logger: &StageLogger,
) -> PipelineResult<StageOutcome> {
    let store = services.store()?;
    let records = store.list_project(ctx.project()).await?;
    if records.is_empty() {
        return Err(PipelineError::missing_input(format!(
            "no scene records for project '{}'; run the log stage first",
            ctx.project()
        )));
    }

    let mut pending: Vec<SceneRecord> = records.into_iter().filter(|r| r.needs_image()).collect();
    if pending.is_empty() {
        return Ok(StageOutcome::skipped("every scene already has an image"));
    }

    let model = if ctx.test_mode() {
        GenerationModel::cheapest(JobKind::Image)
    } else {
        opts.model
    };
    if model.kind() != JobKind::Image {
        return Err(PipelineError::config(format!("{model} is not an image model")));
    }
    if ctx.test_mode() {
        pending.truncate(1);
        logger.log_progress("Test mode: first pending scene only");
    }

    let estimate = model.estimate(pending.len());
    logger.log_start(&format!("{} scene(s) need an image, estimate {}", pending.len(), estimate));

    let reference_path = if model.supports_reference_image() && !ctx.test_mode() {
        match &opts.reference_image {
            Some(path) => Some(path.clone()),
            None => ctx.find_reference_image().await?,
        }
    } else {
        None
    };

    if ctx.dry_run() {
        for record in &pending {
            ctx.plan(format!(
                "{}: generate with {} from prompt: {}",
                record.title,
                model,
                preview(&record.image_prompt)
            ));
        }
        if let Some(path) = &reference_path {
            ctx.plan(format!("upload reference image {}", path.display()));
        }
        ctx.plan(format!("estimated cost {}", estimate.total));
        return Ok(StageOutcome::Planned);
    }

    let Some(approval) = services.approval().approve(Stage::Images, &estimate).await? else {
        return Ok(StageOutcome::Declined);
    };
    let dispatcher = services.dispatcher()?;

    let reference_url = match &reference_path {
        Some(path) => match dispatcher.api().upload_reference(path).await {
            Ok(url) => Some(url),
            Err(e) => {
                logger.log_warning(&format!(
                    "Reference upload failed, generating without it: {e}"
                ));
                None
            }
        },
        None => None,
    };

    let jobs = pending
        .into_iter()
        .map(|record| {
            let mut request = GenerationRequest::new(model, record.image_prompt.clone())
                .with_resolution(opts.resolution);
            if let Some(ratio) = opts.aspect_ratio {
                request = request.with_aspect_ratio(ratio);
            }
            if let Some(url) = &reference_url {
                request = request.with_reference(url.clone());
            }
            SceneJob { record, request }
        })
        .collect();

    let store: Arc<dyn SceneStore> = store.clone();
    let report = generate_scenes(
        JobKind::Image,
        jobs,
        dispatcher,
        &approval,
        services.max_image_jobs(),
        move |record, url| {
            let store = store.clone();
            async move { Ok::<_, PipelineError>(store.set_image_reference(&record, &url).await?) }
        },
    )
    .await;

    logger.log_progress(&format!(
        "{} succeeded, {} failed, spent {}",
        report.succeeded.len(),
        report.failures.len(),
        approval.spent()
    ));
    let done = report.into_result(Stage::Images)?;

    let summary = format!("{} image(s) generated, spent {}", done.len(), approval.spent());
    logger.log_completion(&summary);
    Ok(StageOutcome::completed(summary))
}

/// First 100 characters of a prompt.
pub(crate) fn preview(prompt: &str) -> String {
    let mut chars = prompt.chars();
    let head: String = chars.by_ref().take(100).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
