//! Videos stage: animate each scene's start image.

use std::sync::Arc;

use tracing::{warn, Instrument};

use cloner_jobs::GenerationRequest;
use cloner_media::Downloader;
use cloner_models::{GenerationModel, JobKind, SceneRecord};
use cloner_records::SceneStore;

use super::generation::{generate_scenes, SceneJob};
use super::images::preview;
use super::VideoOptions;
use crate::context::ProjectContext;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::StageLogger;
use crate::services::Services;
use crate::stage::{Stage, StageOutcome};

/// Generate videos for every scene that has an image but no video.
pub async fn run(
    ctx: &ProjectContext,
    services: &Services,
    opts: &VideoOptions,
) -> PipelineResult<StageOutcome> {
    let logger = StageLogger::new(ctx.project(), Stage::Videos);
    let span = logger.create_span();
    run_inner(ctx, services, opts, &logger).instrument(span).await
}

async fn run_inner(
    ctx: &ProjectContext,
    services: &Services,
    opts: &VideoOptions,
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

    let without_image = records.iter().filter(|r| r.needs_image()).count();
    let mut pending: Vec<SceneRecord> = records.into_iter().filter(|r| r.needs_video()).collect();
    if pending.is_empty() {
        if without_image > 0 {
            return Err(PipelineError::missing_input(format!(
                "{without_image} scene(s) have no image yet; run the images stage first"
            )));
        }
        return Ok(StageOutcome::skipped("every scene already has a video"));
    }
    if without_image > 0 {
        logger.log_warning(&format!(
            "{without_image} scene(s) have no image yet and are left for a later run"
        ));
    }

    let model = if ctx.test_mode() {
        GenerationModel::cheapest(JobKind::Video)
    } else {
        opts.model
    };
    if model.kind() != JobKind::Video {
        return Err(PipelineError::config(format!("{model} is not a video model")));
    }
    if ctx.test_mode() {
        pending.truncate(1);
        logger.log_progress("Test mode: first pending scene only");
    }

    let estimate = model.estimate(pending.len());
    logger.log_start(&format!("{} scene(s) need a video, estimate {}", pending.len(), estimate));

    if ctx.dry_run() {
        for record in &pending {
            ctx.plan(format!(
                "{}: animate {} with {} ({}s) from prompt: {}",
                record.title,
                record.image_reference().unwrap_or_default(),
                model,
                opts.length.seconds(),
                preview(&record.video_prompt)
            ));
            if !opts.skip_download {
                ctx.plan(format!("download to {}", ctx.clip_path(record.scene_number).display()));
            }
        }
        ctx.plan(format!("estimated cost {}", estimate.total));
        return Ok(StageOutcome::Planned);
    }

    let Some(approval) = services.approval().approve(Stage::Videos, &estimate).await? else {
        return Ok(StageOutcome::Declined);
    };
    let dispatcher = services.dispatcher()?;
    let downloader: Option<Arc<dyn Downloader>> = if opts.skip_download {
        None
    } else {
        Some(services.downloader()?.clone())
    };

    let jobs = pending
        .into_iter()
        .filter_map(|record| {
            let image = record.image_reference()?.to_string();
            let mut request = GenerationRequest::new(model, record.video_prompt.clone())
                .with_reference(image)
                .with_video_length(opts.length)
                .with_remove_watermark(opts.remove_watermark);
            if let Some(ratio) = opts.aspect_ratio {
                request = request.with_aspect_ratio(ratio);
            }
            Some(SceneJob { record, request })
        })
        .collect();

    let store: Arc<dyn SceneStore> = store.clone();
    let ctx_for_clips = ctx.clone();
    let report = generate_scenes(
        JobKind::Video,
        jobs,
        dispatcher,
        &approval,
        services.max_video_jobs(),
        move |record, url| {
            let store = store.clone();
            let downloader = downloader.clone();
            let clip = ctx_for_clips.clip_path(record.scene_number);
            async move {
                let updated = store.set_video_reference(&record, &url).await?;
                // The reference is already stored; combine fetches missing clips later.
                if let Some(downloader) = downloader {
                    if let Err(e) = downloader.download(&url, &clip).await {
                        warn!(scene = %record.scene_number, error = %e, "Video download failed");
                    }
                }
                Ok::<_, PipelineError>(updated)
            }
        },
    )
    .await;

    logger.log_progress(&format!(
        "{} succeeded, {} failed, spent {}",
        report.succeeded.len(),
        report.failures.len(),
        approval.spent()
    ));
    let done = report.into_result(Stage::Videos)?;

    let summary = format!("{} video(s) generated, spent {}", done.len(), approval.spent());
    logger.log_completion(&summary);
    Ok(StageOutcome::completed(summary))
}
