//! Prompts stage: scene breakdown to image and video prompts.

use cloner_models::{PromptSheet, VideoAnalysis};

use super::PromptOptions;
use crate::context::ProjectContext;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::StageLogger;
use crate::services::Services;
use crate::stage::{Stage, StageOutcome};

pub async fn run(
    ctx: &ProjectContext,
    services: &Services,
    opts: &PromptOptions,
) -> PipelineResult<StageOutcome> {
    let logger = StageLogger::new(ctx.project(), Stage::Prompts);

    let analysis: VideoAnalysis = ctx.read_artifact(&ctx.analysis_path()).await?;
    analysis.validate()?;

    let reference = match &opts.reference_image {
        Some(path) => {
            if !tokio::fs::try_exists(path).await? {
                return Err(PipelineError::missing_input(format!(
                    "reference image {} not found",
                    path.display()
                )));
            }
            Some(path.clone())
        }
        None => ctx.find_reference_image().await?,
    };
    if reference.is_none() {
        logger.log_warning("No reference image; prompts use each scene's own subject");
    }

    if ctx.dry_run() {
        ctx.plan(format!(
            "build prompts for {} scene(s){}",
            analysis.total_scenes(),
            reference
                .as_ref()
                .map(|p| format!(" around {}", p.display()))
                .unwrap_or_default()
        ));
        ctx.plan(format!("write {}", ctx.prompts_path().display()));
        return Ok(StageOutcome::Planned);
    }

    logger.log_start(&format!("Building prompts for {} scene(s)", analysis.total_scenes()));
    let sheet: PromptSheet = services
        .prompter()?
        .synthesize(&analysis, reference.as_deref())
        .await?;
    sheet.validate()?;
    ctx.write_artifact(&ctx.prompts_path(), &sheet).await?;

    let summary = format!(
        "{} prompt pair(s) written to {}",
        sheet.prompts.len(),
        ctx.prompts_path().display()
    );
    logger.log_completion(&summary);
    Ok(StageOutcome::completed(summary))
}
