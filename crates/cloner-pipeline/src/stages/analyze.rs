//! Analyze stage: source video to scene breakdown.

use super::AnalyzeOptions;
use crate::context::ProjectContext;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::StageLogger;
use crate::services::Services;
use crate::stage::{Stage, StageOutcome};

pub async fn run(
    ctx: &ProjectContext,
    services: &Services,
    opts: &AnalyzeOptions,
) -> PipelineResult<StageOutcome> {
    let logger = StageLogger::new(ctx.project(), Stage::Analyze);

    let video = opts
        .video
        .as_deref()
        .ok_or_else(|| PipelineError::missing_input("no source video given (--video)"))?;
    if !tokio::fs::try_exists(video).await? {
        return Err(PipelineError::missing_input(format!(
            "source video {} not found",
            video.display()
        )));
    }

    if ctx.dry_run() {
        ctx.plan(format!("upload {} for analysis", video.display()));
        ctx.plan(format!("write {}", ctx.analysis_path().display()));
        return Ok(StageOutcome::Planned);
    }

    logger.log_start(&format!("Analyzing {}", video.display()));
    let analysis = services.analyzer()?.analyze(video).await?;
    ctx.write_artifact(&ctx.analysis_path(), &analysis).await?;

    let summary = format!(
        "{} scene(s) written to {}",
        analysis.total_scenes(),
        ctx.analysis_path().display()
    );
    logger.log_completion(&summary);
    Ok(StageOutcome::completed(summary))
}
