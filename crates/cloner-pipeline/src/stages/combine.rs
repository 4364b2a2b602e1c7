//! Combine stage: fetch every scene's clip and join them in scene order.

use std::path::PathBuf;

use cloner_media::CombineRequest;
use cloner_models::SceneRecord;

use super::CombineOptions;
use crate::context::ProjectContext;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::StageLogger;
use crate::services::Services;
use crate::stage::{Stage, StageOutcome};

pub async fn run(
    ctx: &ProjectContext,
    services: &Services,
    opts: &CombineOptions,
) -> PipelineResult<StageOutcome> {
    let logger = StageLogger::new(ctx.project(), Stage::Combine);

    let mut records = services.store()?.list_project(ctx.project()).await?;
    if records.is_empty() {
        return Err(PipelineError::missing_input(format!(
            "no scene records for project '{}'",
            ctx.project()
        )));
    }

    let unlogged = ctx.unlogged_scenes(&records).await?;
    if !unlogged.is_empty() {
        let scenes: Vec<String> = unlogged.iter().map(u32::to_string).collect();
        return Err(PipelineError::incomplete(format!(
            "scene(s) {} are in prompts.json but have no record; run the log stage",
            scenes.join(", ")
        )));
    }

    let missing: Vec<String> = records
        .iter()
        .filter(|r| r.video_reference().is_none())
        .map(|r| r.scene_number.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::incomplete(format!(
            "scene(s) {} have no video yet",
            missing.join(", ")
        )));
    }

    if let Some(music) = &opts.music {
        if !tokio::fs::try_exists(music).await? {
            return Err(PipelineError::missing_input(format!(
                "music file {} not found",
                music.display()
            )));
        }
    }

    records.sort_by_key(|r| r.scene_number);
    let output = opts.output_path(ctx);

    if ctx.dry_run() {
        for record in &records {
            let clip = ctx.clip_path(record.scene_number);
            let action = if tokio::fs::try_exists(&clip).await? {
                "use"
            } else {
                "download"
            };
            ctx.plan(format!("{action} {} for {}", clip.display(), record.title));
        }
        if let Some(music) = &opts.music {
            ctx.plan(format!(
                "add music {} with a {}s fade-out",
                music.display(),
                opts.fade_duration
            ));
        }
        ctx.plan(format!("write {}", output.display()));
        return Ok(StageOutcome::Planned);
    }

    logger.log_start(&format!("Combining {} scene(s)", records.len()));
    let clips = fetch_clips(ctx, services, &records, &logger).await?;

    let mut request = CombineRequest::new(clips, &output).with_re_encode(opts.re_encode);
    if let Some(music) = &opts.music {
        request = request.with_music(music, opts.fade_duration);
    }
    let written = services.combiner()?.combine(&request).await?;

    let summary = format!("{} scene(s) combined into {}", records.len(), written.display());
    logger.log_completion(&summary);
    Ok(StageOutcome::completed(summary))
}

/// Local clip paths in record order, downloading the ones not yet on disk.
async fn fetch_clips(
    ctx: &ProjectContext,
    services: &Services,
    records: &[SceneRecord],
    logger: &StageLogger,
) -> PipelineResult<Vec<PathBuf>> {
    let mut clips = Vec::with_capacity(records.len());
    for record in records {
        let clip = ctx.clip_path(record.scene_number);
        if !tokio::fs::try_exists(&clip).await? {
            let url = record.video_reference().ok_or_else(|| {
                PipelineError::incomplete(format!("scene {} has no video", record.scene_number))
            })?;
            logger.log_progress(&format!("Downloading scene {}", record.scene_number));
            services.downloader()?.download(url, &clip).await?;
        }
        clips.push(clip);
    }
    Ok(clips)
}
