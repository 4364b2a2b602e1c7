//! Log stage: persist prompts as scene records.

use cloner_models::{NewSceneRecord, PromptSheet};

use super::LogOptions;
use crate::context::ProjectContext;
use crate::error::PipelineResult;
use crate::logging::StageLogger;
use crate::services::Services;
use crate::stage::{Stage, StageOutcome};

pub async fn run(
    ctx: &ProjectContext,
    services: &Services,
    opts: &LogOptions,
) -> PipelineResult<StageOutcome> {
    let logger = StageLogger::new(ctx.project(), Stage::Log);

    let sheet: PromptSheet = ctx.read_artifact(&ctx.prompts_path()).await?;
    sheet.validate()?;

    let records = sheet
        .prompts
        .iter()
        .map(|p| -> PipelineResult<NewSceneRecord> {
            let record = NewSceneRecord::from_prompts(ctx.project(), p)?;
            record.check()?;
            Ok(record)
        })
        .collect::<PipelineResult<Vec<_>>>()?;

    let store = services.store()?;
    let existing = store.list_project(ctx.project()).await?;
    let clear = opts.clear && !existing.is_empty();
    let records: Vec<NewSceneRecord> = if clear {
        records
    } else {
        // Resume an interrupted run: only scenes without a record are created.
        records
            .into_iter()
            .filter(|r| !existing.iter().any(|e| e.scene_number == r.scene_number))
            .collect()
    };
    if records.is_empty() {
        return Ok(StageOutcome::skipped(format!(
            "{} record(s) already logged; use --clear to log again",
            existing.len()
        )));
    }

    if ctx.dry_run() {
        if clear {
            ctx.plan(format!("delete {} existing record(s)", existing.len()));
        }
        for record in &records {
            ctx.plan(format!("create '{}'", record.title()));
        }
        return Ok(StageOutcome::Planned);
    }

    if clear {
        let removed = store.clear_project(ctx.project()).await?;
        logger.log_progress(&format!("Cleared {removed} existing record(s)"));
    } else if !existing.is_empty() {
        logger.log_progress(&format!(
            "{} scene(s) already logged, creating the remaining {}",
            existing.len(),
            records.len()
        ));
    }

    logger.log_start(&format!("Logging {} scene(s)", records.len()));
    let created = store.create_many(records).await?;

    let summary = format!("{} record(s) created", created.len());
    logger.log_completion(&summary);
    Ok(StageOutcome::completed(summary))
}
