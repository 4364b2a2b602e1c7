//! Resumable stage sequencer.
//!
//! Stages run in order. A stage whose output already exists is skipped, so
//! re-running after a failure picks up where the last run stopped. The
//! first failure halts the run; nothing is rolled back.

use tracing::{info, info_span, Instrument};

use crate::context::ProjectContext;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::StageLogger;
use crate::services::Services;
use crate::stage::{Stage, StageOutcome};
use crate::stages::{run_stage, StageOptions};

/// Outcome of each stage a run visited, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub outcomes: Vec<(Stage, StageOutcome)>,
}

impl RunReport {
    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.outcomes
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, o)| o)
    }

    /// Whether every visited stage completed or was already done.
    pub fn finished(&self) -> bool {
        self.outcomes.iter().all(|(_, o)| o.allows_next())
    }
}

pub struct Sequencer<'a> {
    ctx: &'a ProjectContext,
    services: &'a Services,
    options: &'a StageOptions,
}

impl<'a> Sequencer<'a> {
    pub fn new(ctx: &'a ProjectContext, services: &'a Services, options: &'a StageOptions) -> Self {
        Self {
            ctx,
            services,
            options,
        }
    }

    /// Run one stage regardless of whether it looks complete.
    pub async fn run_stage(&self, stage: Stage) -> PipelineResult<StageOutcome> {
        let span = info_span!("pipeline_stage", project = %self.ctx.project(), stage = %stage);
        let result = run_stage(stage, self.ctx, self.services, self.options)
            .instrument(span)
            .await;
        result.map_err(|e| {
            StageLogger::new(self.ctx.project(), stage).log_error(&e.to_string());
            e.in_stage(stage)
        })
    }

    /// Run stages `from..=to`, skipping those already complete.
    ///
    /// Stops after a declined spend or a dry-run plan, since later stages
    /// depend on output that was not produced.
    pub async fn run(&self, from: Stage, to: Stage) -> PipelineResult<RunReport> {
        if from > to {
            return Err(PipelineError::config(format!(
                "stage range {from}..{to} is empty"
            )));
        }

        let mut report = RunReport::default();
        for stage in Stage::range(from, to) {
            let complete = stage
                .is_complete(self.ctx, self.services, self.options)
                .await
                .map_err(|e| e.in_stage(stage))?;
            if complete {
                info!(project = %self.ctx.project(), stage = %stage, "Stage already complete, skipping");
                report
                    .outcomes
                    .push((stage, StageOutcome::skipped("already complete")));
                continue;
            }

            let outcome = self.run_stage(stage).await?;
            info!(project = %self.ctx.project(), stage = %stage, outcome = %outcome, "Stage finished");
            let proceed = outcome.allows_next();
            report.outcomes.push((stage, outcome));
            if !proceed {
                break;
            }
        }
        Ok(report)
    }
}
