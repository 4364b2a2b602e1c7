//! Pipeline stages and completion detection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::context::ProjectContext;
use crate::error::{PipelineError, PipelineResult};
use crate::services::Services;
use crate::stages::StageOptions;

/// One step of a project, in execution order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Analyze,
    Prompts,
    Log,
    Images,
    Videos,
    Combine,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Analyze,
        Stage::Prompts,
        Stage::Log,
        Stage::Images,
        Stage::Videos,
        Stage::Combine,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Analyze => "analyze",
            Stage::Prompts => "prompts",
            Stage::Log => "log",
            Stage::Images => "images",
            Stage::Videos => "videos",
            Stage::Combine => "combine",
        }
    }

    /// Stages from `from` to `to`, inclusive, in execution order.
    pub fn range(from: Stage, to: Stage) -> impl Iterator<Item = Stage> {
        Self::ALL.into_iter().filter(move |s| *s >= from && *s <= to)
    }

    /// Whether the stage submits paid generation jobs.
    pub fn is_paid(&self) -> bool {
        matches!(self, Stage::Images | Stage::Videos)
    }

    /// Whether the stage's expected output already exists.
    ///
    /// Only reads: local artifacts and the record store.
    pub async fn is_complete(
        &self,
        ctx: &ProjectContext,
        services: &Services,
        options: &StageOptions,
    ) -> PipelineResult<bool> {
        match self {
            Stage::Analyze => Ok(tokio::fs::try_exists(ctx.analysis_path()).await?),
            Stage::Prompts => Ok(tokio::fs::try_exists(ctx.prompts_path()).await?),
            Stage::Log => {
                let records = services.store()?.list_project(ctx.project()).await?;
                Ok(!records.is_empty() && ctx.unlogged_scenes(&records).await?.is_empty())
            }
            Stage::Images => {
                let records = services.store()?.list_project(ctx.project()).await?;
                Ok(!records.is_empty() && records.iter().all(|r| r.image_reference().is_some()))
            }
            Stage::Videos => {
                let records = services.store()?.list_project(ctx.project()).await?;
                Ok(!records.is_empty() && records.iter().all(|r| r.video_reference().is_some()))
            }
            Stage::Combine => {
                let output = options.combine.output_path(ctx);
                Ok(tokio::fs::try_exists(output).await?)
            }
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| PipelineError::config(format!("unknown stage: {s}")))
    }
}

/// What a stage did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// Work was done.
    Completed { summary: String },
    /// Nothing left to do.
    Skipped { reason: String },
    /// Dry run: the plan was printed, nothing was changed.
    Planned,
    /// The spend was not approved.
    Declined,
}

impl StageOutcome {
    pub fn completed(summary: impl Into<String>) -> Self {
        Self::Completed {
            summary: summary.into(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    /// Whether later stages may run after this one.
    pub fn allows_next(&self) -> bool {
        matches!(self, StageOutcome::Completed { .. } | StageOutcome::Skipped { .. })
    }
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageOutcome::Completed { summary } => write!(f, "completed ({summary})"),
            StageOutcome::Skipped { reason } => write!(f, "skipped ({reason})"),
            StageOutcome::Planned => f.write_str("planned (dry run)"),
            StageOutcome::Declined => f.write_str("declined"),
        }
    }
}
