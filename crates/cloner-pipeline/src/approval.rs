//! Spend approval gate.
//!
//! Paid stages ask the gate before submitting anything. An approved
//! estimate becomes a [`SpendApproval`] sized to exactly that estimate.

use std::io::Write;

use async_trait::async_trait;
use tracing::info;

use cloner_jobs::SpendApproval;
use cloner_models::CostEstimate;

use crate::error::{PipelineError, PipelineResult};
use crate::stage::Stage;

/// Decides whether a stage may spend money.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    /// `None` when the spend was declined.
    async fn approve(
        &self,
        stage: Stage,
        estimate: &CostEstimate,
    ) -> PipelineResult<Option<SpendApproval>>;
}

/// Approves every estimate (`--yes`).
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait]
impl ApprovalGate for AutoApprove {
    async fn approve(
        &self,
        stage: Stage,
        estimate: &CostEstimate,
    ) -> PipelineResult<Option<SpendApproval>> {
        info!(stage = %stage, estimate = %estimate, "Spend auto-approved");
        Ok(Some(SpendApproval::for_estimate(estimate)))
    }
}

/// Asks on the terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleApproval;

/// `yes` or `y`, case-insensitive.
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "yes" | "y")
}

#[async_trait]
impl ApprovalGate for ConsoleApproval {
    async fn approve(
        &self,
        stage: Stage,
        estimate: &CostEstimate,
    ) -> PipelineResult<Option<SpendApproval>> {
        let question = format!(
            "\nThe {stage} stage will submit {} job(s) with {} at {} each = {} total\nReady to proceed? (yes/no): ",
            estimate.count, estimate.model, estimate.unit, estimate.total
        );

        let answer = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
            let mut stdout = std::io::stdout();
            stdout.write_all(question.as_bytes())?;
            stdout.flush()?;
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
            Ok(line)
        })
        .await
        .map_err(|e| PipelineError::config(format!("approval prompt failed: {e}")))??;

        if is_affirmative(&answer) {
            Ok(Some(SpendApproval::for_estimate(estimate)))
        } else {
            info!(stage = %stage, "Spend declined");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloner_models::GenerationModel;

    #[test]
    fn test_affirmative_answers() {
        assert!(is_affirmative("yes\n"));
        assert!(is_affirmative(" Y "));
        assert!(!is_affirmative("no"));
        assert!(!is_affirmative(""));
        assert!(!is_affirmative("yep"));
    }

    #[tokio::test]
    async fn test_auto_approve_sized_to_estimate() {
        let estimate = GenerationModel::NanoBananaPro.estimate(3);
        let approval = AutoApprove
            .approve(Stage::Images, &estimate)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(approval.budget(), estimate.total);
    }
}
