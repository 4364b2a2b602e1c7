//! Structured stage logging and subscriber setup.

use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cloner_models::ProjectName;

use crate::stage::Stage;

/// Install the global tracing subscriber.
///
/// Human-readable output by default, JSON when `LOG_FORMAT=json`.
/// `RUST_LOG` directives are honoured on top of `cloner=info`.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    if let Ok(directive) = "cloner=info".parse() {
        env_filter = env_filter.add_directive(directive);
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Stage logger carrying the project and stage on every event.
#[derive(Debug, Clone)]
pub struct StageLogger {
    project: String,
    stage: Stage,
}

impl StageLogger {
    pub fn new(project: &ProjectName, stage: Stage) -> Self {
        Self {
            project: project.to_string(),
            stage,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            project = %self.project,
            stage = %self.stage,
            "Stage started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            project = %self.project,
            stage = %self.stage,
            "{}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            project = %self.project,
            stage = %self.stage,
            "Stage warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            project = %self.project,
            stage = %self.stage,
            "Stage error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            project = %self.project,
            stage = %self.stage,
            "Stage completed: {}", message
        );
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Span for everything done on behalf of this stage.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "stage",
            project = %self.project,
            stage = %self.stage
        )
    }
}
