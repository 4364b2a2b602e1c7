//! Generation job dispatch and completion polling.
//!
//! This crate provides:
//! - The `GenerationApi` seam and its Kie.ai implementation
//! - Staged backoff schedules per job kind
//! - Spend approval tokens charged before each paid submission
//! - `JobDispatcher`, which submits jobs and waits for a terminal state

pub mod api;
pub mod approval;
pub mod dispatcher;
pub mod error;
pub mod kie;
pub mod metrics;
pub mod schedule;

pub use api::{ApiError, ApiResult, GenerationApi, GenerationRequest};
pub use approval::SpendApproval;
pub use dispatcher::{DispatcherConfig, JobDispatcher, StatusRetry};
pub use error::{DispatchError, DispatchResult};
pub use kie::{KieClient, KieConfig};
pub use schedule::{BackoffSchedule, PollStage, SchedulePolicy};
