//! Airtable REST client and scene record store.
//!
//! This crate provides:
//! - A tuned Airtable client with retry and observability
//! - The `SceneStore` abstraction used by every pipeline stage
//! - An Airtable-backed repository and an in-memory store

pub mod client;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod repository;
pub mod retry;
pub mod store;
pub mod types;


pub use client::{AirtableClient, AirtableConfig};
pub use error::{RecordError, RecordResult};
pub use memory::MemorySceneStore;
pub use repository::SceneRepository;
pub use retry::RetryConfig;
pub use store::SceneStore;
pub use types::{Attachment, Fields, Record};
