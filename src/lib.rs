#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Bulkflow Core
//!
//! Reusable bulk item-processing pipeline: a batch of discrete work items
//! (rows to import, QR codes to generate, report jobs to render) driven through
//! a per-item lifecycle with aggregate progress, per-item retry and a
//! multi-phase wizard that gates advancement on item-level outcomes.
//!
//! ## Architecture
//!
//! - Each item moves `Pending -> Processing -> Completed | Error`, with
//!   `Error -> Pending` as the only way back
//! - A [`BatchSession`](orchestration::BatchSession) holds the ordered items,
//!   an id index and O(1) progress counters behind a single lock
//! - The [`TransitionEngine`](orchestration::TransitionEngine) dispatches
//!   pending items to a caller-supplied [`ItemProcessor`](orchestration::ItemProcessor),
//!   sequentially or with bounded concurrency
//! - Per-item failures stay on the item; only a fatal processing error aborts
//!   the whole session
//! - The [`PhaseSequencer`](orchestration::PhaseSequencer) sequences guarded
//!   wizard phases; the [`import`] wizard runs row validation as a nested session
//!
//! ## Module Organization
//!
//! - [`models`] - Work items, ids, progress snapshots and summaries
//! - [`state_machine`] - Item and session transition tables and guards
//! - [`orchestration`] - Sessions, engine, progress aggregation, phase sequencing
//! - [`events`] - Broadcast of item and session lifecycle events
//! - [`config`] - Layered YAML configuration
//! - [`logging`] - Structured logging setup
//! - [`validation`] / [`import`] - Row validation and the import wizard
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bulkflow_core::orchestration::{processor_fn, ItemOutcome, SessionManager};
//! use bulkflow_core::{SessionConfig, WorkItem};
//!
//! # async fn example() -> bulkflow_core::PipelineResult<()> {
//! let manager = SessionManager::new(processor_fn("encode_qr", |url: String| async move {
//!     if url.starts_with("https://") {
//!         Ok(ItemOutcome::success())
//!     } else {
//!         Ok(ItemOutcome::failure("only https links can be encoded"))
//!     }
//! }));
//!
//! let items = vec![
//!     WorkItem::new("https://example.com/a".to_string()),
//!     WorkItem::new("ftp://example.com/b".to_string()),
//! ];
//! let session = manager.create_session(items, SessionConfig::default().with_concurrency(4))?;
//! manager.start(session).await?;
//!
//! let snapshot = manager.snapshot(session)?;
//! assert_eq!((snapshot.completed, snapshot.error), (1, 1));
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod import;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod state_machine;
pub mod validation;

pub use config::{BulkflowConfig, ConfigManager, SessionConfig};
pub use constants::SESSION_ABORTED_REASON;
pub use error::{PipelineError, PipelineResult};
pub use events::{EventPublisher, LifecycleEvent};
pub use logging::init_structured_logging;
pub use models::{
    ItemFailure, ItemId, ProgressSnapshot, SessionId, SessionSummary, SubscriptionHandle, WorkItem,
};
pub use orchestration::{
    processor_fn, BatchSession, FatalProcessingError, ItemOutcome, ItemProcessor, PhaseFlow,
    PhaseSequencer, SessionManager, TransitionEngine,
};
pub use state_machine::{ItemState, SessionStatus};
