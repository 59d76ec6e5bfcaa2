//! # Orchestration
//!
//! Batch sessions and the machinery that drives them.
//!
//! ## Core Components
//!
//! - **ProgressAggregator**: O(1) status counters and progress subscribers
//! - **ItemProcessor**: the per-item processing hook supplied by each use case
//! - **BatchSession**: ordered items, id index and counters under one lock
//! - **TransitionEngine**: sequential or bounded-concurrency dispatch, retry and cancel
//! - **SessionManager**: `SessionId`-keyed entry point for all session operations
//! - **PhaseSequencer**: guarded multi-phase wizard state machine

pub mod batch_session;
pub mod item_processor;
pub mod phase_sequencer;
pub mod progress_aggregator;
pub mod session_manager;
pub mod transition_engine;

pub use batch_session::BatchSession;
pub use item_processor::{
    processor_fn, FatalProcessingError, FnProcessor, ItemOutcome, ItemProcessor, ProcessResult,
};
pub use phase_sequencer::{PhaseFlow, PhaseSequencer};
pub use progress_aggregator::{ProgressAggregator, ProgressCallback, ProgressSubscribers};
pub use session_manager::SessionManager;
pub use transition_engine::TransitionEngine;
