//! # Work Item Model
//!
//! The unit of batch work: an opaque payload plus its lifecycle state.
//!
//! ## Lifecycle
//!
//! ```text
//! Pending -> Processing -> Completed
//!                       \-> Error -> Pending (retry)
//! ```
//!
//! `attempts` is incremented every time the item leaves `Pending` for
//! `Processing` and is never reset, so a retried item keeps its history.
//! `error_detail` is present only while the item is in `Error`;
//! `completed_at` only while it is in `Completed` or `Error`.
//!
//! Items are mutated exclusively through
//! [`ItemStateMachine`](crate::state_machine::ItemStateMachine); callers only
//! ever observe clones.

use crate::error::{PipelineError, PipelineResult};
use crate::models::ItemId;
use crate::state_machine::ItemState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem<P> {
    pub(crate) id: ItemId,
    pub(crate) payload: P,
    pub(crate) state: ItemState,
    pub(crate) error_detail: Option<String>,
    pub(crate) attempts: u32,
    pub(crate) output: Option<Value>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) completed_at: Option<DateTime<Utc>>,
}

impl<P> WorkItem<P> {
    /// Create a pending item with a freshly generated id
    pub fn new(payload: P) -> Self {
        Self::with_id(ItemId::new(), payload)
    }

    /// Create a pending item with a caller-chosen id (e.g. a row number mapped to a uuid)
    pub fn with_id(id: ItemId, payload: P) -> Self {
        Self {
            id,
            payload,
            state: ItemState::Pending,
            error_detail: None,
            attempts: 0,
            output: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Build an item only if the payload passes a structural check.
    ///
    /// Rejections surface as `PipelineError::Validation` and never become
    /// item state.
    pub fn try_new<F>(payload: P, check: F) -> PipelineResult<Self>
    where
        F: FnOnce(&P) -> Result<(), String>,
    {
        check(&payload).map_err(PipelineError::Validation)?;
        Ok(Self::new(payload))
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn state(&self) -> ItemState {
        self.state
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Output recorded by a successful processing run
    pub fn output(&self) -> Option<&Value> {
        self.output.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn is_retryable(&self) -> bool {
        self.state.is_error()
    }
}
