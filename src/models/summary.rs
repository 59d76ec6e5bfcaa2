use crate::models::{ItemId, ProgressSnapshot, SessionId};
use crate::state_machine::SessionStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A failed item as shown in a results table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub item_id: ItemId,
    pub error_detail: String,
    pub attempts: u32,
}

/// Session-level report: status, counts, timing and every failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub progress: ProgressSnapshot,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// The most recent run ended through `cancel`
    pub cancelled: bool,
    pub failures: Vec<ItemFailure>,
}

impl SessionSummary {
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}
