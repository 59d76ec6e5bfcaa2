use serde::{Deserialize, Serialize};

/// Point-in-time copy of a session's item-status counts.
///
/// Produced by the progress aggregator; consumers never recompute counts.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub error: usize,
    /// `(completed + error) / total * 100`, 0 for an empty session
    pub percent_complete: f64,
    /// Increments by one per applied transition
    pub sequence: u64,
}

impl ProgressSnapshot {
    /// Items that have left the pipeline, successfully or not
    pub fn done(&self) -> usize {
        self.completed + self.error
    }

    /// Items still queued or in flight
    pub fn outstanding(&self) -> usize {
        self.pending + self.processing
    }

    pub fn is_consistent(&self) -> bool {
        self.pending + self.processing + self.completed + self.error == self.total
    }
}
