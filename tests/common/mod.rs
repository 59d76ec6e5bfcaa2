//! Shared helpers for integration tests
#![allow(dead_code)]

pub mod processors;

pub use processors::*;

use bulkflow_core::{ProgressSnapshot, WorkItem};
use parking_lot::Mutex;
use std::sync::Arc;

/// Work items with payloads `1..=n`
pub fn numbered_items(n: u32) -> Vec<WorkItem<u32>> {
    (1..=n).map(WorkItem::new).collect()
}

/// Subscriber callback that records every snapshot it receives
#[derive(Clone, Default)]
pub struct SnapshotRecorder {
    seen: Arc<Mutex<Vec<ProgressSnapshot>>>,
}

impl SnapshotRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> Arc<dyn Fn(&ProgressSnapshot) + Send + Sync> {
        let seen = Arc::clone(&self.seen);
        Arc::new(move |snapshot: &ProgressSnapshot| seen.lock().push(*snapshot))
    }

    pub fn snapshots(&self) -> Vec<ProgressSnapshot> {
        self.seen.lock().clone()
    }
}
