//! # Progress Aggregator
//!
//! Incrementally maintained item-status counters and the subscriber registry
//! that receives a [`ProgressSnapshot`] after every transition.
//!
//! Counters are adjusted in O(1) per transition (decrement the old status,
//! increment the new one) and are never rebuilt from the item collection.
//! The aggregator itself is not synchronized: it lives inside the session's
//! state mutex, which is the single synchronization point for every counter
//! update.

use crate::models::{ProgressSnapshot, SubscriptionHandle};
use crate::state_machine::ItemState;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// Callback invoked with a copy of the snapshot after each transition
pub type ProgressCallback = Arc<dyn Fn(&ProgressSnapshot) + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressAggregator {
    total: usize,
    pending: usize,
    processing: usize,
    completed: usize,
    error: usize,
    sequence: u64,
}

impl ProgressAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed counters for items that start out pending
    pub fn with_pending(total: usize) -> Self {
        Self {
            total,
            pending: total,
            ..Self::default()
        }
    }

    /// Account for an item appended while the session is idle
    pub fn record_added(&mut self) {
        self.total += 1;
        self.pending += 1;
        self.sequence += 1;
    }

    /// Move one item from `from` to `to`
    pub fn record_transition(&mut self, from: ItemState, to: ItemState) {
        *self.counter_mut(from) = self.counter(from).saturating_sub(1);
        *self.counter_mut(to) += 1;
        self.sequence += 1;
        debug_assert!(
            self.pending + self.processing + self.completed + self.error == self.total,
            "progress counters diverged from total"
        );
    }

    pub fn counter(&self, state: ItemState) -> usize {
        match state {
            ItemState::Pending => self.pending,
            ItemState::Processing => self.processing,
            ItemState::Completed => self.completed,
            ItemState::Error => self.error,
        }
    }

    fn counter_mut(&mut self, state: ItemState) -> &mut usize {
        match state {
            ItemState::Pending => &mut self.pending,
            ItemState::Processing => &mut self.processing,
            ItemState::Completed => &mut self.completed,
            ItemState::Error => &mut self.error,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn percent_complete(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.completed + self.error) as f64 / self.total as f64 * 100.0
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.total,
            pending: self.pending,
            processing: self.processing,
            completed: self.completed,
            error: self.error,
            percent_complete: self.percent_complete(),
            sequence: self.sequence,
        }
    }
}

/// Ordered registry of progress callbacks.
///
/// Cloning copies the handles, not the callbacks, so a session can take a
/// copy under its lock and deliver after releasing it.
#[derive(Clone, Default)]
pub struct ProgressSubscribers {
    next_id: u64,
    callbacks: Vec<(SubscriptionHandle, ProgressCallback)>,
}

impl ProgressSubscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, callback: ProgressCallback) -> SubscriptionHandle {
        self.next_id += 1;
        let handle = SubscriptionHandle(self.next_id);
        self.callbacks.push((handle, callback));
        handle
    }

    /// Returns false if the handle was not registered
    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|(h, _)| *h != handle);
        self.callbacks.len() != before
    }

    /// Deliver the same snapshot to every subscriber, in subscription order.
    ///
    /// A panicking callback is logged and skipped; later subscribers still run.
    pub fn notify(&self, snapshot: &ProgressSnapshot) {
        for (handle, callback) in &self.callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(snapshot))).is_err() {
                warn!(
                    subscription = handle.0,
                    sequence = snapshot.sequence,
                    "Progress subscriber panicked"
                );
            }
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl fmt::Debug for ProgressSubscribers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressSubscribers")
            .field("count", &self.callbacks.len())
            .finish()
    }
}
