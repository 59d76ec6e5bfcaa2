//! Test processors with controllable outcomes

use async_trait::async_trait;
use bulkflow_core::orchestration::{FatalProcessingError, ItemOutcome, ItemProcessor, ProcessResult};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Fails the payloads in `failing` with "invalid format" until they are fixed
#[derive(Default)]
pub struct ScriptedProcessor {
    failing: Mutex<HashSet<u32>>,
    fatal_at: Option<u32>,
    pub calls: AtomicUsize,
}

impl ScriptedProcessor {
    pub fn failing(payloads: impl IntoIterator<Item = u32>) -> Arc<Self> {
        Arc::new(Self {
            failing: Mutex::new(payloads.into_iter().collect()),
            ..Self::default()
        })
    }

    pub fn fatal_at(payload: u32) -> Arc<Self> {
        Arc::new(Self {
            fatal_at: Some(payload),
            ..Self::default()
        })
    }

    /// Correct the underlying condition for `payload`
    pub fn fix(&self, payload: u32) {
        self.failing.lock().remove(&payload);
    }
}

#[async_trait]
impl ItemProcessor<u32> for ScriptedProcessor {
    async fn process(&self, payload: &u32) -> ProcessResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fatal_at == Some(*payload) {
            return Err(FatalProcessingError::new("storage unavailable"));
        }
        tokio::task::yield_now().await;
        if self.failing.lock().contains(payload) {
            Ok(ItemOutcome::failure("invalid format"))
        } else {
            Ok(ItemOutcome::success_with(serde_json::json!(payload * 10)))
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Holds `gate_at` in `Processing` until released
pub struct GatedProcessor {
    gate_at: u32,
    pub entered: Notify,
    pub release: Notify,
}

impl GatedProcessor {
    pub fn new(gate_at: u32) -> Arc<Self> {
        Arc::new(Self {
            gate_at,
            entered: Notify::new(),
            release: Notify::new(),
        })
    }
}

#[async_trait]
impl ItemProcessor<u32> for GatedProcessor {
    async fn process(&self, payload: &u32) -> ProcessResult {
        if *payload == self.gate_at {
            self.entered.notify_one();
            self.release.notified().await;
        }
        Ok(ItemOutcome::success())
    }
}

/// Tracks the highest number of simultaneous invocations
#[derive(Default)]
pub struct ConcurrencyProbe {
    current: AtomicUsize,
    pub max_seen: AtomicUsize,
}

#[async_trait]
impl ItemProcessor<u32> for ConcurrencyProbe {
    async fn process(&self, _payload: &u32) -> ProcessResult {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(ItemOutcome::success())
    }
}
