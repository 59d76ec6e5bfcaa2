//! # Session Manager
//!
//! The public entry point of the pipeline: owns the sessions created against
//! one processing function and exposes the create / add / start / retry /
//! cancel / observe operations keyed by [`SessionId`].
//!
//! Sessions are stored as `Arc<BatchSession<P>>` in a [`DashMap`]; every
//! operation clones the `Arc` out of the map before doing any work so no map
//! shard lock is held across an await or a subscriber callback.
//!
//! ```rust
//! use bulkflow_core::orchestration::{processor_fn, ItemOutcome, SessionManager};
//! use bulkflow_core::{SessionConfig, SessionStatus, WorkItem};
//!
//! # tokio_test::block_on(async {
//! let manager = SessionManager::new(processor_fn("render", |pages: u32| async move {
//!     if pages == 0 {
//!         Ok(ItemOutcome::failure("empty report"))
//!     } else {
//!         Ok(ItemOutcome::success())
//!     }
//! }));
//!
//! let items = vec![WorkItem::new(3), WorkItem::new(0), WorkItem::new(7)];
//! let session = manager.create_session(items, SessionConfig::default()).unwrap();
//! assert_eq!(manager.start(session).await.unwrap(), SessionStatus::Finished);
//!
//! let snapshot = manager.snapshot(session).unwrap();
//! assert_eq!((snapshot.completed, snapshot.error), (2, 1));
//! # });
//! ```

use crate::config::{BulkflowConfig, SessionConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::events::{EventPublisher, LifecycleEvent};
use crate::models::{ItemId, ProgressSnapshot, SessionId, SessionSummary, SubscriptionHandle, WorkItem};
use crate::orchestration::batch_session::BatchSession;
use crate::orchestration::item_processor::ItemProcessor;
use crate::orchestration::progress_aggregator::ProgressCallback;
use crate::orchestration::transition_engine::TransitionEngine;
use crate::state_machine::SessionStatus;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

pub struct SessionManager<P> {
    sessions: DashMap<SessionId, Arc<BatchSession<P>>>,
    engine: TransitionEngine<P>,
    events: EventPublisher,
    default_config: SessionConfig,
}

impl<P> SessionManager<P>
where
    P: Clone + Send + Sync + 'static,
{
    /// Manager with built-in defaults
    pub fn new(processor: Arc<dyn ItemProcessor<P>>) -> Self {
        Self::with_config(processor, &BulkflowConfig::default())
    }

    /// Manager whose session defaults and event channel come from `config`
    pub fn with_config(processor: Arc<dyn ItemProcessor<P>>, config: &BulkflowConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            engine: TransitionEngine::new(processor),
            events: EventPublisher::new(config.events.channel_capacity),
            default_config: config.session.clone(),
        }
    }

    pub fn default_config(&self) -> &SessionConfig {
        &self.default_config
    }

    /// Create an idle session over `items` with an explicit run configuration.
    ///
    /// Fails with `Validation` for a zero concurrency, a zero timeout or
    /// duplicate item ids.
    pub fn create_session(
        &self,
        items: Vec<WorkItem<P>>,
        config: SessionConfig,
    ) -> PipelineResult<SessionId> {
        let session = BatchSession::new(items, config, self.events.clone())?;
        let session_id = session.id();
        info!(
            session_id = %session_id,
            items = session.len(),
            concurrency = session.config().concurrency,
            "Session created"
        );
        self.sessions.insert(session_id, Arc::new(session));
        Ok(session_id)
    }

    pub fn create_session_with_defaults(&self, items: Vec<WorkItem<P>>) -> PipelineResult<SessionId> {
        self.create_session(items, self.default_config.clone())
    }

    /// Append an item to an idle session
    pub fn add_item(&self, session_id: SessionId, item: WorkItem<P>) -> PipelineResult<ItemId> {
        self.session(session_id)?.add_item(item)
    }

    /// Run the session until it is finished. See [`TransitionEngine::start`].
    pub async fn start(&self, session_id: SessionId) -> PipelineResult<SessionStatus> {
        let session = self.session(session_id)?;
        self.engine.start(session).await
    }

    pub fn retry_item(&self, session_id: SessionId, item_id: ItemId) -> PipelineResult<()> {
        let session = self.session(session_id)?;
        self.engine.retry_item(&session, item_id)
    }

    /// Requeue every failed item of the session; returns how many
    pub fn retry_failed(&self, session_id: SessionId) -> PipelineResult<usize> {
        let requeued = self.session(session_id)?.retry_failed();
        debug!(session_id = %session_id, requeued, "Failed items requeued");
        Ok(requeued)
    }

    pub fn cancel(&self, session_id: SessionId) -> PipelineResult<SessionStatus> {
        let session = self.session(session_id)?;
        self.engine.cancel(&session)
    }

    pub fn subscribe(
        &self,
        session_id: SessionId,
        callback: ProgressCallback,
    ) -> PipelineResult<SubscriptionHandle> {
        Ok(self.session(session_id)?.subscribe(callback))
    }

    /// Returns false if the handle was not registered on this session
    pub fn unsubscribe(
        &self,
        session_id: SessionId,
        handle: SubscriptionHandle,
    ) -> PipelineResult<bool> {
        Ok(self.session(session_id)?.unsubscribe(handle))
    }

    pub fn snapshot(&self, session_id: SessionId) -> PipelineResult<ProgressSnapshot> {
        Ok(self.session(session_id)?.snapshot())
    }

    pub fn status(&self, session_id: SessionId) -> PipelineResult<SessionStatus> {
        Ok(self.session(session_id)?.status())
    }

    pub fn items(&self, session_id: SessionId) -> PipelineResult<Vec<WorkItem<P>>> {
        Ok(self.session(session_id)?.items())
    }

    pub fn item(&self, session_id: SessionId, item_id: ItemId) -> PipelineResult<WorkItem<P>> {
        self.session(session_id)?
            .item(item_id)
            .ok_or(PipelineError::ItemNotFound {
                session_id,
                item_id,
            })
    }

    pub fn summary(&self, session_id: SessionId) -> PipelineResult<SessionSummary> {
        Ok(self.session(session_id)?.summary())
    }

    /// Drop a session that is not running
    pub fn remove_session(&self, session_id: SessionId) -> PipelineResult<()> {
        let session = self.session(session_id)?;
        let status = session.status();
        if status.is_active() {
            return Err(PipelineError::InvalidState {
                session_id,
                reason: format!("cannot remove a session that is {status}"),
            });
        }
        self.sessions.remove(&session_id);
        debug!(session_id = %session_id, "Session removed");
        Ok(())
    }

    /// Shared handle to a session
    pub fn session(&self, session_id: SessionId) -> PipelineResult<Arc<BatchSession<P>>> {
        self.sessions
            .get(&session_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(PipelineError::SessionNotFound(session_id))
    }

    /// Receive item and session lifecycle events for every session of this manager
    pub fn lifecycle_events(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    pub fn event_publisher(&self) -> &EventPublisher {
        &self.events
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl<P> std::fmt::Debug for SessionManager<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.sessions.len())
            .field("engine", &self.engine)
            .field("default_config", &self.default_config)
            .finish()
    }
}
