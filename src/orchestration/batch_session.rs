//! # Batch Session
//!
//! An ordered collection of work items plus run configuration and session
//! status.
//!
//! ## Layout
//!
//! - `items`: insertion order is dispatch priority and is frozen once the
//!   session leaves `Idle`
//! - `index`: `ItemId -> position`, O(1) lookup for retry and completion
//! - `pending`: ordered set of pending positions, so the next item to dispatch
//!   is always the lowest pending position (retried items re-enter in place)
//! - `progress`: the [`ProgressAggregator`] counters
//!
//! All of the above sit behind one `parking_lot::Mutex`, the single
//! synchronization point for item state and counters.
//!
//! ## Notification delivery
//!
//! Every transition queues its notifications on an outbox inside the state
//! lock. Whichever caller finds no delivery in progress drains the outbox,
//! releasing the state lock around each callback. Callbacks therefore see
//! snapshots in transition order and may call back into the session
//! (cancel, subscribe, unsubscribe, read a snapshot): a transition made from
//! inside a callback is queued and delivered by the drain already running.

use crate::config::SessionConfig;
use crate::constants::{events as event_names, item_event_name, SESSION_ABORTED_REASON};
use crate::error::{PipelineError, PipelineResult};
use crate::events::{EventPublisher, LifecycleEvent};
use crate::models::{
    ItemFailure, ItemId, ProgressSnapshot, SessionId, SessionSummary, SubscriptionHandle, WorkItem,
};
use crate::orchestration::progress_aggregator::{
    ProgressAggregator, ProgressCallback, ProgressSubscribers,
};
use crate::state_machine::{
    ItemCanBeRetriedGuard, ItemEvent, ItemState, ItemStateMachine, SessionAcceptsItemsGuard,
    SessionEvent, SessionStateMachine, SessionStatus, StateGuard,
};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeSet, HashMap, VecDeque};
use tracing::{debug, warn};

/// Outcome of asking a session to begin a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunStart {
    Started { pending: usize },
    AlreadyActive(SessionStatus),
}

enum Notification {
    Item(LifecycleEvent, ProgressSnapshot),
    Session(LifecycleEvent),
    Progress(ProgressSnapshot),
}

struct SessionState<P> {
    status: SessionStatus,
    items: Vec<WorkItem<P>>,
    index: HashMap<ItemId, usize>,
    pending: BTreeSet<usize>,
    progress: ProgressAggregator,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    cancelled: bool,
    outbox: VecDeque<Notification>,
    delivering: bool,
}

pub struct BatchSession<P> {
    id: SessionId,
    config: SessionConfig,
    created_at: DateTime<Utc>,
    state: Mutex<SessionState<P>>,
    subscribers: Mutex<ProgressSubscribers>,
    events: EventPublisher,
}

impl<P> BatchSession<P> {
    /// Create an idle session over `items`.
    ///
    /// Every item must be pending and ids must be unique. A zero-item session
    /// is legal and finishes as soon as it is started.
    pub fn new(
        items: Vec<WorkItem<P>>,
        config: SessionConfig,
        events: EventPublisher,
    ) -> PipelineResult<Self> {
        config
            .validate()
            .map_err(|e| PipelineError::Validation(e.to_string()))?;

        let mut index = HashMap::with_capacity(items.len());
        for (position, item) in items.iter().enumerate() {
            if item.state() != ItemState::Pending {
                return Err(PipelineError::validation(format!(
                    "Item {} must be pending to join a session, found {}",
                    item.id(),
                    item.state()
                )));
            }
            if index.insert(item.id(), position).is_some() {
                return Err(PipelineError::validation(format!(
                    "Duplicate item id {}",
                    item.id()
                )));
            }
        }

        let state = SessionState {
            status: SessionStatus::Idle,
            pending: (0..items.len()).collect(),
            progress: ProgressAggregator::with_pending(items.len()),
            items,
            index,
            started_at: None,
            finished_at: None,
            cancelled: false,
            outbox: VecDeque::new(),
            delivering: false,
        };

        Ok(Self {
            id: SessionId::new(),
            config,
            created_at: Utc::now(),
            state: Mutex::new(state),
            subscribers: Mutex::new(ProgressSubscribers::new()),
            events,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> SessionStatus {
        self.state.lock().status
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A copy of the current counts
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.state.lock().progress.snapshot()
    }

    pub fn subscribe(&self, callback: ProgressCallback) -> SubscriptionHandle {
        self.subscribers.lock().subscribe(callback)
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.subscribers.lock().unsubscribe(handle)
    }

    pub fn summary(&self) -> SessionSummary {
        let state = self.state.lock();
        let failures = state
            .items
            .iter()
            .filter(|item| item.state().is_error())
            .map(|item| ItemFailure {
                item_id: item.id(),
                error_detail: item.error_detail().unwrap_or_default().to_string(),
                attempts: item.attempts(),
            })
            .collect();

        SessionSummary {
            session_id: self.id,
            status: state.status,
            progress: state.progress.snapshot(),
            started_at: state.started_at,
            finished_at: state.finished_at,
            cancelled: state.cancelled,
            failures,
        }
    }

    /// Append an item; legal only before the first start
    pub(crate) fn add_item(&self, item: WorkItem<P>) -> PipelineResult<ItemId> {
        let mut state = self.state.lock();

        SessionAcceptsItemsGuard
            .check(&state.status)
            .map_err(|e| PipelineError::InvalidState {
                session_id: self.id,
                reason: e.to_string(),
            })?;

        if item.state() != ItemState::Pending {
            return Err(PipelineError::validation(format!(
                "Item {} must be pending to join a session, found {}",
                item.id(),
                item.state()
            )));
        }
        if state.index.contains_key(&item.id()) {
            return Err(PipelineError::validation(format!(
                "Duplicate item id {}",
                item.id()
            )));
        }

        let item_id = item.id();
        let position = state.items.len();
        state.items.push(item);
        state.index.insert(item_id, position);
        state.pending.insert(position);
        state.progress.record_added();

        let snapshot = state.progress.snapshot();
        self.flush(state, vec![Notification::Progress(snapshot)]);
        Ok(item_id)
    }

    /// Move an idle or finished session to `Running`
    pub(crate) fn begin_run(&self) -> PipelineResult<RunStart> {
        let mut state = self.state.lock();
        if state.status.is_active() {
            return Ok(RunStart::AlreadyActive(state.status));
        }

        let from = state.status;
        state.status = SessionStateMachine::determine_target_state(from, SessionEvent::Start)?;
        state.started_at = Some(Utc::now());
        state.finished_at = None;
        state.cancelled = false;

        let pending = state.pending.len();
        let event = LifecycleEvent::for_session(
            event_names::SESSION_STARTED,
            self.id,
            from,
            state.status,
            serde_json::json!({
                "pending": pending,
                "total": state.progress.total(),
                "concurrency": self.config.concurrency,
            }),
        );
        self.flush(state, vec![Notification::Session(event)]);
        Ok(RunStart::Started { pending })
    }

    /// Claim the lowest-positioned pending item and mark it `Processing`.
    ///
    /// Returns `None` once nothing is pending or the session is no longer
    /// `Running` (cancellation stops dispatch here).
    pub(crate) fn claim_next(&self) -> Option<(ItemId, P)>
    where
        P: Clone,
    {
        let mut state = self.state.lock();
        if state.status != SessionStatus::Running {
            return None;
        }

        let position = state.pending.pop_first()?;
        match self.apply(&mut state, position, ItemEvent::Start) {
            Ok(notification) => {
                let item = &state.items[position];
                let claimed = (item.id(), item.payload().clone());
                self.flush(state, vec![notification]);
                Some(claimed)
            }
            Err(e) => {
                warn!(session_id = %self.id, position, error = %e, "Pending set out of sync with item state");
                None
            }
        }
    }

    /// Record a success; returns the item's attempt count
    pub(crate) fn complete_item(
        &self,
        item_id: ItemId,
        output: Option<serde_json::Value>,
    ) -> PipelineResult<u32> {
        let mut state = self.state.lock();
        let position = self.position(&state, item_id)?;
        let notification = self.apply(&mut state, position, ItemEvent::Complete(output))?;
        let attempts = state.items[position].attempts();
        self.flush(state, vec![notification]);
        Ok(attempts)
    }

    /// Record a per-item failure; returns the item's attempt count
    pub(crate) fn fail_item(&self, item_id: ItemId, reason: String) -> PipelineResult<u32> {
        let mut state = self.state.lock();
        let position = self.position(&state, item_id)?;
        let notification = self.apply(&mut state, position, ItemEvent::Fail(reason))?;
        let attempts = state.items[position].attempts();
        self.flush(state, vec![notification]);
        Ok(attempts)
    }

    /// `Error -> Pending`; rejected for any other state
    pub(crate) fn retry_item(&self, item_id: ItemId) -> PipelineResult<()> {
        let mut state = self.state.lock();
        let position = self.position(&state, item_id)?;

        ItemCanBeRetriedGuard
            .check(&state.items[position])
            .map_err(|e| PipelineError::InvalidTransition {
                item_id,
                reason: e.to_string(),
            })?;

        let notification = self.apply(&mut state, position, ItemEvent::Retry)?;
        state.pending.insert(position);
        self.flush(state, vec![notification]);
        Ok(())
    }

    /// Requeue every failed item; returns how many were requeued
    pub(crate) fn retry_failed(&self) -> usize {
        let mut state = self.state.lock();
        let failed: Vec<usize> = state
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.state().is_error())
            .map(|(position, _)| position)
            .collect();

        let mut notifications = Vec::with_capacity(failed.len());
        for position in failed {
            match self.apply(&mut state, position, ItemEvent::Retry) {
                Ok(notification) => {
                    state.pending.insert(position);
                    notifications.push(notification);
                }
                Err(e) => warn!(session_id = %self.id, position, error = %e, "Skipping retry"),
            }
        }

        let count = notifications.len();
        self.flush(state, notifications);
        count
    }

    /// Stop dispatching new items; a no-op unless the session is running
    pub(crate) fn request_cancel(&self) -> PipelineResult<SessionStatus> {
        let mut state = self.state.lock();
        if state.status != SessionStatus::Running {
            debug!(session_id = %self.id, status = %state.status, "Cancel ignored");
            return Ok(state.status);
        }

        let from = state.status;
        state.status = SessionStateMachine::determine_target_state(from, SessionEvent::Cancel)?;
        let event = LifecycleEvent::for_session(
            event_names::SESSION_CANCELLING,
            self.id,
            from,
            state.status,
            serde_json::json!({
                "pending": state.pending.len(),
                "processing": state.progress.counter(ItemState::Processing),
            }),
        );
        let status = state.status;
        self.flush(state, vec![Notification::Session(event)]);
        Ok(status)
    }

    /// Close the run once nothing is in flight.
    ///
    /// Returns `None` when work is still outstanding for this run: items in
    /// flight, or items re-queued by a retry while the session is running.
    pub(crate) fn try_finish(&self) -> PipelineResult<Option<SessionStatus>> {
        let mut state = self.state.lock();
        if state.progress.counter(ItemState::Processing) > 0
            || (state.status == SessionStatus::Running && !state.pending.is_empty())
        {
            return Ok(None);
        }

        let from = state.status;
        state.status = SessionStateMachine::determine_target_state(from, SessionEvent::Finish)?;
        state.cancelled = from == SessionStatus::Cancelling;
        state.finished_at = Some(Utc::now());

        let snapshot = state.progress.snapshot();
        let event = LifecycleEvent::for_session(
            event_names::SESSION_FINISHED,
            self.id,
            from,
            state.status,
            serde_json::json!({
                "cancelled": state.cancelled,
                "completed": snapshot.completed,
                "error": snapshot.error,
                "pending": snapshot.pending,
            }),
        );
        let status = state.status;
        self.flush(state, vec![Notification::Session(event)]);
        Ok(Some(status))
    }

    /// Fatal abort: every item still pending or processing becomes `Error`
    /// with the session-aborted reason, and the session finishes.
    pub(crate) fn abort(&self, cause: &str) -> PipelineResult<usize> {
        let mut state = self.state.lock();

        let outstanding: Vec<usize> = state
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.state().is_outstanding())
            .map(|(position, _)| position)
            .collect();

        let mut notifications = Vec::with_capacity(outstanding.len() + 1);
        for &position in &outstanding {
            notifications.push(self.apply(
                &mut state,
                position,
                ItemEvent::Abort(SESSION_ABORTED_REASON.to_string()),
            )?);
        }
        state.pending.clear();

        let from = state.status;
        state.status = SessionStateMachine::determine_target_state(from, SessionEvent::Abort)?;
        state.finished_at = Some(Utc::now());
        notifications.push(Notification::Session(LifecycleEvent::for_session(
            event_names::SESSION_ABORTED,
            self.id,
            from,
            state.status,
            serde_json::json!({ "cause": cause, "aborted_items": outstanding.len() }),
        )));

        self.flush(state, notifications);
        Ok(outstanding.len())
    }

    fn position(&self, state: &SessionState<P>, item_id: ItemId) -> PipelineResult<usize> {
        state
            .index
            .get(&item_id)
            .copied()
            .ok_or(PipelineError::ItemNotFound {
                session_id: self.id,
                item_id,
            })
    }

    /// Apply one item event and update the counters in the same critical section
    fn apply(
        &self,
        state: &mut SessionState<P>,
        position: usize,
        event: ItemEvent,
    ) -> PipelineResult<Notification> {
        let item = &mut state.items[position];
        let transition = ItemStateMachine::apply(item, event).map_err(|e| {
            PipelineError::InvalidTransition {
                item_id: item.id(),
                reason: e.to_string(),
            }
        })?;
        let context = serde_json::json!({
            "position": position,
            "attempts": item.attempts(),
            "error_detail": item.error_detail(),
        });

        state.progress.record_transition(transition.from, transition.to);

        let name = item_event_name(transition.event_type).unwrap_or(transition.event_type);
        let event = LifecycleEvent::for_item(name, self.id, &transition, context);
        Ok(Notification::Item(event, state.progress.snapshot()))
    }

    /// Queue `notifications` and drain the outbox unless a drain is already
    /// running, in which case that drain delivers them
    fn flush(&self, mut state: MutexGuard<'_, SessionState<P>>, notifications: Vec<Notification>) {
        state.outbox.extend(notifications);
        if state.delivering {
            return;
        }

        state.delivering = true;
        while let Some(notification) = state.outbox.pop_front() {
            MutexGuard::unlocked(&mut state, || self.deliver(notification));
        }
        state.delivering = false;
    }

    fn deliver(&self, notification: Notification) {
        match notification {
            Notification::Item(event, snapshot) => {
                self.events.publish(event);
                self.notify(&snapshot);
            }
            Notification::Session(event) => self.events.publish(event),
            Notification::Progress(snapshot) => self.notify(&snapshot),
        }
    }

    fn notify(&self, snapshot: &ProgressSnapshot) {
        let subscribers = self.subscribers.lock().clone();
        subscribers.notify(snapshot);
    }
}

impl<P: Clone> BatchSession<P> {
    /// Clone of a single item, looked up by id
    pub fn item(&self, item_id: ItemId) -> Option<WorkItem<P>> {
        let state = self.state.lock();
        state
            .index
            .get(&item_id)
            .map(|&position| state.items[position].clone())
    }

    /// Clones of every item in dispatch order
    pub fn items(&self) -> Vec<WorkItem<P>> {
        self.state.lock().items.clone()
    }
}

impl<P> std::fmt::Debug for BatchSession<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BatchSession")
            .field("id", &self.id)
            .field("status", &state.status)
            .field("items", &state.items.len())
            .field("progress", &state.progress)
            .field("config", &self.config)
            .finish()
    }
}
