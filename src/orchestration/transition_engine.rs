//! # Transition Engine
//!
//! Drives pending items through the processing function under the session's
//! concurrency setting.
//!
//! ## Dispatch
//!
//! A run claims items in position order and keeps at most `concurrency` of
//! them in flight on a [`JoinSet`]. `concurrency == 1` is the sequential mode:
//! exactly one item is `Processing` at any instant. Each invocation runs under
//! an optional per-item timeout with panics caught, so a misbehaving item is
//! recorded as that item's failure.
//!
//! ## Failure channels
//!
//! - business failure, timeout, panic: the item moves to `Error` and the run
//!   continues
//! - [`FatalProcessingError`]: in-flight work is aborted (results that were
//!   already produced are still recorded), every outstanding item is closed
//!   with the session-aborted reason, the session finishes, and `start`
//!   returns [`PipelineError::FatalSession`]
//!
//! The run itself executes on a spawned task, so dropping the future returned
//! by [`TransitionEngine::start`] does not strand items in `Processing`.

use crate::error::{PipelineError, PipelineResult};
use crate::logging::{log_error, log_item_operation, log_session_operation};
use crate::models::ItemId;
use crate::orchestration::batch_session::{BatchSession, RunStart};
use crate::orchestration::item_processor::{FatalProcessingError, ItemOutcome, ItemProcessor};
use crate::state_machine::SessionStatus;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// How a single invocation of the processing function ended
#[derive(Debug)]
enum Invocation {
    Finished(ItemOutcome),
    Fatal(FatalProcessingError),
    Panicked(String),
    TimedOut(Duration),
}

/// Executes batch sessions against one processing function
pub struct TransitionEngine<P> {
    processor: Arc<dyn ItemProcessor<P>>,
}

impl<P> Clone for TransitionEngine<P> {
    fn clone(&self) -> Self {
        Self {
            processor: Arc::clone(&self.processor),
        }
    }
}

impl<P> std::fmt::Debug for TransitionEngine<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionEngine")
            .field("processor", &self.processor.name())
            .finish()
    }
}

impl<P> TransitionEngine<P>
where
    P: Clone + Send + Sync + 'static,
{
    pub fn new(processor: Arc<dyn ItemProcessor<P>>) -> Self {
        Self { processor }
    }

    pub fn processor_name(&self) -> &str {
        self.processor.name()
    }

    /// Run every pending item of `session` to a terminal state.
    ///
    /// Returns once the session is `Finished`. Starting a session that is
    /// already running or cancelling is a no-op returning its status. A
    /// zero-item session finishes immediately.
    pub async fn start(&self, session: Arc<BatchSession<P>>) -> PipelineResult<SessionStatus> {
        let pending = match session.begin_run()? {
            RunStart::AlreadyActive(status) => {
                debug!(session_id = %session.id(), status = %status, "Session already active");
                return Ok(status);
            }
            RunStart::Started { pending } => pending,
        };

        log_session_operation(
            "start",
            &session.id().to_string(),
            "running",
            Some(&format!(
                "pending={pending} concurrency={} processor={}",
                session.config().concurrency,
                self.processor.name()
            )),
        );

        let engine = self.clone();
        let run_session = Arc::clone(&session);
        let handle = tokio::spawn(async move { engine.drive(run_session).await });

        match handle.await {
            Ok(result) => result,
            Err(join_error) => {
                let reason = format!("session driver failed: {join_error}");
                log_error(
                    "transition_engine",
                    "start",
                    &reason,
                    Some(&session.id().to_string()),
                );
                if let Err(e) = session.abort(&reason) {
                    warn!(session_id = %session.id(), error = %e, "Abort after driver failure did not apply");
                }
                Err(PipelineError::FatalSession {
                    session_id: session.id(),
                    reason,
                })
            }
        }
    }

    /// Requeue one failed item. Picked up by the current run if the session
    /// is running, otherwise by the next `start`.
    pub fn retry_item(&self, session: &BatchSession<P>, item_id: ItemId) -> PipelineResult<()> {
        session.retry_item(item_id)?;
        debug!(session_id = %session.id(), item_id = %item_id, "Item requeued");
        Ok(())
    }

    /// Stop dispatching new items; in-flight items still run to completion
    pub fn cancel(&self, session: &BatchSession<P>) -> PipelineResult<SessionStatus> {
        let status = session.request_cancel()?;
        if status == SessionStatus::Cancelling {
            log_session_operation("cancel", &session.id().to_string(), "cancelling", None);
        }
        Ok(status)
    }

    async fn drive(&self, session: Arc<BatchSession<P>>) -> PipelineResult<SessionStatus> {
        let concurrency = session.config().concurrency.max(1);
        let timeout = session.config().item_timeout();
        let started = Instant::now();
        let mut in_flight: JoinSet<(ItemId, Invocation)> = JoinSet::new();

        loop {
            while in_flight.len() < concurrency {
                let Some((item_id, payload)) = session.claim_next() else {
                    break;
                };
                let processor = Arc::clone(&self.processor);
                in_flight.spawn(async move {
                    let invocation = invoke(processor, payload, timeout).await;
                    (item_id, invocation)
                });
            }

            let Some(joined) = in_flight.join_next().await else {
                match session.try_finish()? {
                    Some(status) => {
                        let snapshot = session.snapshot();
                        info!(
                            session_id = %session.id(),
                            completed = snapshot.completed,
                            error = snapshot.error,
                            pending = snapshot.pending,
                            duration_ms = started.elapsed().as_millis() as u64,
                            "Session run finished"
                        );
                        return Ok(status);
                    }
                    // retried while running
                    None => continue,
                }
            };

            let (item_id, invocation) = match joined {
                Ok(result) => result,
                Err(join_error) => {
                    let reason = format!("item task failed: {join_error}");
                    return self.abort_run(&session, &mut in_flight, reason).await;
                }
            };

            if let Some(fatal) = self.record_invocation(&session, item_id, invocation, true) {
                error!(
                    session_id = %session.id(),
                    item_id = %item_id,
                    processor = %self.processor.name(),
                    error = %fatal,
                    "Fatal processing error, aborting session"
                );
                return self.abort_run(&session, &mut in_flight, fatal.reason).await;
            }
        }
    }

    /// Apply the result of one invocation to its item. A fatal error is
    /// handed back untouched for the caller to abort the run.
    fn record_invocation(
        &self,
        session: &BatchSession<P>,
        item_id: ItemId,
        invocation: Invocation,
        auto_retry: bool,
    ) -> Option<FatalProcessingError> {
        match invocation {
            Invocation::Finished(ItemOutcome::Success(output)) => {
                match session.complete_item(item_id, output) {
                    Ok(attempts) => log_item_operation(
                        "complete",
                        &session.id().to_string(),
                        &item_id.to_string(),
                        "completed",
                        attempts,
                        None,
                    ),
                    Err(e) => {
                        warn!(session_id = %session.id(), item_id = %item_id, error = %e, "Could not record completion");
                    }
                }
            }
            Invocation::Finished(ItemOutcome::Failure(reason)) => {
                self.record_failure(session, item_id, reason, auto_retry);
            }
            Invocation::TimedOut(limit) => {
                let reason = format!("processing timed out after {}ms", limit.as_millis());
                self.record_failure(session, item_id, reason, auto_retry);
            }
            Invocation::Panicked(message) => {
                let reason = format!("processor panicked: {message}");
                self.record_failure(session, item_id, reason, false);
            }
            Invocation::Fatal(fatal) => return Some(fatal),
        }
        None
    }

    fn record_failure(
        &self,
        session: &BatchSession<P>,
        item_id: ItemId,
        reason: String,
        retryable: bool,
    ) {
        let details = reason.clone();
        let attempts = match session.fail_item(item_id, reason) {
            Ok(attempts) => attempts,
            Err(e) => {
                warn!(session_id = %session.id(), item_id = %item_id, error = %e, "Could not record failure");
                return;
            }
        };
        log_item_operation(
            "fail",
            &session.id().to_string(),
            &item_id.to_string(),
            "error",
            attempts,
            Some(&details),
        );

        let config = session.config();
        if retryable && config.auto_retry && attempts <= config.max_auto_retries {
            debug!(
                session_id = %session.id(),
                item_id = %item_id,
                attempts = attempts,
                max_auto_retries = config.max_auto_retries,
                "Auto-retrying item"
            );
            if let Err(e) = session.retry_item(item_id) {
                warn!(session_id = %session.id(), item_id = %item_id, error = %e, "Auto-retry rejected");
            }
        }
    }

    async fn abort_run(
        &self,
        session: &BatchSession<P>,
        in_flight: &mut JoinSet<(ItemId, Invocation)>,
        reason: String,
    ) -> PipelineResult<SessionStatus> {
        in_flight.abort_all();
        // tasks that finished before the abort still record their result
        while let Some(joined) = in_flight.join_next().await {
            let Ok((item_id, invocation)) = joined else {
                continue;
            };
            if let Some(fatal) = self.record_invocation(session, item_id, invocation, false) {
                debug!(session_id = %session.id(), item_id = %item_id, error = %fatal, "Further fatal error while aborting");
            }
        }

        let aborted = session.abort(&reason)?;
        log_session_operation(
            "abort",
            &session.id().to_string(),
            "finished",
            Some(&format!("aborted_items={aborted} reason={reason}")),
        );

        Err(PipelineError::FatalSession {
            session_id: session.id(),
            reason,
        })
    }
}

/// Invoke the processor once, with the optional timeout and panics caught
async fn invoke<P>(
    processor: Arc<dyn ItemProcessor<P>>,
    payload: P,
    timeout: Option<Duration>,
) -> Invocation
where
    P: Send + Sync + 'static,
{
    let call = AssertUnwindSafe(processor.process(&payload)).catch_unwind();

    let caught = match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(caught) => caught,
            Err(_) => return Invocation::TimedOut(limit),
        },
        None => call.await,
    };

    match caught {
        Ok(Ok(outcome)) => Invocation::Finished(outcome),
        Ok(Err(fatal)) => Invocation::Fatal(fatal),
        Err(panic) => {
            let message = if let Some(s) = panic.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            Invocation::Panicked(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::constants::SESSION_ABORTED_REASON;
    use crate::events::EventPublisher;
    use crate::models::WorkItem;
    use crate::orchestration::item_processor::processor_fn;
    use crate::state_machine::ItemState;

    fn session(n: u32, config: SessionConfig) -> Arc<BatchSession<u32>> {
        let items = (0..n).map(WorkItem::new).collect();
        Arc::new(BatchSession::new(items, config, EventPublisher::new(256)).unwrap())
    }

    fn fail_odd() -> TransitionEngine<u32> {
        TransitionEngine::new(processor_fn("fail_odd", |n: u32| async move {
            if n % 2 == 1 {
                Ok(ItemOutcome::failure(format!("odd payload {n}")))
            } else {
                Ok(ItemOutcome::success())
            }
        }))
    }

    #[tokio::test]
    async fn test_sequential_run_keeps_failures_local() {
        let session = session(4, SessionConfig::sequential());
        let status = fail_odd().start(Arc::clone(&session)).await.unwrap();

        assert_eq!(status, SessionStatus::Finished);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.completed, 2);
        assert_eq!(snapshot.error, 2);
        assert_eq!(snapshot.percent_complete, 100.0);
    }

    #[tokio::test]
    async fn test_zero_items_finish_immediately() {
        let session = session(0, SessionConfig::default());
        let status = fail_odd().start(Arc::clone(&session)).await.unwrap();

        assert_eq!(status, SessionStatus::Finished);
        assert_eq!(session.snapshot().percent_complete, 0.0);
    }

    #[tokio::test]
    async fn test_fatal_error_aborts_outstanding_items() {
        let engine = TransitionEngine::new(processor_fn("pool", |n: u32| async move {
            if n == 1 {
                Err(FatalProcessingError::new("connection pool closed"))
            } else {
                Ok(ItemOutcome::success())
            }
        }));
        let session = session(4, SessionConfig::sequential());

        let err = engine.start(Arc::clone(&session)).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(session.status(), SessionStatus::Finished);

        let items = session.items();
        assert_eq!(items[0].state(), ItemState::Completed);
        for item in &items[1..] {
            assert_eq!(item.state(), ItemState::Error);
            assert_eq!(item.error_detail(), Some(SESSION_ABORTED_REASON));
        }
    }

    #[tokio::test]
    async fn test_fatal_abort_keeps_results_already_produced() {
        let engine = TransitionEngine::new(processor_fn("pool", |n: u32| async move {
            if n == 0 {
                Err(FatalProcessingError::new("connection pool closed"))
            } else {
                Ok(ItemOutcome::success_with(serde_json::json!(n)))
            }
        }));
        let session = session(4, SessionConfig::default().with_concurrency(2));

        let err = engine.start(Arc::clone(&session)).await.unwrap_err();
        assert!(err.is_fatal());

        let items = session.items();
        assert_eq!(items[0].state(), ItemState::Error);
        assert_eq!(items[0].error_detail(), Some(SESSION_ABORTED_REASON));
        // item 1 ran alongside the fatal item and succeeded
        assert_eq!(items[1].state(), ItemState::Completed);
        assert_eq!(items[1].output(), Some(&serde_json::json!(1)));
        for item in &items[2..] {
            assert!(
                item.state() == ItemState::Completed
                    || item.error_detail() == Some(SESSION_ABORTED_REASON)
            );
        }
        let snapshot = session.snapshot();
        assert_eq!(snapshot.pending + snapshot.processing, 0);
        assert!(snapshot.is_consistent());
    }

    #[tokio::test]
    async fn test_panic_is_an_item_failure() {
        let engine = TransitionEngine::new(processor_fn("panicky", |n: u32| async move {
            if n == 0 {
                panic!("bad template");
            }
            Ok(ItemOutcome::success())
        }));
        let session = session(2, SessionConfig::default().with_auto_retry(3));

        engine.start(Arc::clone(&session)).await.unwrap();

        let first = &session.items()[0];
        assert_eq!(first.state(), ItemState::Error);
        assert_eq!(first.attempts(), 1);
        assert!(first.error_detail().unwrap().contains("bad template"));
        assert_eq!(session.snapshot().completed, 1);
    }

    #[tokio::test]
    async fn test_timeout_fails_item() {
        let engine = TransitionEngine::new(processor_fn("slow", |n: u32| async move {
            if n == 0 {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok(ItemOutcome::success())
        }));
        let config = SessionConfig::default().with_item_timeout(Duration::from_millis(20));
        let session = session(2, config);

        engine.start(Arc::clone(&session)).await.unwrap();

        let slow = &session.items()[0];
        assert_eq!(slow.state(), ItemState::Error);
        assert_eq!(slow.error_detail(), Some("processing timed out after 20ms"));
    }

    #[tokio::test]
    async fn test_auto_retry_stops_at_limit() {
        let session = session(2, SessionConfig::default().with_auto_retry(2));
        fail_odd().start(Arc::clone(&session)).await.unwrap();

        let odd = &session.items()[1];
        assert_eq!(odd.state(), ItemState::Error);
        assert_eq!(odd.attempts(), 3);
    }
}
