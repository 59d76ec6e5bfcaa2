mod common;

use bulkflow_core::{ItemState, SessionConfig, SessionManager, SessionStatus};
use common::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_cancel_lets_in_flight_item_finish() {
    let processor = GatedProcessor::new(3);
    let manager = Arc::new(SessionManager::new(processor.clone()));
    let items = numbered_items(5);
    let ids: Vec<_> = items.iter().map(|item| item.id()).collect();
    let session = manager.create_session(items, SessionConfig::sequential()).unwrap();

    let runner = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.start(session).await })
    };

    processor.entered.notified().await;
    let snapshot = manager.snapshot(session).unwrap();
    assert_eq!((snapshot.completed, snapshot.processing), (2, 1));

    assert_eq!(manager.cancel(session).unwrap(), SessionStatus::Cancelling);
    // start while a run is in progress is a no-op
    assert_eq!(manager.start(session).await.unwrap(), SessionStatus::Cancelling);

    processor.release.notify_one();
    let status = runner.await.unwrap().unwrap();

    assert_eq!(status, SessionStatus::Finished);
    let snapshot = manager.snapshot(session).unwrap();
    assert_eq!(snapshot.completed, 3);
    assert_eq!(snapshot.pending, 2);
    assert_eq!(snapshot.processing, 0);
    assert_eq!(manager.item(session, ids[2]).unwrap().state(), ItemState::Completed);
    assert_eq!(manager.item(session, ids[3]).unwrap().state(), ItemState::Pending);
    assert_eq!(manager.item(session, ids[4]).unwrap().attempts(), 0);
    assert!(manager.summary(session).unwrap().cancelled);
}

#[tokio::test]
async fn test_subscriber_can_cancel_after_first_error() {
    let manager = Arc::new(SessionManager::new(ScriptedProcessor::failing([1])));
    let session = manager.create_session(numbered_items(5), SessionConfig::sequential()).unwrap();

    let weak = Arc::downgrade(&manager);
    manager
        .subscribe(
            session,
            Arc::new(move |snapshot: &bulkflow_core::ProgressSnapshot| {
                if snapshot.error > 0 {
                    if let Some(manager) = weak.upgrade() {
                        manager.cancel(session).unwrap();
                    }
                }
            }),
        )
        .unwrap();

    let status = tokio::time::timeout(Duration::from_secs(3), manager.start(session))
        .await
        .expect("start should not hang when a subscriber cancels")
        .unwrap();

    assert_eq!(status, SessionStatus::Finished);
    let snapshot = manager.snapshot(session).unwrap();
    assert_eq!((snapshot.error, snapshot.pending), (1, 4));
    assert!(manager.summary(session).unwrap().cancelled);
}

#[tokio::test]
async fn test_cancel_ignored_unless_running() {
    let manager = SessionManager::new(ScriptedProcessor::failing([]));
    let session = manager.create_session(numbered_items(2), SessionConfig::default()).unwrap();

    assert_eq!(manager.cancel(session).unwrap(), SessionStatus::Idle);
    manager.start(session).await.unwrap();
    assert_eq!(manager.cancel(session).unwrap(), SessionStatus::Finished);
}

#[tokio::test]
async fn test_cancelled_session_resumes_on_start() {
    let processor = GatedProcessor::new(1);
    let manager = Arc::new(SessionManager::new(processor.clone()));
    let session = manager.create_session(numbered_items(3), SessionConfig::sequential()).unwrap();

    let runner = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.start(session).await })
    };
    processor.entered.notified().await;
    manager.cancel(session).unwrap();
    processor.release.notify_one();
    runner.await.unwrap().unwrap();
    assert_eq!(manager.snapshot(session).unwrap().pending, 2);

    manager.start(session).await.unwrap();
    let snapshot = manager.snapshot(session).unwrap();
    assert_eq!(snapshot.completed, 3);
    assert!(!manager.summary(session).unwrap().cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_is_bounded() {
    let probe = Arc::new(ConcurrencyProbe::default());
    let manager = SessionManager::new(probe.clone());
    let session = manager
        .create_session(numbered_items(12), SessionConfig::default().with_concurrency(3))
        .unwrap();

    manager.start(session).await.unwrap();

    let max_seen = probe.max_seen.load(Ordering::SeqCst);
    assert!(max_seen <= 3, "saw {max_seen} items in flight");
    assert!(max_seen > 1);
    assert_eq!(manager.snapshot(session).unwrap().completed, 12);
}

#[tokio::test]
async fn test_sequential_never_overlaps() {
    let probe = Arc::new(ConcurrencyProbe::default());
    let manager = SessionManager::new(probe.clone());
    let session = manager.create_session(numbered_items(4), SessionConfig::sequential()).unwrap();

    manager.start(session).await.unwrap();
    assert_eq!(probe.max_seen.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_progress_is_monotonic_and_consistent() {
    let manager = SessionManager::new(ScriptedProcessor::failing([2, 5, 9]));
    let session = manager
        .create_session(numbered_items(20), SessionConfig::default().with_concurrency(4))
        .unwrap();
    let recorder = SnapshotRecorder::new();
    let progress_bar = SnapshotRecorder::new();
    manager.subscribe(session, recorder.callback()).unwrap();
    manager.subscribe(session, progress_bar.callback()).unwrap();

    manager.start(session).await.unwrap();

    let snapshots = recorder.snapshots();
    // one snapshot per transition: 20 starts and 20 terminal transitions
    assert_eq!(snapshots.len(), 40);
    assert!(snapshots.iter().all(|s| s.is_consistent()));
    assert!(snapshots.windows(2).all(|w| w[0].done() <= w[1].done()));
    assert!(snapshots.windows(2).all(|w| w[0].sequence < w[1].sequence));
    assert_eq!(snapshots, progress_bar.snapshots());

    let last = snapshots.last().unwrap();
    assert_eq!((last.completed, last.error), (17, 3));
}

#[tokio::test]
async fn test_unsubscribe_stops_callbacks() {
    let manager = SessionManager::new(ScriptedProcessor::failing([]));
    let session = manager.create_session(numbered_items(3), SessionConfig::default()).unwrap();
    let recorder = SnapshotRecorder::new();
    let handle = manager.subscribe(session, recorder.callback()).unwrap();

    assert!(manager.unsubscribe(session, handle).unwrap());
    assert!(!manager.unsubscribe(session, handle).unwrap());
    manager.start(session).await.unwrap();

    assert!(recorder.snapshots().is_empty());
}

#[tokio::test]
async fn test_dropping_start_future_does_not_strand_items() {
    let processor = GatedProcessor::new(1);
    let manager = Arc::new(SessionManager::new(processor.clone()));
    let session = manager.create_session(numbered_items(2), SessionConfig::sequential()).unwrap();

    let runner = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.start(session).await })
    };
    processor.entered.notified().await;
    runner.abort();
    let _ = runner.await;

    processor.release.notify_one();
    for _ in 0..100 {
        if manager.status(session).unwrap() == SessionStatus::Finished {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(manager.status(session).unwrap(), SessionStatus::Finished);
    assert_eq!(manager.snapshot(session).unwrap().completed, 2);
}

#[tokio::test]
async fn test_item_timeout_is_a_failure() {
    let processor = GatedProcessor::new(2);
    let manager = SessionManager::new(processor.clone());
    let config = SessionConfig::default().with_item_timeout(Duration::from_millis(25));
    let items = numbered_items(3);
    let second = items[1].id();
    let session = manager.create_session(items, config).unwrap();

    manager.start(session).await.unwrap();

    let item = manager.item(session, second).unwrap();
    assert_eq!(item.state(), ItemState::Error);
    assert_eq!(item.error_detail(), Some("processing timed out after 25ms"));
    assert_eq!(manager.snapshot(session).unwrap().completed, 2);
}
