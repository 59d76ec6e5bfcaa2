//! # System Constants
//!
//! Lifecycle event names and operational defaults shared by the session
//! engine, the configuration layer and the import wizard.

/// Lifecycle events published on the [`EventPublisher`](crate::events::EventPublisher)
pub mod events {
    // Item lifecycle events
    pub const ITEM_STARTED: &str = "item.started";
    pub const ITEM_COMPLETED: &str = "item.completed";
    pub const ITEM_FAILED: &str = "item.failed";
    pub const ITEM_RETRY_REQUESTED: &str = "item.retry_requested";
    pub const ITEM_ABORTED: &str = "item.aborted";

    // Session lifecycle events
    pub const SESSION_STARTED: &str = "session.started";
    pub const SESSION_CANCELLING: &str = "session.cancelling";
    pub const SESSION_FINISHED: &str = "session.finished";
    pub const SESSION_ABORTED: &str = "session.aborted";
}

/// Reason recorded on every item closed out by a fatal session abort
pub const SESSION_ABORTED_REASON: &str = "session aborted";

/// Operational defaults, mirrored by `config/bulkflow.yaml`
pub mod defaults {
    pub const CONCURRENCY: usize = 1;
    pub const MAX_AUTO_RETRIES: u32 = 2;
    pub const EVENT_CHANNEL_CAPACITY: usize = 1000;
    pub const LOG_LEVEL: &str = "info";
}

/// Map an item transition target to its lifecycle event name
pub fn item_event_name(event_type: &str) -> Option<&'static str> {
    match event_type {
        "start" => Some(events::ITEM_STARTED),
        "complete" => Some(events::ITEM_COMPLETED),
        "fail" => Some(events::ITEM_FAILED),
        "retry" => Some(events::ITEM_RETRY_REQUESTED),
        "abort" => Some(events::ITEM_ABORTED),
        _ => None,
    }
}
