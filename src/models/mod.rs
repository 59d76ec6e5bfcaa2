pub mod ids;
pub mod progress;
pub mod summary;
pub mod work_item;

// Re-export core models for easy access
pub use ids::{ItemId, SessionId, SubscriptionHandle};
pub use progress::ProgressSnapshot;
pub use summary::{ItemFailure, SessionSummary};
pub use work_item::WorkItem;
