use crate::models::{ItemId, SessionId};
use crate::state_machine::{ItemTransition, SessionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A lifecycle event published after an item or session transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub name: String,
    pub session_id: SessionId,
    pub item_id: Option<ItemId>,
    pub from_state: Option<String>,
    pub to_state: String,
    pub context: Value,
    pub published_at: DateTime<Utc>,
}

impl LifecycleEvent {
    pub fn for_item(
        name: &str,
        session_id: SessionId,
        transition: &ItemTransition,
        context: Value,
    ) -> Self {
        Self {
            name: name.to_string(),
            session_id,
            item_id: Some(transition.item_id),
            from_state: Some(transition.from.to_string()),
            to_state: transition.to.to_string(),
            context,
            published_at: transition.at,
        }
    }

    pub fn for_session(
        name: &str,
        session_id: SessionId,
        from: SessionStatus,
        to: SessionStatus,
        context: Value,
    ) -> Self {
        Self {
            name: name.to_string(),
            session_id,
            item_id: None,
            from_state: Some(from.to_string()),
            to_state: to.to_string(),
            context,
            published_at: Utc::now(),
        }
    }

    pub fn is_item_event(&self) -> bool {
        self.item_id.is_some()
    }
}
