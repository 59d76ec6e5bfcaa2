use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events that can trigger work item state transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ItemEvent {
    /// Dispatch the item to the processing function
    Start,
    /// Processing succeeded with optional output
    Complete(Option<Value>),
    /// Processing failed with a reason
    Fail(String),
    /// Requeue a failed item
    Retry,
    /// Session-level abort of an item that had not finished
    Abort(String),
}

impl ItemEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Complete(_) => "complete",
            Self::Fail(_) => "fail",
            Self::Retry => "retry",
            Self::Abort(_) => "abort",
        }
    }

    /// Extract the failure reason if this event records one
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) | Self::Abort(msg) => Some(msg),
            _ => None,
        }
    }

    /// Extract output if this is a completion event
    pub fn output(&self) -> Option<&Value> {
        match self {
            Self::Complete(output) => output.as_ref(),
            _ => None,
        }
    }

    /// Check if this event moves the item into a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Fail(_) | Self::Abort(_))
    }

    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }
}

/// Events that can trigger batch session status transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    Start,
    Cancel,
    Finish,
    Abort,
}

impl SessionEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Cancel => "cancel",
            Self::Finish => "finish",
            Self::Abort => "abort",
        }
    }
}
