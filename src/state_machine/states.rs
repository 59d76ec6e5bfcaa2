use serde::{Deserialize, Serialize};
use std::fmt;

/// Work item lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    /// Queued, waiting for dispatch
    #[default]
    Pending,
    /// Dispatched to the processing function
    Processing,
    /// Processing succeeded
    Completed,
    /// Processing failed; the only state that can be retried
    Error,
}

impl ItemState {
    /// Check if processing has finished for this item (successfully or not)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Check if this is an error state that may allow retry
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }

    /// Check if the item is currently being processed
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Processing)
    }

    /// Check if the item still has work outstanding
    pub fn is_outstanding(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for ItemState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid item state: {s}")),
        }
    }
}

/// Batch session run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created, items may still be appended
    #[default]
    Idle,
    /// Dispatching items
    Running,
    /// Cancel requested; in-flight items are draining
    Cancelling,
    /// No item is in flight; a later `start` may resume pending items
    Finished,
}

impl SessionStatus {
    /// Check if a run is currently in progress
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Cancelling)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished)
    }

    /// Items may only be appended before the first start
    pub fn accepts_items(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Cancelling => write!(f, "cancelling"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "running" => Ok(Self::Running),
            "cancelling" => Ok(Self::Cancelling),
            "finished" => Ok(Self::Finished),
            _ => Err(format!("Invalid session status: {s}")),
        }
    }
}
