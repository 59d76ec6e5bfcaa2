use super::errors::{business_rule_violation, GuardResult};
use super::states::SessionStatus;
use crate::models::WorkItem;

/// Trait for implementing state transition guards
pub trait StateGuard<T: ?Sized> {
    /// Check if a transition is allowed
    fn check(&self, entity: &T) -> GuardResult<()>;

    /// Get a description of this guard for logging
    fn description(&self) -> &'static str;
}

/// Guard to check if an item can be retried (must be in error state)
pub struct ItemCanBeRetriedGuard;

impl<P> StateGuard<WorkItem<P>> for ItemCanBeRetriedGuard {
    fn check(&self, item: &WorkItem<P>) -> GuardResult<()> {
        if item.state().is_error() {
            Ok(())
        } else {
            Err(business_rule_violation(format!(
                "Item {} cannot be retried from state {}, must be in error state",
                item.id(),
                item.state()
            )))
        }
    }

    fn description(&self) -> &'static str {
        "Item must be in error state to be retried"
    }
}

/// Guard to check that a session still accepts new items
pub struct SessionAcceptsItemsGuard;

impl StateGuard<SessionStatus> for SessionAcceptsItemsGuard {
    fn check(&self, status: &SessionStatus) -> GuardResult<()> {
        if status.accepts_items() {
            Ok(())
        } else {
            Err(business_rule_violation(format!(
                "Items can only be added while idle, session is {status}"
            )))
        }
    }

    fn description(&self) -> &'static str {
        "Session must be idle to accept items"
    }
}
