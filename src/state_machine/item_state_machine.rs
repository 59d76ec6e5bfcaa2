use super::{
    errors::{invalid_transition, StateMachineResult},
    events::ItemEvent,
    states::ItemState,
};
use crate::models::{ItemId, WorkItem};
use chrono::{DateTime, Utc};

/// A transition that was applied to a work item
#[derive(Debug, Clone, PartialEq)]
pub struct ItemTransition {
    pub item_id: ItemId,
    pub from: ItemState,
    pub to: ItemState,
    pub event_type: &'static str,
    pub at: DateTime<Utc>,
}

/// Transition table and side effects for a single work item.
///
/// The only forward path is `Pending -> Processing -> {Completed, Error}`;
/// `Error -> Pending` (retry) is the single backward edge. `Abort` is used by
/// a fatal session abort to close out items that never finished.
pub struct ItemStateMachine;

impl ItemStateMachine {
    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        current_state: ItemState,
        event: &ItemEvent,
    ) -> StateMachineResult<ItemState> {
        let target = match (current_state, event) {
            (ItemState::Pending, ItemEvent::Start) => ItemState::Processing,

            (ItemState::Processing, ItemEvent::Complete(_)) => ItemState::Completed,
            (ItemState::Processing, ItemEvent::Fail(_)) => ItemState::Error,

            (ItemState::Error, ItemEvent::Retry) => ItemState::Pending,

            (ItemState::Pending | ItemState::Processing, ItemEvent::Abort(_)) => ItemState::Error,

            (from_state, _) => return Err(invalid_transition(from_state, event.event_type())),
        };

        Ok(target)
    }

    /// Apply `event` to `item`, updating attempts, timestamps and error detail
    pub fn apply<P>(item: &mut WorkItem<P>, event: ItemEvent) -> StateMachineResult<ItemTransition> {
        let from = item.state;
        let to = Self::determine_target_state(from, &event)?;
        let now = Utc::now();
        let event_type = event.event_type();

        match event {
            ItemEvent::Start => {
                item.attempts += 1;
            }
            ItemEvent::Complete(output) => {
                item.output = output;
                item.error_detail = None;
                item.completed_at = Some(now);
            }
            ItemEvent::Fail(reason) | ItemEvent::Abort(reason) => {
                item.output = None;
                item.error_detail = Some(reason);
                item.completed_at = Some(now);
            }
            ItemEvent::Retry => {
                item.error_detail = None;
                item.completed_at = None;
            }
        }
        item.state = to;

        Ok(ItemTransition {
            item_id: item.id,
            from,
            to,
            event_type,
            at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::StateMachineError;

    #[test]
    fn test_forward_path() {
        let mut item = WorkItem::new("row-1");

        let started = ItemStateMachine::apply(&mut item, ItemEvent::Start).unwrap();
        assert_eq!(started.from, ItemState::Pending);
        assert_eq!(started.to, ItemState::Processing);
        assert_eq!(item.attempts(), 1);
        assert!(item.completed_at().is_none());

        ItemStateMachine::apply(
            &mut item,
            ItemEvent::Complete(Some(serde_json::json!("ok"))),
        )
        .unwrap();
        assert_eq!(item.state(), ItemState::Completed);
        assert!(item.completed_at().is_some());
        assert_eq!(item.output(), Some(&serde_json::json!("ok")));
    }

    #[test]
    fn test_failure_then_retry_keeps_attempts() {
        let mut item = WorkItem::new("row-3");
        ItemStateMachine::apply(&mut item, ItemEvent::Start).unwrap();
        ItemStateMachine::apply(&mut item, ItemEvent::fail_with_error("invalid format")).unwrap();

        assert_eq!(item.state(), ItemState::Error);
        assert_eq!(item.error_detail(), Some("invalid format"));
        assert!(item.completed_at().is_some());

        ItemStateMachine::apply(&mut item, ItemEvent::Retry).unwrap();
        assert_eq!(item.state(), ItemState::Pending);
        assert_eq!(item.attempts(), 1);
        assert!(item.error_detail().is_none());
        assert!(item.completed_at().is_none());

        ItemStateMachine::apply(&mut item, ItemEvent::Start).unwrap();
        assert_eq!(item.attempts(), 2);
    }

    #[test]
    fn test_invalid_transitions_leave_item_untouched() {
        let mut item = WorkItem::new("row");

        let err = ItemStateMachine::apply(&mut item, ItemEvent::Retry).unwrap_err();
        assert!(matches!(err, StateMachineError::InvalidTransition { .. }));
        assert_eq!(item.state(), ItemState::Pending);

        let err = ItemStateMachine::apply(&mut item, ItemEvent::Complete(None)).unwrap_err();
        assert!(matches!(err, StateMachineError::InvalidTransition { .. }));
        assert_eq!(item.attempts(), 0);
    }

    #[test]
    fn test_completed_is_final() {
        for event in [
            ItemEvent::Start,
            ItemEvent::Retry,
            ItemEvent::Fail("x".into()),
            ItemEvent::Abort("x".into()),
        ] {
            assert!(ItemStateMachine::determine_target_state(ItemState::Completed, &event).is_err());
        }
    }

    #[test]
    fn test_abort_closes_outstanding_items() {
        assert_eq!(
            ItemStateMachine::determine_target_state(
                ItemState::Pending,
                &ItemEvent::Abort("session aborted".into())
            )
            .unwrap(),
            ItemState::Error
        );
        assert_eq!(
            ItemStateMachine::determine_target_state(
                ItemState::Processing,
                &ItemEvent::Abort("session aborted".into())
            )
            .unwrap(),
            ItemState::Error
        );
        assert!(ItemStateMachine::determine_target_state(
            ItemState::Error,
            &ItemEvent::Abort("session aborted".into())
        )
        .is_err());
    }
}
