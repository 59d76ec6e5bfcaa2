use super::{
    errors::{invalid_transition, StateMachineResult},
    events::SessionEvent,
    states::SessionStatus,
};

/// Status transitions of a batch session.
///
/// `Finished -> Running` is legal so that a session whose failed items were
/// retried can be started again.
pub struct SessionStateMachine;

impl SessionStateMachine {
    pub fn determine_target_state(
        current: SessionStatus,
        event: SessionEvent,
    ) -> StateMachineResult<SessionStatus> {
        let target = match (current, event) {
            (SessionStatus::Idle | SessionStatus::Finished, SessionEvent::Start) => {
                SessionStatus::Running
            }
            (SessionStatus::Running, SessionEvent::Cancel) => SessionStatus::Cancelling,
            (SessionStatus::Running | SessionStatus::Cancelling, SessionEvent::Finish) => {
                SessionStatus::Finished
            }
            (SessionStatus::Running | SessionStatus::Cancelling, SessionEvent::Abort) => {
                SessionStatus::Finished
            }
            (from, event) => return Err(invalid_transition(from, event.event_type())),
        };

        Ok(target)
    }
}
