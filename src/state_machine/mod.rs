// State machine module for the work item and batch session lifecycles
//
// Transition tables are pure functions over (state, event); side effects on
// items (attempts, timestamps, error detail) are applied in one place.

pub mod errors;
pub mod events;
pub mod guards;
pub mod item_state_machine;
pub mod session_state_machine;
pub mod states;

// Re-export main types for convenient access
pub use errors::{GuardError, GuardResult, StateMachineError, StateMachineResult};
pub use events::{ItemEvent, SessionEvent};
pub use item_state_machine::{ItemStateMachine, ItemTransition};
pub use session_state_machine::SessionStateMachine;
pub use states::{ItemState, SessionStatus};

// Common traits and utilities
pub use guards::{ItemCanBeRetriedGuard, SessionAcceptsItemsGuard, StateGuard};
