//! # Phase Sequencer
//!
//! Wizard-level state machine over a fixed, ordered list of phases.
//!
//! A [`PhaseFlow`] supplies the phase list, the guard that gates leaving each
//! phase, and the work performed on entering a phase (for example starting a
//! nested batch session). The sequencer owns only the phase pointer.
//!
//! - `advance` moves forward one phase if the current phase's guard holds
//! - `retreat` moves back one phase without touching state built by later phases
//! - `reset` returns to the first phase and discards the flow's state

use crate::error::{PipelineError, PipelineResult};
use crate::logging::log_phase_operation;
use crate::state_machine::GuardResult;
use async_trait::async_trait;
use std::fmt::{Debug, Display};

#[async_trait]
pub trait PhaseFlow: Send {
    type Phase: Copy + Eq + Debug + Display + Send + Sync;

    /// The ordered phases; must be non-empty and fixed for the flow's lifetime
    fn phases(&self) -> &[Self::Phase];

    /// Whether the flow may leave `phase` for the next one
    fn guard(&self, phase: Self::Phase) -> GuardResult<()>;

    /// Work performed after the pointer has moved onto `phase`
    async fn on_enter(&mut self, phase: Self::Phase) -> PipelineResult<()>;

    /// Discard all wizard state
    fn reset(&mut self);
}

#[derive(Debug)]
pub struct PhaseSequencer<F> {
    flow: F,
    current: usize,
}

impl<F: PhaseFlow> PhaseSequencer<F> {
    pub fn new(flow: F) -> PipelineResult<Self> {
        if flow.phases().is_empty() {
            return Err(PipelineError::validation("a phase flow needs at least one phase"));
        }
        Ok(Self { flow, current: 0 })
    }

    pub fn current_phase(&self) -> F::Phase {
        self.flow.phases()[self.current]
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// True once the pointer is on the last phase
    pub fn is_complete(&self) -> bool {
        self.current + 1 == self.flow.phases().len()
    }

    /// Move to the next phase.
    ///
    /// The current phase's guard must hold. If entering the next phase fails
    /// the pointer is restored and the error returned.
    pub async fn advance(&mut self) -> PipelineResult<F::Phase> {
        let from = self.current_phase();
        if self.is_complete() {
            return Err(PipelineError::GuardFailed {
                phase: from.to_string(),
                reason: "already at the final phase".to_string(),
            });
        }

        if let Err(guard_error) = self.flow.guard(from) {
            log_phase_operation("advance", &from.to_string(), "-", "rejected");
            return Err(match PipelineError::from(guard_error) {
                PipelineError::StateMachine(reason) => PipelineError::GuardFailed {
                    phase: from.to_string(),
                    reason,
                },
                other => other,
            });
        }

        self.current += 1;
        let to = self.current_phase();
        if let Err(e) = self.flow.on_enter(to).await {
            self.current -= 1;
            log_phase_operation("advance", &from.to_string(), &to.to_string(), "failed");
            return Err(e);
        }

        log_phase_operation("advance", &from.to_string(), &to.to_string(), "ok");
        Ok(to)
    }

    /// Move to the previous phase; rejected on the first phase
    pub fn retreat(&mut self) -> PipelineResult<F::Phase> {
        let from = self.current_phase();
        if self.current == 0 {
            return Err(PipelineError::GuardFailed {
                phase: from.to_string(),
                reason: "cannot retreat from the first phase".to_string(),
            });
        }

        self.current -= 1;
        let to = self.current_phase();
        log_phase_operation("retreat", &from.to_string(), &to.to_string(), "ok");
        Ok(to)
    }

    pub fn reset(&mut self) {
        let from = self.current_phase();
        self.flow.reset();
        self.current = 0;
        log_phase_operation("reset", &from.to_string(), &self.current_phase().to_string(), "ok");
    }

    pub fn flow(&self) -> &F {
        &self.flow
    }

    pub fn flow_mut(&mut self) -> &mut F {
        &mut self.flow
    }

    pub fn into_flow(self) -> F {
        self.flow
    }
}
