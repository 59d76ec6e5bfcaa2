//! Guards gating each forward step of the import wizard

use super::{ImportFlow, ImportPhase};
use crate::state_machine::errors::phase_rejected;
use crate::state_machine::{GuardResult, StateGuard};

/// Upload -> Map: a source with at least one record is attached
pub struct SourceAttachedGuard;

impl StateGuard<ImportFlow> for SourceAttachedGuard {
    fn check(&self, flow: &ImportFlow) -> GuardResult<()> {
        match flow.source() {
            None => Err(phase_rejected(ImportPhase::Upload, "no file attached")),
            Some(source) if source.is_empty() => Err(phase_rejected(
                ImportPhase::Upload,
                format!("{} contains no records", source.name),
            )),
            Some(_) => Ok(()),
        }
    }

    fn description(&self) -> &'static str {
        "A record source must be attached"
    }
}

/// Map -> Validate: every required field is mapped to an existing column
pub struct RequiredFieldsMappedGuard;

impl StateGuard<ImportFlow> for RequiredFieldsMappedGuard {
    fn check(&self, flow: &ImportFlow) -> GuardResult<()> {
        let Some(source) = flow.source() else {
            return Err(phase_rejected(ImportPhase::Map, "no file attached"));
        };

        let unmapped = flow.mapping().unmapped_required(flow.fields(), source);
        if unmapped.is_empty() {
            Ok(())
        } else {
            Err(phase_rejected(
                ImportPhase::Map,
                format!("required fields not mapped: {}", unmapped.join(", ")),
            ))
        }
    }

    fn description(&self) -> &'static str {
        "Every required target field must be mapped"
    }
}

/// Validate -> Complete: the row validation session has finished
pub struct ValidationFinishedGuard;

impl StateGuard<ImportFlow> for ValidationFinishedGuard {
    fn check(&self, flow: &ImportFlow) -> GuardResult<()> {
        match flow.validation_status() {
            Some(status) if status.is_finished() => Ok(()),
            Some(status) => Err(phase_rejected(
                ImportPhase::Validate,
                format!("row validation is {status}"),
            )),
            None => Err(phase_rejected(ImportPhase::Validate, "row validation has not run")),
        }
    }

    fn description(&self) -> &'static str {
        "Row validation must be finished"
    }
}
