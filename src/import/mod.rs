//! # Import Wizard
//!
//! Upload -> Map -> Validate -> Complete, driven by a [`PhaseSequencer`].
//!
//! Entering Validate projects every source record onto the target schema and
//! runs one work item per row through [`RowValidator`] in a nested batch
//! session. Entering Complete commits an [`ImportOutcome`]: with
//! `skip_invalid` the valid rows are imported and the invalid ones reported;
//! without it any invalid row rejects the whole import.
//!
//! ```rust,no_run
//! use bulkflow_core::import::{FieldMapping, ImportFlow, ImportOptions, RecordSource};
//! use bulkflow_core::validation::{FieldFormat, TargetField};
//!
//! # async fn example() -> bulkflow_core::error::PipelineResult<()> {
//! let fields = vec![TargetField::required("email", FieldFormat::Email)];
//! let mut wizard = ImportFlow::new(fields, ImportOptions::default()).into_wizard()?;
//!
//! wizard.flow_mut().attach_source(RecordSource::from_json("people.json", r#"[{"Mail": "a@b.io"}]"#)?);
//! wizard.advance().await?;
//! wizard.flow_mut().map_field("email", "Mail");
//! wizard.advance().await?;
//! wizard.advance().await?;
//! assert_eq!(wizard.flow().outcome().map(|o| o.imported.len()), Some(1));
//! # Ok(())
//! # }
//! ```

pub mod guards;
pub mod mapping;

pub use guards::{RequiredFieldsMappedGuard, SourceAttachedGuard, ValidationFinishedGuard};
pub use mapping::{build_rows, FieldMapping, Record, RecordSource};

use crate::config::{BulkflowConfig, SessionConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::models::{ProgressSnapshot, SessionId, WorkItem};
use crate::orchestration::phase_sequencer::{PhaseFlow, PhaseSequencer};
use crate::orchestration::session_manager::SessionManager;
use crate::state_machine::{GuardResult, ItemState, SessionStatus, StateGuard};
use crate::validation::{MappedRow, RowValidator, TargetField};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportPhase {
    Upload,
    Map,
    Validate,
    Complete,
}

impl fmt::Display for ImportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload => write!(f, "upload"),
            Self::Map => write!(f, "map"),
            Self::Validate => write!(f, "validate"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

const IMPORT_PHASES: [ImportPhase; 4] = [
    ImportPhase::Upload,
    ImportPhase::Map,
    ImportPhase::Validate,
    ImportPhase::Complete,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    /// Import valid rows and skip invalid ones; otherwise any invalid row rejects the import
    pub skip_invalid: bool,
    /// Run configuration of the row validation session
    pub session: SessionConfig,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self::from_config(&BulkflowConfig::default())
    }
}

impl ImportOptions {
    pub fn from_config(config: &BulkflowConfig) -> Self {
        Self {
            skip_invalid: config.import.skip_invalid,
            session: config.session.clone(),
        }
    }

    pub fn reject_all(mut self) -> Self {
        self.skip_invalid = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedRow {
    pub row_number: usize,
    pub error_detail: String,
}

/// What the Complete phase committed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub imported: Vec<MappedRow>,
    pub rejected: Vec<RejectedRow>,
    /// True when invalid rows caused the whole import to be rejected
    pub import_rejected: bool,
}

#[derive(Debug)]
struct ValidationRun {
    session_id: SessionId,
    status: SessionStatus,
}

/// Wizard state for one import
pub struct ImportFlow {
    fields: Arc<Vec<TargetField>>,
    options: ImportOptions,
    source: Option<RecordSource>,
    mapping: FieldMapping,
    validator: SessionManager<MappedRow>,
    validation: Option<ValidationRun>,
    outcome: Option<ImportOutcome>,
}

pub type ImportWizard = PhaseSequencer<ImportFlow>;

impl ImportFlow {
    pub fn new(fields: Vec<TargetField>, options: ImportOptions) -> Self {
        let fields = Arc::new(fields);
        Self {
            validator: SessionManager::new(Arc::new(RowValidator::new(Arc::clone(&fields)))),
            fields,
            options,
            source: None,
            mapping: FieldMapping::new(),
            validation: None,
            outcome: None,
        }
    }

    pub fn into_wizard(self) -> PipelineResult<ImportWizard> {
        PhaseSequencer::new(self)
    }

    /// Attach (or replace) the uploaded source; clears any existing mapping
    pub fn attach_source(&mut self, source: RecordSource) {
        self.source = Some(source);
        self.mapping.clear();
    }

    pub fn map_field(&mut self, target: impl Into<String>, source_column: impl Into<String>) {
        self.mapping.assign(target, source_column);
    }

    pub fn unmap_field(&mut self, target: &str) -> Option<String> {
        self.mapping.unassign(target)
    }

    pub fn fields(&self) -> &[TargetField] {
        &self.fields
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    pub fn source(&self) -> Option<&RecordSource> {
        self.source.as_ref()
    }

    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    pub fn validation_status(&self) -> Option<SessionStatus> {
        self.validation.as_ref().map(|run| run.status)
    }

    /// Progress of the row validation session, including the row-level error count
    pub fn validation_snapshot(&self) -> Option<ProgressSnapshot> {
        let run = self.validation.as_ref()?;
        self.validator.snapshot(run.session_id).ok()
    }

    pub fn validation_session(&self) -> Option<SessionId> {
        self.validation.as_ref().map(|run| run.session_id)
    }

    /// Per-row results of the validation session, in source order
    pub fn validation_items(&self) -> Vec<WorkItem<MappedRow>> {
        self.validation
            .as_ref()
            .and_then(|run| self.validator.items(run.session_id).ok())
            .unwrap_or_default()
    }

    pub fn outcome(&self) -> Option<&ImportOutcome> {
        self.outcome.as_ref()
    }

    async fn run_validation(&mut self) -> PipelineResult<()> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| PipelineError::validation("no file attached"))?;
        let rows = build_rows(source, &self.fields, &self.mapping)?;
        let row_count = rows.len();

        if let Some(previous) = self.validation.take() {
            if let Err(e) = self.validator.remove_session(previous.session_id) {
                warn!(session_id = %previous.session_id, error = %e, "Could not discard previous validation run");
            }
        }
        self.outcome = None;

        let items = rows.into_iter().map(WorkItem::new).collect();
        let session_id = self
            .validator
            .create_session(items, self.options.session.clone())?;
        self.validation = Some(ValidationRun {
            session_id,
            status: SessionStatus::Idle,
        });

        let status = self.validator.start(session_id).await;
        if let Some(run) = self.validation.as_mut() {
            run.status = self.validator.status(session_id)?;
        }
        status?;

        let snapshot = self.validator.snapshot(session_id)?;
        info!(
            session_id = %session_id,
            rows = row_count,
            valid = snapshot.completed,
            invalid = snapshot.error,
            "Row validation finished"
        );
        Ok(())
    }

    fn commit(&mut self) -> PipelineResult<()> {
        let run = self
            .validation
            .as_ref()
            .ok_or_else(|| PipelineError::validation("row validation has not run"))?;

        let mut valid = Vec::new();
        let mut rejected = Vec::new();
        for item in self.validator.items(run.session_id)? {
            match item.state() {
                ItemState::Completed => valid.push(item.payload().clone()),
                _ => rejected.push(RejectedRow {
                    row_number: item.payload().row_number,
                    error_detail: item.error_detail().unwrap_or("not validated").to_string(),
                }),
            }
        }

        let import_rejected = !self.options.skip_invalid && !rejected.is_empty();
        let imported = if import_rejected { Vec::new() } else { valid };

        info!(
            imported = imported.len(),
            rejected = rejected.len(),
            import_rejected,
            "Import committed"
        );
        self.outcome = Some(ImportOutcome {
            imported,
            rejected,
            import_rejected,
        });
        Ok(())
    }
}

#[async_trait]
impl PhaseFlow for ImportFlow {
    type Phase = ImportPhase;

    fn phases(&self) -> &[ImportPhase] {
        &IMPORT_PHASES
    }

    fn guard(&self, phase: ImportPhase) -> GuardResult<()> {
        match phase {
            ImportPhase::Upload => SourceAttachedGuard.check(self),
            ImportPhase::Map => RequiredFieldsMappedGuard.check(self),
            ImportPhase::Validate => ValidationFinishedGuard.check(self),
            ImportPhase::Complete => Ok(()),
        }
    }

    async fn on_enter(&mut self, phase: ImportPhase) -> PipelineResult<()> {
        match phase {
            ImportPhase::Validate => self.run_validation().await,
            ImportPhase::Complete => self.commit(),
            ImportPhase::Upload | ImportPhase::Map => Ok(()),
        }
    }

    fn reset(&mut self) {
        if let Some(run) = self.validation.take() {
            if let Err(e) = self.validator.remove_session(run.session_id) {
                warn!(session_id = %run.session_id, error = %e, "Could not discard validation run");
            }
        }
        self.source = None;
        self.mapping.clear();
        self.outcome = None;
    }
}

impl fmt::Debug for ImportFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportFlow")
            .field("fields", &self.fields.len())
            .field("source", &self.source.as_ref().map(|s| s.name.as_str()))
            .field("mapping", &self.mapping)
            .field("validation", &self.validation)
            .field("outcome", &self.outcome.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::FieldFormat;

    fn wizard(options: ImportOptions) -> ImportWizard {
        let fields = vec![
            TargetField::required("email", FieldFormat::Email),
            TargetField::optional("age", FieldFormat::Integer),
        ];
        ImportFlow::new(fields, options).into_wizard().unwrap()
    }

    fn source() -> RecordSource {
        RecordSource::from_json(
            "people.json",
            r#"[
                {"Mail": "ana@example.com", "Age": "31"},
                {"Mail": "not-an-email", "Age": "40"},
                {"Mail": "bo@example.com", "Age": "n/a"}
            ]"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_upload_requires_source() {
        let mut wizard = wizard(ImportOptions::default());
        let err = wizard.advance().await.unwrap_err();
        assert!(matches!(err, PipelineError::GuardFailed { ref phase, .. } if phase == "upload"));

        wizard
            .flow_mut()
            .attach_source(RecordSource::new("empty.csv", vec![]));
        assert!(wizard.advance().await.is_err());
        assert_eq!(wizard.current_phase(), ImportPhase::Upload);
    }

    #[tokio::test]
    async fn test_skip_invalid_imports_valid_rows() {
        let mut wizard = wizard(ImportOptions::default());
        wizard.flow_mut().attach_source(source());
        wizard.advance().await.unwrap();
        wizard.flow_mut().map_field("email", "Mail");
        wizard.flow_mut().map_field("age", "Age");

        assert_eq!(wizard.advance().await.unwrap(), ImportPhase::Validate);
        let snapshot = wizard.flow().validation_snapshot().unwrap();
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.error, 2);

        assert_eq!(wizard.advance().await.unwrap(), ImportPhase::Complete);
        assert!(wizard.is_complete());
        let outcome = wizard.flow().outcome().unwrap();
        assert_eq!(outcome.imported.len(), 1);
        assert_eq!(outcome.rejected.len(), 2);
        assert_eq!(outcome.rejected[0].row_number, 2);
        assert!(!outcome.import_rejected);
    }

    #[tokio::test]
    async fn test_reject_all_imports_nothing() {
        let mut wizard = wizard(ImportOptions::default().reject_all());
        wizard.flow_mut().attach_source(source());
        wizard.advance().await.unwrap();
        wizard.flow_mut().map_field("email", "Mail");
        wizard.advance().await.unwrap();
        wizard.advance().await.unwrap();

        let outcome = wizard.flow().outcome().unwrap();
        assert!(outcome.import_rejected);
        assert!(outcome.imported.is_empty());
        // age unmapped, so only the bad email fails
        assert_eq!(outcome.rejected.len(), 1);
    }

    #[tokio::test]
    async fn test_reset_discards_state() {
        let mut wizard = wizard(ImportOptions::default());
        wizard.flow_mut().attach_source(source());
        wizard.advance().await.unwrap();
        wizard.flow_mut().map_field("email", "Mail");
        wizard.advance().await.unwrap();

        wizard.reset();
        assert_eq!(wizard.current_phase(), ImportPhase::Upload);
        assert!(wizard.flow().source().is_none());
        assert!(wizard.flow().validation_status().is_none());
        assert!(wizard.flow().mapping().is_empty());
    }
}
