//! Record sources and column mapping for the import wizard

use crate::error::{PipelineError, PipelineResult};
use crate::validation::{MappedRow, TargetField};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// A parsed source record, keyed by source column
pub type Record = Map<String, Value>;

/// An uploaded file after parsing: a named, ordered list of records
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecordSource {
    pub name: String,
    pub records: Vec<Record>,
}

impl RecordSource {
    pub fn new(name: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            name: name.into(),
            records,
        }
    }

    /// Parse a JSON array of objects
    pub fn from_json(name: impl Into<String>, json: &str) -> PipelineResult<Self> {
        let records: Vec<Record> = serde_json::from_str(json).map_err(|e| {
            PipelineError::validation(format!("source must be a JSON array of objects: {e}"))
        })?;
        Ok(Self::new(name, records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every column appearing in at least one record
    pub fn columns(&self) -> BTreeSet<&str> {
        self.records
            .iter()
            .flat_map(|record| record.keys().map(String::as_str))
            .collect()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.records.iter().any(|record| record.contains_key(column))
    }
}

/// Target field -> source column assignments
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FieldMapping {
    assignments: BTreeMap<String, String>,
}

impl FieldMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, target: impl Into<String>, source_column: impl Into<String>) -> Self {
        self.assign(target, source_column);
        self
    }

    pub fn assign(&mut self, target: impl Into<String>, source_column: impl Into<String>) {
        self.assignments.insert(target.into(), source_column.into());
    }

    /// Returns the column the target was mapped to, if any
    pub fn unassign(&mut self, target: &str) -> Option<String> {
        self.assignments.remove(target)
    }

    pub fn source_for(&self, target: &str) -> Option<&str> {
        self.assignments.get(target).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn clear(&mut self) {
        self.assignments.clear();
    }

    /// Required fields with no assignment to a column present in `source`
    pub fn unmapped_required<'a>(
        &self,
        fields: &'a [TargetField],
        source: &RecordSource,
    ) -> Vec<&'a str> {
        fields
            .iter()
            .filter(|field| field.required)
            .filter(|field| {
                !self
                    .source_for(&field.name)
                    .is_some_and(|column| source.has_column(column))
            })
            .map(|field| field.name.as_str())
            .collect()
    }
}

/// Project every source record onto the target schema.
///
/// Fails with `Validation` if a required field is not mapped to an existing
/// column. Unmapped optional fields are left out of the row.
pub fn build_rows(
    source: &RecordSource,
    fields: &[TargetField],
    mapping: &FieldMapping,
) -> PipelineResult<Vec<MappedRow>> {
    let unmapped = mapping.unmapped_required(fields, source);
    if !unmapped.is_empty() {
        return Err(PipelineError::validation(format!(
            "required fields not mapped: {}",
            unmapped.join(", ")
        )));
    }

    let rows = source
        .records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let values = fields
                .iter()
                .filter_map(|field| {
                    let column = mapping.source_for(&field.name)?;
                    let value = record.get(column).cloned().unwrap_or(Value::Null);
                    Some((field.name.clone(), value))
                })
                .collect();
            MappedRow {
                row_number: index + 1,
                values,
            }
        })
        .collect();

    Ok(rows)
}
