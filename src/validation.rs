//! Row-level validation for imported records
//!
//! Field format checks and the [`RowValidator`] processing function run by the
//! import wizard's Validate phase, one work item per mapped row. Values may be
//! native JSON types or strings read from a spreadsheet cell.

use crate::orchestration::item_processor::{ItemOutcome, ItemProcessor, ProcessResult};
use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Maximum accepted length for a text value
const MAX_TEXT_LENGTH: usize = 10_000;

/// Accepted digit count for phone numbers (E.164 allows at most 15)
const PHONE_DIGITS: std::ops::RangeInclusive<usize> = 7..=15;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Local part, then dot-separated domain labels that start and end with an
/// alphanumeric, then an alphabetic top-level domain
const EMAIL_PATTERN: &str =
    r"^[A-Za-z0-9._%+-]+@(?:[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?\.)+[A-Za-z]{2,}$";

/// Optional leading `+`, then digits with common separators
const PHONE_PATTERN: &str = r"^\+?[0-9(][0-9 ().-]*[0-9]$";

static EMAIL_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
static PHONE_REGEX: OnceLock<Option<Regex>> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldFormat {
    #[default]
    Text,
    Email,
    Phone,
    Number,
    Integer,
    /// `YYYY-MM-DD`
    Date,
    Boolean,
}

impl fmt::Display for FieldFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Date => "date",
            Self::Boolean => "boolean",
        };
        write!(f, "{name}")
    }
}

impl FieldFormat {
    /// Check a non-empty value against this format
    pub fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            Self::Text => match value {
                Value::String(s) if s.chars().count() > MAX_TEXT_LENGTH => Err(format!(
                    "text longer than {MAX_TEXT_LENGTH} characters"
                )),
                Value::Array(_) | Value::Object(_) => Err("expected a scalar value".to_string()),
                _ => Ok(()),
            },
            Self::Email => as_str(value).filter(|s| is_email(s)).map(|_| ()).ok_or_else(|| {
                format!("'{}' is not a valid email address", display_value(value))
            }),
            Self::Phone => as_str(value)
                .filter(|s| is_phone(s))
                .map(|_| ())
                .ok_or_else(|| format!("'{}' is not a valid phone number", display_value(value))),
            Self::Number => match value {
                Value::Number(_) => Ok(()),
                Value::String(s) if s.trim().parse::<f64>().is_ok_and(f64::is_finite) => Ok(()),
                _ => Err(format!("'{}' is not a number", display_value(value))),
            },
            Self::Integer => match value {
                Value::Number(n) if n.is_i64() || n.is_u64() => Ok(()),
                Value::String(s) if s.trim().parse::<i64>().is_ok() => Ok(()),
                _ => Err(format!("'{}' is not an integer", display_value(value))),
            },
            Self::Date => as_str(value)
                .filter(|s| NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).is_ok())
                .map(|_| ())
                .ok_or_else(|| {
                    format!("'{}' is not a date in YYYY-MM-DD form", display_value(value))
                }),
            Self::Boolean => match value {
                Value::Bool(_) => Ok(()),
                Value::String(s) if parse_bool(s).is_some() => Ok(()),
                Value::Number(n) if n.as_u64().is_some_and(|n| n <= 1) => Ok(()),
                _ => Err(format!("'{}' is not a boolean", display_value(value))),
            },
        }
    }
}

/// A field of the import target schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetField {
    pub name: String,
    pub required: bool,
    #[serde(default)]
    pub format: FieldFormat,
}

impl TargetField {
    pub fn required(name: impl Into<String>, format: FieldFormat) -> Self {
        Self {
            name: name.into(),
            required: true,
            format,
        }
    }

    pub fn optional(name: impl Into<String>, format: FieldFormat) -> Self {
        Self {
            name: name.into(),
            required: false,
            format,
        }
    }
}

/// One source record after column mapping, keyed by target field name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedRow {
    /// 1-based position in the source
    pub row_number: usize,
    pub values: Map<String, Value>,
}

impl MappedRow {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }
}

/// Check one row against the target schema, collecting every problem
pub fn validate_row(fields: &[TargetField], row: &MappedRow) -> Result<(), Vec<String>> {
    let mut problems = Vec::new();

    for field in fields {
        match row.get(&field.name).filter(|v| !is_blank(v)) {
            None if field.required => {
                problems.push(format!("missing required field '{}'", field.name));
            }
            None => {}
            Some(value) => {
                if let Err(problem) = field.format.check(value) {
                    problems.push(format!("{}: {problem}", field.name));
                }
            }
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems)
    }
}

/// Processing function of the Validate phase
#[derive(Debug, Clone)]
pub struct RowValidator {
    fields: Arc<Vec<TargetField>>,
}

impl RowValidator {
    pub fn new(fields: Arc<Vec<TargetField>>) -> Self {
        Self { fields }
    }
}

#[async_trait]
impl ItemProcessor<MappedRow> for RowValidator {
    async fn process(&self, row: &MappedRow) -> ProcessResult {
        Ok(match validate_row(&self.fields, row) {
            Ok(()) => ItemOutcome::success_with(Value::Object(row.values.clone())),
            Err(problems) => {
                ItemOutcome::failure(format!("row {}: {}", row.row_number, problems.join("; ")))
            }
        })
    }

    fn name(&self) -> &str {
        "row_validator"
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn as_str(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim)
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Compile `pattern` once; `None` if it fails to compile
fn compiled(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            tracing::error!(pattern, error = %e, "Invalid validation pattern");
            None
        }
    })
    .as_ref()
}

fn is_email(s: &str) -> bool {
    compiled(&EMAIL_REGEX, EMAIL_PATTERN).is_some_and(|regex| regex.is_match(s))
}

fn is_phone(s: &str) -> bool {
    compiled(&PHONE_REGEX, PHONE_PATTERN).is_some_and(|regex| regex.is_match(s))
        && PHONE_DIGITS.contains(&s.chars().filter(char::is_ascii_digit).count())
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}
