//! Recoverable validation outcomes.

use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Conversion,
    Required,
    Unique,
    Rule,
    AllowedValue,
    Mapping,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Conversion => "conversion",
            FailureKind::Required => "required",
            FailureKind::Unique => "unique",
            FailureKind::Rule => "rule",
            FailureKind::AllowedValue => "allowed_value",
            FailureKind::Mapping => "mapping",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One rule or coercion violation. `row_index` is `None` when the failure is
/// not tied to a specific row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailure {
    pub field_name: String,
    pub error_message: String,
    pub row_index: Option<usize>,
    pub attempted_value: Option<String>,
    pub kind: FailureKind,
}

impl ValidationFailure {
    pub fn new(
        kind: FailureKind,
        field_name: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            error_message: error_message.into(),
            row_index: None,
            attempted_value: None,
            kind,
        }
    }

    pub fn at_row(mut self, row_index: usize) -> Self {
        self.row_index = Some(row_index);
        self
    }

    pub fn with_attempted_value(mut self, value: impl Into<String>) -> Self {
        self.attempted_value = Some(value.into());
        self
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.row_index {
            Some(row) => write!(f, "row {row}, field '{}': {}", self.field_name, self.error_message)?,
            None => write!(f, "field '{}': {}", self.field_name, self.error_message)?,
        }
        if let Some(value) = &self.attempted_value {
            write!(f, " (value '{value}')")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    errors: Vec<ValidationFailure>,
    error_messages: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty() && self.error_messages.is_empty()
    }

    pub fn errors(&self) -> &[ValidationFailure] {
        &self.errors
    }

    /// Object-level messages that are not scoped to a field.
    pub fn error_messages(&self) -> &[String] {
        &self.error_messages
    }

    pub fn add_failure(&mut self, failure: ValidationFailure) {
        self.errors.push(failure);
    }

    pub fn extend_failures<I>(&mut self, failures: I)
    where
        I: IntoIterator<Item = ValidationFailure>,
    {
        self.errors.extend(failures);
    }

    pub fn add_message(&mut self, message: impl Into<String>) {
        self.error_messages.push(message.into());
    }

    pub fn clear(&mut self) {
        self.errors.clear();
        self.error_messages.clear();
    }

    pub fn errors_for_field<'a>(
        &'a self,
        field_name: &'a str,
    ) -> impl Iterator<Item = &'a ValidationFailure> + 'a {
        self.errors
            .iter()
            .filter(move |failure| failure.field_name == field_name)
    }

    pub fn errors_for_row(&self, row_index: usize) -> impl Iterator<Item = &ValidationFailure> {
        self.errors
            .iter()
            .filter(move |failure| failure.row_index == Some(row_index))
    }

    pub fn count_by_kind(&self, kind: FailureKind) -> usize {
        self.errors.iter().filter(|failure| failure.kind == kind).count()
    }

    /// Rows with at least one failure, ascending.
    pub fn failing_rows(&self) -> Vec<usize> {
        self.errors
            .iter()
            .filter_map(|failure| failure.row_index)
            .sorted_unstable()
            .dedup()
            .collect()
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            return f.write_str("valid");
        }
        write!(
            f,
            "{} failure(s), {} message(s)",
            self.errors.len(),
            self.error_messages.len()
        )
    }
}
