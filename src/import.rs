//! The import session: map fields onto a source, load it, validate it and
//! hand back typed rows.
//!
//! ## Workflow
//!
//! ```text
//! Unmapped --set_mapping--> Mapped --load_data--> Loaded --validate_data_types--> Validated
//!                              ^                                                     |
//!                              +-------------------------- remap --------------------+
//! ```
//!
//! `load_data` keeps the raw table so that `validate_data_types` can be run
//! any number of times with identical results. After `remap` the loaded data
//! is discarded and the source must be loaded again; readers buffer their
//! table, so the same reader can be passed back in.

use std::{collections::HashMap, marker::PhantomData, sync::Arc, time::Instant};

use log::{debug, info, warn};
use similar::TextDiff;

use crate::{
    converter::{ConverterRegistry, TypeConverter},
    error::{ImportError, ImportResult},
    field::{FieldDefinition, FieldDefinitionCollection, FieldType},
    record::{ImportRecord, RecordView},
    source::{RawTable, SourceReader},
    validation::{FailureKind, ValidationFailure, ValidationResult},
    value::{FromValue, Value},
};

const SUGGESTION_CUTOFF: f32 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unmapped,
    Mapped,
    Loaded,
    Validated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataRow {
    pub index: usize,
    pub values: Vec<Option<Value>>,
}

impl DataRow {
    pub fn get(&self, column: usize) -> Option<&Value> {
        self.values.get(column).and_then(Option::as_ref)
    }
}

/// Converted rows, one column per field in registry order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSource {
    columns: Vec<String>,
    column_types: Vec<FieldType>,
    rows: Vec<DataRow>,
}

impl DataSource {
    fn with_fields(fields: &FieldDefinitionCollection) -> Self {
        Self {
            columns: fields.field_names(),
            column_types: fields.iter().map(|f| f.field_type().clone()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_types(&self) -> &[FieldType] {
        &self.column_types
    }

    pub fn rows(&self) -> &[DataRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_position(&self, field_name: &str) -> Option<usize> {
        let wanted = field_name.trim();
        self.columns
            .iter()
            .position(|column| column.eq_ignore_ascii_case(wanted))
    }

    /// Value at `row` (position in [`rows`](Self::rows)) for `field_name`.
    pub fn get(&self, row: usize, field_name: &str) -> Option<&Value> {
        let column = self.column_position(field_name)?;
        self.rows.get(row)?.get(column)
    }

    pub fn column_values(&self, field_name: &str) -> Option<impl Iterator<Item = Option<&Value>>> {
        let column = self.column_position(field_name)?;
        Some(self.rows.iter().map(move |row| row.get(column)))
    }

    fn clear(&mut self) {
        self.columns.clear();
        self.column_types.clear();
        self.rows.clear();
    }
}

/// A field whose source column is absent from the loaded table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingIssue {
    pub field_name: String,
    pub mapped_name: String,
    pub suggestion: Option<String>,
}

impl MappingIssue {
    fn message(&self) -> String {
        let mut message = format!(
            "Column '{}' mapped to field '{}' was not found in the source",
            self.mapped_name, self.field_name
        );
        if let Some(suggestion) = &self.suggestion {
            message.push_str(&format!(" (did you mean '{suggestion}'?)"));
        }
        message
    }
}

/// Closest header to `wanted` by character similarity, ignoring case.
pub fn suggest_column(wanted: &str, columns: &[String]) -> Option<String> {
    let wanted = wanted.trim().to_lowercase();
    columns
        .iter()
        .map(|column| {
            let ratio = TextDiff::from_chars(wanted.as_str(), column.trim().to_lowercase().as_str())
                .ratio();
            (column, ratio)
        })
        .filter(|(_, ratio)| *ratio >= SUGGESTION_CUTOFF)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(column, _)| column.clone())
}

/// Lazily converted view of one raw cell. Every call to
/// [`try_get_value`](Self::try_get_value) converts the raw text again.
pub struct ImportedFieldValue<'a, T> {
    field: &'a FieldDefinition,
    raw: Option<&'a str>,
    converter: &'a Arc<dyn TypeConverter>,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T> ImportedFieldValue<'a, T>
where
    T: FromValue,
{
    pub fn field(&self) -> &'a FieldDefinition {
        self.field
    }

    pub fn raw_value(&self) -> Option<&'a str> {
        self.raw
    }

    pub fn try_get_value(&self) -> Option<T> {
        let raw = self.raw?;
        let value = self.converter.try_convert(raw).ok().flatten()?;
        T::from_value(&value)
    }
}

#[derive(Debug)]
pub struct ImportManager {
    registry: ConverterRegistry,
    fields: FieldDefinitionCollection,
    converters: Vec<Arc<dyn TypeConverter>>,
    state: SessionState,
    table: Option<RawTable>,
    bindings: Vec<Option<usize>>,
    mapping_issues: Vec<MappingIssue>,
    data_source: DataSource,
    result: ValidationResult,
}

impl Default for ImportManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportManager {
    pub fn new() -> Self {
        Self::with_registry(ConverterRegistry::with_defaults())
    }

    pub fn with_registry(registry: ConverterRegistry) -> Self {
        Self {
            registry,
            fields: FieldDefinitionCollection::new(),
            converters: Vec::new(),
            state: SessionState::Unmapped,
            table: None,
            bindings: Vec::new(),
            mapping_issues: Vec::new(),
            data_source: DataSource::default(),
            result: ValidationResult::new(),
        }
    }

    /// A session already mapped with the record type's definitions.
    pub fn for_record<T: ImportRecord>() -> ImportResult<Self> {
        let mut manager = Self::new();
        manager.set_mapping(T::field_definitions()?)?;
        Ok(manager)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn registry(&self) -> &ConverterRegistry {
        &self.registry
    }

    pub fn fields(&self) -> &FieldDefinitionCollection {
        &self.fields
    }

    pub fn validation_result(&self) -> &ValidationResult {
        &self.result
    }

    pub fn data_source(&self) -> &DataSource {
        &self.data_source
    }

    pub fn mapping_issues(&self) -> &[MappingIssue] {
        &self.mapping_issues
    }

    /// Installs `fields` as the mapping. Every converter is resolved here, so
    /// an unregistered custom type fails now rather than per cell.
    pub fn set_mapping(&mut self, fields: FieldDefinitionCollection) -> ImportResult<()> {
        if fields.is_empty() {
            return Err(ImportError::InvalidDefinition(
                "at least one field definition is required".to_string(),
            ));
        }
        let converters = fields
            .iter()
            .map(|field| field.resolve_converter(&self.registry))
            .collect::<ImportResult<Vec<_>>>()?;
        debug!("Mapping set with {} field(s)", fields.len());
        self.fields = fields;
        self.converters = converters;
        self.discard_loaded();
        self.state = SessionState::Mapped;
        Ok(())
    }

    /// Points a field at another source column. Loaded data is discarded.
    pub fn remap(&mut self, field_name: &str, source_column: &str) -> ImportResult<()> {
        if self.state == SessionState::Unmapped {
            return Err(ImportError::NotMapped);
        }
        self.fields.remap(field_name, source_column)?;
        self.discard_loaded();
        self.state = SessionState::Mapped;
        Ok(())
    }

    fn discard_loaded(&mut self) {
        self.table = None;
        self.bindings.clear();
        self.mapping_issues.clear();
        self.data_source.clear();
        self.result.clear();
    }

    pub fn load_data(&mut self, reader: &mut dyn SourceReader) -> ImportResult<()> {
        if self.state == SessionState::Unmapped {
            return Err(ImportError::NotMapped);
        }
        if !reader.can_read() {
            // The reader's own error names the cause; fall back only when it has none.
            return Err(match reader.read_data() {
                Err(err) => err,
                Ok(_) => ImportError::SourceUnavailable(reader.describe()),
            });
        }
        self.discard_loaded();
        self.state = SessionState::Mapped;

        let started = Instant::now();
        let table = reader.read_data()?;
        debug!(
            "Read {} row(s) and {} column(s) from {}",
            table.len(),
            table.columns.len(),
            reader.describe()
        );

        self.bindings = self
            .fields
            .iter()
            .map(|field| table.column_index(field.mapped_name()))
            .collect();
        self.mapping_issues = self
            .fields
            .iter()
            .zip(&self.bindings)
            .filter(|(_, binding)| binding.is_none())
            .map(|(field, _)| MappingIssue {
                field_name: field.field_name().to_string(),
                mapped_name: field.mapped_name().to_string(),
                suggestion: suggest_column(field.mapped_name(), &table.columns),
            })
            .collect();
        for issue in &self.mapping_issues {
            warn!("{}", issue.message());
        }

        let mut data_source = DataSource::with_fields(&self.fields);
        data_source.rows = table
            .rows
            .iter()
            .map(|row| DataRow {
                index: row.index,
                values: self
                    .bindings
                    .iter()
                    .zip(&self.converters)
                    .map(|(binding, converter)| {
                        binding
                            .and_then(|column| row.get(column))
                            .and_then(|raw| converter.convert(raw))
                    })
                    .collect(),
            })
            .collect();
        self.data_source = data_source;
        self.table = Some(table);
        self.state = SessionState::Loaded;
        info!(
            "Loaded {} row(s) for {} field(s) from {} in {:.2} ms",
            self.data_source.len(),
            self.fields.len(),
            reader.describe(),
            started.elapsed().as_secs_f64() * 1000.0
        );
        Ok(())
    }

    /// Validates every loaded cell and returns whether the data is valid.
    /// The previous result is discarded first, so repeated calls report
    /// identical failures.
    pub fn validate_data_types(&mut self) -> ImportResult<bool> {
        let table = match (self.state, &self.table) {
            (SessionState::Unmapped, _) => return Err(ImportError::NotMapped),
            (_, None) => return Err(ImportError::NotLoaded),
            (_, Some(table)) => table,
        };
        let started = Instant::now();
        let mut result = ValidationResult::new();

        for issue in &self.mapping_issues {
            let message = issue.message();
            result.add_message(message.clone());
            result.add_failure(ValidationFailure::new(
                FailureKind::Mapping,
                issue.field_name.clone(),
                message,
            ));
        }

        let mut rows = Vec::with_capacity(table.rows.len());
        for raw_row in &table.rows {
            let mut values = Vec::with_capacity(self.fields.len());
            for ((field, converter), binding) in
                self.fields.iter().zip(&self.converters).zip(&self.bindings)
            {
                let Some(column) = binding else {
                    values.push(None);
                    continue;
                };
                let raw = raw_row.get(*column);
                let value = validate_cell(field, converter.as_ref(), raw, raw_row.index, &mut result);
                values.push(value);
            }
            rows.push(DataRow {
                index: raw_row.index,
                values,
            });
        }

        for (position, field) in self.fields.iter().enumerate() {
            if field.is_unique() && self.bindings[position].is_some() {
                check_unique(field, position, &rows, &mut result);
            }
        }

        let mut data_source = DataSource::with_fields(&self.fields);
        data_source.rows = rows;
        self.data_source = data_source;
        self.result = result;
        self.state = SessionState::Validated;

        let is_valid = self.result.is_valid();
        info!(
            "Validated {} row(s): {} failure(s) across {} row(s) in {:.2} ms",
            self.data_source.len(),
            self.result.errors().len(),
            self.result.failing_rows().len(),
            started.elapsed().as_secs_f64() * 1000.0
        );
        if !is_valid {
            debug!(
                "Failures by kind: conversion={}, required={}, unique={}, rule={}, allowed={}, mapping={}",
                self.result.count_by_kind(FailureKind::Conversion),
                self.result.count_by_kind(FailureKind::Required),
                self.result.count_by_kind(FailureKind::Unique),
                self.result.count_by_kind(FailureKind::Rule),
                self.result.count_by_kind(FailureKind::AllowedValue),
                self.result.count_by_kind(FailureKind::Mapping),
            );
        }
        Ok(is_valid)
    }

    /// Converted value at `row` (position in the data source) as `T`.
    pub fn field_value<T: FromValue>(&self, row: usize, field_name: &str) -> Option<T> {
        self.data_source
            .get(row, field_name)
            .and_then(T::from_value)
    }

    /// Raw cell at `row` paired with its field's converter.
    pub fn imported_value<T: FromValue>(
        &self,
        row: usize,
        field_name: &str,
    ) -> ImportResult<ImportedFieldValue<'_, T>> {
        let table = self.table.as_ref().ok_or(ImportError::NotLoaded)?;
        let position = self
            .fields
            .position(field_name)
            .ok_or_else(|| ImportError::UnknownField(field_name.to_string()))?;
        let raw = match (self.bindings[position], table.rows.get(row)) {
            (Some(column), Some(raw_row)) => raw_row.get(column),
            _ => None,
        };
        Ok(ImportedFieldValue {
            field: &self.fields.as_slice()[position],
            raw,
            converter: &self.converters[position],
            _marker: PhantomData,
        })
    }

    /// Builds one `T` per loaded row from the converted values.
    pub fn records<T: ImportRecord>(&self) -> ImportResult<Vec<T>> {
        if self.table.is_none() {
            return Err(ImportError::NotLoaded);
        }
        let columns = self.data_source.columns();
        self.data_source
            .rows()
            .iter()
            .map(|row| T::from_row(&RecordView::new(columns, row)))
            .collect()
    }
}

fn validate_cell(
    field: &FieldDefinition,
    converter: &dyn TypeConverter,
    raw: Option<&str>,
    row_index: usize,
    result: &mut ValidationResult,
) -> Option<Value> {
    let raw = raw.filter(|text| !text.trim().is_empty());
    let Some(raw) = raw else {
        if field.is_required() {
            result.add_failure(
                ValidationFailure::new(
                    FailureKind::Required,
                    field.field_name(),
                    format!("'{}' is required", field.display_name()),
                )
                .at_row(row_index),
            );
        } else if !field.allow_null() {
            result.add_failure(
                ValidationFailure::new(
                    FailureKind::Conversion,
                    field.field_name(),
                    format!("'{}' does not allow empty values", field.display_name()),
                )
                .at_row(row_index),
            );
        } else {
            apply_rules(field, None, row_index, result);
        }
        return None;
    };

    match converter.try_convert(raw) {
        Ok(value) => {
            apply_rules(field, value.as_ref(), row_index, result);
            if let (Some(value), Some(allowed)) = (&value, field.allowed_values())
                && !allowed.contains(value)
            {
                result.add_failure(
                    ValidationFailure::new(
                        FailureKind::AllowedValue,
                        field.field_name(),
                        format!("'{}' must be {}", field.display_name(), allowed.describe()),
                    )
                    .at_row(row_index)
                    .with_attempted_value(value.as_display()),
                );
            }
            value
        }
        Err(err) => {
            result.add_failure(
                ValidationFailure::new(
                    FailureKind::Conversion,
                    field.field_name(),
                    format!(
                        "'{}' could not be converted to {}: {err}",
                        field.display_name(),
                        field.field_type()
                    ),
                )
                .at_row(row_index)
                .with_attempted_value(raw),
            );
            let fallback = Value::String(raw.to_string());
            apply_rules(field, Some(&fallback), row_index, result);
            None
        }
    }
}

fn apply_rules(
    field: &FieldDefinition,
    value: Option<&Value>,
    row_index: usize,
    result: &mut ValidationResult,
) {
    for rule in field.validation_rules() {
        result.extend_failures(
            rule.validate(value, field.field_name())
                .into_iter()
                .map(|failure| failure.at_row(row_index)),
        );
    }
}

fn check_unique(
    field: &FieldDefinition,
    position: usize,
    rows: &[DataRow],
    result: &mut ValidationResult,
) {
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    for row in rows {
        let Some(value) = row.get(position) else {
            continue;
        };
        match first_seen.get(&value.unique_key()) {
            Some(first_row) => result.add_failure(
                ValidationFailure::new(
                    FailureKind::Unique,
                    field.field_name(),
                    format!(
                        "'{}' value '{}' is duplicated (first seen in row {first_row})",
                        field.display_name(),
                        value
                    ),
                )
                .at_row(row.index)
                .with_attempted_value(value.as_display()),
            ),
            None => {
                first_seen.insert(value.unique_key(), row.index);
            }
        }
    }
}
