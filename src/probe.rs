//! Field-definition inference from a sample of a loaded table.

use heck::ToUpperCamelCase;
use log::debug;
use uuid::Uuid;

use crate::{
    error::ImportResult,
    field::{FieldDefinition, FieldDefinitionCollection, FieldType},
    source::RawTable,
    value::{parse_naive_date, parse_naive_datetime, parse_naive_time},
};

#[derive(Debug, Clone)]
struct TypeCandidate {
    possible_boolean: bool,
    possible_integer: bool,
    possible_float: bool,
    possible_date: bool,
    possible_datetime: bool,
    possible_time: bool,
    possible_guid: bool,
    non_blank: usize,
    blank: usize,
}

impl TypeCandidate {
    fn new() -> Self {
        Self {
            possible_boolean: true,
            possible_integer: true,
            possible_float: true,
            possible_date: true,
            possible_datetime: true,
            possible_time: true,
            possible_guid: true,
            non_blank: 0,
            blank: 0,
        }
    }

    fn observe(&mut self, cell: Option<&str>) {
        let Some(text) = cell.map(str::trim).filter(|text| !text.is_empty()) else {
            self.blank += 1;
            return;
        };
        self.non_blank += 1;
        if self.possible_boolean
            && !matches!(
                text.to_lowercase().as_str(),
                "true" | "false" | "yes" | "no" | "si" | "sí"
            )
        {
            self.possible_boolean = false;
        }
        if self.possible_integer && text.strip_prefix('+').unwrap_or(text).parse::<i64>().is_err() {
            self.possible_integer = false;
        }
        if self.possible_float && !text.parse::<f64>().is_ok_and(f64::is_finite) {
            self.possible_float = false;
        }
        if self.possible_date && parse_naive_date(text).is_none() {
            self.possible_date = false;
        }
        if self.possible_datetime && parse_naive_datetime(text).is_none() {
            self.possible_datetime = false;
        }
        if self.possible_time && parse_naive_time(text).is_none() {
            self.possible_time = false;
        }
        if self.possible_guid
            && Uuid::parse_str(text.trim_matches(|c| matches!(c, '{' | '}'))).is_err()
        {
            self.possible_guid = false;
        }
    }

    fn decide(&self) -> FieldType {
        if self.non_blank == 0 {
            FieldType::String
        } else if self.possible_boolean {
            FieldType::Boolean
        } else if self.possible_integer {
            FieldType::Integer
        } else if self.possible_float {
            FieldType::Float
        } else if self.possible_date {
            FieldType::Date
        } else if self.possible_datetime {
            FieldType::DateTime
        } else if self.possible_time {
            FieldType::Time
        } else if self.possible_guid {
            FieldType::Guid
        } else {
            FieldType::String
        }
    }
}

/// UpperCamelCase field name for a source header, falling back to
/// `Field{n}` when nothing alphanumeric remains.
pub fn field_name_for_header(header: &str, position: usize) -> String {
    let name = header.to_upper_camel_case();
    if name.is_empty() {
        format!("Field{}", position + 1)
    } else {
        name
    }
}

/// Proposes one field per column. `sample_rows == 0` scans every row.
pub fn infer_field_definitions(
    table: &RawTable,
    sample_rows: usize,
) -> ImportResult<FieldDefinitionCollection> {
    let mut candidates = vec![TypeCandidate::new(); table.columns.len()];
    let limit = if sample_rows == 0 {
        table.rows.len()
    } else {
        sample_rows
    };
    for row in table.rows.iter().take(limit) {
        for (column, candidate) in candidates.iter_mut().enumerate() {
            candidate.observe(row.get(column));
        }
    }

    let mut fields = FieldDefinitionCollection::new();
    for (position, (header, candidate)) in table.columns.iter().zip(&candidates).enumerate() {
        let mut name = field_name_for_header(header, position);
        if fields.get(&name).is_some() {
            name = format!("{name}{}", position + 1);
        }
        let field_type = candidate.decide();
        debug!(
            "Column '{header}' -> field '{name}' as {field_type} ({} blank of {} sampled)",
            candidate.blank,
            candidate.blank + candidate.non_blank
        );
        fields.add(
            FieldDefinition::new(name, field_type)
                .mapped_from(header.clone())
                .nullable(candidate.blank > 0),
        )?;
    }
    Ok(fields)
}
