use std::{
    fs,
    path::{Path, PathBuf},
};

use log::info;
use serde_json::Value as JsonValue;

use super::{RawTable, SourceReader, TableBuilder};
use crate::error::{ImportError, ImportResult};

#[derive(Debug, Clone)]
enum JsonInput {
    Path(PathBuf),
    Text(String),
}

/// Reads an API-style payload: a JSON array of flat objects. Columns are the
/// union of object keys in first-seen order.
#[derive(Debug, Clone)]
pub struct JsonSourceReader {
    input: JsonInput,
    cached: Option<RawTable>,
}

impl JsonSourceReader {
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self {
            input: JsonInput::Path(path.as_ref().to_path_buf()),
            cached: None,
        }
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            input: JsonInput::Text(text.into()),
            cached: None,
        }
    }

    fn parse(&self) -> ImportResult<RawTable> {
        let payload: JsonValue = match &self.input {
            JsonInput::Path(path) => {
                if !path.is_file() {
                    return Err(ImportError::SourceNotFound(path.display().to_string()));
                }
                serde_json::from_str(&fs::read_to_string(path)?)?
            }
            JsonInput::Text(text) => serde_json::from_str(text)?,
        };
        let records = match payload {
            JsonValue::Array(items) => items,
            other => {
                return Err(ImportError::SourceUnavailable(format!(
                    "expected a JSON array of objects, found {}",
                    json_kind(&other)
                )));
            }
        };

        let mut columns: Vec<String> = Vec::new();
        let mut objects = Vec::with_capacity(records.len());
        for (position, record) in records.into_iter().enumerate() {
            let JsonValue::Object(object) = record else {
                return Err(ImportError::SourceUnavailable(format!(
                    "record {position} is not a JSON object"
                )));
            };
            for key in object.keys() {
                if !columns.iter().any(|column| column == key) {
                    columns.push(key.clone());
                }
            }
            objects.push(object);
        }

        let mut table = TableBuilder::with_headers(columns.iter().cloned().map(Some));
        for object in &objects {
            table.push_row(
                columns
                    .iter()
                    .map(|column| object.get(column).and_then(render_json)),
            );
        }
        Ok(table.finish())
    }
}

fn render_json(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => (!s.trim().is_empty()).then(|| s.clone()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        nested => Some(nested.to_string()),
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

impl SourceReader for JsonSourceReader {
    fn can_read(&self) -> bool {
        match &self.input {
            JsonInput::Path(path) => self.cached.is_some() || path.is_file(),
            JsonInput::Text(_) => true,
        }
    }

    fn read_data(&mut self) -> ImportResult<RawTable> {
        if let Some(table) = &self.cached {
            return Ok(table.clone());
        }
        let table = self.parse()?;
        info!(
            "Read {} record(s) across {} column(s) from {}",
            table.len(),
            table.columns.len(),
            self.describe()
        );
        self.cached = Some(table.clone());
        Ok(table)
    }

    fn describe(&self) -> String {
        match &self.input {
            JsonInput::Path(path) => format!("JSON '{}'", path.display()),
            JsonInput::Text(_) => "JSON payload".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_follow_first_seen_key_order() {
        let mut reader = JsonSourceReader::from_text(
            r#"[{"name":"Ana","age":30},{"age":41,"city":"Lugo","name":null}]"#,
        );
        let table = reader.read_data().unwrap();
        assert_eq!(table.columns, vec!["name", "age", "city"]);
        assert_eq!(table.rows[0].get(1), Some("30"));
        assert_eq!(table.rows[0].get(2), None);
        assert_eq!(table.rows[1].get(0), None);
    }

    #[test]
    fn scalars_and_nested_values_render_as_text() {
        let mut reader =
            JsonSourceReader::from_text(r#"[{"ok":true,"score":2.5,"tags":["a","b"]}]"#);
        let table = reader.read_data().unwrap();
        assert_eq!(table.rows[0].get(0), Some("true"));
        assert_eq!(table.rows[0].get(1), Some("2.5"));
        assert_eq!(table.rows[0].get(2), Some(r#"["a","b"]"#));
    }

    #[test]
    fn non_array_payload_is_rejected() {
        let mut reader = JsonSourceReader::from_text(r#"{"name":"Ana"}"#);
        assert!(matches!(
            reader.read_data(),
            Err(ImportError::SourceUnavailable(_))
        ));
        let mut reader = JsonSourceReader::from_text("[1, 2]");
        assert!(reader.read_data().is_err());
    }

    #[test]
    fn malformed_json_propagates() {
        let mut reader = JsonSourceReader::from_text("[{");
        assert!(matches!(reader.read_data(), Err(ImportError::Json(_))));
    }
}
