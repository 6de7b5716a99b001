//! Source readers turn an external byte stream into an untyped [`RawTable`].
//!
//! Every adapter (CSV, Excel, JSON) follows the same contract: `read_data`
//! either returns a complete table or fails, and the table produced by the
//! first successful read is buffered so later reads (the re-mapping
//! workflow) never touch the underlying stream again.

mod csv_reader;
mod excel_reader;
mod json_reader;

use std::path::Path;

use log::debug;

pub use csv_reader::{CsvOptions, CsvSourceReader};
pub use excel_reader::{ExcelSourceReader, format_cell};
pub use json_reader::JsonSourceReader;

use crate::{
    error::{ImportError, ImportResult},
    io_utils,
};

pub trait SourceReader {
    /// Whether a call to [`read_data`](SourceReader::read_data) can succeed.
    fn can_read(&self) -> bool;

    fn read_data(&mut self) -> ImportResult<RawTable>;

    /// Short label used in log output.
    fn describe(&self) -> String;
}

/// One source record. `index` is 0-based with the header row excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub index: usize,
    pub cells: Vec<Option<String>>,
}

impl RawRow {
    pub fn get(&self, column: usize) -> Option<&str> {
        self.cells.get(column).and_then(|cell| cell.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    /// Case-insensitive, whitespace-tolerant column lookup.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let wanted = name.trim();
        self.columns
            .iter()
            .position(|column| column.trim().eq_ignore_ascii_case(wanted))
            .or_else(|| {
                let lowered = wanted.to_lowercase();
                self.columns
                    .iter()
                    .position(|column| column.trim().to_lowercase() == lowered)
            })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_values(&self, column: usize) -> impl Iterator<Item = Option<&str>> {
        self.rows.iter().map(move |row| row.get(column))
    }
}

pub fn synthetic_column_name(position: usize) -> String {
    format!("Column{}", position + 1)
}

/// Accumulates rows while folding duplicate header names onto the first
/// occurrence. A later duplicate only fills cells the first occurrence left
/// null.
#[derive(Debug)]
pub(crate) struct TableBuilder {
    columns: Vec<String>,
    targets: Vec<usize>,
    rows: Vec<RawRow>,
}

impl TableBuilder {
    pub(crate) fn with_headers<I>(headers: I) -> Self
    where
        I: IntoIterator<Item = Option<String>>,
    {
        let mut columns: Vec<String> = Vec::new();
        let mut targets = Vec::new();
        for (position, header) in headers.into_iter().enumerate() {
            let name = header
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .unwrap_or_else(|| synthetic_column_name(position));
            let existing = columns
                .iter()
                .position(|column| column.to_lowercase() == name.to_lowercase());
            match existing {
                Some(target) => {
                    debug!("Folding duplicate header '{name}' at position {position} into column {target}");
                    targets.push(target);
                }
                None => {
                    targets.push(columns.len());
                    columns.push(name);
                }
            }
        }
        Self {
            columns,
            targets,
            rows: Vec::new(),
        }
    }

    pub(crate) fn synthetic(width: usize) -> Self {
        Self::with_headers((0..width).map(|_| None))
    }

    pub(crate) fn push_row<I>(&mut self, cells: I)
    where
        I: IntoIterator<Item = Option<String>>,
    {
        let mut row = vec![None; self.columns.len()];
        for (position, cell) in cells.into_iter().enumerate() {
            let Some(&target) = self.targets.get(position) else {
                continue;
            };
            if row[target].is_none() {
                row[target] = cell;
            }
        }
        let index = self.rows.len();
        self.rows.push(RawRow { index, cells: row });
    }

    pub(crate) fn finish(self) -> RawTable {
        RawTable {
            columns: self.columns,
            rows: self.rows,
        }
    }
}

/// Options used by [`open_source`] to configure whichever adapter the file
/// extension selects.
#[derive(Debug, Clone, Default)]
pub struct SourceOptions {
    pub csv: CsvOptions,
    pub sheet: Option<String>,
}

/// Picks a reader by file extension.
pub fn open_source(path: &Path, options: &SourceOptions) -> ImportResult<Box<dyn SourceReader>> {
    let extension = io_utils::extension_of(path);
    match extension.as_str() {
        "csv" | "tsv" | "txt" => {
            let mut csv = options.csv.clone();
            csv.delimiter = Some(io_utils::resolve_input_delimiter(path, csv.delimiter));
            Ok(Box::new(CsvSourceReader::from_path(path, csv)))
        }
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => {
            let mut reader = ExcelSourceReader::new(path);
            if let Some(sheet) = &options.sheet {
                reader = reader.with_sheet(sheet);
            }
            reader = reader
                .with_headers(options.csv.has_headers)
                .empty_as_null(options.csv.empty_as_null);
            Ok(Box::new(reader))
        }
        "json" => Ok(Box::new(JsonSourceReader::from_path(path))),
        other => Err(ImportError::UnsupportedFormat(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(value: &str) -> Option<String> {
        Some(value.to_string())
    }

    #[test]
    fn table_builder_folds_duplicate_headers() {
        let mut builder = TableBuilder::with_headers(
            ["Nombre", "Edad", "nombre", "Ciudad"].map(cell),
        );
        builder.push_row([cell("Ana"), cell("30"), cell("Eva"), cell("Lugo")]);
        builder.push_row([None, cell("41"), cell("Luis"), None]);
        let table = builder.finish();

        assert_eq!(table.columns, vec!["Nombre", "Edad", "Ciudad"]);
        assert_eq!(table.rows[0].get(0), Some("Ana"));
        assert_eq!(table.rows[1].get(0), Some("Luis"));
        assert_eq!(table.rows[1].get(2), None);
    }

    #[test]
    fn table_builder_synthesizes_blank_headers() {
        let builder = TableBuilder::with_headers([cell("id"), None, cell(" ")]);
        let table = builder.finish();
        assert_eq!(table.columns, vec!["id", "Column2", "Column3"]);
    }

    #[test]
    fn table_builder_pads_short_rows() {
        let mut builder = TableBuilder::synthetic(3);
        builder.push_row([cell("a")]);
        let table = builder.finish();
        assert_eq!(table.rows[0].cells, vec![cell("a"), None, None]);
    }

    #[test]
    fn column_index_ignores_case_and_padding() {
        let table = RawTable {
            columns: vec!["Apellidos".into(), "Ciudad".into()],
            rows: Vec::new(),
        };
        assert_eq!(table.column_index(" apellidos"), Some(0));
        assert_eq!(table.column_index("CIUDAD"), Some(1));
        assert_eq!(table.column_index("Apellido"), None);
    }

    #[test]
    fn open_source_rejects_unknown_extension() {
        let result = open_source(Path::new("data.parquet"), &SourceOptions::default());
        assert!(matches!(result, Err(ImportError::UnsupportedFormat(ext)) if ext == "parquet"));
    }
}
