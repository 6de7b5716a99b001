use std::path::{Path, PathBuf};

use calamine::{Data, Reader, open_workbook_auto};
use chrono::{NaiveDateTime, NaiveTime, TimeDelta};
use log::{debug, info};

use super::{RawTable, SourceReader, TableBuilder};
use crate::{
    error::{ImportError, ImportResult},
    io_utils,
};

const EXCEL_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

#[derive(Debug, Clone)]
pub struct ExcelSourceReader {
    path: PathBuf,
    sheet: Option<String>,
    has_headers: bool,
    empty_as_null: bool,
    cached: Option<RawTable>,
}

impl ExcelSourceReader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            sheet: None,
            has_headers: true,
            empty_as_null: true,
            cached: None,
        }
    }

    /// Selects a worksheet by name; the first sheet is used otherwise.
    pub fn with_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet = Some(sheet.into());
        self
    }

    pub fn with_headers(mut self, has_headers: bool) -> Self {
        self.has_headers = has_headers;
        self
    }

    pub fn empty_as_null(mut self, enabled: bool) -> Self {
        self.empty_as_null = enabled;
        self
    }

    fn parse(&self) -> ImportResult<RawTable> {
        if !self.path.is_file() {
            return Err(ImportError::SourceNotFound(self.path.display().to_string()));
        }
        let extension = io_utils::extension_of(&self.path);
        if !EXCEL_EXTENSIONS.contains(&extension.as_str()) {
            return Err(ImportError::UnsupportedFormat(extension));
        }

        let mut workbook = open_workbook_auto(&self.path)?;
        let sheet_names = workbook.sheet_names();
        let sheet = match &self.sheet {
            Some(wanted) => sheet_names
                .iter()
                .find(|name| name.eq_ignore_ascii_case(wanted))
                .cloned()
                .ok_or_else(|| ImportError::SheetNotFound(wanted.clone()))?,
            None => sheet_names.first().cloned().ok_or(ImportError::EmptyWorkbook)?,
        };
        debug!("Reading worksheet '{sheet}' from {:?}", self.path);
        let range = workbook.worksheet_range(&sheet)?;

        let mut rows = range.rows();
        let mut table = if self.has_headers {
            match rows.next() {
                Some(header) => TableBuilder::with_headers(header.iter().map(format_cell)),
                None => TableBuilder::with_headers(std::iter::empty()),
            }
        } else {
            TableBuilder::synthetic(range.width())
        };
        for row in rows {
            table.push_row(row.iter().map(|cell| self.cell(cell)));
        }
        Ok(table.finish())
    }

    fn cell(&self, cell: &Data) -> Option<String> {
        match (cell, self.empty_as_null) {
            (Data::Empty, false) => Some(String::new()),
            (Data::String(s), false) if s.trim().is_empty() => Some(s.clone()),
            _ => format_cell(cell),
        }
    }
}

/// Renders a worksheet cell to the canonical text handed to converters.
/// Empty and error cells are null.
pub fn format_cell(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Data::Bool(b) => Some(b.to_string()),
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) => Some(format_number(*f)),
        Data::DateTime(excel) => {
            if excel.is_duration() {
                excel.as_duration().map(format_duration)
            } else {
                excel.as_datetime().map(format_datetime)
            }
        }
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.clone()),
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

fn format_datetime(value: NaiveDateTime) -> String {
    if value.time() == NaiveTime::MIN {
        value.format("%Y-%m-%d").to_string()
    } else {
        value.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

fn format_duration(value: TimeDelta) -> String {
    let total = value.num_seconds();
    let sign = if total < 0 { "-" } else { "" };
    let total = total.abs();
    format!(
        "{sign}{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

impl SourceReader for ExcelSourceReader {
    fn can_read(&self) -> bool {
        self.cached.is_some() || self.path.is_file()
    }

    fn read_data(&mut self) -> ImportResult<RawTable> {
        if let Some(table) = &self.cached {
            return Ok(table.clone());
        }
        let table = self.parse()?;
        info!(
            "Read {} row(s) across {} column(s) from {}",
            table.len(),
            table.columns.len(),
            self.describe()
        );
        self.cached = Some(table.clone());
        Ok(table)
    }

    fn describe(&self) -> String {
        match &self.sheet {
            Some(sheet) => format!("workbook '{}' sheet '{sheet}'", self.path.display()),
            None => format!("workbook '{}'", self.path.display()),
        }
    }
}
