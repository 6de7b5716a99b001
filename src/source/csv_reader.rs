use std::{
    io::Read,
    path::{Path, PathBuf},
};

use csv::{ReaderBuilder, StringRecord, Trim};
use encoding_rs::{Encoding, UTF_8};
use log::{debug, info};

use super::{RawTable, SourceReader, TableBuilder};
use crate::{error::ImportResult, io_utils};

#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// Field separator; `None` resolves from the file extension.
    pub delimiter: Option<u8>,
    pub quote: u8,
    /// Escape character for quotes. When unset, doubled quotes are used.
    pub escape: Option<u8>,
    pub trim: bool,
    pub empty_as_null: bool,
    pub has_headers: bool,
    pub encoding: &'static Encoding,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            quote: b'"',
            escape: None,
            trim: true,
            empty_as_null: true,
            has_headers: true,
            encoding: UTF_8,
        }
    }
}

#[derive(Debug, Clone)]
enum CsvInput {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct CsvSourceReader {
    input: CsvInput,
    options: CsvOptions,
    cached: Option<RawTable>,
}

impl CsvSourceReader {
    pub fn from_path(path: impl AsRef<Path>, options: CsvOptions) -> Self {
        Self {
            input: CsvInput::Path(path.as_ref().to_path_buf()),
            options,
            cached: None,
        }
    }

    /// Buffers an in-memory stream so it can be re-read.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>, options: CsvOptions) -> Self {
        Self {
            input: CsvInput::Bytes(bytes.into()),
            options,
            cached: None,
        }
    }

    /// Drains `reader` up front; the stream is not touched again.
    pub fn from_reader<R: Read>(mut reader: R, options: CsvOptions) -> ImportResult<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(Self::from_bytes(bytes, options))
    }

    pub fn options(&self) -> &CsvOptions {
        &self.options
    }

    fn load_bytes(&self) -> ImportResult<Vec<u8>> {
        match &self.input {
            CsvInput::Path(path) => {
                let mut bytes = Vec::new();
                io_utils::open_input(path)?.read_to_end(&mut bytes)?;
                Ok(bytes)
            }
            CsvInput::Bytes(bytes) => Ok(bytes.clone()),
        }
    }

    fn delimiter(&self) -> u8 {
        match (&self.input, self.options.delimiter) {
            (_, Some(delimiter)) => delimiter,
            (CsvInput::Path(path), None) => io_utils::resolve_input_delimiter(path, None),
            (CsvInput::Bytes(_), None) => io_utils::DEFAULT_CSV_DELIMITER,
        }
    }

    fn parse(&self) -> ImportResult<RawTable> {
        let bytes = self.load_bytes()?;
        let decoded = io_utils::decode_input(std::io::Cursor::new(bytes), self.options.encoding);

        let mut builder = ReaderBuilder::new();
        builder
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter())
            .quote(self.options.quote)
            .trim(if self.options.trim { Trim::All } else { Trim::None });
        if let Some(escape) = self.options.escape {
            builder.escape(Some(escape)).double_quote(false);
        }
        let mut reader = builder.from_reader(decoded);

        let mut records = Vec::new();
        let mut record = StringRecord::new();
        while reader.read_record(&mut record)? {
            records.push(record.clone());
        }

        let mut records = records.into_iter();
        let mut table = if self.options.has_headers {
            match records.next() {
                Some(header) => {
                    TableBuilder::with_headers(header.iter().map(|h| Some(h.to_string())))
                }
                None => TableBuilder::with_headers(std::iter::empty()),
            }
        } else {
            let remaining: Vec<StringRecord> = records.collect();
            let width = remaining.iter().map(StringRecord::len).max().unwrap_or(0);
            let mut table = TableBuilder::synthetic(width);
            for record in &remaining {
                table.push_row(record.iter().map(|cell| self.cell(cell)));
            }
            return Ok(table.finish());
        };

        for record in records {
            table.push_row(record.iter().map(|cell| self.cell(cell)));
        }
        Ok(table.finish())
    }

    fn cell(&self, raw: &str) -> Option<String> {
        if self.options.empty_as_null && raw.trim().is_empty() {
            None
        } else {
            Some(raw.to_string())
        }
    }
}

impl SourceReader for CsvSourceReader {
    fn can_read(&self) -> bool {
        match &self.input {
            CsvInput::Path(path) => self.cached.is_some() || path.is_file(),
            CsvInput::Bytes(_) => true,
        }
    }

    fn read_data(&mut self) -> ImportResult<RawTable> {
        if let Some(table) = &self.cached {
            debug!("Reusing buffered table for {}", self.describe());
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
        match &self.input {
            CsvInput::Path(path) => format!("CSV '{}'", path.display()),
            CsvInput::Bytes(bytes) => format!("CSV buffer ({} bytes)", bytes.len()),
        }
    }
}
