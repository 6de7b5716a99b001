//! Low-level file helpers shared by the source readers and the report writer.
//!
//! - **Delimiter resolution**: extension-based detection (`.tsv` → tab,
//!   everything else → comma) with manual override.
//! - **Encoding**: input decoding through `encoding_rs_io`, defaulting to UTF-8.
//! - **stdout**: the `-` path convention routes CSV output to standard output.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};
use encoding_rs_io::DecodeReaderBytesBuilder;

use crate::error::{ImportError, ImportResult};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

pub fn resolve_encoding(label: Option<&str>) -> ImportResult<&'static Encoding> {
    match label.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => Encoding::for_label(value.as_bytes())
            .ok_or_else(|| ImportError::UnknownEncoding(value.to_string())),
        None => Ok(UTF_8),
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match extension_of(path).as_str() {
        "tsv" => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

/// Opens `path` for reading, failing with [`ImportError::SourceNotFound`]
/// before any byte is consumed when the file is absent.
pub fn open_input(path: &Path) -> ImportResult<BufReader<File>> {
    if !path.is_file() {
        return Err(ImportError::SourceNotFound(path.display().to_string()));
    }
    Ok(BufReader::new(File::open(path)?))
}

/// Wraps `reader` so that it yields UTF-8 regardless of the source encoding.
/// A byte-order mark, when present, overrides `encoding`.
pub fn decode_input<R>(reader: R, encoding: &'static Encoding) -> Box<dyn Read>
where
    R: Read + 'static,
{
    Box::new(
        DecodeReaderBytesBuilder::new()
            .encoding(Some(encoding))
            .bom_override(true)
            .build(reader),
    )
}

pub fn open_csv_writer(path: Option<&Path>, delimiter: u8) -> ImportResult<csv::Writer<Box<dyn Write>>> {
    let base: Box<dyn Write> = match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(File::create(p)?)),
        _ => Box::new(std::io::stdout()),
    };
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    Ok(builder.from_writer(base))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tsv_extension_selects_tab() {
        assert_eq!(resolve_input_delimiter(Path::new("people.TSV"), None), b'\t');
        assert_eq!(resolve_input_delimiter(Path::new("people.csv"), None), b',');
        assert_eq!(resolve_input_delimiter(Path::new("people.tsv"), Some(b';')), b';');
    }

    #[test]
    fn resolve_encoding_rejects_unknown_labels() {
        assert_eq!(resolve_encoding(None).unwrap(), UTF_8);
        assert_eq!(
            resolve_encoding(Some("latin1")).unwrap().name(),
            "windows-1252"
        );
        assert!(matches!(
            resolve_encoding(Some("klingon")),
            Err(ImportError::UnknownEncoding(_))
        ));
    }

    #[test]
    fn decode_input_transcodes_windows_1252() {
        let bytes: &'static [u8] = b"Nombre\nJos\xe9\n";
        let mut reader = decode_input(bytes, encoding_rs::WINDOWS_1252);
        let mut text = String::new();
        reader.read_to_string(&mut text).unwrap();
        assert_eq!(text, "Nombre\nJosé\n");
    }

    #[test]
    fn open_input_reports_missing_file() {
        let err = open_input(Path::new("definitely/missing.csv")).unwrap_err();
        assert!(matches!(err, ImportError::SourceNotFound(_)));
    }
}
