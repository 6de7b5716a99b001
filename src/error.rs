//! Fatal error taxonomy for the import pipeline.
//!
//! Anything in this enum aborts the current operation. Per-cell problems
//! (conversion failures, required or unique violations, rule failures) are
//! never reported through [`ImportError`]; they accumulate in
//! [`ValidationResult`](crate::validation::ValidationResult) instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Source file not found: {0}")]
    SourceNotFound(String),

    #[error("Unsupported source format '{0}' (expected .csv, .tsv, .txt, .xlsx, .xlsm, .xlsb, .xls, .ods or .json)")]
    UnsupportedFormat(String),

    #[error("Worksheet '{0}' not found in workbook")]
    SheetNotFound(String),

    #[error("Workbook contains no worksheets")]
    EmptyWorkbook,

    #[error("Source cannot be read: {0}")]
    SourceUnavailable(String),

    #[error("Unknown encoding '{0}'")]
    UnknownEncoding(String),

    #[error("CSV read failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Excel read failed: {0}")]
    Excel(#[from] calamine::Error),

    #[error("JSON read failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML field definitions invalid: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Duplicate field name '{0}' in field definitions")]
    DuplicateField(String),

    #[error("Unknown field '{0}'")]
    UnknownField(String),

    #[error("No converter registered for type '{0}'")]
    UnregisteredType(String),

    #[error("Invalid rule for field '{field}': {message}")]
    InvalidRule { field: String, message: String },

    #[error("Invalid field definition: {0}")]
    InvalidDefinition(String),

    #[error("No field mapping has been set; call set_mapping first")]
    NotMapped,

    #[error("No data has been loaded; call load_data first")]
    NotLoaded,

    #[error("Row {row}: cannot build record: {message}")]
    Record { row: usize, message: String },
}

pub type ImportResult<T> = Result<T, ImportError>;
