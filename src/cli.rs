use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Import CSV, Excel and JSON sources into typed, validated tables",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Inspect a source and write proposed field definitions as YAML
    Probe(ProbeArgs),
    /// Load a source through field definitions and report validation failures
    Validate(ValidateArgs),
}

/// Options shared by every command that reads a source.
#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Source file (.csv, .tsv, .txt, .xlsx, .xlsm, .xlsb, .xls, .ods, .json)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Worksheet to read from a workbook (defaults to the first sheet)
    #[arg(long)]
    pub sheet: Option<String>,
    /// Character encoding of CSV input (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Treat the first row as data and name columns Column1..ColumnN
    #[arg(long = "no-header")]
    pub no_header: bool,
}

#[derive(Debug, Args)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// Destination YAML field-definition file
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
    /// Number of rows to sample when inferring types (0 means full scan)
    #[arg(long, default_value_t = 2000)]
    pub sample_rows: usize,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// YAML field-definition file
    #[arg(short = 'f', long = "fields")]
    pub fields: PathBuf,
    /// Point a field at a different source column (FIELD=COLUMN, repeatable)
    #[arg(long = "remap", value_parser = parse_remap)]
    pub remap: Vec<(String, String)>,
    /// Write the converted rows as CSV ('-' for stdout)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Delimiter for the converted output (defaults to ',')
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
    /// Maximum number of failures to print (0 prints all)
    #[arg(long = "max-errors", default_value_t = 50)]
    pub max_errors: usize,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

pub fn parse_remap(value: &str) -> Result<(String, String), String> {
    let (field, column) = value
        .split_once('=')
        .ok_or_else(|| format!("Remap '{value}' must look like FIELD=COLUMN"))?;
    let (field, column) = (field.trim(), column.trim());
    if field.is_empty() || column.is_empty() {
        return Err(format!("Remap '{value}' needs both a field and a column"));
    }
    Ok((field.to_string(), column.to_string()))
}
