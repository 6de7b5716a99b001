pub mod allowed;
pub mod builder;
pub mod cli;
pub mod converter;
pub mod error;
pub mod field;
pub mod import;
pub mod io_utils;
pub mod probe;
pub mod record;
pub mod report;
pub mod rules;
pub mod source;
pub mod validation;
pub mod value;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands, SourceArgs},
    field::FieldDefinitionCollection,
    import::ImportManager,
    source::{CsvOptions, SourceOptions, SourceReader},
};

pub use crate::{
    error::{ImportError, ImportResult},
    field::{FieldDefinition, FieldType},
    record::{ImportRecord, RecordView},
    validation::{FailureKind, ValidationFailure, ValidationResult},
    value::Value,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("tabular_import", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Probe(args) => handle_probe(&args),
        Commands::Validate(args) => handle_validate(&args),
    }
}

fn open_reader(args: &SourceArgs) -> Result<Box<dyn SourceReader>> {
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())
        .with_context(|| format!("Resolving encoding for {:?}", args.input))?;
    let options = SourceOptions {
        csv: CsvOptions {
            delimiter: args.delimiter,
            has_headers: !args.no_header,
            encoding,
            ..CsvOptions::default()
        },
        sheet: args.sheet.clone(),
    };
    source::open_source(&args.input, &options)
        .with_context(|| format!("Opening source {:?}", args.input))
}

fn handle_probe(args: &cli::ProbeArgs) -> Result<()> {
    info!(
        "Probing '{}' with delimiter '{}'",
        args.source.input.display(),
        printable_delimiter(io_utils::resolve_input_delimiter(
            &args.source.input,
            args.source.delimiter
        ))
    );
    let mut reader = open_reader(&args.source)?;
    let table = reader
        .read_data()
        .with_context(|| format!("Reading {:?}", args.source.input))?;
    let fields = probe::infer_field_definitions(&table, args.sample_rows)
        .with_context(|| format!("Inferring fields from {:?}", args.source.input))?;
    fields
        .save(&args.output)
        .with_context(|| format!("Writing field definitions to {:?}", args.output))?;

    let rows: Vec<Vec<String>> = fields
        .iter()
        .map(|field| {
            vec![
                field.field_name().to_string(),
                field.mapped_name().to_string(),
                field.field_type().to_string(),
                field.allow_null().to_string(),
            ]
        })
        .collect();
    let headers = ["field", "source", "type", "nullable"].map(String::from).to_vec();
    print!("{}", report::render_table(&headers, &rows));
    info!(
        "Inferred {} field(s) written to {:?}",
        fields.len(),
        args.output
    );
    Ok(())
}

fn handle_validate(args: &cli::ValidateArgs) -> Result<()> {
    let fields = FieldDefinitionCollection::load(&args.fields)
        .with_context(|| format!("Loading field definitions from {:?}", args.fields))?;
    let mut manager = ImportManager::new();
    manager
        .set_mapping(fields)
        .context("Resolving converters for field definitions")?;
    for (field, column) in &args.remap {
        debug!("Remapping '{field}' to column '{column}'");
        manager
            .remap(field, column)
            .with_context(|| format!("Remapping field '{field}' to '{column}'"))?;
    }

    let mut reader = open_reader(&args.source)?;
    manager
        .load_data(reader.as_mut())
        .with_context(|| format!("Loading {:?}", args.source.input))?;
    let is_valid = manager.validate_data_types()?;

    if let Some(output) = &args.output {
        report::write_data_source(
            manager.data_source(),
            Some(output.as_path()),
            args.output_delimiter.unwrap_or(io_utils::DEFAULT_CSV_DELIMITER),
        )
        .with_context(|| format!("Writing converted rows to {output:?}"))?;
    }

    let limit = (args.max_errors > 0).then_some(args.max_errors);
    let rendered = report::render_failures(manager.validation_result(), limit);
    if args.output.as_deref().is_some_and(io_utils::is_dash) {
        eprint!("{rendered}");
    } else {
        print!("{rendered}");
    }

    if !is_valid {
        bail!(
            "Validation failed for {:?}: {} failure(s) across {} row(s)",
            args.source.input,
            manager.validation_result().errors().len(),
            manager.validation_result().failing_rows().len()
        );
    }
    info!(
        "Validated {} row(s) from {:?} against {} field(s)",
        manager.data_source().len(),
        args.source.input,
        manager.fields().len()
    );
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
