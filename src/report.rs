//! Plain-text and CSV renderings of validation outcomes and converted data.

use std::{borrow::Cow, fmt::Write as _, path::Path};

use crate::{
    error::ImportResult,
    import::DataSource,
    io_utils,
    validation::ValidationResult,
};

/// Left-aligned table with a dashed separator under the header. Embedded
/// line breaks and tabs are flattened; ANSI color sequences take no width.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| visible_width(h).max(1)).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(visible_width(cell));
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", render_line(headers, &widths));
    let rule_widths: Vec<usize> = widths.iter().map(|w| (*w).max(3)).collect();
    let rules: Vec<String> = rule_widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(output, "{}", render_line(&rules, &rule_widths));
    for row in rows {
        let _ = writeln!(output, "{}", render_line(row, &widths));
    }
    output
}

fn render_line(cells: &[String], widths: &[usize]) -> String {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| {
            let flat = flatten(cell);
            let padding = width.saturating_sub(visible_width(&flat));
            format!("{flat}{}", " ".repeat(padding))
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

fn visible_width(text: &str) -> usize {
    let mut width = 0;
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch == '\u{1b}' {
            for next in chars.by_ref() {
                if next == 'm' {
                    break;
                }
            }
        } else {
            width += 1;
        }
    }
    width
}

fn flatten(text: &str) -> Cow<'_, str> {
    if text.contains(['\n', '\r', '\t']) {
        Cow::Owned(text.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(text)
    }
}

/// Failure listing ordered by row, then field order of appearance.
/// `limit` caps the number of failure lines; a trailer reports the rest.
pub fn render_failures(result: &ValidationResult, limit: Option<usize>) -> String {
    if result.is_valid() {
        return "No validation failures.\n".to_string();
    }
    let mut output = String::new();
    for message in result.error_messages() {
        let _ = writeln!(output, "! {message}");
    }
    if !result.error_messages().is_empty() {
        output.push('\n');
    }

    let mut failures: Vec<_> = result.errors().iter().collect();
    failures.sort_by_key(|failure| failure.row_index.map_or(0, |row| row + 1));
    let shown = limit.unwrap_or(failures.len()).min(failures.len());

    let headers = ["row", "field", "kind", "value", "message"]
        .map(String::from)
        .to_vec();
    let rows: Vec<Vec<String>> = failures
        .iter()
        .take(shown)
        .map(|failure| {
            vec![
                failure
                    .row_index
                    .map_or_else(|| "-".to_string(), |row| row.to_string()),
                failure.field_name.clone(),
                failure.kind.to_string(),
                failure.attempted_value.clone().unwrap_or_default(),
                failure.error_message.clone(),
            ]
        })
        .collect();
    output.push_str(&render_table(&headers, &rows));
    if shown < failures.len() {
        let _ = writeln!(output, "... {} more failure(s)", failures.len() - shown);
    }
    output
}

/// Writes the converted rows as CSV to `path`, or stdout when `None`/`-`.
/// Null cells are written empty.
pub fn write_data_source(
    data_source: &DataSource,
    path: Option<&Path>,
    delimiter: u8,
) -> ImportResult<()> {
    let target = path.filter(|p| !io_utils::is_dash(p));
    let mut writer = io_utils::open_csv_writer(target, delimiter)?;
    writer.write_record(data_source.columns())?;
    for row in data_source.rows() {
        writer.write_record(
            row.values
                .iter()
                .map(|value| value.as_ref().map(|v| v.as_display()).unwrap_or_default()),
        )?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{FailureKind, ValidationFailure};

    #[test]
    fn table_aligns_columns_and_ignores_ansi() {
        let headers = vec!["name".to_string(), "age".to_string()];
        let rows = vec![
            vec!["\u{1b}[31mJuan\u{1b}[0m".to_string(), "25".to_string()],
            vec!["Ana\nMaria".to_string(), "7".to_string()],
        ];
        let rendered = render_table(&headers, &rows);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "name       age");
        assert_eq!(lines[1], "---------  ---");
        assert!(lines[2].ends_with("  25"));
        assert_eq!(lines[3], "Ana Maria  7");
    }

    #[test]
    fn failures_are_listed_by_row_with_limit() {
        let mut result = ValidationResult::new();
        result.add_message("Column 'Apellidos' was not found");
        result.add_failure(
            ValidationFailure::new(FailureKind::Conversion, "Edad", "bad number")
                .at_row(2)
                .with_attempted_value("abc"),
        );
        result.add_failure(
            ValidationFailure::new(FailureKind::Required, "Nombre", "missing").at_row(0),
        );
        let rendered = render_failures(&result, Some(1));
        assert!(rendered.starts_with("! Column 'Apellidos' was not found\n"));
        assert!(rendered.contains("0    Nombre  required"));
        assert!(!rendered.contains("bad number"));
        assert!(rendered.contains("... 1 more failure(s)"));

        assert_eq!(
            render_failures(&ValidationResult::new(), None),
            "No validation failures.\n"
        );
    }

    #[test]
    fn export_keeps_fractional_seconds() {
        use crate::{
            field::{FieldDefinition, FieldDefinitionCollection, FieldType},
            import::ImportManager,
            source::{CsvOptions, CsvSourceReader},
        };

        let fields = FieldDefinitionCollection::from_fields([
            FieldDefinition::new("Alta", FieldType::DateTime),
            FieldDefinition::new("Hora", FieldType::Time),
        ])
        .unwrap();
        let mut manager = ImportManager::new();
        manager.set_mapping(fields).unwrap();
        let mut reader = CsvSourceReader::from_bytes(
            "Alta,Hora\n2024-01-01T10:00:00.125,08:30:00.5\n2024-01-02 11:00:00,\n",
            CsvOptions::default(),
        );
        manager.load_data(&mut reader).unwrap();
        assert!(manager.validate_data_types().unwrap());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("typed.csv");
        write_data_source(manager.data_source(), Some(&path), b',').unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "Alta,Hora\n2024-01-01 10:00:00.125,08:30:00.500\n2024-01-02 11:00:00,\n"
        );
    }
}
