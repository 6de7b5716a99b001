//! Typed row projection: a struct declares its field definitions once and
//! builds itself from each validated row.

use crate::{
    error::{ImportError, ImportResult},
    field::FieldDefinitionCollection,
    import::DataRow,
    value::{FromValue, Value},
};

pub trait ImportRecord: Sized {
    fn field_definitions() -> ImportResult<FieldDefinitionCollection>;

    fn from_row(row: &RecordView<'_>) -> ImportResult<Self>;
}

/// Borrowed view of one converted row, addressed by field name.
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    columns: &'a [String],
    row: &'a DataRow,
}

impl<'a> RecordView<'a> {
    pub fn new(columns: &'a [String], row: &'a DataRow) -> Self {
        Self { columns, row }
    }

    pub fn row_index(&self) -> usize {
        self.row.index
    }

    pub fn value(&self, field_name: &str) -> ImportResult<Option<&'a Value>> {
        let position = self
            .columns
            .iter()
            .position(|column| column.eq_ignore_ascii_case(field_name.trim()))
            .ok_or_else(|| ImportError::UnknownField(field_name.to_string()))?;
        Ok(self.row.values.get(position).and_then(Option::as_ref))
    }

    /// `Ok(None)` for a null cell; an error when the cell holds a value that
    /// cannot be read as `T`.
    pub fn get<T: FromValue>(&self, field_name: &str) -> ImportResult<Option<T>> {
        match self.value(field_name)? {
            None => Ok(None),
            Some(value) => T::from_value(value).map(Some).ok_or_else(|| ImportError::Record {
                row: self.row.index,
                message: format!(
                    "field '{field_name}' holds a {} value, expected {}",
                    value.type_name(),
                    T::type_label()
                ),
            }),
        }
    }

    pub fn required<T: FromValue>(&self, field_name: &str) -> ImportResult<T> {
        self.get(field_name)?.ok_or_else(|| ImportError::Record {
            row: self.row.index,
            message: format!("field '{field_name}' is null"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> (Vec<String>, DataRow) {
        (
            vec!["Name".into(), "Edad".into()],
            DataRow {
                index: 3,
                values: vec![Some(Value::from("Juan")), None],
            },
        )
    }

    #[test]
    fn nulls_read_as_none() {
        let (columns, row) = row();
        let view = RecordView::new(&columns, &row);
        assert_eq!(view.get::<String>("name").unwrap().as_deref(), Some("Juan"));
        assert_eq!(view.get::<i64>("Edad").unwrap(), None);
        assert!(matches!(
            view.required::<i64>("Edad"),
            Err(ImportError::Record { row: 3, .. })
        ));
    }

    #[test]
    fn type_mismatch_and_unknown_fields_are_errors() {
        let (columns, row) = row();
        let view = RecordView::new(&columns, &row);
        assert!(matches!(
            view.get::<i64>("Name"),
            Err(ImportError::Record { .. })
        ));
        assert!(matches!(
            view.get::<String>("Ciudad"),
            Err(ImportError::UnknownField(_))
        ));
    }
}
