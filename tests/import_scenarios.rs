mod common;

use common::{TestWorkspace, fixture_path, minimal_fields, people_fields};
use tabular_import::{
    FailureKind, ImportError, ImportRecord, ImportResult, RecordView, Value,
    allowed::AllowedStrings,
    converter::ConverterRegistry,
    field::{FieldDefinition, FieldDefinitionCollection, FieldType},
    import::{ImportManager, SessionState},
    source::{
        CsvOptions, CsvSourceReader, ExcelSourceReader, JsonSourceReader, SourceOptions,
        SourceReader, open_source,
    },
};

fn csv(name: &str) -> CsvSourceReader {
    CsvSourceReader::from_path(fixture_path(name), CsvOptions::default())
}

fn loaded(fields: FieldDefinitionCollection, reader: &mut dyn SourceReader) -> ImportManager {
    let mut manager = ImportManager::new();
    manager.set_mapping(fields).expect("set mapping");
    manager.load_data(reader).expect("load data");
    manager
}

#[test]
fn basic_csv_loads_four_typed_rows() {
    let mut manager = loaded(people_fields(), &mut csv("basic.csv"));
    assert!(manager.validate_data_types().expect("validate"));

    let data = manager.data_source();
    assert_eq!(data.len(), 4);
    assert_eq!(data.columns(), ["Name", "SecondName", "Age", "City"]);
    assert_eq!(data.column_types()[2], FieldType::Integer);
    assert_eq!(data.get(0, "Age"), Some(&Value::Integer(25)));
    assert_eq!(manager.field_value::<String>(3, "Name").as_deref(), Some("Lucia"));
    let ages: Vec<i64> = data
        .column_values("Age")
        .expect("age column")
        .flatten()
        .filter_map(|value| match value {
            Value::Integer(age) => Some(*age),
            _ => None,
        })
        .collect();
    assert_eq!(ages, vec![25, 30, 45, 38]);
}

#[test]
fn empty_cells_yield_one_failure_per_cell() {
    let mut manager = loaded(people_fields(), &mut csv("empty_cells.csv"));
    assert!(!manager.validate_data_types().expect("validate"));

    let result = manager.validation_result();
    assert_eq!(result.errors().len(), 2);
    assert_eq!(result.failing_rows(), vec![1, 3]);

    let missing_surname: Vec<_> = result.errors_for_row(1).collect();
    assert_eq!(missing_surname.len(), 1);
    assert_eq!(missing_surname[0].kind, FailureKind::Required);
    assert_eq!(missing_surname[0].field_name, "SecondName");

    let missing_age: Vec<_> = result.errors_for_row(3).collect();
    assert_eq!(missing_age.len(), 1);
    assert_eq!(missing_age[0].kind, FailureKind::Conversion);
    assert_eq!(missing_age[0].field_name, "Age");
    assert_eq!(manager.data_source().get(3, "Age"), None);
}

#[test]
fn nullable_field_accepts_empty_cell() {
    let mut fields = people_fields();
    let age = fields.get_mut("Age").expect("age field");
    age.set_allow_null(true);
    age.clear_rules();
    let mut manager = loaded(fields, &mut csv("empty_cells.csv"));
    manager.validate_data_types().expect("validate");

    assert_eq!(manager.data_source().get(3, "Age"), None);
    assert_eq!(manager.validation_result().errors_for_field("Age").count(), 0);
}

#[test]
fn duplicate_headers_fold_into_first_occurrence() {
    let mut reader = csv("duplicate_headers.csv");
    let table = reader.read_data().expect("read");
    assert_eq!(table.columns, vec!["Nombre", "Edad", "Ciudad"]);

    let mut manager = loaded(minimal_fields(), &mut reader);
    assert!(manager.validate_data_types().expect("validate"));
    let data = manager.data_source();
    assert_eq!(data.get(0, "Nombre"), Some(&Value::from("Juan")));
    assert_eq!(data.get(0, "Edad"), Some(&Value::Integer(25)));
    assert_eq!(data.get(0, "Ciudad"), Some(&Value::from("Madrid")));
    assert_eq!(data.get(1, "Nombre"), Some(&Value::from("Maria")));
    assert_eq!(data.get(2, "Edad"), Some(&Value::Integer(45)));
    assert_eq!(data.get(2, "Ciudad"), Some(&Value::from("Valencia")));
}

#[test]
fn remapping_recovers_from_renamed_header() {
    let mut reader = csv("apellidos.csv");
    let mut manager = loaded(people_fields(), &mut reader);
    assert!(!manager.validate_data_types().expect("validate"));
    let result = manager.validation_result();
    assert_eq!(result.count_by_kind(FailureKind::Mapping), 1);
    assert!(result.error_messages()[0].contains("did you mean 'Apellidos'?"));

    manager.remap("SecondName", "Apellidos").expect("remap");
    assert_eq!(manager.state(), SessionState::Mapped);
    manager.load_data(&mut reader).expect("reload");
    assert!(manager.validate_data_types().expect("validate after remap"));
    assert_eq!(
        manager.field_value::<String>(0, "SecondName").as_deref(),
        Some("Perez")
    );
}

#[test]
fn remapped_collection_leaves_original_untouched() {
    let original = people_fields();
    let fixed = original.remapped("SecondName", "Apellidos").expect("remapped");
    assert_eq!(original["SecondName"].mapped_name(), "Apellido");

    let mut manager = loaded(fixed, &mut csv("apellidos.csv"));
    assert!(manager.validate_data_types().expect("validate"));
}

#[test]
fn validating_twice_reports_identical_failures() {
    let mut manager = loaded(people_fields(), &mut csv("empty_cells.csv"));
    manager.validate_data_types().expect("first pass");
    let first = manager.validation_result().clone();
    let first_data = manager.data_source().clone();
    manager.validate_data_types().expect("second pass");
    assert_eq!(manager.validation_result(), &first);
    assert_eq!(manager.data_source(), &first_data);
}

#[test]
fn unique_fields_flag_every_repeat() {
    let workspace = TestWorkspace::new();
    let path = workspace.write(
        "codes.csv",
        "Id,Code\n1,A1\n2,b2\n3,A1\n4,\n5,A1\n6,B2\n",
    );
    let fields = FieldDefinitionCollection::from_fields([
        FieldDefinition::new("Id", FieldType::Integer).unique(true),
        FieldDefinition::new("Code", FieldType::String).unique(true),
    ])
    .expect("fields");
    let mut manager = loaded(
        fields,
        &mut CsvSourceReader::from_path(&path, CsvOptions::default()),
    );
    assert!(!manager.validate_data_types().expect("validate"));

    let unique: Vec<_> = manager
        .validation_result()
        .errors()
        .iter()
        .filter(|failure| failure.kind == FailureKind::Unique)
        .map(|failure| (failure.field_name.as_str(), failure.row_index))
        .collect();
    assert_eq!(unique, vec![("Code", Some(2)), ("Code", Some(4))]);
}

#[test]
fn tsv_extension_selects_tab_separator() {
    let mut reader =
        open_source(&fixture_path("people.tsv"), &SourceOptions::default()).expect("open");
    let mut manager = loaded(people_fields(), reader.as_mut());
    assert!(manager.validate_data_types().expect("validate"));
    assert_eq!(manager.data_source().len(), 2);
}

#[test]
fn json_payload_maps_like_csv() {
    let mut reader = JsonSourceReader::from_path(fixture_path("people.json"));
    let mut manager = loaded(people_fields(), &mut reader);
    assert!(!manager.validate_data_types().expect("validate"));

    let result = manager.validation_result();
    assert_eq!(result.errors().len(), 1);
    assert_eq!(result.errors()[0].kind, FailureKind::Required);
    assert_eq!(result.errors()[0].row_index, Some(2));
    assert_eq!(manager.field_value::<i64>(1, "Age"), Some(30));
}

#[test]
fn excel_workbook_reads_named_sheet() {
    let path = fixture_path("people.xlsx");
    let mut reader = ExcelSourceReader::new(&path).with_sheet("personas");
    let mut manager = loaded(people_fields(), &mut reader);
    assert!(manager.validate_data_types().expect("validate"));
    assert_eq!(manager.data_source().len(), 3);
    assert_eq!(manager.field_value::<i64>(2, "Age"), Some(45));

    let mut missing = ExcelSourceReader::new(&path).with_sheet("Hoja2");
    assert!(matches!(
        missing.read_data(),
        Err(ImportError::SheetNotFound(sheet)) if sheet == "Hoja2"
    ));
}

#[test]
fn missing_source_is_reported_before_loading() {
    let mut manager = ImportManager::new();
    manager.set_mapping(people_fields()).expect("mapping");
    let mut reader = csv("does_not_exist.csv");
    assert!(matches!(
        manager.load_data(&mut reader),
        Err(ImportError::SourceNotFound(path)) if path.ends_with("does_not_exist.csv")
    ));
    assert_eq!(manager.data_source().len(), 0);
    assert!(matches!(
        open_source(&fixture_path("people.parquet"), &SourceOptions::default()),
        Err(ImportError::UnsupportedFormat(ext)) if ext == "parquet"
    ));
}

#[test]
fn custom_converter_resolves_registered_tag() {
    let city_code = FieldType::Custom("city_code".into());
    let mut registry = ConverterRegistry::with_defaults();
    registry.register_fn(city_code.clone(), |input| {
        match input.to_lowercase().as_str() {
            "madrid" => Ok(Value::from("MAD")),
            "sevilla" => Ok(Value::from("SVQ")),
            _ => Err(format!("'{input}' has no city code")),
        }
    });
    let fields = FieldDefinitionCollection::from_fields([
        FieldDefinition::new("Code", city_code).mapped_from("Ciudad"),
    ])
    .expect("fields");

    let mut manager = ImportManager::with_registry(registry);
    manager.set_mapping(fields).expect("mapping");
    manager.load_data(&mut csv("basic.csv")).expect("load");
    assert!(!manager.validate_data_types().expect("validate"));
    assert_eq!(manager.field_value::<String>(1, "Code").as_deref(), Some("SVQ"));
    assert_eq!(
        manager.validation_result().count_by_kind(FailureKind::Conversion),
        2
    );
}

#[test]
fn builder_rules_and_allowed_values_report_separately() {
    let mut age = FieldDefinition::new("Edad", FieldType::Integer);
    age.rules()
        .greater_than(26)
        .must_with_message::<i64, _>(|age| age % 5 == 0, "age must be a multiple of 5");
    let city = FieldDefinition::new("Ciudad", FieldType::String)
        .with_allowed_values(AllowedStrings::new(["madrid", "sevilla"]));
    let fields = FieldDefinitionCollection::from_fields([age, city]).expect("fields");

    let mut manager = loaded(fields, &mut csv("basic.csv"));
    assert!(!manager.validate_data_types().expect("validate"));
    let result = manager.validation_result();
    // 25 is not greater than 26; 38 is not a multiple of 5.
    assert_eq!(result.count_by_kind(FailureKind::Rule), 2);
    assert_eq!(result.count_by_kind(FailureKind::AllowedValue), 2);
    assert_eq!(result.failing_rows(), vec![0, 2, 3]);
}

#[derive(Debug, PartialEq)]
struct Person {
    name: String,
    surname: Option<String>,
    age: i64,
}

impl ImportRecord for Person {
    fn field_definitions() -> ImportResult<FieldDefinitionCollection> {
        let mut age = FieldDefinition::new("Age", FieldType::Integer)
            .mapped_from("Edad")
            .nullable(false);
        age.rules().greater_than_or_equal(0);
        FieldDefinitionCollection::from_fields([
            FieldDefinition::new("Name", FieldType::String)
                .mapped_from("Nombre")
                .required(true),
            FieldDefinition::new("Surname", FieldType::String).mapped_from("Apellido"),
            age,
        ])
    }

    fn from_row(row: &RecordView<'_>) -> ImportResult<Self> {
        Ok(Self {
            name: row.required("Name")?,
            surname: row.get("Surname")?,
            age: row.required("Age")?,
        })
    }
}

#[test]
fn records_project_rows_into_structs() {
    let mut manager = ImportManager::for_record::<Person>().expect("record mapping");
    assert!(matches!(
        manager.records::<Person>(),
        Err(ImportError::NotLoaded)
    ));
    manager.load_data(&mut csv("basic.csv")).expect("load");
    assert!(manager.validate_data_types().expect("validate"));

    let people = manager.records::<Person>().expect("records");
    assert_eq!(people.len(), 4);
    assert_eq!(
        people[0],
        Person {
            name: "Juan".into(),
            surname: Some("Perez".into()),
            age: 25,
        }
    );
}

#[test]
fn records_fail_on_rows_with_missing_required_values() {
    let mut manager = ImportManager::for_record::<Person>().expect("record mapping");
    manager.load_data(&mut csv("empty_cells.csv")).expect("load");
    assert!(!manager.validate_data_types().expect("validate"));
    assert!(matches!(
        manager.records::<Person>(),
        Err(ImportError::Record { row: 3, .. })
    ));
}
