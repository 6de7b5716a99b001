//! Field definitions: what each destination column is called, where it comes
//! from in the source, what type it holds and how it is validated.
//!
//! ## Responsibilities
//!
//! - [`FieldType`] semantic type tags, including user-registered custom tags
//! - [`FieldDefinition`] per-field metadata, converter override and rules
//! - [`FieldDefinitionCollection`] ordered, name-keyed registry with the
//!   re-mapping operations used by the "fix the header and retry" workflow
//! - YAML persistence of declarative field definitions via `serde_yaml`

use std::{
    fmt,
    fs::File,
    io::BufReader,
    ops::Index,
    path::Path,
    str::FromStr,
    sync::Arc,
};

use log::{debug, warn};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::{
    allowed::AllowedValues,
    builder::ImportRuleBuilder,
    converter::{ConverterRegistry, TypeConverter},
    error::{ImportError, ImportResult},
    rules::{ImportRule, RuleSpec},
};

pub const CURRENT_DEFINITION_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Integer,
    Float,
    Decimal,
    Boolean,
    Date,
    DateTime,
    Time,
    Guid,
    /// A tag resolved through a converter registered at runtime.
    Custom(String),
}

impl FieldType {
    pub fn as_str(&self) -> &str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Decimal => "decimal",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::DateTime => "datetime",
            FieldType::Time => "time",
            FieldType::Guid => "guid",
            FieldType::Custom(name) => name,
        }
    }

    pub fn builtins() -> &'static [FieldType] {
        &[
            FieldType::String,
            FieldType::Integer,
            FieldType::Float,
            FieldType::Decimal,
            FieldType::Boolean,
            FieldType::Date,
            FieldType::DateTime,
            FieldType::Time,
            FieldType::Guid,
        ]
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Float | FieldType::Decimal)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = ImportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ImportError::InvalidDefinition(
                "field type cannot be empty".to_string(),
            ));
        }
        Ok(match trimmed.to_ascii_lowercase().as_str() {
            "string" | "text" => FieldType::String,
            "integer" | "int" | "long" => FieldType::Integer,
            "float" | "double" => FieldType::Float,
            "decimal" | "money" => FieldType::Decimal,
            "boolean" | "bool" => FieldType::Boolean,
            "date" => FieldType::Date,
            "datetime" | "date-time" | "timestamp" => FieldType::DateTime,
            "time" | "timespan" => FieldType::Time,
            "guid" | "uuid" => FieldType::Guid,
            _ => FieldType::Custom(trimmed.to_string()),
        })
    }
}

impl Serialize for FieldType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        FieldType::from_str(&token).map_err(de::Error::custom)
    }
}

/// One destination column.
///
/// `field_name` never changes after construction. `mapped_name` (the source
/// column to read) may be reassigned to correct a mapping before reloading.
/// Changing the field type drops any converter override that no longer
/// matches, so the converter in use always agrees with the field type.
#[derive(Debug, Clone)]
pub struct FieldDefinition {
    field_name: String,
    display_name: Option<String>,
    description: Option<String>,
    mapped_name: String,
    field_type: FieldType,
    allow_null: bool,
    is_required: bool,
    is_unique: bool,
    converter: Option<Arc<dyn TypeConverter>>,
    rules: Vec<Arc<dyn ImportRule>>,
    /// Declarative rules with their position in `rules`.
    rule_specs: Vec<(usize, RuleSpec)>,
    /// Registry the declarative rules resolved their literals against.
    rule_registry: Option<ConverterRegistry>,
    allowed_values: Option<AllowedValues>,
}

impl FieldDefinition {
    pub fn new(field_name: impl Into<String>, field_type: FieldType) -> Self {
        let field_name = field_name.into();
        Self {
            mapped_name: field_name.clone(),
            field_name,
            display_name: None,
            description: None,
            field_type,
            allow_null: true,
            is_required: false,
            is_unique: false,
            converter: None,
            rules: Vec::new(),
            rule_specs: Vec::new(),
            rule_registry: None,
            allowed_values: None,
        }
    }

    pub fn mapped_from(mut self, source_column: impl Into<String>) -> Self {
        self.mapped_name = source_column.into();
        self
    }

    pub fn nullable(mut self, allow_null: bool) -> Self {
        self.allow_null = allow_null;
        self
    }

    pub fn required(mut self, is_required: bool) -> Self {
        self.is_required = is_required;
        self
    }

    pub fn unique(mut self, is_unique: bool) -> Self {
        self.is_unique = is_unique;
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_rule<R>(mut self, rule: R) -> Self
    where
        R: ImportRule + 'static,
    {
        self.rules.push(Arc::new(rule));
        self
    }

    pub fn with_allowed_values(mut self, allowed: impl Into<AllowedValues>) -> Self {
        self.allowed_values = Some(allowed.into());
        self
    }

    /// Overrides the registry converter for this field. The field type is
    /// taken from the converter.
    pub fn with_converter(mut self, converter: Arc<dyn TypeConverter>) -> Self {
        self.field_type = converter.field_type().clone();
        self.converter = Some(converter);
        self
    }

    /// Fluent rule composition; see [`ImportRuleBuilder`].
    pub fn rules(&mut self) -> ImportRuleBuilder<'_> {
        ImportRuleBuilder::new(self)
    }

    pub fn add_rule(&mut self, rule: Arc<dyn ImportRule>) {
        self.rules.push(rule);
    }

    pub fn clear_rules(&mut self) {
        self.rules.clear();
        self.rule_specs.clear();
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.field_name)
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn mapped_name(&self) -> &str {
        &self.mapped_name
    }

    pub fn set_mapped_name(&mut self, source_column: impl Into<String>) {
        self.mapped_name = source_column.into();
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    pub fn set_field_type(&mut self, field_type: FieldType) {
        if self
            .converter
            .as_ref()
            .is_some_and(|converter| converter.field_type() != &field_type)
        {
            debug!(
                "Dropping converter override for '{}' after type change to {field_type}",
                self.field_name
            );
            self.converter = None;
        }
        let changed = self.field_type != field_type;
        self.field_type = field_type;
        if changed {
            self.rebind_rule_literals();
        }
    }

    /// Rebuilds declarative rules whose thresholds depend on the field type.
    fn rebind_rule_literals(&mut self) {
        let Some(registry) = &self.rule_registry else {
            return;
        };
        for (position, spec) in &self.rule_specs {
            if !spec.depends_on_field_type() {
                continue;
            }
            match spec.build(&self.field_name, &self.field_type, registry) {
                Ok(rule) => self.rules[*position] = rule,
                Err(err) => warn!(
                    "Keeping previous '{}' rule for '{}': {err}",
                    self.rules[*position].describe(),
                    self.field_name
                ),
            }
        }
    }

    pub fn allow_null(&self) -> bool {
        self.allow_null
    }

    pub fn set_allow_null(&mut self, allow_null: bool) {
        self.allow_null = allow_null;
    }

    pub fn is_required(&self) -> bool {
        self.is_required
    }

    pub fn set_required(&mut self, is_required: bool) {
        self.is_required = is_required;
    }

    pub fn is_unique(&self) -> bool {
        self.is_unique
    }

    pub fn set_unique(&mut self, is_unique: bool) {
        self.is_unique = is_unique;
    }

    pub fn validation_rules(&self) -> &[Arc<dyn ImportRule>] {
        &self.rules
    }

    pub fn allowed_values(&self) -> Option<&AllowedValues> {
        self.allowed_values.as_ref()
    }

    pub fn set_allowed_values(&mut self, allowed: Option<AllowedValues>) {
        self.allowed_values = allowed;
    }

    pub fn converter_override(&self) -> Option<&Arc<dyn TypeConverter>> {
        self.converter.as_ref()
    }

    /// The converter for the current field type: the override when set,
    /// otherwise the registry's converter honoring `allow_null`.
    pub fn resolve_converter(
        &self,
        registry: &ConverterRegistry,
    ) -> ImportResult<Arc<dyn TypeConverter>> {
        match &self.converter {
            Some(converter) => Ok(Arc::clone(converter)),
            None => registry.resolve(&self.field_type, self.allow_null),
        }
    }

    pub fn from_spec(spec: &FieldSpec, registry: &ConverterRegistry) -> ImportResult<Self> {
        let name = spec.name.trim();
        if name.is_empty() {
            return Err(ImportError::InvalidDefinition(
                "field name cannot be empty".to_string(),
            ));
        }
        let mut field = FieldDefinition::new(name, spec.field_type.clone())
            .nullable(spec.allow_null)
            .required(spec.required)
            .unique(spec.unique);
        if let Some(source) = spec.source.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            field.mapped_name = source.to_string();
        }
        field.display_name = spec.display_name.clone();
        field.description = spec.description.clone();
        field.allowed_values = spec.allowed.clone();
        for rule in &spec.rules {
            field.rule_specs.push((field.rules.len(), rule.clone()));
            field
                .rules
                .push(rule.build(name, &spec.field_type, registry)?);
        }
        if !spec.rules.is_empty() {
            field.rule_registry = Some(registry.clone());
        }
        Ok(field)
    }

    /// Declarative form of this field. Rules attached programmatically have
    /// no declarative form and are left out.
    pub fn to_spec(&self) -> FieldSpec {
        FieldSpec {
            name: self.field_name.clone(),
            display_name: self.display_name.clone(),
            description: self.description.clone(),
            source: (self.mapped_name != self.field_name).then(|| self.mapped_name.clone()),
            field_type: self.field_type.clone(),
            allow_null: self.allow_null,
            required: self.is_required,
            unique: self.is_unique,
            rules: self.rule_specs.iter().map(|(_, spec)| spec.clone()).collect(),
            allowed: self.allowed_values.clone(),
        }
    }
}

const fn default_allow_null() -> bool {
    true
}

fn default_field_type() -> FieldType {
    FieldType::String
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, alias = "mapped_name", skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(rename = "type", default = "default_field_type")]
    pub field_type: FieldType,
    #[serde(default = "default_allow_null")]
    pub allow_null: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RuleSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<AllowedValues>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FieldDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    fields: Vec<FieldSpec>,
}

/// Ordered, name-keyed set of field definitions. Insertion order is the
/// output column order; names are unique, compared case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct FieldDefinitionCollection {
    fields: Vec<FieldDefinition>,
}

impl FieldDefinitionCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: FieldDefinition) -> ImportResult<()> {
        if self.position(field.field_name()).is_some() {
            return Err(ImportError::DuplicateField(field.field_name().to_string()));
        }
        self.fields.push(field);
        Ok(())
    }

    pub fn add_range<I>(&mut self, fields: I) -> ImportResult<()>
    where
        I: IntoIterator<Item = FieldDefinition>,
    {
        for field in fields {
            self.add(field)?;
        }
        Ok(())
    }

    pub fn from_fields<I>(fields: I) -> ImportResult<Self>
    where
        I: IntoIterator<Item = FieldDefinition>,
    {
        let mut collection = Self::new();
        collection.add_range(fields)?;
        Ok(collection)
    }

    pub fn position(&self, field_name: &str) -> Option<usize> {
        let wanted = field_name.trim();
        self.fields
            .iter()
            .position(|field| field.field_name().eq_ignore_ascii_case(wanted))
    }

    pub fn get(&self, field_name: &str) -> Option<&FieldDefinition> {
        self.position(field_name).map(|idx| &self.fields[idx])
    }

    pub fn get_mut(&mut self, field_name: &str) -> Option<&mut FieldDefinition> {
        self.position(field_name).map(|idx| &mut self.fields[idx])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldDefinition> {
        self.fields.iter()
    }

    pub fn as_slice(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields
            .iter()
            .map(|field| field.field_name().to_string())
            .collect()
    }

    /// Points `field_name` at a different source column, in place.
    pub fn remap(&mut self, field_name: &str, source_column: &str) -> ImportResult<()> {
        let source_column = source_column.trim();
        if source_column.is_empty() {
            return Err(ImportError::InvalidDefinition(format!(
                "source column for '{field_name}' cannot be empty"
            )));
        }
        let field = self
            .get_mut(field_name)
            .ok_or_else(|| ImportError::UnknownField(field_name.to_string()))?;
        debug!(
            "Remapping field '{}' from '{}' to '{source_column}'",
            field.field_name(),
            field.mapped_name()
        );
        field.set_mapped_name(source_column);
        Ok(())
    }

    /// Same as [`remap`](Self::remap) but leaves `self` untouched.
    pub fn remapped(&self, field_name: &str, source_column: &str) -> ImportResult<Self> {
        let mut copy = self.clone();
        copy.remap(field_name, source_column)?;
        Ok(copy)
    }

    pub fn from_specs(specs: &[FieldSpec], registry: &ConverterRegistry) -> ImportResult<Self> {
        let mut collection = Self::new();
        for spec in specs {
            collection.add(FieldDefinition::from_spec(spec, registry)?)?;
        }
        Ok(collection)
    }

    pub fn to_specs(&self) -> Vec<FieldSpec> {
        self.fields.iter().map(FieldDefinition::to_spec).collect()
    }

    pub fn from_yaml_str(text: &str) -> ImportResult<Self> {
        Self::from_yaml_str_with_registry(text, &ConverterRegistry::with_defaults())
    }

    pub fn from_yaml_str_with_registry(
        text: &str,
        registry: &ConverterRegistry,
    ) -> ImportResult<Self> {
        let document: FieldDocument = serde_yaml::from_str(text)?;
        Self::from_specs(&document.fields, registry)
    }

    pub fn load(path: &Path) -> ImportResult<Self> {
        Self::load_with_registry(path, &ConverterRegistry::with_defaults())
    }

    pub fn load_with_registry(path: &Path, registry: &ConverterRegistry) -> ImportResult<Self> {
        if !path.is_file() {
            return Err(ImportError::SourceNotFound(path.display().to_string()));
        }
        let reader = BufReader::new(File::open(path)?);
        let document: FieldDocument = serde_yaml::from_reader(reader)?;
        let collection = Self::from_specs(&document.fields, registry)?;
        debug!(
            "Loaded {} field definition(s) from {:?}",
            collection.len(),
            path
        );
        Ok(collection)
    }

    pub fn to_yaml_string(&self) -> ImportResult<String> {
        let document = FieldDocument {
            version: Some(CURRENT_DEFINITION_VERSION.to_string()),
            fields: self.to_specs(),
        };
        Ok(serde_yaml::to_string(&document)?)
    }

    pub fn save(&self, path: &Path) -> ImportResult<()> {
        let document = FieldDocument {
            version: Some(CURRENT_DEFINITION_VERSION.to_string()),
            fields: self.to_specs(),
        };
        let file = File::create(path)?;
        serde_yaml::to_writer(file, &document)?;
        Ok(())
    }
}

impl Index<&str> for FieldDefinitionCollection {
    type Output = FieldDefinition;

    fn index(&self, field_name: &str) -> &Self::Output {
        match self.get(field_name) {
            Some(field) => field,
            None => panic!("no field named '{field_name}'"),
        }
    }
}

impl<'a> IntoIterator for &'a FieldDefinitionCollection {
    type Item = &'a FieldDefinition;
    type IntoIter = std::slice::Iter<'a, FieldDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        converter::{IntegerParser, NonNullableConverter},
        value::Value,
    };

    #[test]
    fn field_type_parses_aliases_and_custom_tags() {
        assert_eq!(FieldType::from_str("INT").unwrap(), FieldType::Integer);
        assert_eq!(FieldType::from_str("uuid").unwrap(), FieldType::Guid);
        assert_eq!(
            FieldType::from_str("color").unwrap(),
            FieldType::Custom("color".into())
        );
        assert!(FieldType::from_str("  ").is_err());
    }

    #[test]
    fn mapped_name_defaults_to_field_name() {
        let field = FieldDefinition::new("Edad", FieldType::Integer);
        assert_eq!(field.mapped_name(), "Edad");
        assert_eq!(field.display_name(), "Edad");
        assert!(field.allow_null());
    }

    #[test]
    fn collection_rejects_duplicate_names() {
        let mut fields = FieldDefinitionCollection::new();
        fields.add(FieldDefinition::new("Name", FieldType::String)).unwrap();
        let err = fields
            .add(FieldDefinition::new("name", FieldType::String))
            .unwrap_err();
        assert!(matches!(err, ImportError::DuplicateField(name) if name == "name"));
    }

    #[test]
    fn remap_mutates_in_place_and_remapped_copies() {
        let mut fields = FieldDefinitionCollection::from_fields([
            FieldDefinition::new("SecondName", FieldType::String).mapped_from("Apellido"),
        ])
        .unwrap();

        let copy = fields.remapped("SecondName", "Apellidos").unwrap();
        assert_eq!(fields["SecondName"].mapped_name(), "Apellido");
        assert_eq!(copy["SecondName"].mapped_name(), "Apellidos");

        fields.remap("secondname", "Apellidos").unwrap();
        assert_eq!(fields["SecondName"].mapped_name(), "Apellidos");
        assert!(matches!(
            fields.remap("Missing", "x"),
            Err(ImportError::UnknownField(_))
        ));
    }

    #[test]
    fn changing_type_drops_stale_converter_override() {
        let converter = Arc::new(NonNullableConverter::new(
            FieldType::Integer,
            Arc::new(IntegerParser),
        ));
        let mut field = FieldDefinition::new("Edad", FieldType::String).with_converter(converter);
        assert_eq!(field.field_type(), &FieldType::Integer);
        assert!(field.converter_override().is_some());

        field.set_field_type(FieldType::Integer);
        assert!(field.converter_override().is_some());

        field.set_field_type(FieldType::Float);
        assert!(field.converter_override().is_none());
        let registry = ConverterRegistry::with_defaults();
        let resolved = field.resolve_converter(&registry).unwrap();
        assert_eq!(resolved.convert("2.5"), Some(Value::Float(2.5)));
    }

    #[test]
    fn changing_type_rebinds_rule_thresholds() {
        let yaml = r#"
fields:
  - name: Alta
    type: string
    rules:
      - not_null
      - less_than: "2024-01-01"
"#;
        let mut fields = FieldDefinitionCollection::from_yaml_str(yaml).unwrap();
        let alta = fields.get_mut("Alta").unwrap();
        alta.add_rule(Arc::new(crate::rules::NotNullRule::new()));
        alta.set_field_type(FieldType::Date);

        let rules = alta.validation_rules();
        assert_eq!(rules.len(), 3);
        let before = Value::Date(chrono::NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
        let after = Value::Date(chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert!(rules[1].validate(Some(&before), "Alta").is_empty());
        assert_eq!(rules[1].validate(Some(&after), "Alta").len(), 1);
        assert_eq!(rules[2].describe(), "not null");
        assert_eq!(alta.to_spec().rules.len(), 2);
    }

    #[test]
    fn yaml_round_trip_keeps_declarative_rules() {
        let yaml = r#"
fields:
  - name: Edad
    source: Edad
    type: int
    allow_null: false
    required: true
    rules:
      - greater_than_or_equal: 0
  - name: City
    source: Ciudad
    allowed:
      strings:
        values: [Madrid, Sevilla]
"#;
        let fields = FieldDefinitionCollection::from_yaml_str(yaml).unwrap();
        assert_eq!(fields.len(), 2);
        let edad = &fields["Edad"];
        assert_eq!(edad.field_type(), &FieldType::Integer);
        assert!(edad.is_required());
        assert!(!edad.allow_null());
        assert_eq!(edad.validation_rules().len(), 1);
        assert_eq!(fields["City"].mapped_name(), "Ciudad");
        assert!(fields["City"].allowed_values().is_some());

        let text = fields.to_yaml_string().unwrap();
        let reloaded = FieldDefinitionCollection::from_yaml_str(&text).unwrap();
        assert_eq!(reloaded.to_specs(), fields.to_specs());
    }

    #[test]
    fn yaml_with_duplicate_names_is_rejected() {
        let yaml = "fields:\n  - name: A\n  - name: a\n";
        assert!(matches!(
            FieldDefinitionCollection::from_yaml_str(yaml),
            Err(ImportError::DuplicateField(_))
        ));
    }
}
