//! String → typed value converters and the registry that resolves them.
//!
//! A [`ValueParser`] handles the non-empty case for one [`FieldType`]. The
//! registry wraps it in either a [`NonNullableConverter`] (blank input is a
//! failure) or a [`NullableConverter`] (blank input converts to null) depending
//! on the field's nullability. Converters never fail fatally on malformed
//! input; only resolving an unregistered type is an error.

use std::{collections::HashMap, fmt, str::FromStr, sync::Arc};

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    error::{ImportError, ImportResult},
    field::FieldType,
    value::{Value, parse_boolean, parse_naive_date, parse_naive_datetime, parse_naive_time},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    Empty,
    Invalid { input: String, reason: String },
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionError::Empty => f.write_str("value is required but was empty"),
            ConversionError::Invalid { reason, .. } => f.write_str(reason),
        }
    }
}

/// Parses a non-blank, trimmed string.
pub trait ValueParser: Send + Sync + fmt::Debug {
    fn parse(&self, input: &str) -> Result<Value, String>;
}

pub trait TypeConverter: Send + Sync + fmt::Debug {
    fn field_type(&self) -> &FieldType;

    fn allows_null(&self) -> bool;

    fn try_convert(&self, input: &str) -> Result<Option<Value>, ConversionError>;

    /// Convenience form: `None` on failure or null.
    fn convert(&self, input: &str) -> Option<Value> {
        self.try_convert(input).ok().flatten()
    }
}

#[derive(Debug, Clone)]
pub struct NonNullableConverter {
    field_type: FieldType,
    parser: Arc<dyn ValueParser>,
}

impl NonNullableConverter {
    pub fn new(field_type: FieldType, parser: Arc<dyn ValueParser>) -> Self {
        Self { field_type, parser }
    }
}

impl TypeConverter for NonNullableConverter {
    fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    fn allows_null(&self) -> bool {
        false
    }

    fn try_convert(&self, input: &str) -> Result<Option<Value>, ConversionError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ConversionError::Empty);
        }
        self.parser
            .parse(trimmed)
            .map(Some)
            .map_err(|reason| ConversionError::Invalid {
                input: input.to_string(),
                reason,
            })
    }
}

/// Nullable wrapper around a non-nullable converter: blank input is a
/// successful null, anything else is delegated.
#[derive(Debug, Clone)]
pub struct NullableConverter {
    inner: NonNullableConverter,
}

impl NullableConverter {
    pub fn new(inner: NonNullableConverter) -> Self {
        Self { inner }
    }
}

impl TypeConverter for NullableConverter {
    fn field_type(&self) -> &FieldType {
        self.inner.field_type()
    }

    fn allows_null(&self) -> bool {
        true
    }

    fn try_convert(&self, input: &str) -> Result<Option<Value>, ConversionError> {
        if input.trim().is_empty() {
            return Ok(None);
        }
        self.inner.try_convert(input)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StringParser;

impl ValueParser for StringParser {
    fn parse(&self, input: &str) -> Result<Value, String> {
        Ok(Value::String(input.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerParser;

impl ValueParser for IntegerParser {
    fn parse(&self, input: &str) -> Result<Value, String> {
        input
            .strip_prefix('+')
            .unwrap_or(input)
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| format!("'{input}' is not a valid integer"))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FloatParser;

impl ValueParser for FloatParser {
    fn parse(&self, input: &str) -> Result<Value, String> {
        match input.parse::<f64>() {
            Ok(parsed) if parsed.is_finite() => Ok(Value::Float(parsed)),
            _ => Err(format!("'{input}' is not a valid number")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DecimalParser;

impl ValueParser for DecimalParser {
    fn parse(&self, input: &str) -> Result<Value, String> {
        Decimal::from_str(input)
            .or_else(|_| Decimal::from_scientific(input))
            .map(Value::Decimal)
            .map_err(|_| format!("'{input}' is not a valid decimal"))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanParser;

impl ValueParser for BooleanParser {
    fn parse(&self, input: &str) -> Result<Value, String> {
        parse_boolean(input)
            .map(Value::Boolean)
            .ok_or_else(|| format!("'{input}' is not a valid boolean"))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DateParser;

impl ValueParser for DateParser {
    fn parse(&self, input: &str) -> Result<Value, String> {
        parse_naive_date(input)
            .or_else(|| parse_naive_datetime(input).map(|dt| dt.date()))
            .map(Value::Date)
            .ok_or_else(|| format!("'{input}' is not a valid date"))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DateTimeParser;

impl ValueParser for DateTimeParser {
    fn parse(&self, input: &str) -> Result<Value, String> {
        parse_naive_datetime(input)
            .or_else(|| parse_naive_date(input).and_then(|d| d.and_hms_opt(0, 0, 0)))
            .map(Value::DateTime)
            .ok_or_else(|| format!("'{input}' is not a valid date/time"))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TimeParser;

impl ValueParser for TimeParser {
    fn parse(&self, input: &str) -> Result<Value, String> {
        parse_naive_time(input)
            .map(Value::Time)
            .ok_or_else(|| format!("'{input}' is not a valid time"))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GuidParser;

impl ValueParser for GuidParser {
    fn parse(&self, input: &str) -> Result<Value, String> {
        let trimmed = input.trim_matches(|c| matches!(c, '{' | '}'));
        Uuid::parse_str(trimmed)
            .map(Value::Guid)
            .map_err(|_| format!("'{input}' is not a valid GUID"))
    }
}

/// Adapts a closure into a [`ValueParser`].
pub struct FnParser<F> {
    name: String,
    parse: F,
}

impl<F> FnParser<F>
where
    F: Fn(&str) -> Result<Value, String> + Send + Sync,
{
    pub fn new(name: impl Into<String>, parse: F) -> Self {
        Self {
            name: name.into(),
            parse,
        }
    }
}

impl<F> fmt::Debug for FnParser<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnParser").field("name", &self.name).finish()
    }
}

impl<F> ValueParser for FnParser<F>
where
    F: Fn(&str) -> Result<Value, String> + Send + Sync,
{
    fn parse(&self, input: &str) -> Result<Value, String> {
        (self.parse)(input)
    }
}

#[derive(Debug, Clone)]
pub struct ConverterRegistry {
    parsers: HashMap<FieldType, Arc<dyn ValueParser>>,
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ConverterRegistry {
    /// A registry without any parser, not even the built-ins.
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(FieldType::String, StringParser);
        registry.register(FieldType::Integer, IntegerParser);
        registry.register(FieldType::Float, FloatParser);
        registry.register(FieldType::Decimal, DecimalParser);
        registry.register(FieldType::Boolean, BooleanParser);
        registry.register(FieldType::Date, DateParser);
        registry.register(FieldType::DateTime, DateTimeParser);
        registry.register(FieldType::Time, TimeParser);
        registry.register(FieldType::Guid, GuidParser);
        registry
    }

    /// Registers (or replaces) the parser used for `field_type`.
    pub fn register<P>(&mut self, field_type: FieldType, parser: P) -> &mut Self
    where
        P: ValueParser + 'static,
    {
        self.parsers.insert(field_type, Arc::new(parser));
        self
    }

    pub fn register_fn<F>(&mut self, field_type: FieldType, parse: F) -> &mut Self
    where
        F: Fn(&str) -> Result<Value, String> + Send + Sync + 'static,
    {
        let name = field_type.to_string();
        self.register(field_type, FnParser::new(name, parse))
    }

    pub fn contains(&self, field_type: &FieldType) -> bool {
        self.parsers.contains_key(field_type)
    }

    pub fn parser(&self, field_type: &FieldType) -> ImportResult<Arc<dyn ValueParser>> {
        self.parsers
            .get(field_type)
            .cloned()
            .ok_or_else(|| ImportError::UnregisteredType(field_type.to_string()))
    }

    pub fn resolve(
        &self,
        field_type: &FieldType,
        allow_null: bool,
    ) -> ImportResult<Arc<dyn TypeConverter>> {
        let inner = NonNullableConverter::new(field_type.clone(), self.parser(field_type)?);
        if allow_null {
            Ok(Arc::new(NullableConverter::new(inner)))
        } else {
            Ok(Arc::new(inner))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn convert(field_type: FieldType, allow_null: bool, input: &str) -> Result<Option<Value>, ConversionError> {
        ConverterRegistry::with_defaults()
            .resolve(&field_type, allow_null)
            .expect("registered")
            .try_convert(input)
    }

    #[test]
    fn integer_round_trips() {
        assert_eq!(
            convert(FieldType::Integer, false, "42"),
            Ok(Some(Value::Integer(42)))
        );
        assert_eq!(
            convert(FieldType::Integer, false, " +7 "),
            Ok(Some(Value::Integer(7)))
        );
        assert!(matches!(
            convert(FieldType::Integer, false, "4.2"),
            Err(ConversionError::Invalid { .. })
        ));
    }

    #[test]
    fn blank_input_depends_on_nullability() {
        assert_eq!(convert(FieldType::Integer, true, "  "), Ok(None));
        assert_eq!(
            convert(FieldType::Integer, false, ""),
            Err(ConversionError::Empty)
        );
    }

    #[test]
    fn nullable_delegates_non_empty_input() {
        assert_eq!(
            convert(FieldType::Boolean, true, "yes"),
            Ok(Some(Value::Boolean(true)))
        );
        assert!(convert(FieldType::Boolean, true, "perhaps").is_err());
    }

    #[test]
    fn dates_accept_datetime_text() {
        let expected = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(
            convert(FieldType::Date, false, "2024-02-29T10:00:00"),
            Ok(Some(Value::Date(expected)))
        );
        assert_eq!(
            convert(FieldType::DateTime, false, "29/02/2024"),
            Ok(Some(Value::DateTime(expected.and_hms_opt(0, 0, 0).unwrap())))
        );
    }

    #[test]
    fn decimal_accepts_scientific_notation() {
        assert_eq!(
            convert(FieldType::Decimal, false, "1.5e2"),
            Ok(Some(Value::Decimal(Decimal::from(150))))
        );
    }

    #[test]
    fn guid_tolerates_braces() {
        let value = convert(
            FieldType::Guid,
            false,
            "{550e8400-e29b-41d4-a716-446655440000}",
        )
        .unwrap();
        assert!(matches!(value, Some(Value::Guid(_))));
    }

    #[test]
    fn convert_returns_none_on_failure() {
        let converter = ConverterRegistry::with_defaults()
            .resolve(&FieldType::Float, false)
            .unwrap();
        assert_eq!(converter.convert("abc"), None);
        assert_eq!(converter.convert("2.5"), Some(Value::Float(2.5)));
    }

    #[test]
    fn custom_types_must_be_registered() {
        let color = FieldType::Custom("color".into());
        let mut registry = ConverterRegistry::with_defaults();
        assert!(matches!(
            registry.resolve(&color, false),
            Err(ImportError::UnregisteredType(name)) if name == "color"
        ));

        registry.register_fn(color.clone(), |input| match input.to_lowercase().as_str() {
            "red" | "green" | "blue" => Ok(Value::String(input.to_lowercase())),
            _ => Err(format!("'{input}' is not a primary color")),
        });
        let converter = registry.resolve(&color, false).unwrap();
        assert_eq!(converter.convert("RED"), Some(Value::String("red".into())));
        assert_eq!(converter.convert("teal"), None);
    }
}
