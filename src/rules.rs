//! Validation rules evaluated against a single (converted) cell value.
//!
//! Every rule treats a null value as valid except [`NotNullRule`]; combine
//! rules with `not_null` to forbid nulls. Rules never panic on a value of an
//! unexpected type, they report it as a failure instead.

use std::{fmt, marker::PhantomData, sync::Arc};

use evalexpr::{ContextWithMutableVariables, HashMapContext, Node, Value as EvalValue};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    allowed::AllowedValues,
    converter::ConverterRegistry,
    error::{ImportError, ImportResult},
    field::FieldType,
    validation::{FailureKind, ValidationFailure},
    value::{FromValue, Value, compare_values},
};

pub trait ImportRule: Send + Sync + fmt::Debug {
    fn validate(&self, value: Option<&Value>, field_name: &str) -> Vec<ValidationFailure>;

    fn describe(&self) -> String;
}

fn rule_failure(field_name: &str, message: String, value: Option<&Value>) -> ValidationFailure {
    let failure = ValidationFailure::new(FailureKind::Rule, field_name, message);
    match value {
        Some(value) => failure.with_attempted_value(value.as_display()),
        None => failure,
    }
}

#[derive(Debug, Clone, Default)]
pub struct NotNullRule {
    message: Option<String>,
}

impl NotNullRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }
}

impl ImportRule for NotNullRule {
    fn validate(&self, value: Option<&Value>, field_name: &str) -> Vec<ValidationFailure> {
        match value {
            Some(value) if !value.is_blank() => Vec::new(),
            _ => vec![rule_failure(
                field_name,
                self.message
                    .clone()
                    .unwrap_or_else(|| format!("'{field_name}' must not be empty")),
                None,
            )],
        }
    }

    fn describe(&self) -> String {
        "not null".to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    Equal,
    NotEqual,
}

impl ComparisonOperator {
    pub fn holds(&self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::{Equal, Greater, Less};
        match self {
            ComparisonOperator::GreaterThan => ordering == Greater,
            ComparisonOperator::LessThan => ordering == Less,
            ComparisonOperator::GreaterThanOrEqual => ordering != Less,
            ComparisonOperator::LessThanOrEqual => ordering != Greater,
            ComparisonOperator::Equal => ordering == Equal,
            ComparisonOperator::NotEqual => ordering != Equal,
        }
    }

    pub fn phrase(&self) -> &'static str {
        match self {
            ComparisonOperator::GreaterThan => "greater than",
            ComparisonOperator::LessThan => "less than",
            ComparisonOperator::GreaterThanOrEqual => "greater than or equal to",
            ComparisonOperator::LessThanOrEqual => "less than or equal to",
            ComparisonOperator::Equal => "equal to",
            ComparisonOperator::NotEqual => "not equal to",
        }
    }
}

/// `value <operator> threshold`, compared with [`compare_values`] so that
/// numeric variants mix freely while unrelated types are reported.
#[derive(Debug, Clone)]
pub struct ComparisonRule {
    operator: ComparisonOperator,
    threshold: Value,
    message: Option<String>,
}

impl ComparisonRule {
    pub fn new(operator: ComparisonOperator, threshold: impl Into<Value>) -> Self {
        Self {
            operator,
            threshold: threshold.into(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn operator(&self) -> ComparisonOperator {
        self.operator
    }

    pub fn threshold(&self) -> &Value {
        &self.threshold
    }
}

impl ImportRule for ComparisonRule {
    fn validate(&self, value: Option<&Value>, field_name: &str) -> Vec<ValidationFailure> {
        let Some(value) = value else {
            return Vec::new();
        };
        match compare_values(value, &self.threshold) {
            Some(ordering) if self.operator.holds(ordering) => Vec::new(),
            Some(_) => vec![rule_failure(
                field_name,
                self.message.clone().unwrap_or_else(|| {
                    format!(
                        "'{field_name}' must be {} {}",
                        self.operator.phrase(),
                        self.threshold
                    )
                }),
                Some(value),
            )],
            None => vec![rule_failure(
                field_name,
                format!(
                    "'{field_name}' cannot compare a {} value with {} threshold {}",
                    value.type_name(),
                    self.threshold.type_name(),
                    self.threshold
                ),
                Some(value),
            )],
        }
    }

    fn describe(&self) -> String {
        format!("{} {}", self.operator.phrase(), self.threshold)
    }
}

type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// User predicate over the value extracted as `T` (see [`FromValue`] for the
/// accepted representations).
pub struct PredicateRule<T> {
    predicate: Predicate<T>,
    message: Option<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> PredicateRule<T>
where
    T: FromValue,
{
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
            message: None,
            _marker: PhantomData,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl<T> Clone for PredicateRule<T> {
    fn clone(&self) -> Self {
        Self {
            predicate: Arc::clone(&self.predicate),
            message: self.message.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for PredicateRule<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateRule")
            .field("type", &std::any::type_name::<T>())
            .field("message", &self.message)
            .finish()
    }
}

impl<T> ImportRule for PredicateRule<T>
where
    T: FromValue,
{
    fn validate(&self, value: Option<&Value>, field_name: &str) -> Vec<ValidationFailure> {
        let Some(value) = value else {
            return Vec::new();
        };
        match T::from_value(value) {
            Some(typed) if (self.predicate)(&typed) => Vec::new(),
            Some(_) => vec![rule_failure(
                field_name,
                self.message
                    .clone()
                    .unwrap_or_else(|| format!("'{field_name}' does not satisfy its condition")),
                Some(value),
            )],
            None => vec![rule_failure(
                field_name,
                format!(
                    "'{field_name}' expected a value of type {} but found {}",
                    T::type_label(),
                    value.type_name()
                ),
                Some(value),
            )],
        }
    }

    fn describe(&self) -> String {
        format!("custom {} predicate", T::type_label())
    }
}

#[derive(Debug, Clone)]
pub struct AllowedValuesRule {
    allowed: AllowedValues,
}

impl AllowedValuesRule {
    pub fn new(allowed: impl Into<AllowedValues>) -> Self {
        Self {
            allowed: allowed.into(),
        }
    }
}

impl ImportRule for AllowedValuesRule {
    fn validate(&self, value: Option<&Value>, field_name: &str) -> Vec<ValidationFailure> {
        match value {
            Some(value) if !self.allowed.contains(value) => {
                let failure = ValidationFailure::new(
                    FailureKind::AllowedValue,
                    field_name,
                    format!("'{field_name}' must be {}", self.allowed.describe()),
                )
                .with_attempted_value(value.as_display());
                vec![failure]
            }
            _ => Vec::new(),
        }
    }

    fn describe(&self) -> String {
        self.allowed.describe()
    }
}

/// Regular-expression match against the value's display form.
#[derive(Debug, Clone)]
pub struct PatternRule {
    regex: Regex,
}

impl PatternRule {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
        })
    }
}

impl ImportRule for PatternRule {
    fn validate(&self, value: Option<&Value>, field_name: &str) -> Vec<ValidationFailure> {
        match value {
            Some(value) if !self.regex.is_match(&value.as_display()) => vec![rule_failure(
                field_name,
                format!("'{field_name}' must match pattern '{}'", self.regex.as_str()),
                Some(value),
            )],
            _ => Vec::new(),
        }
    }

    fn describe(&self) -> String {
        format!("matches '{}'", self.regex.as_str())
    }
}

/// Character-count bounds, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthRule {
    min: Option<usize>,
    max: Option<usize>,
}

impl LengthRule {
    pub fn new(min: Option<usize>, max: Option<usize>) -> Self {
        Self { min, max }
    }
}

impl ImportRule for LengthRule {
    fn validate(&self, value: Option<&Value>, field_name: &str) -> Vec<ValidationFailure> {
        let Some(value) = value else {
            return Vec::new();
        };
        let length = value.as_display().chars().count();
        let too_short = self.min.is_some_and(|min| length < min);
        let too_long = self.max.is_some_and(|max| length > max);
        if too_short || too_long {
            vec![rule_failure(
                field_name,
                format!("'{field_name}' length must be {}", self.describe()),
                Some(value),
            )]
        } else {
            Vec::new()
        }
    }

    fn describe(&self) -> String {
        match (self.min, self.max) {
            (Some(min), Some(max)) => format!("between {min} and {max} characters"),
            (Some(min), None) => format!("at least {min} characters"),
            (None, Some(max)) => format!("at most {max} characters"),
            (None, None) => "any length".to_string(),
        }
    }
}

/// Boolean `evalexpr` expression over the variable `value`. The expression
/// is parsed once, when the rule is built.
#[derive(Debug, Clone)]
pub struct ExpressionRule {
    source: String,
    node: Node,
}

impl ExpressionRule {
    pub fn new(expression: &str) -> Result<Self, evalexpr::EvalexprError> {
        let node = evalexpr::build_operator_tree(expression)?;
        Ok(Self {
            source: expression.to_string(),
            node,
        })
    }
}

pub fn value_to_evalexpr(value: &Value) -> EvalValue {
    match value {
        Value::String(s) => EvalValue::String(s.clone()),
        Value::Integer(i) => EvalValue::Int(*i),
        Value::Float(f) => EvalValue::Float(*f),
        Value::Decimal(_) => EvalValue::Float(value.as_f64().unwrap_or_default()),
        Value::Boolean(b) => EvalValue::Boolean(*b),
        other => EvalValue::String(other.as_display()),
    }
}

impl ImportRule for ExpressionRule {
    fn validate(&self, value: Option<&Value>, field_name: &str) -> Vec<ValidationFailure> {
        let Some(value) = value else {
            return Vec::new();
        };
        let mut context: HashMapContext = HashMapContext::new();
        let outcome = context
            .set_value("value".into(), value_to_evalexpr(value))
            .and_then(|_| self.node.eval_boolean_with_context(&context));
        match outcome {
            Ok(true) => Vec::new(),
            Ok(false) => vec![rule_failure(
                field_name,
                format!("'{field_name}' must satisfy `{}`", self.source),
                Some(value),
            )],
            Err(err) => vec![rule_failure(
                field_name,
                format!("'{field_name}' could not evaluate `{}`: {err}", self.source),
                Some(value),
            )],
        }
    }

    fn describe(&self) -> String {
        format!("`{}`", self.source)
    }
}

/// Scalar literal as written in a YAML rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Literal {
    /// Resolves the literal against the field type, so `"2024-01-01"` becomes
    /// a date threshold for a date field.
    pub fn to_value(&self, field_type: &FieldType, registry: &ConverterRegistry) -> Value {
        match self {
            Literal::Boolean(b) => Value::Boolean(*b),
            Literal::Integer(i) => Value::Integer(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::Text(text) => registry
                .parser(field_type)
                .ok()
                .and_then(|parser| parser.parse(text.trim()).ok())
                .unwrap_or_else(|| Value::String(text.clone())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LengthSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<usize>,
}

/// Declarative rule form used by YAML field definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSpec {
    NotNull,
    GreaterThan(Literal),
    LessThan(Literal),
    GreaterThanOrEqual(Literal),
    LessThanOrEqual(Literal),
    Equal(Literal),
    NotEqual(Literal),
    Matches(String),
    Length(LengthSpec),
    Expression(String),
    Allowed(AllowedValues),
}

impl RuleSpec {
    /// Comparison thresholds are parsed with the field's type, so these rules
    /// must be rebuilt when that type changes.
    pub fn depends_on_field_type(&self) -> bool {
        matches!(
            self,
            RuleSpec::GreaterThan(_)
                | RuleSpec::LessThan(_)
                | RuleSpec::GreaterThanOrEqual(_)
                | RuleSpec::LessThanOrEqual(_)
                | RuleSpec::Equal(_)
                | RuleSpec::NotEqual(_)
        )
    }

    pub fn build(
        &self,
        field_name: &str,
        field_type: &FieldType,
        registry: &ConverterRegistry,
    ) -> ImportResult<Arc<dyn ImportRule>> {
        let invalid = |message: String| ImportError::InvalidRule {
            field: field_name.to_string(),
            message,
        };
        let compare = |operator, literal: &Literal| -> Arc<dyn ImportRule> {
            Arc::new(ComparisonRule::new(
                operator,
                literal.to_value(field_type, registry),
            ))
        };
        let rule: Arc<dyn ImportRule> = match self {
            RuleSpec::NotNull => Arc::new(NotNullRule::new()),
            RuleSpec::GreaterThan(v) => compare(ComparisonOperator::GreaterThan, v),
            RuleSpec::LessThan(v) => compare(ComparisonOperator::LessThan, v),
            RuleSpec::GreaterThanOrEqual(v) => compare(ComparisonOperator::GreaterThanOrEqual, v),
            RuleSpec::LessThanOrEqual(v) => compare(ComparisonOperator::LessThanOrEqual, v),
            RuleSpec::Equal(v) => compare(ComparisonOperator::Equal, v),
            RuleSpec::NotEqual(v) => compare(ComparisonOperator::NotEqual, v),
            RuleSpec::Matches(pattern) => Arc::new(
                PatternRule::new(pattern).map_err(|err| invalid(format!("invalid pattern: {err}")))?,
            ),
            RuleSpec::Length(spec) => {
                if let (Some(min), Some(max)) = (spec.min, spec.max)
                    && min > max
                {
                    return Err(invalid(format!("length min {min} exceeds max {max}")));
                }
                Arc::new(LengthRule::new(spec.min, spec.max))
            }
            RuleSpec::Expression(expression) => Arc::new(
                ExpressionRule::new(expression)
                    .map_err(|err| invalid(format!("invalid expression: {err}")))?,
            ),
            RuleSpec::Allowed(allowed) => Arc::new(AllowedValuesRule::new(allowed.clone())),
        };
        Ok(rule)
    }
}
