//! Fluent rule composition for a single field.
//!
//! ```ignore
//! let mut age = FieldDefinition::new("Edad", FieldType::Integer);
//! age.rules()
//!     .not_null()
//!     .greater_than_or_equal(0)
//!     .must_with_message::<i64, _>(|age| *age < 150, "age looks wrong");
//! ```

use std::sync::Arc;

use crate::{
    allowed::AllowedValues,
    error::{ImportError, ImportResult},
    field::FieldDefinition,
    rules::{
        ComparisonOperator, ComparisonRule, ExpressionRule, ImportRule, LengthRule, NotNullRule,
        PatternRule, PredicateRule,
    },
    value::{FromValue, Value},
};

#[derive(Debug)]
pub struct ImportRuleBuilder<'a> {
    field: &'a mut FieldDefinition,
}

impl<'a> ImportRuleBuilder<'a> {
    pub fn new(field: &'a mut FieldDefinition) -> Self {
        Self { field }
    }

    pub fn rule<R>(&mut self, rule: R) -> &mut Self
    where
        R: ImportRule + 'static,
    {
        self.field.add_rule(Arc::new(rule));
        self
    }

    pub fn not_null(&mut self) -> &mut Self {
        self.rule(NotNullRule::new())
    }

    pub fn not_null_with_message(&mut self, message: impl Into<String>) -> &mut Self {
        self.rule(NotNullRule::with_message(message))
    }

    pub fn must<T, F>(&mut self, predicate: F) -> &mut Self
    where
        T: FromValue + 'static,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.rule(PredicateRule::<T>::new(predicate))
    }

    pub fn must_with_message<T, F>(&mut self, predicate: F, message: impl Into<String>) -> &mut Self
    where
        T: FromValue + 'static,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.rule(PredicateRule::<T>::new(predicate).with_message(message))
    }

    fn compare(&mut self, operator: ComparisonOperator, threshold: Value) -> &mut Self {
        self.rule(ComparisonRule::new(operator, threshold))
    }

    pub fn greater_than(&mut self, threshold: impl Into<Value>) -> &mut Self {
        self.compare(ComparisonOperator::GreaterThan, threshold.into())
    }

    pub fn less_than(&mut self, threshold: impl Into<Value>) -> &mut Self {
        self.compare(ComparisonOperator::LessThan, threshold.into())
    }

    pub fn greater_than_or_equal(&mut self, threshold: impl Into<Value>) -> &mut Self {
        self.compare(ComparisonOperator::GreaterThanOrEqual, threshold.into())
    }

    pub fn less_than_or_equal(&mut self, threshold: impl Into<Value>) -> &mut Self {
        self.compare(ComparisonOperator::LessThanOrEqual, threshold.into())
    }

    pub fn equal(&mut self, expected: impl Into<Value>) -> &mut Self {
        self.compare(ComparisonOperator::Equal, expected.into())
    }

    pub fn not_equal(&mut self, rejected: impl Into<Value>) -> &mut Self {
        self.compare(ComparisonOperator::NotEqual, rejected.into())
    }

    pub fn matches(&mut self, pattern: &str) -> ImportResult<&mut Self> {
        let rule = PatternRule::new(pattern).map_err(|err| self.invalid(format!("invalid pattern: {err}")))?;
        Ok(self.rule(rule))
    }

    pub fn length(&mut self, min: Option<usize>, max: Option<usize>) -> ImportResult<&mut Self> {
        if let (Some(min), Some(max)) = (min, max)
            && min > max
        {
            return Err(self.invalid(format!("length min {min} exceeds max {max}")));
        }
        Ok(self.rule(LengthRule::new(min, max)))
    }

    pub fn expression(&mut self, expression: &str) -> ImportResult<&mut Self> {
        let rule = ExpressionRule::new(expression)
            .map_err(|err| self.invalid(format!("invalid expression: {err}")))?;
        Ok(self.rule(rule))
    }

    /// Restricts the field to a value domain, replacing any previous one.
    pub fn allowed(&mut self, allowed: impl Into<AllowedValues>) -> &mut Self {
        self.field.set_allowed_values(Some(allowed.into()));
        self
    }

    fn invalid(&self, message: String) -> ImportError {
        ImportError::InvalidRule {
            field: self.field.field_name().to_string(),
            message,
        }
    }
}
