//! Value-domain restrictions attached to a field: a set of allowed strings,
//! a numeric range or a date range.

use chrono::NaiveDate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

use crate::value::{FromValue, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowedValues {
    Strings(AllowedStrings),
    NumberRange(AllowedNumberRange),
    DateRange(AllowedDateRange),
}

impl AllowedValues {
    pub fn contains(&self, value: &Value) -> bool {
        match self {
            AllowedValues::Strings(set) => set.contains(value),
            AllowedValues::NumberRange(range) => range.contains(value),
            AllowedValues::DateRange(range) => range.contains(value),
        }
    }

    /// Human-readable description of the domain, used in failure messages.
    pub fn describe(&self) -> String {
        match self {
            AllowedValues::Strings(set) => set.describe(),
            AllowedValues::NumberRange(range) => range.describe(),
            AllowedValues::DateRange(range) => range.describe(),
        }
    }
}

impl From<AllowedStrings> for AllowedValues {
    fn from(value: AllowedStrings) -> Self {
        AllowedValues::Strings(value)
    }
}

impl From<AllowedNumberRange> for AllowedValues {
    fn from(value: AllowedNumberRange) -> Self {
        AllowedValues::NumberRange(value)
    }
}

impl From<AllowedDateRange> for AllowedValues {
    fn from(value: AllowedDateRange) -> Self {
        AllowedValues::DateRange(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedStrings {
    pub values: Vec<String>,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub ignore_diacritics: bool,
}

impl AllowedStrings {
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
            case_sensitive: false,
            ignore_diacritics: false,
        }
    }

    pub fn case_sensitive(mut self, enabled: bool) -> Self {
        self.case_sensitive = enabled;
        self
    }

    pub fn ignore_diacritics(mut self, enabled: bool) -> Self {
        self.ignore_diacritics = enabled;
        self
    }

    fn normalize(&self, text: &str) -> String {
        let text = text.trim();
        let folded: String = if self.ignore_diacritics {
            strip_diacritics(text)
        } else {
            text.to_string()
        };
        if self.case_sensitive {
            folded
        } else {
            folded.to_lowercase()
        }
    }

    pub fn contains_str(&self, candidate: &str) -> bool {
        let wanted = self.normalize(candidate);
        self.values.iter().any(|value| self.normalize(value) == wanted)
    }

    pub fn contains(&self, value: &Value) -> bool {
        match value {
            Value::String(s) => self.contains_str(s),
            other => self.contains_str(&other.as_display()),
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "one of [{}]",
            self.values.iter().map(|value| format!("'{value}'")).join(", ")
        )
    }
}

/// Removes combining marks after canonical decomposition, so `"Cádiz"`
/// becomes `"Cadiz"`.
pub fn strip_diacritics(text: &str) -> String {
    text.nfd().filter(|c| !is_combining_mark(*c)).nfc().collect()
}

/// Inclusive numeric range; either bound may be open.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AllowedNumberRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl AllowedNumberRange {
    pub fn between(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn at_least(min: f64) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    pub fn at_most(max: f64) -> Self {
        Self {
            min: None,
            max: Some(max),
        }
    }

    pub fn contains(&self, value: &Value) -> bool {
        let Some(number) = value.as_f64() else {
            return false;
        };
        self.min.is_none_or(|min| number >= min) && self.max.is_none_or(|max| number <= max)
    }

    pub fn describe(&self) -> String {
        let fmt = |n: f64| Value::Float(n).as_display();
        match (self.min, self.max) {
            (Some(min), Some(max)) => format!("between {} and {}", fmt(min), fmt(max)),
            (Some(min), None) => format!("at least {}", fmt(min)),
            (None, Some(max)) => format!("at most {}", fmt(max)),
            (None, None) => "any number".to_string(),
        }
    }
}

/// Inclusive date range; datetimes are compared by their date part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AllowedDateRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<NaiveDate>,
}

impl AllowedDateRange {
    pub fn between(min: NaiveDate, max: NaiveDate) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn contains(&self, value: &Value) -> bool {
        let Some(date) = NaiveDate::from_value(value) else {
            return false;
        };
        self.min.is_none_or(|min| date >= min) && self.max.is_none_or(|max| date <= max)
    }

    pub fn describe(&self) -> String {
        let fmt = |d: NaiveDate| d.format("%Y-%m-%d").to_string();
        match (self.min, self.max) {
            (Some(min), Some(max)) => format!("between {} and {}", fmt(min), fmt(max)),
            (Some(min), None) => format!("on or after {}", fmt(min)),
            (None, Some(max)) => format!("on or before {}", fmt(max)),
            (None, None) => "any date".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_default_to_case_insensitive() {
        let set = AllowedStrings::new(["Madrid", "Sevilla"]);
        assert!(set.contains(&Value::String("madrid".into())));
        assert!(!set.contains(&Value::String("Lugo".into())));

        let strict = set.clone().case_sensitive(true);
        assert!(!strict.contains(&Value::String("madrid".into())));
    }

    #[test]
    fn diacritics_are_optional() {
        let set = AllowedStrings::new(["Cádiz", "León"]);
        assert!(!set.contains_str("Cadiz"));
        let relaxed = set.ignore_diacritics(true);
        assert!(relaxed.contains_str("cadiz"));
        assert!(relaxed.contains_str("LEON"));
    }

    #[test]
    fn strip_diacritics_keeps_base_letters() {
        assert_eq!(strip_diacritics("Ñandú Pérez"), "Nandu Perez");
    }

    #[test]
    fn number_range_is_inclusive() {
        let range = AllowedNumberRange::between(0.0, 120.0);
        assert!(range.contains(&Value::Integer(0)));
        assert!(range.contains(&Value::Float(120.0)));
        assert!(!range.contains(&Value::Integer(121)));
        assert!(!range.contains(&Value::String("5".into())));
        assert_eq!(range.describe(), "between 0 and 120");
        assert_eq!(AllowedNumberRange::at_least(1.5).describe(), "at least 1.5");
    }

    #[test]
    fn date_range_accepts_datetimes() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        let range = AllowedDateRange::between(start, end);
        let inside = end.and_hms_opt(23, 59, 0).unwrap();
        assert!(range.contains(&Value::DateTime(inside)));
        assert!(!range.contains(&Value::Date(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())));
        assert_eq!(range.describe(), "between 2024-01-01 and 2024-12-31");
    }

    #[test]
    fn allowed_values_deserialize_from_yaml() {
        let yaml = "strings:\n  values: [Madrid, Sevilla]\n  ignore_diacritics: true\n";
        let allowed: AllowedValues = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(allowed.describe(), "one of ['Madrid', 'Sevilla']");

        let yaml = "number_range:\n  min: 18\n";
        let allowed: AllowedValues = serde_yaml::from_str(yaml).unwrap();
        assert!(allowed.contains(&Value::Integer(18)));
        assert!(!allowed.contains(&Value::Integer(17)));
    }
}
