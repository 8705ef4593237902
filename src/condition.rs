//! Boolean conditions over field values.
//!
//! Validation rules and decision-tree branches share one condition language.
//! Evaluation distinguishes two outcomes: a condition that is simply false
//! (`Ok(false)`), and a condition that could not be evaluated at all
//! (`Err`) — a malformed regex, a comparison against the wrong value type.
//! What happens on an `Err` is the calling layer's policy: the rule
//! evaluator downgrades, the tree walker falls back.

use std::collections::HashMap;
use std::fmt;
use std::sync::{OnceLock, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::field::{FieldId, FieldMap};
use crate::value::FieldValue;

const REGEX_CACHE_MAX: usize = 256;

static REGEX_CACHE: OnceLock<RwLock<HashMap<String, regex::Regex>>> = OnceLock::new();

fn cached_regex(pattern: &str) -> Result<regex::Regex, ConditionError> {
    let cache = REGEX_CACHE.get_or_init(|| RwLock::new(HashMap::new()));

    {
        let guard = cache.read().map_err(|_| ConditionError::CachePoisoned)?;
        if let Some(re) = guard.get(pattern) {
            return Ok(re.clone());
        }
    }

    let compiled = regex::Regex::new(pattern).map_err(|e| ConditionError::InvalidRegex {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;

    let mut guard = cache.write().map_err(|_| ConditionError::CachePoisoned)?;

    if guard.len() >= REGEX_CACHE_MAX {
        // Keep the cache bounded to avoid unbounded memory usage.
        guard.clear();
    }

    // Another thread may have inserted it while we compiled.
    guard
        .entry(pattern.to_string())
        .or_insert_with(|| compiled.clone());
    Ok(compiled)
}

/// An evaluation failure (distinct from a condition being false).
#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("Invalid regex '{pattern}': {reason}")]
    InvalidRegex {
        pattern: String,
        reason: String,
    },

    #[error("Field '{field}' has type {actual}, expected {expected}")]
    TypeMismatch {
        field: FieldId,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Regex cache lock poisoned")]
    CachePoisoned,
}

/// A boolean expression over a field-value map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Field has a non-null value.
    Present {
        field: FieldId,
    },

    /// Field is missing or null.
    Absent {
        field: FieldId,
    },

    /// Field equals the given value. False when the field is absent.
    /// Ints and floats compare numerically.
    Equals {
        field: FieldId,
        value: FieldValue,
    },

    /// Field is present and differs from the given value.
    NotEquals {
        field: FieldId,
        value: FieldValue,
    },

    /// Numeric value within inclusive bounds. False when the field is
    /// absent; an error when the value is not numeric.
    Range {
        field: FieldId,
        min: Option<f64>,
        max: Option<f64>,
    },

    /// Text value is one of the allowed strings.
    OneOf {
        field: FieldId,
        allowed: Vec<String>,
    },

    /// Text value matches a regex.
    Matches {
        field: FieldId,
        pattern: String,
    },

    /// All sub-conditions hold.
    All {
        conditions: Vec<Condition>,
    },

    /// At least one sub-condition holds.
    Any {
        conditions: Vec<Condition>,
    },

    /// The sub-condition does not hold.
    Not {
        condition: Box<Condition>,
    },
}

impl Condition {
    /// Convenience constructor for an equality check.
    #[must_use]
    pub fn equals(field: FieldId, value: impl Into<FieldValue>) -> Self {
        Self::Equals {
            field,
            value: value.into(),
        }
    }

    /// Convenience constructor for an inequality check.
    #[must_use]
    pub fn not_equals(field: FieldId, value: impl Into<FieldValue>) -> Self {
        Self::NotEquals {
            field,
            value: value.into(),
        }
    }

    /// Convenience constructor for a numeric range check.
    #[must_use]
    pub const fn range(field: FieldId, min: Option<f64>, max: Option<f64>) -> Self {
        Self::Range { field, min, max }
    }

    /// Convenience constructor for an allowed-values check.
    #[must_use]
    pub fn one_of<S: Into<String>>(field: FieldId, allowed: impl IntoIterator<Item = S>) -> Self {
        Self::OneOf {
            field,
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    /// Convenience constructor for a regex check.
    #[must_use]
    pub fn matches(field: FieldId, pattern: impl Into<String>) -> Self {
        Self::Matches {
            field,
            pattern: pattern.into(),
        }
    }

    /// Conjunction of conditions.
    #[must_use]
    pub fn all(conditions: Vec<Condition>) -> Self {
        Self::All { conditions }
    }

    /// Disjunction of conditions.
    #[must_use]
    pub fn any(conditions: Vec<Condition>) -> Self {
        Self::Any { conditions }
    }

    /// Negation of a condition.
    #[must_use]
    pub fn negate(condition: Condition) -> Self {
        Self::Not {
            condition: Box::new(condition),
        }
    }

    /// Evaluates this condition against a field map.
    ///
    /// # Errors
    ///
    /// Returns `ConditionError` when the condition cannot be evaluated:
    /// an invalid regex, or a typed comparison against a value of the
    /// wrong type.
    pub fn evaluate(&self, fields: &FieldMap) -> Result<bool, ConditionError> {
        match self {
            Self::Present { field } => Ok(fields.get(field).is_some_and(|v| !v.is_null())),

            Self::Absent { field } => Ok(!fields.get(field).is_some_and(|v| !v.is_null())),

            Self::Equals { field, value } => {
                Ok(fields.get(field).is_some_and(|v| values_equal(v, value)))
            }

            Self::NotEquals { field, value } => Ok(fields
                .get(field)
                .is_some_and(|v| !v.is_null() && !values_equal(v, value))),

            Self::Range { field, min, max } => {
                let Some(value) = fields.get(field) else {
                    return Ok(false);
                };
                if value.is_null() {
                    return Ok(false);
                }
                let n = value
                    .as_float()
                    .ok_or_else(|| ConditionError::TypeMismatch {
                        field: field.clone(),
                        expected: "number",
                        actual: value.type_name(),
                    })?;
                Ok(min.map_or(true, |lo| n >= lo) && max.map_or(true, |hi| n <= hi))
            }

            Self::OneOf { field, allowed } => {
                let Some(value) = fields.get(field) else {
                    return Ok(false);
                };
                if value.is_null() {
                    return Ok(false);
                }
                let text = value
                    .as_text()
                    .ok_or_else(|| ConditionError::TypeMismatch {
                        field: field.clone(),
                        expected: "text",
                        actual: value.type_name(),
                    })?;
                Ok(allowed.iter().any(|a| a == text))
            }

            Self::Matches { field, pattern } => {
                let re = cached_regex(pattern)?;
                Ok(fields
                    .get(field)
                    .and_then(FieldValue::as_text)
                    .is_some_and(|text| re.is_match(text)))
            }

            Self::All { conditions } => {
                for condition in conditions {
                    if !condition.evaluate(fields)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }

            Self::Any { conditions } => {
                for condition in conditions {
                    if condition.evaluate(fields)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }

            Self::Not { condition } => Ok(!condition.evaluate(fields)?),
        }
    }
}

fn values_equal(a: &FieldValue, b: &FieldValue) -> bool {
    // Ints and floats compare numerically so authored conditions don't have
    // to know which representation the UI sent.
    match (a.as_float(), b.as_float()) {
        (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
        _ => a == b,
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present { field } => write!(f, "present({field})"),
            Self::Absent { field } => write!(f, "absent({field})"),
            Self::Equals { field, value } => write!(f, "{field} == {value}"),
            Self::NotEquals { field, value } => write!(f, "{field} != {value}"),
            Self::Range { field, min, max } => {
                let lo = min.map_or_else(|| "-inf".to_string(), |v| v.to_string());
                let hi = max.map_or_else(|| "inf".to_string(), |v| v.to_string());
                write!(f, "{field} in [{lo}, {hi}]")
            }
            Self::OneOf { field, allowed } => write!(f, "{field} in {allowed:?}"),
            Self::Matches { field, pattern } => write!(f, "{field} ~ /{pattern}/"),
            Self::All { conditions } => write!(f, "all({} conditions)", conditions.len()),
            Self::Any { conditions } => write!(f, "any({} conditions)", conditions.len()),
            Self::Not { condition } => write!(f, "not({condition})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> FieldMap {
        let mut map = FieldMap::new();
        map.insert(FieldId::Age, FieldValue::Int(25));
        map.insert(FieldId::Country, FieldValue::Text("Canada".into()));
        map.insert(FieldId::Email, FieldValue::Text("a@b.edu".into()));
        map.insert(FieldId::PlanningToWork, FieldValue::Bool(true));
        map
    }

    #[test]
    fn test_present_and_absent() {
        let fields = fields();
        assert!(Condition::Present { field: FieldId::Age }.evaluate(&fields).unwrap());
        assert!(!Condition::Present { field: FieldId::State }.evaluate(&fields).unwrap());
        assert!(Condition::Absent { field: FieldId::State }.evaluate(&fields).unwrap());
    }

    #[test]
    fn test_equals() {
        let fields = fields();
        assert!(Condition::equals(FieldId::Country, "Canada")
            .evaluate(&fields)
            .unwrap());
        assert!(!Condition::equals(FieldId::Country, "France")
            .evaluate(&fields)
            .unwrap());
        // Absent field: equality is not asserted.
        assert!(!Condition::equals(FieldId::State, "CA")
            .evaluate(&fields)
            .unwrap());
    }

    #[test]
    fn test_equals_numeric_widening() {
        let fields = fields();
        // Int 25 equals Float 25.0.
        assert!(Condition::equals(FieldId::Age, 25.0f64)
            .evaluate(&fields)
            .unwrap());
    }

    #[test]
    fn test_not_equals_absent_field_is_false() {
        let fields = fields();
        assert!(!Condition::not_equals(FieldId::State, "CA")
            .evaluate(&fields)
            .unwrap());
        assert!(Condition::not_equals(FieldId::Country, "United States")
            .evaluate(&fields)
            .unwrap());
    }

    #[test]
    fn test_range() {
        let fields = fields();
        assert!(Condition::range(FieldId::Age, Some(24.0), None)
            .evaluate(&fields)
            .unwrap());
        assert!(!Condition::range(FieldId::Age, None, Some(18.0))
            .evaluate(&fields)
            .unwrap());
        assert!(!Condition::range(FieldId::GraduationYear, Some(2000.0), None)
            .evaluate(&fields)
            .unwrap());
    }

    #[test]
    fn test_range_type_mismatch_is_error() {
        let fields = fields();
        let err = Condition::range(FieldId::Country, Some(0.0), None)
            .evaluate(&fields)
            .unwrap_err();
        assert!(matches!(err, ConditionError::TypeMismatch { .. }));
    }

    #[test]
    fn test_one_of() {
        let fields = fields();
        assert!(Condition::one_of(FieldId::Country, ["Canada", "Mexico"])
            .evaluate(&fields)
            .unwrap());
        assert!(!Condition::one_of(FieldId::Country, ["France"])
            .evaluate(&fields)
            .unwrap());
    }

    #[test]
    fn test_matches() {
        let fields = fields();
        assert!(Condition::matches(FieldId::Email, r"\.edu$")
            .evaluate(&fields)
            .unwrap());
        assert!(!Condition::matches(FieldId::Email, r"\.gov$")
            .evaluate(&fields)
            .unwrap());
    }

    #[test]
    fn test_matches_invalid_regex_is_error() {
        let fields = fields();
        let err = Condition::matches(FieldId::Email, "(unclosed")
            .evaluate(&fields)
            .unwrap_err();
        assert!(matches!(err, ConditionError::InvalidRegex { .. }));
    }

    #[test]
    fn test_combinators() {
        let fields = fields();
        let both = Condition::all(vec![
            Condition::range(FieldId::Age, Some(24.0), None),
            Condition::equals(FieldId::Country, "Canada"),
        ]);
        assert!(both.evaluate(&fields).unwrap());

        let either = Condition::any(vec![
            Condition::equals(FieldId::Country, "France"),
            Condition::equals(FieldId::PlanningToWork, true),
        ]);
        assert!(either.evaluate(&fields).unwrap());

        let negated = Condition::negate(Condition::equals(FieldId::Country, "Canada"));
        assert!(!negated.evaluate(&fields).unwrap());
    }

    #[test]
    fn test_combinator_propagates_errors() {
        let fields = fields();
        let bad = Condition::all(vec![
            Condition::equals(FieldId::Country, "Canada"),
            Condition::matches(FieldId::Email, "(unclosed"),
        ]);
        assert!(bad.evaluate(&fields).is_err());
    }

    #[test]
    fn test_condition_serialization() {
        let condition = Condition::all(vec![
            Condition::range(FieldId::Age, Some(24.0), None),
            Condition::equals(FieldId::FafsaDependencyStatus, "dependent"),
        ]);
        let json = serde_json::to_string(&condition).unwrap();
        let back: Condition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, condition);
    }

    #[test]
    fn test_condition_display() {
        let condition = Condition::equals(FieldId::Country, "Canada");
        assert_eq!(format!("{condition}"), "country == \"Canada\"");
    }
}
