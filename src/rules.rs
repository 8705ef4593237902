//! Declarative validation rules and their evaluation.
//!
//! A rule states the *bad* combination: its condition evaluates true when
//! the rule is violated, producing one issue. A rule whose condition cannot
//! be evaluated at all does not abort the batch; it is logged and downgraded
//! to a low-confidence warning so one malformed rule never blocks a form.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::condition::Condition;
use crate::confidence::Confidence;
use crate::field::{FieldId, FieldMap};

/// Multiplicative decay applied to overall confidence per error found.
const ERROR_DECAY: f32 = 0.7;

/// Multiplicative decay applied to overall confidence per warning found.
const WARNING_DECAY: f32 = 0.9;

/// Confidence assigned to an issue produced by a rule that failed to
/// evaluate (as opposed to a rule that found a real violation).
const DOWNGRADED_CONFIDENCE: f32 = 0.3;

/// Issue severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A declarative validation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    /// Stable rule identifier (names the business rule, e.g. `age_range`).
    pub id: String,

    /// The violation condition: true means the rule fires.
    pub condition: Condition,

    /// Message shown when the rule fires.
    pub message: String,

    /// Severity of a violation.
    pub severity: Severity,

    /// Primary field the rule is about, if it has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<FieldId>,

    /// Optional hint for an assistant-driven resolution flow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_hint: Option<String>,

    /// Confidence in the rule itself.
    pub confidence: Confidence,

    /// Whether the rule is currently active.
    pub active: bool,
}

impl ValidationRule {
    /// Creates an active rule with full confidence.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        condition: Condition,
        message: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            id: id.into(),
            condition,
            message: message.into(),
            severity,
            field: None,
            ai_hint: None,
            confidence: Confidence::one(),
            active: true,
        }
    }

    /// Sets the primary field.
    #[must_use]
    pub fn with_field(mut self, field: FieldId) -> Self {
        self.field = Some(field);
        self
    }

    /// Sets the AI resolution hint.
    #[must_use]
    pub fn with_ai_hint(mut self, hint: impl Into<String>) -> Self {
        self.ai_hint = Some(hint.into());
        self
    }

    /// Sets the rule confidence.
    #[must_use]
    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }

    /// Deactivates the rule.
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// One finding produced by a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// The rule that produced this issue.
    pub rule_id: String,

    /// The affected field, if the rule names one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<FieldId>,

    /// Human-readable message.
    pub message: String,

    /// Severity.
    pub severity: Severity,

    /// Optional hint for an assistant-driven resolution flow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_hint: Option<String>,

    /// Confidence in the finding.
    pub confidence: Confidence,
}

/// Aggregated validation findings for one processing pass.
///
/// Overall confidence starts at 1.0 and decays multiplicatively with every
/// error and warning; it never increases within a pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResults {
    /// Error-severity findings.
    pub errors: Vec<ValidationIssue>,

    /// Warning-severity findings.
    pub warnings: Vec<ValidationIssue>,

    /// Advisory findings.
    pub suggestions: Vec<ValidationIssue>,

    /// Aggregate confidence in the validated data.
    pub overall_confidence: Confidence,
}

impl ValidationResults {
    /// Empty results at full confidence.
    #[must_use]
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            suggestions: Vec::new(),
            overall_confidence: Confidence::one(),
        }
    }

    /// Adds an issue, decaying overall confidence by its severity.
    pub fn push(&mut self, issue: ValidationIssue) {
        match issue.severity {
            Severity::Error => {
                self.overall_confidence = self.overall_confidence.decay(ERROR_DECAY);
                self.errors.push(issue);
            }
            Severity::Warning => {
                self.overall_confidence = self.overall_confidence.decay(WARNING_DECAY);
                self.warnings.push(issue);
            }
            Severity::Info => self.suggestions.push(issue),
        }
    }

    /// Errors plus warnings. Suggestions are advisory and not counted.
    #[must_use]
    pub fn issue_count(&self) -> usize {
        self.errors.len() + self.warnings.len()
    }

    /// Returns true if any error-severity issue was found.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns true if nothing was found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty() && self.suggestions.is_empty()
    }
}

impl Default for ValidationResults {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluates every active rule against a field map.
///
/// Produces zero or one issue per rule. A rule whose condition evaluation
/// errors is downgraded to a warning with confidence 0.3 instead of aborting
/// the batch.
#[must_use]
pub fn evaluate_rules(rules: &[ValidationRule], fields: &FieldMap) -> ValidationResults {
    let mut results = ValidationResults::new();

    for rule in rules.iter().filter(|r| r.active) {
        match rule.condition.evaluate(fields) {
            Ok(true) => results.push(ValidationIssue {
                rule_id: rule.id.clone(),
                field: rule.field.clone(),
                message: rule.message.clone(),
                severity: rule.severity,
                ai_hint: rule.ai_hint.clone(),
                confidence: rule.confidence,
            }),
            Ok(false) => {}
            Err(err) => {
                warn!(rule = %rule.id, error = %err, "rule evaluation failed; downgraded to warning");
                results.push(ValidationIssue {
                    rule_id: rule.id.clone(),
                    field: rule.field.clone(),
                    message: format!("rule '{}' could not be evaluated: {err}", rule.id),
                    severity: Severity::Warning,
                    ai_hint: None,
                    confidence: Confidence::clamped(DOWNGRADED_CONFIDENCE),
                });
            }
        }
    }

    results
}
