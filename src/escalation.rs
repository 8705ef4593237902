//! Human-escalation policy.
//!
//! Escalation is a pure OR over four triggers, with no weighting: a false
//! "needs review" costs a counselor a minute, silently proceeding on shaky
//! inferred data costs an applicant money. The thresholds are policy
//! parameters, not constants; the defaults carry the canonical values.

use serde::{Deserialize, Serialize};

use crate::conflict::DataConflict;
use crate::rules::ValidationResults;

/// Threshold configuration for the escalation policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EscalationThresholds {
    /// Escalate when overall validation confidence drops below this.
    pub confidence_floor: f32,

    /// Escalate when any conflict's confidence is below this (the conflict
    /// is too uncertain to act on either way).
    pub conflict_floor: f32,

    /// Escalate when errors plus warnings exceed this count.
    pub max_issues: usize,
}

impl Default for EscalationThresholds {
    fn default() -> Self {
        Self {
            confidence_floor: 0.5,
            conflict_floor: 0.7,
            max_issues: 5,
        }
    }
}

/// Why a session was escalated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTrigger {
    /// At least one error-severity issue exists.
    HasErrors,
    /// Overall validation confidence fell below the floor.
    LowConfidence,
    /// A conflict too uncertain to act on slipped through.
    UnresolvableConflict,
    /// More issues than a clean session should accumulate.
    TooManyIssues,
}

impl EscalationTrigger {
    /// Stable flag string for `FormContext::uncertainty_flags`.
    #[must_use]
    pub const fn flag(self) -> &'static str {
        match self {
            Self::HasErrors => "escalation:has_errors",
            Self::LowConfidence => "escalation:low_confidence",
            Self::UnresolvableConflict => "escalation:unresolvable_conflict",
            Self::TooManyIssues => "escalation:too_many_issues",
        }
    }
}

/// Decides whether a session needs a human.
#[derive(Debug, Clone, Copy, Default)]
pub struct EscalationPolicy {
    thresholds: EscalationThresholds,
}

impl EscalationPolicy {
    /// Creates a policy with the given thresholds.
    #[must_use]
    pub const fn new(thresholds: EscalationThresholds) -> Self {
        Self { thresholds }
    }

    /// Returns every trigger that fired, in a stable order.
    #[must_use]
    pub fn triggers(
        &self,
        validation: &ValidationResults,
        conflicts: &[DataConflict],
    ) -> Vec<EscalationTrigger> {
        let mut fired = Vec::new();

        if validation.has_errors() {
            fired.push(EscalationTrigger::HasErrors);
        }
        if validation.overall_confidence.value() < self.thresholds.confidence_floor {
            fired.push(EscalationTrigger::LowConfidence);
        }
        if conflicts
            .iter()
            .any(|c| c.confidence.value() < self.thresholds.conflict_floor)
        {
            fired.push(EscalationTrigger::UnresolvableConflict);
        }
        if validation.issue_count() > self.thresholds.max_issues {
            fired.push(EscalationTrigger::TooManyIssues);
        }

        fired
    }

    /// True if any trigger fired.
    #[must_use]
    pub fn should_escalate(
        &self,
        validation: &ValidationResults,
        conflicts: &[DataConflict],
    ) -> bool {
        !self.triggers(validation, conflicts).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::Confidence;
    use crate::conflict::ConflictKind;
    use crate::rules::{Severity, ValidationIssue};
    use chrono::Utc;

    fn issue(severity: Severity) -> ValidationIssue {
        ValidationIssue {
            rule_id: "r".into(),
            field: None,
            message: "m".into(),
            severity,
            ai_hint: None,
            confidence: Confidence::one(),
        }
    }

    fn conflict(confidence: f32) -> DataConflict {
        DataConflict {
            kind: ConflictKind::GraduationTimeline,
            description: "d".into(),
            fields: vec![],
            suggested_resolution: "s".into(),
            confidence: Confidence::clamped(confidence),
            auto_resolution: None,
            detected_at: Utc::now(),
        }
    }

    /// Warnings pushed through `push` decay overall confidence; build
    /// results with an explicit confidence instead where a test needs one.
    fn results_with(warnings: usize, errors: usize, confidence: f32) -> ValidationResults {
        let mut results = ValidationResults::new();
        for _ in 0..errors {
            results.errors.push(issue(Severity::Error));
        }
        for _ in 0..warnings {
            results.warnings.push(issue(Severity::Warning));
        }
        results.overall_confidence = Confidence::clamped(confidence);
        results
    }

    #[test]
    fn test_clean_session_does_not_escalate() {
        let policy = EscalationPolicy::default();
        assert!(!policy.should_escalate(&ValidationResults::new(), &[]));
    }

    #[test]
    fn test_any_error_escalates() {
        let policy = EscalationPolicy::default();
        let results = results_with(0, 1, 0.95);
        assert_eq!(policy.triggers(&results, &[]), vec![EscalationTrigger::HasErrors]);
    }

    #[test]
    fn test_low_confidence_escalates() {
        let policy = EscalationPolicy::default();
        let results = results_with(0, 0, 0.4);
        assert_eq!(
            policy.triggers(&results, &[]),
            vec![EscalationTrigger::LowConfidence]
        );
    }

    #[test]
    fn test_uncertain_conflict_escalates() {
        let policy = EscalationPolicy::default();
        let conflicts = [conflict(0.6)];
        assert_eq!(
            policy.triggers(&ValidationResults::new(), &conflicts),
            vec![EscalationTrigger::UnresolvableConflict]
        );
    }

    #[test]
    fn test_confident_conflict_does_not_escalate() {
        let policy = EscalationPolicy::default();
        let conflicts = [conflict(0.9)];
        assert!(!policy.should_escalate(&ValidationResults::new(), &conflicts));
    }

    #[test]
    fn test_six_issues_escalate_five_do_not() {
        let policy = EscalationPolicy::default();

        let six = results_with(6, 0, 0.95);
        assert_eq!(
            policy.triggers(&six, &[]),
            vec![EscalationTrigger::TooManyIssues]
        );

        let five = results_with(5, 0, 0.9);
        assert!(!policy.should_escalate(&five, &[]));
    }

    #[test]
    fn test_triggers_are_independent() {
        let policy = EscalationPolicy::default();
        let results = results_with(6, 1, 0.3);
        let conflicts = [conflict(0.5)];
        let fired = policy.triggers(&results, &conflicts);
        assert_eq!(fired.len(), 4);
    }

    #[test]
    fn test_custom_thresholds() {
        let policy = EscalationPolicy::new(EscalationThresholds {
            confidence_floor: 0.9,
            conflict_floor: 0.5,
            max_issues: 1,
        });
        let results = results_with(2, 0, 0.95);
        assert_eq!(
            policy.triggers(&results, &[conflict(0.6)]),
            vec![EscalationTrigger::TooManyIssues]
        );
    }

    #[test]
    fn test_trigger_flags() {
        assert_eq!(EscalationTrigger::HasErrors.flag(), "escalation:has_errors");
        assert_eq!(
            EscalationTrigger::TooManyIssues.flag(),
            "escalation:too_many_issues"
        );
    }
}
