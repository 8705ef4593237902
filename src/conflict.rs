//! Cross-field conflict detection.
//!
//! Conflicts are explicit objects, not hidden errors. When two field values
//! cannot both be right, the detector records a conflict with a confidence
//! score and, where the correction is unambiguous, an attached automatic
//! resolution. Automatic resolution is gated strictly on confidence: below
//! the configured threshold the engine surfaces the conflict to a human
//! rather than guess. Changing a dependency status has downstream aid
//! implications, so that family is never auto-resolved; rewriting an
//! impossible residency status for a foreign country is, because the
//! correction cannot under- or over-state eligibility.

use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::confidence::Confidence;
use crate::field::{FieldId, FieldMap};
use crate::value::FieldValue;

/// The known conflict families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Adult age combined with a dependent FAFSA status.
    AgeDependencyMismatch,
    /// Foreign country combined with an in-state residency status.
    InternationalInState,
    /// Graduation year inconsistent with start date plus program duration.
    GraduationTimeline,
}

impl ConflictKind {
    /// Stable string identifier for this conflict family.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::AgeDependencyMismatch => "age_dependency_mismatch",
            Self::InternationalInState => "international_instate_conflict",
            Self::GraduationTimeline => "graduation_timeline_conflict",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// An unambiguous correction attached to a conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoResolution {
    /// Field to rewrite.
    pub field: FieldId,
    /// The corrected value.
    pub replacement: FieldValue,
}

/// A detected logical inconsistency between field values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConflict {
    /// The conflict family.
    pub kind: ConflictKind,

    /// Human-readable description of the inconsistency.
    pub description: String,

    /// The implicated fields.
    pub fields: Vec<FieldId>,

    /// Suggested resolution text for the review UI.
    pub suggested_resolution: String,

    /// Confidence that this is a real conflict.
    pub confidence: Confidence,

    /// Correction to apply automatically, if the conflict carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_resolution: Option<AutoResolution>,

    /// When the conflict was detected.
    pub detected_at: DateTime<Utc>,
}

impl DataConflict {
    /// Stable string identifier for this conflict.
    #[must_use]
    pub const fn id(&self) -> &'static str {
        self.kind.id()
    }
}

/// Detects known inconsistent field combinations.
#[derive(Debug, Clone)]
pub struct ConflictDetector {
    home_country: String,
    auto_resolve_threshold: f32,
}

impl ConflictDetector {
    /// Creates a detector.
    ///
    /// `home_country` anchors the residency checks; `auto_resolve_threshold`
    /// gates automatic resolution (conflicts below it are never rewritten).
    #[must_use]
    pub fn new(home_country: impl Into<String>, auto_resolve_threshold: f32) -> Self {
        Self {
            home_country: home_country.into(),
            auto_resolve_threshold,
        }
    }

    /// Inspects a field map for the known conflict families.
    ///
    /// `at` stamps `detected_at` on every conflict. Passing the triggering
    /// update's timestamp (rather than reading the clock here) keeps one
    /// processing run a pure function of its inputs, so the in-process and
    /// worker paths produce identical contexts.
    #[must_use]
    pub fn detect(&self, fields: &FieldMap, at: DateTime<Utc>) -> Vec<DataConflict> {
        let mut conflicts = Vec::new();

        if let Some(conflict) = self.age_dependency(fields, at) {
            conflicts.push(conflict);
        }
        if let Some(conflict) = self.international_in_state(fields, at) {
            conflicts.push(conflict);
        }
        if let Some(conflict) = self.graduation_timeline(fields, at) {
            conflicts.push(conflict);
        }

        conflicts
    }

    /// Returns the conflicts whose corrections may be applied without
    /// asking, paired with those corrections.
    ///
    /// A correction qualifies only when the conflict carries one *and* its
    /// confidence clears the threshold.
    #[must_use]
    pub fn resolvable<'a>(
        &self,
        conflicts: &'a [DataConflict],
    ) -> Vec<(&'a DataConflict, &'a AutoResolution)> {
        conflicts
            .iter()
            .filter(|c| c.confidence.value() >= self.auto_resolve_threshold)
            .filter_map(|c| c.auto_resolution.as_ref().map(|r| (c, r)))
            .collect()
    }

    fn age_dependency(&self, fields: &FieldMap, at: DateTime<Utc>) -> Option<DataConflict> {
        let age = fields.get(&FieldId::Age)?.as_float()?;
        let status = fields.get(&FieldId::FafsaDependencyStatus)?.as_text()?;
        if age < 24.0 || status != "dependent" {
            return None;
        }

        Some(DataConflict {
            kind: ConflictKind::AgeDependencyMismatch,
            description: format!(
                "Age {age:.0} qualifies as independent for FAFSA purposes, but the \
                 dependency status is 'dependent'"
            ),
            fields: vec![FieldId::Age, FieldId::FafsaDependencyStatus],
            suggested_resolution: "Confirm whether the applicant is an independent student; \
                                   students 24 or older usually are"
                .to_string(),
            confidence: Confidence::clamped(0.9),
            // Changing dependency status changes aid outcomes; a human must
            // confirm this one.
            auto_resolution: None,
            detected_at: at,
        })
    }

    fn international_in_state(&self, fields: &FieldMap, at: DateTime<Utc>) -> Option<DataConflict> {
        let country = fields.get(&FieldId::Country)?.as_text()?;
        let residency = fields.get(&FieldId::ResidencyStatus)?.as_text()?;
        if country == self.home_country || residency != "in_state" {
            return None;
        }

        Some(DataConflict {
            kind: ConflictKind::InternationalInState,
            description: format!(
                "Country '{country}' cannot hold an in-state residency status in \
                 {}",
                self.home_country
            ),
            fields: vec![FieldId::Country, FieldId::ResidencyStatus],
            suggested_resolution: "Residency status corrected to 'international'".to_string(),
            confidence: Confidence::clamped(0.95),
            auto_resolution: Some(AutoResolution {
                field: FieldId::ResidencyStatus,
                replacement: FieldValue::Text("international".to_string()),
            }),
            detected_at: at,
        })
    }

    fn graduation_timeline(&self, fields: &FieldMap, at: DateTime<Utc>) -> Option<DataConflict> {
        let graduation_year = fields.get(&FieldId::GraduationYear)?.as_int()?;
        let start = fields.get(&FieldId::StartDate)?.as_date()?;
        let duration = fields.get(&FieldId::ProgramDurationYears)?.as_float()?;

        let expected = i64::from(start.year()) + duration.round() as i64;
        if (graduation_year - expected).abs() <= 1 {
            return None;
        }

        Some(DataConflict {
            kind: ConflictKind::GraduationTimeline,
            description: format!(
                "Graduation year {graduation_year} does not match a {duration:.0}-year \
                 program starting {start}"
            ),
            fields: vec![
                FieldId::GraduationYear,
                FieldId::StartDate,
                FieldId::ProgramDurationYears,
            ],
            suggested_resolution: format!("Expected graduation around {expected}"),
            confidence: Confidence::clamped(0.8),
            auto_resolution: None,
            detected_at: at,
        })
    }
}
