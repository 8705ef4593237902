//! Field identifiers and field updates.
//!
//! The form UI addresses fields by camelCase wire names
//! (`residencyStatus`, `fafsaDependencyStatus`, ...). Known fields are a
//! closed enum so the engine can match on them; names it has never seen land
//! in the `Extra` bucket instead of being rejected, which keeps old engine
//! builds compatible with newer form definitions.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::confidence::Confidence;
use crate::value::FieldValue;

/// Identifier for one form field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldId {
    // Identity
    FullName,
    Email,
    DateOfBirth,
    Age,

    // Education
    EducationLevel,
    SchoolType,
    State,
    Country,
    ResidencyStatus,

    // Financial-aid status
    FafsaDependencyStatus,

    // Academic timeline
    GraduationYear,
    StartDate,
    ProgramDurationYears,

    // Living situation
    Housing,
    PlanningToWork,

    // Residency follow-ups
    ResidencyTimeline,
    TargetState,

    // International follow-ups
    VisaStatus,
    InternationalStudentAid,
    StateAidEligibility,

    // Expense sub-fields
    MealPlanCost,
    DormCost,
    RentCost,
    UtilitiesCost,

    // Graduate funding
    ResearchFunding,
    AssistantshipInterest,

    // Work
    WorkStudyInterest,
    WorkStudyHours,

    /// A field the engine does not know about. Carried through untouched.
    Extra(String),
}

impl FieldId {
    /// Returns the wire name used by the form UI.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::FullName => "fullName",
            Self::Email => "email",
            Self::DateOfBirth => "dateOfBirth",
            Self::Age => "age",
            Self::EducationLevel => "educationLevel",
            Self::SchoolType => "schoolType",
            Self::State => "state",
            Self::Country => "country",
            Self::ResidencyStatus => "residencyStatus",
            Self::FafsaDependencyStatus => "fafsaDependencyStatus",
            Self::GraduationYear => "graduationYear",
            Self::StartDate => "startDate",
            Self::ProgramDurationYears => "programDurationYears",
            Self::Housing => "housing",
            Self::PlanningToWork => "planningToWork",
            Self::ResidencyTimeline => "residencyTimeline",
            Self::TargetState => "targetState",
            Self::VisaStatus => "visaStatus",
            Self::InternationalStudentAid => "internationalStudentAid",
            Self::StateAidEligibility => "stateAidEligibility",
            Self::MealPlanCost => "mealPlanCost",
            Self::DormCost => "dormCost",
            Self::RentCost => "rentCost",
            Self::UtilitiesCost => "utilitiesCost",
            Self::ResearchFunding => "researchFunding",
            Self::AssistantshipInterest => "assistantshipInterest",
            Self::WorkStudyInterest => "workStudyInterest",
            Self::WorkStudyHours => "workStudyHours",
            Self::Extra(name) => name,
        }
    }

    /// Returns true if this is a field the engine has no schema for.
    #[must_use]
    pub const fn is_extra(&self) -> bool {
        matches!(self, Self::Extra(_))
    }
}

impl From<&str> for FieldId {
    fn from(name: &str) -> Self {
        match name {
            "fullName" => Self::FullName,
            "email" => Self::Email,
            "dateOfBirth" => Self::DateOfBirth,
            "age" => Self::Age,
            "educationLevel" => Self::EducationLevel,
            "schoolType" => Self::SchoolType,
            "state" => Self::State,
            "country" => Self::Country,
            "residencyStatus" => Self::ResidencyStatus,
            "fafsaDependencyStatus" => Self::FafsaDependencyStatus,
            "graduationYear" => Self::GraduationYear,
            "startDate" => Self::StartDate,
            "programDurationYears" => Self::ProgramDurationYears,
            "housing" => Self::Housing,
            "planningToWork" => Self::PlanningToWork,
            "residencyTimeline" => Self::ResidencyTimeline,
            "targetState" => Self::TargetState,
            "visaStatus" => Self::VisaStatus,
            "internationalStudentAid" => Self::InternationalStudentAid,
            "stateAidEligibility" => Self::StateAidEligibility,
            "mealPlanCost" => Self::MealPlanCost,
            "dormCost" => Self::DormCost,
            "rentCost" => Self::RentCost,
            "utilitiesCost" => Self::UtilitiesCost,
            "researchFunding" => Self::ResearchFunding,
            "assistantshipInterest" => Self::AssistantshipInterest,
            "workStudyInterest" => Self::WorkStudyInterest,
            "workStudyHours" => Self::WorkStudyHours,
            other => Self::Extra(other.to_string()),
        }
    }
}

impl From<String> for FieldId {
    fn from(name: String) -> Self {
        Self::from(name.as_str())
    }
}

impl From<FieldId> for String {
    fn from(field: FieldId) -> Self {
        field.as_str().to_string()
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The flat field-value map every evaluator reads.
pub type FieldMap = BTreeMap<FieldId, FieldValue>;

/// Where a field update originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateSource {
    /// Typed by the user.
    UserInput,
    /// Inferred by the decision engine.
    Inferred,
    /// Pre-filled from a form template.
    Template,
    /// Derived arithmetically from other fields.
    Calculated,
}

impl UpdateSource {
    /// Default confidence weight for values from this source.
    ///
    /// Ordered by how much human intent stands behind the value: direct
    /// input outranks derived values, which outrank template defaults and
    /// probabilistic inference.
    #[must_use]
    pub fn confidence(self) -> Confidence {
        match self {
            Self::UserInput => Confidence::one(),
            Self::Calculated => Confidence::clamped(0.95),
            Self::Template => Confidence::clamped(0.9),
            Self::Inferred => Confidence::clamped(0.8),
        }
    }
}

impl fmt::Display for UpdateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserInput => write!(f, "user_input"),
            Self::Inferred => write!(f, "inferred"),
            Self::Template => write!(f, "template"),
            Self::Calculated => write!(f, "calculated"),
        }
    }
}

/// A single change to one field.
///
/// Created by the form UI, consumed once by the orchestrator; not persisted
/// beyond the context it updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldUpdate {
    /// The field being changed.
    pub field: FieldId,
    /// The new value.
    pub value: FieldValue,
    /// When the change happened.
    pub timestamp: DateTime<Utc>,
    /// Where the change came from.
    pub source: UpdateSource,
}

impl FieldUpdate {
    /// Creates an update stamped with the current time.
    #[must_use]
    pub fn new(field: FieldId, value: impl Into<FieldValue>, source: UpdateSource) -> Self {
        Self {
            field,
            value: value.into(),
            timestamp: Utc::now(),
            source,
        }
    }

    /// Creates a user-input update.
    #[must_use]
    pub fn from_user(field: FieldId, value: impl Into<FieldValue>) -> Self {
        Self::new(field, value, UpdateSource::UserInput)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_id_wire_names_round_trip() {
        let known = [
            FieldId::FullName,
            FieldId::ResidencyStatus,
            FieldId::FafsaDependencyStatus,
            FieldId::WorkStudyHours,
        ];
        for field in known {
            let name = field.as_str().to_string();
            assert_eq!(FieldId::from(name), field);
        }
    }

    #[test]
    fn test_field_id_unknown_lands_in_extra() {
        let field = FieldId::from("petName");
        assert_eq!(field, FieldId::Extra("petName".to_string()));
        assert!(field.is_extra());
        assert_eq!(field.as_str(), "petName");
    }

    #[test]
    fn test_field_id_serde_uses_wire_name() {
        let json = serde_json::to_string(&FieldId::ResidencyStatus).unwrap();
        assert_eq!(json, "\"residencyStatus\"");

        let parsed: FieldId = serde_json::from_str("\"fafsaDependencyStatus\"").unwrap();
        assert_eq!(parsed, FieldId::FafsaDependencyStatus);
    }

    #[test]
    fn test_field_id_display() {
        assert_eq!(format!("{}", FieldId::Country), "country");
        assert_eq!(format!("{}", FieldId::Extra("x".into())), "x");
    }

    #[test]
    fn test_update_source_confidence_ordering() {
        assert!(
            UpdateSource::UserInput.confidence().value()
                > UpdateSource::Calculated.confidence().value()
        );
        assert!(
            UpdateSource::Calculated.confidence().value()
                > UpdateSource::Template.confidence().value()
        );
        assert!(
            UpdateSource::Template.confidence().value()
                > UpdateSource::Inferred.confidence().value()
        );
    }

    #[test]
    fn test_field_update_new() {
        let update = FieldUpdate::from_user(FieldId::Age, 25i64);
        assert_eq!(update.field, FieldId::Age);
        assert_eq!(update.value, FieldValue::Int(25));
        assert_eq!(update.source, UpdateSource::UserInput);
    }

    #[test]
    fn test_field_update_serialization() {
        let update = FieldUpdate::new(FieldId::Country, "Canada", UpdateSource::Template);
        let json = serde_json::to_string(&update).unwrap();
        assert!(json.contains("\"country\""));
        assert!(json.contains("template"));
        let back: FieldUpdate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, update);
    }

    #[test]
    fn test_field_map_is_ordered() {
        let mut map = FieldMap::new();
        map.insert(FieldId::State, "CA".into());
        map.insert(FieldId::Age, 19i64.into());
        // BTreeMap keys come out in FieldId order, which keeps the JSON
        // encoding canonical for fingerprinting.
        let keys: Vec<&FieldId> = map.keys().collect();
        assert_eq!(keys, vec![&FieldId::Age, &FieldId::State]);
    }
}
