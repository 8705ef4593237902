//! Field visibility calculation.
//!
//! Visibility is decided in two passes. The first applies the show/hide
//! outcome actions produced by decision trees, in order, last-applied-wins.
//! The second applies hard-coded conditional domain rules keyed on concrete
//! field values; these encode hard business constraints and therefore
//! override whatever the trees said about the same field. A fixed baseline
//! of identity and education fields is visible no matter what.
//!
//! The result names both a visible set and a hidden set. Fields in neither
//! are unspecified: the caller decides their default, the engine has no
//! opinion.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::field::{FieldId, FieldMap};
use crate::tree::{ActionKind, OutcomeAction};
use crate::value::FieldValue;

/// The fields every form shows regardless of state.
#[must_use]
pub fn baseline_fields() -> &'static [FieldId] {
    const BASELINE: &[FieldId] = &[
        FieldId::FullName,
        FieldId::Email,
        FieldId::DateOfBirth,
        FieldId::EducationLevel,
        FieldId::SchoolType,
        FieldId::State,
        FieldId::Country,
    ];
    BASELINE
}

/// The visibility decision for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityOutcome {
    /// Fields the UI should render.
    pub visible: BTreeSet<FieldId>,

    /// Fields the UI should not render.
    pub hidden: BTreeSet<FieldId>,
}

impl VisibilityOutcome {
    #[must_use]
    pub fn is_visible(&self, field: &FieldId) -> bool {
        self.visible.contains(field)
    }

    #[must_use]
    pub fn is_hidden(&self, field: &FieldId) -> bool {
        self.hidden.contains(field)
    }

    /// Neither shown nor hidden; the caller's default applies.
    #[must_use]
    pub fn is_unspecified(&self, field: &FieldId) -> bool {
        !self.is_visible(field) && !self.is_hidden(field)
    }

    fn reveal(&mut self, field: FieldId) {
        self.hidden.remove(&field);
        self.visible.insert(field);
    }

    fn suppress(&mut self, field: FieldId) {
        self.visible.remove(&field);
        self.hidden.insert(field);
    }
}

/// Computes field visibility from tree output and domain rules.
#[derive(Debug, Clone)]
pub struct VisibilityCalculator {
    home_country: String,
}

impl VisibilityCalculator {
    /// Creates a calculator anchored on the given home country.
    #[must_use]
    pub fn new(home_country: impl Into<String>) -> Self {
        Self {
            home_country: home_country.into(),
        }
    }

    /// Runs both passes and returns the final visible and hidden sets.
    #[must_use]
    pub fn compute(&self, actions: &[OutcomeAction], fields: &FieldMap) -> VisibilityOutcome {
        let mut outcome = VisibilityOutcome::default();
        for field in baseline_fields() {
            outcome.visible.insert(field.clone());
        }

        // Pass 1: tree-derived actions, in order, last-applied-wins.
        for action in actions {
            match action.kind {
                ActionKind::ShowField => outcome.reveal(action.target.clone()),
                ActionKind::HideField => outcome.suppress(action.target.clone()),
                _ => {}
            }
        }

        // Pass 2: conditional domain rules, authoritative over pass 1.
        self.apply_domain_rules(&mut outcome, fields);

        // The baseline always wins last.
        for field in baseline_fields() {
            outcome.reveal(field.clone());
        }

        outcome
    }

    fn apply_domain_rules(&self, outcome: &mut VisibilityOutcome, fields: &FieldMap) {
        let text = |field: &FieldId| fields.get(field).and_then(FieldValue::as_text);

        // Public-school enrollment raises residency questions.
        if text(&FieldId::SchoolType) == Some("public") {
            outcome.reveal(FieldId::ResidencyTimeline);
            outcome.reveal(FieldId::TargetState);
        }

        // International applicants need visa fields and cannot use
        // domestic state aid.
        if let Some(country) = text(&FieldId::Country) {
            if country != self.home_country {
                outcome.reveal(FieldId::VisaStatus);
                outcome.reveal(FieldId::InternationalStudentAid);
                outcome.suppress(FieldId::StateAidEligibility);
            }
        }

        // Housing choice toggles mutually exclusive expense sub-fields.
        match text(&FieldId::Housing) {
            Some("on_campus") => {
                outcome.reveal(FieldId::MealPlanCost);
                outcome.reveal(FieldId::DormCost);
                outcome.suppress(FieldId::RentCost);
                outcome.suppress(FieldId::UtilitiesCost);
            }
            Some("off_campus") => {
                outcome.reveal(FieldId::RentCost);
                outcome.reveal(FieldId::UtilitiesCost);
                outcome.suppress(FieldId::MealPlanCost);
                outcome.suppress(FieldId::DormCost);
            }
            _ => {}
        }

        // Graduate-level study opens research funding.
        if matches!(text(&FieldId::EducationLevel), Some("graduate" | "doctoral")) {
            outcome.reveal(FieldId::ResearchFunding);
            outcome.reveal(FieldId::AssistantshipInterest);
        }

        // Work plans open work-study.
        let planning_to_work = match fields.get(&FieldId::PlanningToWork) {
            Some(FieldValue::Bool(v)) => *v,
            Some(FieldValue::Text(v)) => v == "yes",
            _ => false,
        };
        if planning_to_work {
            outcome.reveal(FieldId::WorkStudyInterest);
            outcome.reveal(FieldId::WorkStudyHours);
        }
    }
}
