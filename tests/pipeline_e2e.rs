use std::sync::Arc;

use aidflow::{
    baseline_fields, Branch, Condition, Confidence, DecisionEngine, DecisionNode, DecisionTree,
    FieldId, FieldUpdate, FieldValue, FormContext, InMemoryRuleStore, InMemoryTreeStore,
    OutcomeAction, RuleStore, Severity, StoreError, ValidationRule,
};

fn engine_with(rules: InMemoryRuleStore, trees: InMemoryTreeStore) -> DecisionEngine {
    DecisionEngine::new(Arc::new(rules), Arc::new(trees))
}

fn education_tree() -> DecisionTree {
    let root = DecisionNode::new(
        "school_type",
        "What kind of school is the applicant attending?",
        FieldId::SchoolType,
        Confidence::clamped(0.95),
    )
    .with_branch(Branch::to(
        Condition::equals(FieldId::SchoolType, "public"),
        vec![OutcomeAction::show(
            FieldId::ResidencyStatus,
            Confidence::clamped(0.9),
        )],
        "residency",
    ))
    .with_branch(Branch::leaf(
        Condition::equals(FieldId::SchoolType, "private"),
        vec![OutcomeAction::hide(
            FieldId::ResidencyStatus,
            Confidence::clamped(0.9),
        )],
    ));

    let residency = DecisionNode::new(
        "residency",
        "Does the applicant qualify for in-state tuition?",
        FieldId::ResidencyStatus,
        Confidence::clamped(0.9),
    )
    .with_branch(Branch::leaf(
        Condition::equals(FieldId::ResidencyStatus, "out_of_state"),
        vec![
            OutcomeAction::show(FieldId::ResidencyTimeline, Confidence::clamped(0.85)),
            OutcomeAction::show(FieldId::TargetState, Confidence::clamped(0.85)),
        ],
    ));

    DecisionTree::new("school_residency", "education", root).with_node(residency)
}

#[test]
fn international_in_state_conflict_is_auto_resolved() {
    let engine = engine_with(InMemoryRuleStore::new(), InMemoryTreeStore::new());

    let mut context = FormContext::new("user-1", "education");
    context.apply_update(&FieldUpdate::from_user(FieldId::ResidencyStatus, "in_state"));

    let next = engine.process_update(FieldUpdate::from_user(FieldId::Country, "Canada"), &context);

    assert_eq!(next.detected_conflicts.len(), 1);
    let conflict = &next.detected_conflicts[0];
    assert_eq!(conflict.id(), "international_instate_conflict");
    assert!((conflict.confidence.value() - 0.95).abs() < f32::EPSILON);
    assert_eq!(
        next.field(&FieldId::ResidencyStatus),
        Some(&FieldValue::Text("international".into()))
    );
}

#[test]
fn age_dependency_mismatch_is_flagged_but_not_changed() {
    let engine = engine_with(InMemoryRuleStore::new(), InMemoryTreeStore::new());

    let mut context = FormContext::new("user-1", "education");
    context.apply_update(&FieldUpdate::from_user(
        FieldId::FafsaDependencyStatus,
        "dependent",
    ));

    let next = engine.process_update(FieldUpdate::from_user(FieldId::Age, 25i64), &context);

    assert_eq!(next.detected_conflicts.len(), 1);
    let conflict = &next.detected_conflicts[0];
    assert_eq!(conflict.id(), "age_dependency_mismatch");
    assert!((conflict.confidence.value() - 0.9).abs() < f32::EPSILON);
    assert_eq!(
        next.field(&FieldId::FafsaDependencyStatus),
        Some(&FieldValue::Text("dependent".into()))
    );
}

#[test]
fn public_out_of_state_reveals_residency_followups() {
    let trees = InMemoryTreeStore::new();
    trees.insert(education_tree()).unwrap();
    let engine = engine_with(InMemoryRuleStore::new(), trees);

    let mut context = FormContext::new("user-1", "education");
    context.apply_update(&FieldUpdate::from_user(FieldId::SchoolType, "public"));

    let next = engine.process_update(
        FieldUpdate::from_user(FieldId::ResidencyStatus, "out_of_state"),
        &context,
    );

    assert!(next.visible_fields.contains(&FieldId::ResidencyTimeline));
    assert!(next.visible_fields.contains(&FieldId::TargetState));
}

#[test]
fn six_warnings_escalate_five_do_not() {
    let missing_fields = [
        FieldId::Email,
        FieldId::State,
        FieldId::Country,
        FieldId::SchoolType,
        FieldId::EducationLevel,
        FieldId::GraduationYear,
    ];

    let build_engine = |rule_count: usize| {
        let rules = InMemoryRuleStore::new();
        for field in missing_fields.iter().take(rule_count) {
            rules
                .insert(
                    ValidationRule::new(
                        format!("{field}_missing"),
                        Condition::Absent {
                            field: field.clone(),
                        },
                        format!("{field} has not been provided"),
                        Severity::Warning,
                    )
                    .with_field(field.clone()),
                )
                .unwrap();
        }
        engine_with(rules, InMemoryTreeStore::new())
    };

    let context = FormContext::new("user-1", "education");
    let update = || FieldUpdate::from_user(FieldId::FullName, "Ada Lovelace");

    // Six warnings, zero errors, no conflicts: escalated by count alone.
    let six = build_engine(6).process_update(update(), &context);
    assert_eq!(six.validation.warnings.len(), 6);
    assert!(six.validation.errors.is_empty());
    assert!(six.detected_conflicts.is_empty());
    assert!(six.needs_manual_intervention);
    assert!(six
        .uncertainty_flags
        .iter()
        .any(|f| f == "escalation:too_many_issues"));

    // Five warnings stay under every threshold.
    let five = build_engine(5).process_update(update(), &context);
    assert_eq!(five.validation.warnings.len(), 5);
    assert!(five.validation.overall_confidence.value() > 0.5);
    assert!(!five.needs_manual_intervention);
}

#[test]
fn baseline_fields_survive_hostile_tree_output() {
    // A tree that tries to hide every baseline field.
    let mut branch_actions = Vec::new();
    for field in baseline_fields() {
        branch_actions.push(OutcomeAction::hide(field.clone(), Confidence::clamped(0.9)));
    }
    let root = DecisionNode::new("hide_all", "q", FieldId::FullName, Confidence::one())
        .with_branch(Branch::leaf(
            Condition::Present {
                field: FieldId::FullName,
            },
            branch_actions,
        ));
    let tree = DecisionTree::new("hostile", "education", root);

    let trees = InMemoryTreeStore::new();
    trees.insert(tree).unwrap();
    let engine = engine_with(InMemoryRuleStore::new(), trees);

    let context = FormContext::new("user-1", "education");
    let next = engine.process_update(
        FieldUpdate::from_user(FieldId::FullName, "Ada Lovelace"),
        &context,
    );

    for field in baseline_fields() {
        assert!(
            next.visible_fields.contains(field),
            "baseline field {field} must stay visible"
        );
    }
}

struct OfflineRuleStore;

impl RuleStore for OfflineRuleStore {
    fn active_rules(&self) -> Result<Vec<ValidationRule>, StoreError> {
        Err(StoreError::Backend("rule store offline".to_string()))
    }
}

#[test]
fn orchestrator_never_fails_the_caller() {
    let engine = DecisionEngine::new(Arc::new(OfflineRuleStore), Arc::new(InMemoryTreeStore::new()));

    let mut context = FormContext::new("user-1", "education");
    context.apply_update(&FieldUpdate::from_user(FieldId::State, "CA"));

    let next = engine.process_update(FieldUpdate::from_user(FieldId::Age, 19i64), &context);

    assert!(next.needs_manual_intervention);
    assert!(!next.validation.errors.is_empty());
    assert_eq!(next.validation.overall_confidence, Confidence::zero());
    // Prior data survives untouched in the degraded context.
    assert_eq!(next.field(&FieldId::State), Some(&FieldValue::Text("CA".into())));
    assert!(next.field(&FieldId::Age).is_none());
}

#[test]
fn visibility_follows_the_applicant_through_the_form() {
    let trees = InMemoryTreeStore::new();
    trees.insert(education_tree()).unwrap();
    let engine = engine_with(InMemoryRuleStore::new(), trees);

    let mut context = FormContext::new("user-1", "education");

    // International applicant: visa fields appear, state aid disappears.
    context = engine.process_update(FieldUpdate::from_user(FieldId::Country, "Canada"), &context);
    assert!(context.visible_fields.contains(&FieldId::VisaStatus));
    assert!(context
        .visible_fields
        .contains(&FieldId::InternationalStudentAid));
    assert!(!context.visible_fields.contains(&FieldId::StateAidEligibility));

    // On-campus housing: dorm costs appear, rent fields stay out.
    context = engine.process_update(
        FieldUpdate::from_user(FieldId::Housing, "on_campus"),
        &context,
    );
    assert!(context.visible_fields.contains(&FieldId::MealPlanCost));
    assert!(context.visible_fields.contains(&FieldId::DormCost));
    assert!(!context.visible_fields.contains(&FieldId::RentCost));

    // Doctoral study: research funding appears.
    context = engine.process_update(
        FieldUpdate::from_user(FieldId::EducationLevel, "doctoral"),
        &context,
    );
    assert!(context.visible_fields.contains(&FieldId::ResearchFunding));
    assert!(context
        .visible_fields
        .contains(&FieldId::AssistantshipInterest));

    // Work plans: work-study fields appear.
    context = engine.process_update(
        FieldUpdate::from_user(FieldId::PlanningToWork, true),
        &context,
    );
    assert!(context.visible_fields.contains(&FieldId::WorkStudyInterest));
    assert!(context.visible_fields.contains(&FieldId::WorkStudyHours));

    // The baseline never left.
    for field in baseline_fields() {
        assert!(context.visible_fields.contains(field));
    }
}

#[test]
fn broken_rule_degrades_to_warning_without_blocking() {
    let rules = InMemoryRuleStore::new();
    rules
        .insert(ValidationRule::new(
            "email_format",
            Condition::matches(FieldId::Email, "(unclosed"),
            "Email must look like an email",
            Severity::Error,
        ))
        .unwrap();
    rules
        .insert(
            ValidationRule::new(
                "age_minimum",
                Condition::range(FieldId::Age, None, Some(15.0)),
                "Applicants must be at least 16",
                Severity::Error,
            )
            .with_field(FieldId::Age),
        )
        .unwrap();
    let engine = engine_with(rules, InMemoryTreeStore::new());

    let mut context = FormContext::new("user-1", "education");
    context.apply_update(&FieldUpdate::from_user(FieldId::Email, "a@b.edu"));

    let next = engine.process_update(FieldUpdate::from_user(FieldId::Age, 14i64), &context);

    // The broken rule became a low-confidence warning; the good rule still
    // produced its error.
    assert_eq!(next.validation.warnings.len(), 1);
    assert!((next.validation.warnings[0].confidence.value() - 0.3).abs() < f32::EPSILON);
    assert_eq!(next.validation.errors.len(), 1);
    assert_eq!(next.validation.errors[0].rule_id, "age_minimum");
    assert!(next.needs_manual_intervention);
}
