//! The orchestrator.
//!
//! `DecisionEngine` runs the per-field-update pipeline: merge, tree
//! walking, visibility, validation, conflict detection, next-action
//! synthesis, escalation. Tree walking and validation have no data
//! dependency on each other and run as parallel scoped threads; conflict
//! detection follows validation inside the same task so it overlaps the
//! tail of tree walking. Everything else is sequential.
//!
//! The engine's boundary guarantee: `process_update` always returns a
//! well-formed `FormContext`, never an error and never a panic. Any failure
//! inside the pipeline degrades into the prior context with the
//! manual-intervention flag set and a synthetic error issue attached.

/// Background-worker execution path.
pub mod worker;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use tracing::{debug, warn};

use crate::confidence::Confidence;
use crate::conflict::ConflictDetector;
use crate::context::{FormContext, RETENTION_HOURS};
use crate::error::{EngineError, EngineResult, ExecutionError};
use crate::escalation::{EscalationPolicy, EscalationThresholds};
use crate::field::{FieldId, FieldUpdate};
use crate::rules::{evaluate_rules, Severity, ValidationIssue, ValidationResults};
use crate::store::{RuleStore, TreeStore};
use crate::tree::{dedupe_actions, OutcomeAction, TreeWalker, DEFAULT_CONFIDENCE_FLOOR};
use crate::visibility::VisibilityCalculator;

/// Progress checkpoint after the update is merged.
pub const PROGRESS_MERGED: u8 = 10;
/// Progress checkpoint after tree walking and validation complete.
pub const PROGRESS_TREES: u8 = 20;
/// Progress checkpoint after visibility, conflicts, and auto-resolution.
pub const PROGRESS_CHECKED: u8 = 60;
/// Progress checkpoint after next-action synthesis.
pub const PROGRESS_SYNTHESIZED: u8 = 80;
/// Progress checkpoint when the new context is assembled.
pub const PROGRESS_COMPLETE: u8 = 100;

/// Rule id used for the synthetic issue attached to a degraded context.
pub const PIPELINE_FAILURE_RULE: &str = "pipeline_failure";

/// Policy parameters for one engine instance.
///
/// Every threshold the pipeline consults lives here; nothing is hard-coded
/// at a use site.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Country whose residency statuses are domestic.
    pub home_country: String,

    /// Minimum conflict confidence for automatic resolution.
    pub auto_resolve_threshold: f32,

    /// Confidence floor at which tree traversal stops.
    pub tree_confidence_floor: f32,

    /// Escalation thresholds.
    pub escalation: EscalationThresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            home_country: "United States".to_string(),
            auto_resolve_threshold: 0.8,
            tree_confidence_floor: DEFAULT_CONFIDENCE_FLOOR,
            escalation: EscalationThresholds::default(),
        }
    }
}

/// The decision engine.
///
/// Stores are injected, not global: pass isolated instances in tests, the
/// production-backed ones in an application.
#[derive(Clone)]
pub struct DecisionEngine {
    rules: Arc<dyn RuleStore>,
    trees: Arc<dyn TreeStore>,
    config: EngineConfig,
}

impl DecisionEngine {
    /// Creates an engine with default policy parameters.
    #[must_use]
    pub fn new(rules: Arc<dyn RuleStore>, trees: Arc<dyn TreeStore>) -> Self {
        Self::with_config(rules, trees, EngineConfig::default())
    }

    /// Creates an engine with explicit policy parameters.
    #[must_use]
    pub fn with_config(
        rules: Arc<dyn RuleStore>,
        trees: Arc<dyn TreeStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            rules,
            trees,
            config,
        }
    }

    /// Access the engine's policy parameters.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Processes one field update against the prior context.
    ///
    /// Never fails: on any pipeline error the returned context is the prior
    /// one, degraded (`needs_manual_intervention = true`, one synthetic
    /// error issue, zero confidence).
    #[must_use]
    pub fn process_update(&self, update: FieldUpdate, prior: &FormContext) -> FormContext {
        self.process_update_with_progress(update, prior, &|_| {})
    }

    /// Same as `process_update`, reporting progress at the fixed
    /// checkpoints (10/20/60/80/100).
    ///
    /// The worker path and the in-process path both run through here, which
    /// is what makes their outputs identical for the same inputs.
    #[must_use]
    pub fn process_update_with_progress(
        &self,
        update: FieldUpdate,
        prior: &FormContext,
        progress: &dyn Fn(u8),
    ) -> FormContext {
        let at = update.timestamp;
        let outcome =
            panic::catch_unwind(AssertUnwindSafe(|| self.run_pipeline(&update, prior, progress)));
        match outcome {
            Ok(Ok(context)) => context,
            Ok(Err(err)) => self.degraded(prior, at, &err.to_string()),
            Err(_) => self.degraded(prior, at, "processing pipeline panicked"),
        }
    }

    /// Evaluates the active rules against a context's field data.
    ///
    /// # Errors
    ///
    /// Returns an error if the rule store is unavailable.
    pub fn validate(&self, context: &FormContext) -> EngineResult<ValidationResults> {
        let rules = self.rules.active_rules()?;
        Ok(evaluate_rules(&rules, &context.inferred_data))
    }

    /// Detects conflicts in a context, applies gated auto-resolutions, and
    /// re-runs the escalation decision.
    ///
    /// # Errors
    ///
    /// This operation touches no store and currently cannot fail; the
    /// `Result` keeps its signature aligned with the other engine entry
    /// points.
    pub fn resolve_conflicts(&self, context: &FormContext) -> EngineResult<FormContext> {
        let mut next = context.clone();
        let detector = self.detector();
        let conflicts = detector.detect(&next.inferred_data, next.updated_at);

        for (conflict, resolution) in detector.resolvable(&conflicts) {
            debug!(conflict = conflict.id(), field = %resolution.field, "auto-resolving conflict");
            next.inferred_data
                .insert(resolution.field.clone(), resolution.replacement.clone());
            next.field_confidence
                .insert(resolution.field.clone(), conflict.confidence);
        }

        let policy = EscalationPolicy::new(self.config.escalation);
        next.needs_manual_intervention = policy.should_escalate(&next.validation, &conflicts);
        next.detected_conflicts = conflicts;
        Ok(next)
    }

    fn detector(&self) -> ConflictDetector {
        ConflictDetector::new(
            self.config.home_country.clone(),
            self.config.auto_resolve_threshold,
        )
    }

    fn run_pipeline(
        &self,
        update: &FieldUpdate,
        prior: &FormContext,
        progress: &dyn Fn(u8),
    ) -> EngineResult<FormContext> {
        // A session past its retention window cannot be extended; it comes
        // back degraded and flagged for review.
        if prior.is_expired(update.timestamp) {
            let expired_at = prior.updated_at + chrono::Duration::hours(RETENTION_HOURS);
            return Err(ExecutionError::ContextExpired {
                session: prior.session_id.to_string(),
                expired_at: expired_at.to_rfc3339(),
            }
            .into());
        }

        // Phase 1: merge. Per-pass outputs from the prior run are cleared;
        // field data accumulates.
        let mut context = prior.clone();
        context.uncertainty_flags.clear();
        context.pending_actions.clear();
        context.apply_update(update);
        progress(PROGRESS_MERGED);

        let fields = context.inferred_data.clone();
        let rules = self.rules.active_rules()?;
        let trees = self.trees.trees_for_phase(&context.current_phase)?;

        let walker = TreeWalker::new(self.config.tree_confidence_floor);
        let detector = self.detector();
        let detected_at = context.updated_at;

        // Phases 2 and 4 are independent and run in parallel. Conflict
        // detection (phase 5) needs validation's pass to have finished, so
        // it rides in the same task and overlaps the tail of tree walking.
        let (walk_outcome, check_outcome) = thread::scope(|s| {
            let walk_task = s.spawn(|| walker.walk_all(&trees, &fields));
            let check_task = s.spawn(|| {
                let validation = evaluate_rules(&rules, &fields);
                let conflicts = detector.detect(&fields, detected_at);
                (validation, conflicts)
            });
            (walk_task.join(), check_task.join())
        });
        let walks =
            walk_outcome.map_err(|_| EngineError::internal("decision-tree task panicked"))?;
        let (validation, conflicts) =
            check_outcome.map_err(|_| EngineError::internal("validation task panicked"))?;
        progress(PROGRESS_TREES);

        for walk in &walks {
            if let Some(fallback) = walk.fallback_applied {
                context
                    .uncertainty_flags
                    .push(format!("tree_fallback:{}:{fallback}", walk.tree_name));
            } else if !walk.completed {
                context
                    .uncertainty_flags
                    .push(format!("tree_incomplete:{}", walk.tree_name));
            }
        }

        // Phase 3: visibility from the deduplicated tree output.
        let actions = dedupe_actions(walks.into_iter().flat_map(|walk| walk.actions));
        let visibility =
            VisibilityCalculator::new(self.config.home_country.clone()).compute(&actions, &fields);

        // Phase 5 tail: apply the auto-resolutions that cleared the gate.
        for (conflict, resolution) in detector.resolvable(&conflicts) {
            debug!(conflict = conflict.id(), field = %resolution.field, "auto-resolving conflict");
            context
                .inferred_data
                .insert(resolution.field.clone(), resolution.replacement.clone());
            context
                .field_confidence
                .insert(resolution.field.clone(), conflict.confidence);
            context
                .uncertainty_flags
                .push(format!("auto_resolved:{}", conflict.id()));
        }
        progress(PROGRESS_CHECKED);

        // Phase 6: synthesize the pending-action queue from everything the
        // pass produced. Visibility actions were consumed by phase 3; the
        // rest await their consumers.
        let mut pending: Vec<OutcomeAction> = actions
            .iter()
            .filter(|action| !action.is_visibility())
            .cloned()
            .collect();
        for conflict in &conflicts {
            let auto_applied = conflict.auto_resolution.is_some()
                && conflict.confidence.value() >= self.config.auto_resolve_threshold;
            if auto_applied {
                continue;
            }
            let target = conflict
                .fields
                .first()
                .cloned()
                .unwrap_or_else(|| FieldId::Extra("form".to_string()));
            pending.push(
                OutcomeAction::warn(target, conflict.confidence).with_params(serde_json::json!({
                    "conflict": conflict.id(),
                    "suggestion": conflict.suggested_resolution,
                })),
            );
        }
        progress(PROGRESS_SYNTHESIZED);

        // Phase 7: escalation and assembly.
        let policy = EscalationPolicy::new(self.config.escalation);
        let triggers = policy.triggers(&validation, &conflicts);
        for trigger in &triggers {
            context.uncertainty_flags.push(trigger.flag().to_string());
        }
        context.needs_manual_intervention = !triggers.is_empty();
        context.visible_fields = visibility.visible;
        context.enforce_baseline();
        context.pending_actions = pending;
        context.validation = validation;
        context.detected_conflicts = conflicts;
        progress(PROGRESS_COMPLETE);

        Ok(context)
    }

    fn degraded(
        &self,
        prior: &FormContext,
        at: chrono::DateTime<chrono::Utc>,
        message: &str,
    ) -> FormContext {
        warn!(error = message, "pipeline failed; returning degraded context");

        let mut context = prior.clone();
        context.needs_manual_intervention = true;
        context.updated_at = at;

        let mut validation = ValidationResults::new();
        validation.push(ValidationIssue {
            rule_id: PIPELINE_FAILURE_RULE.to_string(),
            field: None,
            message: format!("field update could not be processed: {message}"),
            severity: Severity::Error,
            ai_hint: None,
            confidence: Confidence::zero(),
        });
        validation.overall_confidence = Confidence::zero();
        context.validation = validation;

        context
    }
}
