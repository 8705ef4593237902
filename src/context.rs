//! Session state for one in-progress adaptive form.
//!
//! A `FormContext` is owned by exactly one user session and mutated only by
//! the orchestrator: each processed field update produces a new context, the
//! prior one is never edited in place. Contexts expire after a fixed
//! retention window and carry everything the form UI needs to render the
//! next step: visible fields, inferred values with per-field confidence,
//! validation findings, detected conflicts, and the manual-intervention
//! flag.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::confidence::Confidence;
use crate::conflict::DataConflict;
use crate::error::{EngineResult, ExecutionError};
use crate::field::{FieldId, FieldMap, FieldUpdate};
use crate::rules::ValidationResults;
use crate::tree::OutcomeAction;
use crate::visibility::baseline_fields;

/// How long a context stays usable after its last update.
pub const RETENTION_HOURS: i64 = 24;

/// Unique identifier for a form session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Creates a new random session ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of one in-progress multi-step form session.
///
/// All maps and sets are ordered (`BTreeMap`/`BTreeSet`), so the JSON
/// encoding of a context is canonical and `fingerprint` is stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormContext {
    /// The owning user.
    pub user_id: String,

    /// This session.
    pub session_id: SessionId,

    /// The form phase currently being filled in.
    pub current_phase: String,

    /// Sections the user has finished, in completion order.
    pub completed_sections: Vec<String>,

    /// Fields the UI should currently render. Always a superset of
    /// `baseline_fields()`.
    pub visible_fields: BTreeSet<FieldId>,

    /// Field values, both user-entered and inferred.
    pub inferred_data: FieldMap,

    /// Per-field confidence in the stored value.
    pub field_confidence: BTreeMap<FieldId, Confidence>,

    /// Free-form flags recording where the engine was unsure.
    pub uncertainty_flags: Vec<String>,

    /// Outcome actions awaiting a consumer (calculations, validations,
    /// warnings).
    pub pending_actions: Vec<OutcomeAction>,

    /// Latest validation findings.
    pub validation: ValidationResults,

    /// Conflicts detected in the latest pass.
    pub detected_conflicts: Vec<DataConflict>,

    /// True when a human must review this session before automation
    /// continues.
    pub needs_manual_intervention: bool,

    /// When the session started.
    pub created_at: DateTime<Utc>,

    /// When the session last changed.
    pub updated_at: DateTime<Utc>,
}

impl FormContext {
    /// Creates a fresh context with the baseline fields visible.
    #[must_use]
    pub fn new(user_id: impl Into<String>, phase: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            session_id: SessionId::new(),
            current_phase: phase.into(),
            completed_sections: Vec::new(),
            visible_fields: baseline_fields().iter().cloned().collect(),
            inferred_data: FieldMap::new(),
            field_confidence: BTreeMap::new(),
            uncertainty_flags: Vec::new(),
            pending_actions: Vec::new(),
            validation: ValidationResults::new(),
            detected_conflicts: Vec::new(),
            needs_manual_intervention: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reads a field value.
    #[must_use]
    pub fn field(&self, field: &FieldId) -> Option<&crate::value::FieldValue> {
        self.inferred_data.get(field)
    }

    /// Merges one update into the field data.
    ///
    /// The update's timestamp becomes `updated_at`, which keeps a processing
    /// run a pure function of its inputs.
    pub fn apply_update(&mut self, update: &FieldUpdate) {
        self.inferred_data
            .insert(update.field.clone(), update.value.clone());
        self.field_confidence
            .insert(update.field.clone(), update.source.confidence());
        self.updated_at = update.timestamp;
    }

    /// Returns true if the retention window has elapsed at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.updated_at > Duration::hours(RETENTION_HOURS)
    }

    /// Restores the visible-set invariant: baseline fields are always
    /// visible, whatever the trees and rules decided.
    pub fn enforce_baseline(&mut self) {
        for field in baseline_fields() {
            self.visible_fields.insert(field.clone());
        }
    }

    /// Content fingerprint: blake3 over the canonical JSON encoding.
    ///
    /// Two contexts with the same content always produce the same
    /// fingerprint, which is how the worker path proves it matched the
    /// in-process path.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::Serialization` if the context cannot be
    /// encoded.
    pub fn fingerprint(&self) -> EngineResult<String> {
        let encoded = serde_json::to_vec(self).map_err(|e| ExecutionError::Serialization {
            message: e.to_string(),
        })?;
        Ok(blake3::hash(&encoded).to_hex().to_string())
    }
}
