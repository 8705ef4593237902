//! # Aidflow - Adaptive Form Decision Engine
//!
//! Aidflow decides what a financial-aid form should do next. Given one
//! field update and the session's prior state, it walks decision trees to
//! infer which fields to reveal, validates the data against declarative
//! rules, detects cross-field conflicts (auto-resolving only the
//! unambiguous ones), and decides whether a human needs to look before
//! automation continues.
//!
//! ## Core Concepts
//!
//! - **FormContext**: session-scoped state for one in-progress form,
//!   replaced wholesale on every processed update
//! - **DecisionTree**: condition→action graph inferring which fields to
//!   show next, walked with a confidence floor and a cycle guard
//! - **DataConflict**: a detected inconsistency between field values, with
//!   confidence-gated automatic resolution
//! - **Escalation**: a conservative OR of triggers that flags a session
//!   for human review
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use aidflow::{
//!     DecisionEngine, FieldId, FieldUpdate, FormContext, InMemoryRuleStore,
//!     InMemoryTreeStore,
//! };
//!
//! let engine = DecisionEngine::new(
//!     Arc::new(InMemoryRuleStore::new()),
//!     Arc::new(InMemoryTreeStore::new()),
//! );
//!
//! let context = FormContext::new("user-1", "education");
//! let update = FieldUpdate::from_user(FieldId::Country, "Canada");
//!
//! // Never fails: on any internal error the context comes back degraded
//! // with `needs_manual_intervention` set.
//! let next = engine.process_update(update, &context);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod condition;
pub mod confidence;
pub mod conflict;
pub mod context;
pub mod error;
pub mod field;
pub mod rules;
pub mod tree;
pub mod value;

// Policies and calculation passes
pub mod escalation;
pub mod visibility;

// Stores and orchestration
pub mod engine;
pub mod store;

// Re-export primary types at crate root for convenience
pub use condition::{Condition, ConditionError};
pub use confidence::Confidence;
pub use conflict::{AutoResolution, ConflictDetector, ConflictKind, DataConflict};
pub use context::{FormContext, SessionId, RETENTION_HOURS};
pub use engine::worker::{
    EngineWorker, PendingRequest, RequestId, WorkerConfig, WorkerOutput, WorkerReply,
    WorkerRequest,
};
pub use engine::{DecisionEngine, EngineConfig, PIPELINE_FAILURE_RULE};
pub use error::{EngineError, EngineResult, ExecutionError, ValidationError, WorkerError};
pub use escalation::{EscalationPolicy, EscalationThresholds, EscalationTrigger};
pub use field::{FieldId, FieldMap, FieldUpdate, UpdateSource};
pub use rules::{evaluate_rules, Severity, ValidationIssue, ValidationResults, ValidationRule};
pub use store::{InMemoryRuleStore, InMemoryTreeStore, RuleStore, StoreError, TreeStore};
pub use tree::{
    dedupe_actions, ActionKind, Branch, DecisionNode, DecisionTree, FallbackStrategy, NodeId,
    OutcomeAction, TreeId, TreeWalk, TreeWalker,
};
pub use value::FieldValue;
pub use visibility::{baseline_fields, VisibilityCalculator, VisibilityOutcome};
