//! Decision trees and their traversal.
//!
//! A decision tree is a named, versioned graph of question nodes. Walking
//! one against the current field values yields outcome actions (show or
//! hide a field, request a calculation, raise a warning) and a running
//! confidence score. Trees are immutable once loaded; the walker holds all
//! traversal state per walk, so one tree can be walked concurrently.
//!
//! Traversal is defensive by construction: a revisited node ends the walk
//! silently, a confidence drop below the floor ends it, and an evaluation
//! failure applies the tree's declared fallback strategy while honoring the
//! actions collected before the failure.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::condition::Condition;
use crate::confidence::Confidence;
use crate::error::ValidationError;
use crate::field::{FieldId, FieldMap};

/// Confidence floor below which traversal stops.
pub const DEFAULT_CONFIDENCE_FLOOR: f32 = 0.7;

/// Unique identifier for a decision tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TreeId(Uuid);

impl TreeId {
    /// Creates a new random tree ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TreeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a node within one tree. Trees are authored by hand, so
/// node ids are human-chosen strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Wraps a node name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The effect an outcome action has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    ShowField,
    HideField,
    Calculate,
    Validate,
    Warn,
    Error,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShowField => write!(f, "show_field"),
            Self::HideField => write!(f, "hide_field"),
            Self::Calculate => write!(f, "calculate"),
            Self::Validate => write!(f, "validate"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One discrete effect produced by tree evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeAction {
    /// What the action does.
    pub kind: ActionKind,

    /// The field it targets.
    pub target: FieldId,

    /// Free-form parameters for the consumer.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub params: serde_json::Value,

    /// Confidence in this action.
    pub confidence: Confidence,
}

impl OutcomeAction {
    /// Creates an action with no parameters.
    #[must_use]
    pub fn new(kind: ActionKind, target: FieldId, confidence: Confidence) -> Self {
        Self {
            kind,
            target,
            params: serde_json::Value::Null,
            confidence,
        }
    }

    /// Creates a show-field action.
    #[must_use]
    pub fn show(target: FieldId, confidence: Confidence) -> Self {
        Self::new(ActionKind::ShowField, target, confidence)
    }

    /// Creates a hide-field action.
    #[must_use]
    pub fn hide(target: FieldId, confidence: Confidence) -> Self {
        Self::new(ActionKind::HideField, target, confidence)
    }

    /// Creates a warn action.
    #[must_use]
    pub fn warn(target: FieldId, confidence: Confidence) -> Self {
        Self::new(ActionKind::Warn, target, confidence)
    }

    /// Sets the parameter payload.
    #[must_use]
    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    /// Returns true if this action changes field visibility.
    #[must_use]
    pub const fn is_visibility(&self) -> bool {
        matches!(self.kind, ActionKind::ShowField | ActionKind::HideField)
    }
}

/// One conditional edge out of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    /// The condition selecting this branch.
    pub condition: Condition,

    /// Actions yielded when the branch is taken.
    #[serde(default)]
    pub actions: Vec<OutcomeAction>,

    /// The node to move to, or none for a leaf branch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<NodeId>,
}

impl Branch {
    /// Creates a leaf branch.
    #[must_use]
    pub fn leaf(condition: Condition, actions: Vec<OutcomeAction>) -> Self {
        Self {
            condition,
            actions,
            next: None,
        }
    }

    /// Creates a branch that continues to another node.
    #[must_use]
    pub fn to(condition: Condition, actions: Vec<OutcomeAction>, next: impl Into<NodeId>) -> Self {
        Self {
            condition,
            actions,
            next: Some(next.into()),
        }
    }
}

/// One question node. Branches are tried in order; the first whose
/// condition holds is taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionNode {
    /// Node identifier, unique within the tree.
    pub id: NodeId,

    /// The question this node answers.
    pub question: String,

    /// The field the question is about.
    pub field: FieldId,

    /// Conditional edges, tried in order.
    pub branches: Vec<Branch>,

    /// The node's own confidence, multiplied into the running score.
    pub confidence: Confidence,

    /// Validation rules that apply when this node is reached.
    #[serde(default)]
    pub rule_ids: Vec<String>,
}

impl DecisionNode {
    /// Creates a node.
    #[must_use]
    pub fn new(
        id: impl Into<NodeId>,
        question: impl Into<String>,
        field: FieldId,
        confidence: Confidence,
    ) -> Self {
        Self {
            id: id.into(),
            question: question.into(),
            field,
            branches: Vec::new(),
            confidence,
            rule_ids: Vec::new(),
        }
    }

    /// Adds a branch.
    #[must_use]
    pub fn with_branch(mut self, branch: Branch) -> Self {
        self.branches.push(branch);
        self
    }

    /// Attaches applicable validation rule ids.
    #[must_use]
    pub fn with_rules<S: Into<String>>(mut self, rule_ids: impl IntoIterator<Item = S>) -> Self {
        self.rule_ids.extend(rule_ids.into_iter().map(Into::into));
        self
    }
}

/// What a walk does when the tree itself fails mid-traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Keep only the actions collected before the failure.
    Conservative,

    /// Additionally reveal every field the tree asks about, so the user
    /// can answer manually what the tree failed to infer.
    ShowAll,

    /// Raise a warn action so the escalation policy flags the session.
    Escalate,
}

impl fmt::Display for FallbackStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conservative => write!(f, "conservative"),
            Self::ShowAll => write!(f, "show_all"),
            Self::Escalate => write!(f, "escalate"),
        }
    }
}

/// A named, versioned condition→action graph. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Unique tree ID.
    pub id: TreeId,

    /// Human-readable tree name.
    pub name: String,

    /// Version of this tree definition.
    pub version: u32,

    /// The form phase this tree applies to.
    pub phase: String,

    /// The entry node.
    pub root: NodeId,

    /// All nodes, keyed by id.
    pub nodes: BTreeMap<NodeId, DecisionNode>,

    /// Natural-language prompt describing the tree's intent.
    #[serde(default)]
    pub prompt: String,

    /// Rules that must never be violated while this tree applies.
    #[serde(default)]
    pub critical_rules: Vec<String>,

    /// Mistakes applicants commonly make in this area.
    #[serde(default)]
    pub common_mistakes: Vec<String>,

    /// What to do when traversal fails.
    pub fallback: FallbackStrategy,
}

impl DecisionTree {
    /// Creates a tree rooted at the given node.
    #[must_use]
    pub fn new(name: impl Into<String>, phase: impl Into<String>, root: DecisionNode) -> Self {
        let root_id = root.id.clone();
        let mut nodes = BTreeMap::new();
        nodes.insert(root_id.clone(), root);
        Self {
            id: TreeId::new(),
            name: name.into(),
            version: 1,
            phase: phase.into(),
            root: root_id,
            nodes,
            prompt: String::new(),
            critical_rules: Vec::new(),
            common_mistakes: Vec::new(),
            fallback: FallbackStrategy::Conservative,
        }
    }

    /// Adds a node.
    #[must_use]
    pub fn with_node(mut self, node: DecisionNode) -> Self {
        self.nodes.insert(node.id.clone(), node);
        self
    }

    /// Sets the fallback strategy.
    #[must_use]
    pub fn with_fallback(mut self, fallback: FallbackStrategy) -> Self {
        self.fallback = fallback;
        self
    }

    /// Sets the prompt text.
    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Checks that the graph is well-formed: the root exists and every
    /// branch target resolves to a node.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidTree` on a dangling reference.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.nodes.contains_key(&self.root) {
            return Err(ValidationError::InvalidTree {
                name: self.name.clone(),
                reason: format!("root node '{}' does not exist", self.root),
            });
        }
        for node in self.nodes.values() {
            for branch in &node.branches {
                if let Some(next) = &branch.next {
                    if !self.nodes.contains_key(next) {
                        return Err(ValidationError::InvalidTree {
                            name: self.name.clone(),
                            reason: format!(
                                "node '{}' branches to missing node '{next}'",
                                node.id
                            ),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// The result of walking one tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeWalk {
    /// The walked tree.
    pub tree_id: TreeId,

    /// Its name, for flags and logs.
    pub tree_name: String,

    /// Actions collected along the taken path.
    pub actions: Vec<OutcomeAction>,

    /// The running confidence when the walk ended.
    pub confidence: Confidence,

    /// True if the walk reached a leaf normally (no cycle, no floor stop,
    /// no fallback).
    pub completed: bool,

    /// The fallback applied, if traversal failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_applied: Option<FallbackStrategy>,
}

/// Walks decision trees against a field map.
#[derive(Debug, Clone, Copy)]
pub struct TreeWalker {
    confidence_floor: f32,
}

impl TreeWalker {
    /// Creates a walker that stops traversal at the given confidence floor.
    #[must_use]
    pub const fn new(confidence_floor: f32) -> Self {
        Self { confidence_floor }
    }

    /// Walks one tree. Never fails: traversal problems end the walk or
    /// apply the tree's fallback.
    #[must_use]
    pub fn walk(&self, tree: &DecisionTree, fields: &FieldMap) -> TreeWalk {
        let mut visited: HashSet<&NodeId> = HashSet::new();
        let mut actions: Vec<OutcomeAction> = Vec::new();
        let mut confidence = Confidence::one();
        let mut completed = false;
        let mut fallback_applied = None;
        let mut current = Some(&tree.root);

        while let Some(node_id) = current {
            if !visited.insert(node_id) {
                // Revisiting a node means the graph loops. End the walk and
                // keep what was collected.
                debug!(tree = %tree.name, node = %node_id, "cycle detected; ending walk");
                break;
            }

            let Some(node) = tree.nodes.get(node_id) else {
                debug!(tree = %tree.name, node = %node_id, fallback = %tree.fallback,
                       "branch target missing; applying fallback");
                fallback_applied = Some(tree.fallback);
                apply_fallback(tree, confidence, &mut actions);
                break;
            };

            let mut next = None;
            let mut matched = false;
            let mut failed = false;
            for branch in &node.branches {
                match branch.condition.evaluate(fields) {
                    Ok(true) => {
                        actions.extend(branch.actions.iter().cloned());
                        next = branch.next.as_ref();
                        matched = true;
                        break;
                    }
                    Ok(false) => {}
                    Err(err) => {
                        debug!(tree = %tree.name, node = %node_id, error = %err,
                               fallback = %tree.fallback, "branch evaluation failed; applying fallback");
                        fallback_applied = Some(tree.fallback);
                        apply_fallback(tree, confidence, &mut actions);
                        failed = true;
                        break;
                    }
                }
            }
            if failed {
                break;
            }

            confidence = confidence.decay(node.confidence.value());

            if !matched || next.is_none() {
                completed = true;
                break;
            }
            if confidence.value() <= self.confidence_floor {
                break;
            }
            current = next;
        }

        TreeWalk {
            tree_id: tree.id,
            tree_name: tree.name.clone(),
            actions,
            confidence,
            completed,
            fallback_applied,
        }
    }

    /// Walks each tree independently.
    #[must_use]
    pub fn walk_all(&self, trees: &[DecisionTree], fields: &FieldMap) -> Vec<TreeWalk> {
        trees.iter().map(|tree| self.walk(tree, fields)).collect()
    }
}

impl Default for TreeWalker {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_FLOOR)
    }
}

fn apply_fallback(tree: &DecisionTree, confidence: Confidence, actions: &mut Vec<OutcomeAction>) {
    match tree.fallback {
        FallbackStrategy::Conservative => {}
        FallbackStrategy::ShowAll => {
            for node in tree.nodes.values() {
                actions.push(OutcomeAction::show(node.field.clone(), confidence));
            }
        }
        FallbackStrategy::Escalate => {
            if let Some(root) = tree.nodes.get(&tree.root) {
                actions.push(
                    OutcomeAction::warn(root.field.clone(), confidence).with_params(
                        serde_json::json!({ "tree": tree.name, "reason": "traversal_failed" }),
                    ),
                );
            }
        }
    }
}

/// Collapses duplicate actions: the same kind against the same target keeps
/// only the highest-confidence instance, at its first position.
#[must_use]
pub fn dedupe_actions(actions: impl IntoIterator<Item = OutcomeAction>) -> Vec<OutcomeAction> {
    let mut deduped: Vec<OutcomeAction> = Vec::new();
    let mut index: HashMap<(ActionKind, FieldId), usize> = HashMap::new();

    for action in actions {
        let key = (action.kind, action.target.clone());
        match index.get(&key) {
            Some(&i) => {
                if action.confidence.value() > deduped[i].confidence.value() {
                    deduped[i] = action;
                }
            }
            None => {
                index.insert(key, deduped.len());
                deduped.push(action);
            }
        }
    }

    deduped
}
