//! Abstract stores for rules and decision trees.
//!
//! The engine never owns its rule set or tree registry; both are injected
//! behind object-safe traits. This keeps global registries out of the crate
//! and lets tests run against isolated in-memory instances. During one
//! processing run a store is treated as a read-only snapshot.

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

use crate::rules::ValidationRule;
use crate::tree::{DecisionTree, TreeId};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Tree not found.
    #[error("Decision tree not found: {0}")]
    TreeNotFound(TreeId),

    /// Backend error.
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Store supplying active validation rules.
pub trait RuleStore: Send + Sync {
    /// Returns every currently active rule.
    fn active_rules(&self) -> Result<Vec<ValidationRule>, StoreError>;
}

/// Store supplying decision trees.
pub trait TreeStore: Send + Sync {
    /// Returns the trees applicable to a form phase.
    fn trees_for_phase(&self, phase: &str) -> Result<Vec<DecisionTree>, StoreError>;

    /// Looks up one tree by ID.
    fn get(&self, id: TreeId) -> Result<Option<DecisionTree>, StoreError>;
}

/// In-memory rule store for embedded use and tests.
#[derive(Debug, Default)]
pub struct InMemoryRuleStore {
    rules: RwLock<Vec<ValidationRule>>,
}

impl InMemoryRuleStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` if the lock is poisoned.
    pub fn insert(&self, rule: ValidationRule) -> Result<(), StoreError> {
        let mut rules = self
            .rules
            .write()
            .map_err(|_| StoreError::Backend("rule store lock poisoned".to_string()))?;
        rules.push(rule);
        Ok(())
    }
}

impl RuleStore for InMemoryRuleStore {
    fn active_rules(&self) -> Result<Vec<ValidationRule>, StoreError> {
        let rules = self
            .rules
            .read()
            .map_err(|_| StoreError::Backend("rule store lock poisoned".to_string()))?;
        Ok(rules.iter().filter(|r| r.active).cloned().collect())
    }
}

/// In-memory tree store for embedded use and tests.
#[derive(Debug, Default)]
pub struct InMemoryTreeStore {
    trees: RwLock<HashMap<TreeId, DecisionTree>>,
}

impl InMemoryTreeStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tree after validating its graph.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` if the tree is malformed or the lock
    /// is poisoned.
    pub fn insert(&self, tree: DecisionTree) -> Result<(), StoreError> {
        tree.validate()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let mut trees = self
            .trees
            .write()
            .map_err(|_| StoreError::Backend("tree store lock poisoned".to_string()))?;
        trees.insert(tree.id, tree);
        Ok(())
    }
}

impl TreeStore for InMemoryTreeStore {
    fn trees_for_phase(&self, phase: &str) -> Result<Vec<DecisionTree>, StoreError> {
        let trees = self
            .trees
            .read()
            .map_err(|_| StoreError::Backend("tree store lock poisoned".to_string()))?;
        let mut applicable: Vec<DecisionTree> = trees
            .values()
            .filter(|t| t.phase == phase)
            .cloned()
            .collect();
        // Deterministic walk order regardless of map iteration order.
        applicable.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(applicable)
    }

    fn get(&self, id: TreeId) -> Result<Option<DecisionTree>, StoreError> {
        let trees = self
            .trees
            .read()
            .map_err(|_| StoreError::Backend("tree store lock poisoned".to_string()))?;
        Ok(trees.get(&id).cloned())
    }
}
