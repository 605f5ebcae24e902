//! Node aliases: stable user-facing names pointing at a node of the study.

use crate::error::ApiError;
use crate::types::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasTarget {
    pub node_id: NodeId,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAlias {
    pub alias: String,
    pub target: Option<AliasTarget>,
}

/// Alias string -> optional target. Targets are cleared, never the alias itself, when the node
/// leaves the live tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AliasIndex {
    entries: BTreeMap<String, Option<AliasTarget>>,
}

impl AliasIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn checked_alias(alias: &str) -> Result<String, ApiError> {
        let alias = alias.trim();
        if alias.is_empty() {
            return Err(ApiError::BadRequest("alias cannot be empty".to_string()));
        }
        Ok(alias.to_string())
    }

    pub fn create(&mut self, alias: &str, target: Option<AliasTarget>) -> Result<(), ApiError> {
        let alias = Self::checked_alias(alias)?;
        if self.entries.contains_key(&alias) {
            return Err(ApiError::BadRequest(format!("alias '{}' already exists", alias)));
        }
        self.entries.insert(alias, target);
        Ok(())
    }

    pub fn update(&mut self, alias: &str, target: Option<AliasTarget>) -> Result<(), ApiError> {
        let slot = self
            .entries
            .get_mut(alias.trim())
            .ok_or_else(|| ApiError::AliasNotFound(alias.to_string()))?;
        *slot = target;
        Ok(())
    }

    pub fn delete(&mut self, alias: &str) -> Result<(), ApiError> {
        self.entries
            .remove(alias.trim())
            .map(|_| ())
            .ok_or_else(|| ApiError::AliasNotFound(alias.to_string()))
    }

    pub fn resolve(&self, alias: &str) -> Result<Option<&AliasTarget>, ApiError> {
        self.entries
            .get(alias.trim())
            .map(Option::as_ref)
            .ok_or_else(|| ApiError::AliasNotFound(alias.to_string()))
    }

    pub fn list(&self) -> Vec<NodeAlias> {
        self.entries
            .iter()
            .map(|(alias, target)| NodeAlias {
                alias: alias.clone(),
                target: target.clone(),
            })
            .collect()
    }

    /// Clear every alias pointing at one of `nodes`, returning the affected alias strings.
    pub fn detach_nodes(&mut self, nodes: &HashSet<NodeId>) -> Vec<String> {
        let mut cleared = Vec::new();
        for (alias, target) in self.entries.iter_mut() {
            if target.as_ref().map_or(false, |t| nodes.contains(&t.node_id)) {
                *target = None;
                cleared.push(alias.clone());
            }
        }
        cleared
    }

    pub fn rename_node(&mut self, node_id: NodeId, display_name: &str) {
        for target in self.entries.values_mut().flatten() {
            if target.node_id == node_id {
                target.display_name = display_name.to_string();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
