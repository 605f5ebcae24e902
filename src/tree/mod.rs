//! Study Tree
//!
//! Id-keyed arena holding the root node and every modification node of one study. Parent and
//! child links are plain ids; stashed subtrees stay in the arena with their top node detached.

pub mod adjacency;
pub mod node;
pub mod walker;

pub use adjacency::{check_placement, InsertMode};
pub use node::{ModificationNodeType, NewNode, NodeKind, NodeType, TreeNode};

use crate::error::ApiError;
use crate::types::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyTree {
    root: NodeId,
    nodes: HashMap<NodeId, TreeNode>,
}

impl StudyTree {
    pub fn new(root_id: NodeId, root_name: &str) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(root_id, TreeNode::root(root_id, root_name));
        Self {
            root: root_id,
            nodes,
        }
    }

    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, node_id: &NodeId) -> Option<&TreeNode> {
        self.nodes.get(node_id)
    }

    /// Any node of the arena, stashed ones included.
    pub fn node(&self, node_id: NodeId) -> Result<&TreeNode, ApiError> {
        self.nodes
            .get(&node_id)
            .ok_or(ApiError::NodeNotFound(node_id))
    }

    pub(crate) fn node_mut(&mut self, node_id: NodeId) -> Result<&mut TreeNode, ApiError> {
        self.nodes
            .get_mut(&node_id)
            .ok_or(ApiError::NodeNotFound(node_id))
    }

    /// A node reachable from the root. Stashed nodes are reported as not found.
    pub fn live_node(&self, node_id: NodeId) -> Result<&TreeNode, ApiError> {
        let node = self.node(node_id)?;
        if self.is_live(node_id) {
            Ok(node)
        } else {
            Err(ApiError::NodeNotFound(node_id))
        }
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.nodes.contains_key(node_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes.values()
    }

    pub fn is_live(&self, node_id: NodeId) -> bool {
        if node_id == self.root {
            return true;
        }
        match self.nodes.get(&node_id) {
            Some(node) if !node.stashed => walker::ancestors(self, node_id)
                .last()
                .map_or(false, |top| top.id == self.root),
            _ => false,
        }
    }

    /// Add a node without linking it anywhere.
    pub(crate) fn add_detached(&mut self, mut node: TreeNode) {
        node.parent = None;
        self.nodes.insert(node.id, node);
    }

    /// Link `child` under `parent`, at `index` among its siblings or last.
    pub(crate) fn attach(
        &mut self,
        parent: NodeId,
        child: NodeId,
        index: Option<usize>,
    ) -> Result<(), ApiError> {
        if !self.nodes.contains_key(&child) {
            return Err(ApiError::NodeNotFound(child));
        }
        let parent_node = self.node_mut(parent)?;
        let at = index
            .unwrap_or(parent_node.children.len())
            .min(parent_node.children.len());
        parent_node.children.insert(at, child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Unlink a node from its parent, returning the former parent and sibling index.
    pub(crate) fn detach(&mut self, node_id: NodeId) -> Option<(NodeId, usize)> {
        let parent = self.nodes.get_mut(&node_id)?.parent.take()?;
        let siblings = &mut self.nodes.get_mut(&parent)?.children;
        let index = siblings.iter().position(|id| *id == node_id)?;
        siblings.remove(index);
        Some((parent, index))
    }

    /// Drop a node from the arena. Links must already have been rewired by the caller.
    pub(crate) fn remove(&mut self, node_id: NodeId) -> Option<TreeNode> {
        if node_id == self.root {
            return None;
        }
        self.nodes.remove(&node_id)
    }

    /// Whether another node of the study already uses `name` (after normalization).
    pub fn name_taken(&self, name: &str, except: Option<NodeId>) -> bool {
        let wanted: String = name.trim().nfc().collect();
        self.nodes.values().any(|node| {
            Some(node.id) != except && node.name.trim().nfc().collect::<String>() == wanted
        })
    }

    /// Validate and normalize a node name for this study.
    pub fn checked_name(&self, name: &str, except: Option<NodeId>) -> Result<String, ApiError> {
        let normalized: String = name.trim().nfc().collect();
        if normalized.is_empty() {
            return Err(ApiError::NodeNameInvalid("name cannot be empty".to_string()));
        }
        if self.name_taken(&normalized, except) {
            return Err(ApiError::NodeNameInvalid(format!(
                "name '{}' is already used in this study",
                normalized
            )));
        }
        Ok(normalized)
    }

    /// First `"{prefix} {n}"` name not used in the study.
    pub fn unique_name(&self, prefix: &str) -> String {
        let prefix = prefix.trim();
        (1..)
            .map(|n| format!("{} {}", prefix, n))
            .find(|candidate| !self.name_taken(candidate, None))
            .unwrap_or_else(|| prefix.to_string())
    }
}
