//! Tree node entities.

use crate::types::{GroupRef, NodeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse node type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Root,
    Modification,
}

/// Role of a modification node in the study.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModificationNodeType {
    Construction,
    Security,
}

/// Type-specific payload of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Root,
    Modification {
        group_ref: GroupRef,
        node_type: ModificationNodeType,
    },
}

/// One node of the study tree.
///
/// Links are ids into the owning [`super::StudyTree`] arena; nodes never hold references to
/// each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: NodeId,
    pub name: String,
    pub description: Option<String>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub kind: NodeKind,
    pub stashed: bool,
    pub stashed_at: Option<DateTime<Utc>>,
    pub column_position: u32,
}

impl TreeNode {
    pub fn root(id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            parent: None,
            children: Vec::new(),
            kind: NodeKind::Root,
            stashed: false,
            stashed_at: None,
            column_position: 0,
        }
    }

    pub fn modification(
        id: NodeId,
        name: impl Into<String>,
        description: Option<String>,
        group_ref: GroupRef,
        node_type: ModificationNodeType,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            description,
            parent: None,
            children: Vec::new(),
            kind: NodeKind::Modification {
                group_ref,
                node_type,
            },
            stashed: false,
            stashed_at: None,
            column_position: 0,
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self.kind {
            NodeKind::Root => NodeType::Root,
            NodeKind::Modification { .. } => NodeType::Modification,
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self.kind, NodeKind::Root)
    }

    pub fn modification_type(&self) -> Option<ModificationNodeType> {
        match self.kind {
            NodeKind::Root => None,
            NodeKind::Modification { node_type, .. } => Some(node_type),
        }
    }

    pub fn group_ref(&self) -> Option<GroupRef> {
        match self.kind {
            NodeKind::Root => None,
            NodeKind::Modification { group_ref, .. } => Some(group_ref),
        }
    }
}

/// Attributes of a node to be inserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNode {
    pub name: String,
    pub description: Option<String>,
    pub node_type: ModificationNodeType,
}

impl NewNode {
    pub fn construction(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            node_type: ModificationNodeType::Construction,
        }
    }

    pub fn security(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            node_type: ModificationNodeType::Security,
        }
    }
}
