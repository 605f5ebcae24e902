//! Node-type adjacency rules enforced when a node is inserted or moved.

use crate::error::ApiError;
use crate::tree::{walker, ModificationNodeType, StudyTree, TreeNode};
use crate::types::NodeId;
use serde::{Deserialize, Serialize};

/// Where a node lands relative to a reference node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InsertMode {
    /// Take the reference's place; the reference becomes a child of the new node.
    Before,
    /// Become the only child of the reference, adopting its former children.
    After,
    /// Become an extra child of the reference.
    Child,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Neighbour {
    Root,
    RootLevelConstruction,
    Construction,
    Security,
}

fn classify(tree: &StudyTree, node: &TreeNode) -> Neighbour {
    match node.modification_type() {
        None => Neighbour::Root,
        Some(ModificationNodeType::Security) => Neighbour::Security,
        Some(ModificationNodeType::Construction) => {
            let under_security = walker::ancestors(tree, node.id)
                .any(|a| a.modification_type() == Some(ModificationNodeType::Security));
            if under_security {
                Neighbour::Construction
            } else {
                Neighbour::RootLevelConstruction
            }
        }
    }
}

/// Check that a node of type `candidate` may be placed relative to `reference`.
///
/// `moving` is the subtree being relocated, if any; it is ignored as a neighbour and the
/// reference may not lie inside it.
pub fn check_placement(
    tree: &StudyTree,
    candidate: ModificationNodeType,
    reference: NodeId,
    mode: InsertMode,
    moving: Option<NodeId>,
) -> Result<(), ApiError> {
    let reference_node = tree.live_node(reference)?;

    if let Some(moving) = moving {
        if walker::is_in_subtree(tree, moving, reference) {
            return Err(ApiError::InvalidNodeInsertion(
                "a node cannot be moved relative to its own subtree".to_string(),
            ));
        }
    }

    let neighbours: Vec<&TreeNode> = match mode {
        InsertMode::Child => return Ok(()),
        InsertMode::Before => {
            let parent = reference_node
                .parent
                .ok_or(ApiError::RootMutationForbidden("preceded by another node"))?;
            let mut list = vec![reference_node];
            if Some(parent) != moving {
                list.push(tree.node(parent)?);
            }
            list
        }
        InsertMode::After => {
            let mut list = vec![reference_node];
            for child in &reference_node.children {
                if Some(*child) != moving {
                    list.push(tree.node(*child)?);
                }
            }
            list
        }
    };

    for neighbour in neighbours {
        let class = classify(tree, neighbour);
        let rejected = match candidate {
            ModificationNodeType::Construction => class == Neighbour::Security,
            ModificationNodeType::Security => {
                matches!(class, Neighbour::Root | Neighbour::RootLevelConstruction)
            }
        };
        if rejected {
            return Err(ApiError::InvalidNodeInsertion(format!(
                "a {:?} node cannot be placed {:?} node '{}' ({:?} neighbour)",
                candidate, mode, neighbour.name, class
            )));
        }
    }
    Ok(())
}
