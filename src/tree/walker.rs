//! Traversals over the study tree arena.

use crate::tree::{StudyTree, TreeNode};
use crate::types::NodeId;

/// Iterator over the ancestors of a node, nearest first.
pub struct Ancestors<'a> {
    tree: &'a StudyTree,
    next: Option<NodeId>,
    // Bounded by the arena size so a corrupted snapshot cannot loop forever.
    remaining: usize,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a TreeNode;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let node = self.tree.get(&self.next?)?;
        self.next = node.parent;
        Some(node)
    }
}

/// Ancestors of `node_id`, excluding the node itself.
pub fn ancestors(tree: &StudyTree, node_id: NodeId) -> Ancestors<'_> {
    Ancestors {
        tree,
        next: tree.get(&node_id).and_then(|node| node.parent),
        remaining: tree.len(),
    }
}

/// Node ids of the subtree rooted at `node_id`, in pre-order (the root of the subtree first,
/// siblings in child order).
pub fn subtree(tree: &StudyTree, node_id: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    if !tree.contains(&node_id) {
        return out;
    }
    let mut stack = vec![node_id];
    while let Some(id) = stack.pop() {
        out.push(id);
        if let Some(node) = tree.get(&id) {
            stack.extend(node.children.iter().rev().copied());
        }
    }
    out
}

/// Whether `candidate` is `subtree_root` or one of its descendants.
pub fn is_in_subtree(tree: &StudyTree, subtree_root: NodeId, candidate: NodeId) -> bool {
    candidate == subtree_root || ancestors(tree, candidate).any(|node| node.id == subtree_root)
}

/// Ids from the root down to `node_id`, both included.
pub fn path_from_root(tree: &StudyTree, node_id: NodeId) -> Vec<NodeId> {
    let mut path: Vec<NodeId> = ancestors(tree, node_id).map(|node| node.id).collect();
    path.reverse();
    path.push(node_id);
    path
}

pub fn depth(tree: &StudyTree, node_id: NodeId) -> usize {
    ancestors(tree, node_id).count()
}
