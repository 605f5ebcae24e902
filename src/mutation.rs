//! Tree Mutation Service
//!
//! Structural operations on a study tree. Every operation validates first and mutates the arena
//! under one write lock, so a rejected request leaves the tree untouched. Invalidation and
//! notifications follow once the lock is released.

use crate::error::ApiError;
use crate::invalidation::{
    CleanupHandle, CleanupTask, InvalidationEngine, InvalidationReport, InvalidationScope,
};
use crate::notification::{ElementUpdate, NotificationBus, StudyUpdate, UpdateType};
use crate::overlay::Overlay;
use crate::remote::RemoteClients;
use crate::study::{RootNetwork, Study, StudyRegistry};
use crate::tree::{check_placement, walker, InsertMode, NewNode, StudyTree, TreeNode};
use crate::types::{GroupRef, NodeId, RootNetworkId, StudyId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of stashing a node or subtree.
#[derive(Debug)]
pub struct StashReport {
    pub stashed: Vec<NodeId>,
    pub cleared_aliases: Vec<String>,
    pub invalidation: InvalidationReport,
}

/// Result of a deletion.
#[derive(Debug)]
pub struct DeleteReport {
    pub deleted: Vec<NodeId>,
    pub cleared_aliases: Vec<String>,
    pub invalidation: InvalidationReport,
    pub cleanup: CleanupHandle,
}

/// Top-level node of a stashed subtree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StashedNode {
    pub node: TreeNode,
    pub stashed_at: Option<DateTime<Utc>>,
    pub descendants: usize,
}

#[derive(Clone)]
pub struct TreeMutationService {
    studies: Arc<StudyRegistry>,
    remote: RemoteClients,
    bus: NotificationBus,
    invalidation: InvalidationEngine,
}

impl TreeMutationService {
    pub fn new(
        studies: Arc<StudyRegistry>,
        remote: RemoteClients,
        bus: NotificationBus,
        invalidation: InvalidationEngine,
    ) -> Self {
        Self {
            studies,
            remote,
            bus,
            invalidation,
        }
    }

    fn notify(&self, study_id: StudyId, update: StudyUpdate, user: &str) {
        self.bus.publish(update);
        self.bus.audit(ElementUpdate::with_now(study_id, user));
    }

    /// Create a study holding a root node and one built root row per root network.
    pub fn create_root(
        &self,
        root_networks: Vec<RootNetwork>,
        user: &str,
    ) -> Result<Arc<Study>, ApiError> {
        let study = self.studies.insert(Study::new(Uuid::new_v4(), root_networks)?);
        let root = study.root_id();
        info!(study_id = %study.id, root_id = %root, "Study created");
        self.notify(
            study.id,
            StudyUpdate::with_now(study.id, UpdateType::NodeCreated, vec![root]),
            user,
        );
        Ok(study)
    }

    /// Attach a root network to a study, seeding one row per existing node.
    pub fn add_root_network(
        &self,
        study_id: StudyId,
        root_network: RootNetwork,
        user: &str,
    ) -> Result<RootNetworkId, ApiError> {
        let study = self.studies.get(study_id)?;
        let tree = study.tree.read();
        {
            let mut root_networks = study.root_networks.write();
            if root_networks.iter().any(|rn| rn.id == root_network.id) {
                return Err(ApiError::BadRequest(format!(
                    "root network {} already belongs to the study",
                    root_network.id
                )));
            }
            root_networks.push(root_network.clone());
        }
        for node in tree.nodes() {
            let row = if node.is_root() {
                Overlay::for_root(node.id, root_network.id)
            } else {
                Overlay::for_modification(node.id, root_network.id)
            };
            study.overlays.seed(row);
        }
        drop(tree);
        info!(study_id = %study_id, root_network_id = %root_network.id, "Root network added");
        self.notify(
            study_id,
            StudyUpdate::with_now(study_id, UpdateType::RootNetworkAdded, Vec::new())
                .on_root_network(root_network.id),
            user,
        );
        Ok(root_network.id)
    }

    /// Detach a root network, dropping its rows and cleaning their remote results.
    pub fn remove_root_network(
        &self,
        study_id: StudyId,
        root_network_id: RootNetworkId,
        user: &str,
    ) -> Result<CleanupHandle, ApiError> {
        let study = self.studies.get(study_id)?;
        {
            let mut root_networks = study.root_networks.write();
            let index = root_networks
                .iter()
                .position(|rn| rn.id == root_network_id)
                .ok_or(ApiError::RootNetworkNotFound(root_network_id))?;
            if root_networks.len() == 1 {
                return Err(ApiError::BadRequest(
                    "a study keeps at least one root network".to_string(),
                ));
            }
            root_networks.remove(index);
        }
        let mut tasks = Vec::new();
        if let Some((active, _)) = study
            .build_slot
            .finish_if(|b| b.root_network_id == root_network_id, |_| ())
        {
            tasks.push(CleanupTask::StopBuild(active.build_id));
        }
        let rows = study.overlays.remove_root_network(root_network_id);
        info!(
            study_id = %study_id,
            root_network_id = %root_network_id,
            rows = rows.len(),
            "Root network removed"
        );
        self.notify(
            study_id,
            StudyUpdate::with_now(study_id, UpdateType::RootNetworkRemoved, Vec::new())
                .on_root_network(root_network_id),
            user,
        );
        let mut handle = self.invalidation.release_rows(&rows);
        if !tasks.is_empty() {
            let stop = self.invalidation.spawn_cleanup(tasks);
            handle = CleanupHandle::merge(handle, stop);
        }
        Ok(handle)
    }

    /// Insert a new modification node relative to `reference`.
    ///
    /// New nodes start with an empty modification group, so nodes placed below them keep their
    /// content and stay built.
    pub fn insert(
        &self,
        study_id: StudyId,
        new_node: NewNode,
        reference: NodeId,
        mode: InsertMode,
        user: &str,
    ) -> Result<TreeNode, ApiError> {
        let study = self.studies.get(study_id)?;
        let node = {
            let mut tree = study.tree.write();
            let name = tree.checked_name(&new_node.name, None)?;
            check_placement(&tree, new_node.node_type, reference, mode, None)?;

            let node = TreeNode::modification(
                Uuid::new_v4(),
                name,
                new_node.description,
                Uuid::new_v4(),
                new_node.node_type,
            );
            let id = node.id;
            tree.add_detached(node);
            place(&mut tree, id, reference, mode)?;
            tree.node(id)?.clone()
        };
        study.seed_node_overlays(node.id);

        info!(study_id = %study_id, node_id = %node.id, mode = ?mode, "Node inserted");
        self.notify(
            study_id,
            StudyUpdate::with_now(study_id, UpdateType::NodeCreated, vec![node.id]).with_payload(
                json!({ "parent": node.parent, "reference": reference, "mode": mode }),
            ),
            user,
        );
        Ok(node)
    }

    /// Move the subtree rooted at `node_id` relative to `target`.
    ///
    /// The moved subtree, and whatever ends up below it, loses its built state.
    pub fn move_subtree(
        &self,
        study_id: StudyId,
        node_id: NodeId,
        target: NodeId,
        mode: InsertMode,
        user: &str,
    ) -> Result<InvalidationReport, ApiError> {
        let study = self.studies.get(study_id)?;
        let origin = {
            let mut tree = study.tree.write();
            let node = tree.live_node(node_id)?;
            let node_type = node
                .modification_type()
                .ok_or(ApiError::RootMutationForbidden("moved"))?;
            check_placement(&tree, node_type, target, mode, Some(node_id))?;
            let (origin, _) = tree
                .detach(node_id)
                .ok_or(ApiError::RootMutationForbidden("moved"))?;
            place(&mut tree, node_id, target, mode)?;
            origin
        };

        let report = self.invalidation.invalidate(
            &study,
            &[node_id],
            InvalidationScope::NodeAndDescendants,
            None,
        );
        info!(
            study_id = %study_id,
            node_id = %node_id,
            origin = %origin,
            target = %target,
            "Subtree moved"
        );
        self.notify(
            study_id,
            StudyUpdate::with_now(study_id, UpdateType::NodeMoved, vec![node_id])
                .with_payload(json!({ "origin": origin, "target": target, "mode": mode })),
            user,
        );
        Ok(report)
    }

    /// Soft-remove a node. With `cascade` its whole subtree goes along; without, the node must
    /// be a leaf.
    pub fn stash(
        &self,
        study_id: StudyId,
        node_id: NodeId,
        cascade: bool,
        user: &str,
    ) -> Result<StashReport, ApiError> {
        let study = self.studies.get(study_id)?;
        let stashed = {
            let mut tree = study.tree.write();
            let node = tree.live_node(node_id)?;
            if node.is_root() {
                return Err(ApiError::RootMutationForbidden("stashed"));
            }
            if !cascade && !node.children.is_empty() {
                return Err(ApiError::NodeHasChildren(node_id));
            }
            let subtree = walker::subtree(&tree, node_id);
            tree.detach(node_id);
            let now = Utc::now();
            for id in &subtree {
                let node = tree.node_mut(*id)?;
                node.stashed = true;
                node.stashed_at = Some(now);
            }
            subtree
        };

        let invalidation = self.invalidation.invalidate(
            &study,
            &[node_id],
            InvalidationScope::NodeAndDescendants,
            None,
        );
        let cleared_aliases = study
            .aliases
            .write()
            .detach_nodes(&stashed.iter().copied().collect());

        info!(study_id = %study_id, node_id = %node_id, count = stashed.len(), "Nodes stashed");
        self.notify(
            study_id,
            StudyUpdate::with_now(study_id, UpdateType::NodesStashed, stashed.clone()),
            user,
        );
        if !cleared_aliases.is_empty() {
            self.bus.publish(
                StudyUpdate::with_now(study_id, UpdateType::AliasesUpdated, Vec::new())
                    .with_payload(json!({ "cleared": cleared_aliases })),
            );
        }
        Ok(StashReport {
            stashed,
            cleared_aliases,
            invalidation,
        })
    }

    /// Reattach stashed subtrees as children of `anchor`.
    pub fn restore(
        &self,
        study_id: StudyId,
        node_ids: &[NodeId],
        anchor: NodeId,
        user: &str,
    ) -> Result<Vec<NodeId>, ApiError> {
        let study = self.studies.get(study_id)?;
        let restored = {
            let mut tree = study.tree.write();
            tree.live_node(anchor)?;
            let mut seen = HashSet::new();
            for id in node_ids {
                let node = tree.node(*id)?;
                if !node.stashed || node.parent.is_some() || !seen.insert(*id) {
                    return Err(ApiError::NodeNotStashed(*id));
                }
            }
            let mut restored = Vec::new();
            for id in node_ids {
                let subtree = walker::subtree(&tree, *id);
                for member in &subtree {
                    let node = tree.node_mut(*member)?;
                    node.stashed = false;
                    node.stashed_at = None;
                }
                tree.attach(anchor, *id, None)?;
                restored.extend(subtree);
            }
            restored
        };

        info!(study_id = %study_id, anchor = %anchor, count = restored.len(), "Nodes restored");
        self.notify(
            study_id,
            StudyUpdate::with_now(study_id, UpdateType::NodesRestored, restored.clone())
                .with_payload(json!({ "anchor": anchor })),
            user,
        );
        Ok(restored)
    }

    pub fn rename(
        &self,
        study_id: StudyId,
        node_id: NodeId,
        name: &str,
        user: &str,
    ) -> Result<String, ApiError> {
        let study = self.studies.get(study_id)?;
        let name = {
            let mut tree = study.tree.write();
            tree.node(node_id)?;
            let name = tree.checked_name(name, Some(node_id))?;
            tree.node_mut(node_id)?.name = name.clone();
            name
        };
        study.aliases.write().rename_node(node_id, &name);
        debug!(study_id = %study_id, node_id = %node_id, name = %name, "Node renamed");
        self.notify(
            study_id,
            StudyUpdate::with_now(study_id, UpdateType::NodeRenamed, vec![node_id])
                .with_payload(json!({ "name": name })),
            user,
        );
        Ok(name)
    }

    pub fn set_description(
        &self,
        study_id: StudyId,
        node_id: NodeId,
        description: Option<String>,
        user: &str,
    ) -> Result<(), ApiError> {
        let study = self.studies.get(study_id)?;
        study.tree.write().node_mut(node_id)?.description = description;
        self.notify(
            study_id,
            StudyUpdate::with_now(study_id, UpdateType::NodeRenamed, vec![node_id]),
            user,
        );
        Ok(())
    }

    /// Set the UI column of each child of `parent` to its index in `ordered_children`, which
    /// must list exactly the parent's children.
    pub fn set_column_positions(
        &self,
        study_id: StudyId,
        parent: NodeId,
        ordered_children: &[NodeId],
        user: &str,
    ) -> Result<(), ApiError> {
        let study = self.studies.get(study_id)?;
        {
            let mut tree = study.tree.write();
            let current: HashSet<NodeId> = tree.live_node(parent)?.children.iter().copied().collect();
            let wanted: HashSet<NodeId> = ordered_children.iter().copied().collect();
            if current != wanted || wanted.len() != ordered_children.len() {
                return Err(ApiError::BadRequest(
                    "column positions must list every child exactly once".to_string(),
                ));
            }
            for (position, id) in ordered_children.iter().enumerate() {
                tree.node_mut(*id)?.column_position = u32::try_from(position).unwrap_or(u32::MAX);
            }
        }
        self.notify(
            study_id,
            StudyUpdate::with_now(
                study_id,
                UpdateType::ColumnPositionsChanged,
                ordered_children.to_vec(),
            )
            .with_payload(json!({ "parent": parent })),
            user,
        );
        Ok(())
    }

    /// Hard-delete nodes.
    ///
    /// Without `delete_children`, children of a deleted live node move up to its parent at its
    /// position and lose their built state. Stashed nodes always go with their whole subtree.
    pub fn delete(
        &self,
        study_id: StudyId,
        node_ids: &[NodeId],
        delete_children: bool,
        user: &str,
    ) -> Result<DeleteReport, ApiError> {
        let study = self.studies.get(study_id)?;

        let reparenting: Vec<NodeId> = {
            let tree = study.tree.read();
            let mut reparenting = Vec::new();
            for id in node_ids {
                if tree.node(*id)?.is_root() {
                    return Err(ApiError::RootMutationForbidden("deleted"));
                }
                if !delete_children && tree.is_live(*id) {
                    reparenting.push(*id);
                }
            }
            reparenting
        };
        let invalidation = self.invalidation.invalidate(
            &study,
            &reparenting,
            InvalidationScope::DescendantsOnly,
            None,
        );

        let mut deleted = Vec::new();
        let mut groups: Vec<GroupRef> = Vec::new();
        {
            let mut tree = study.tree.write();
            let mut removed: HashSet<NodeId> = HashSet::new();
            for id in node_ids {
                if removed.contains(id) || !tree.contains(id) {
                    continue;
                }
                let whole_subtree = delete_children || !tree.is_live(*id);
                let doomed = if whole_subtree {
                    walker::subtree(&tree, *id)
                } else {
                    vec![*id]
                };
                let slot = tree.detach(*id);
                if !whole_subtree {
                    let children = tree.node(*id)?.children.clone();
                    if let Some((parent, index)) = slot {
                        for (offset, child) in children.iter().enumerate() {
                            tree.node_mut(*child)?.parent = None;
                            tree.attach(parent, *child, Some(index + offset))?;
                        }
                    }
                }
                for doomed_id in doomed {
                    if let Some(node) = tree.remove(doomed_id) {
                        if let Some(group) = node.group_ref() {
                            groups.push(group);
                        }
                        removed.insert(doomed_id);
                        deleted.push(doomed_id);
                    }
                }
            }
        }

        let removed: HashSet<NodeId> = deleted.iter().copied().collect();
        let mut tasks: Vec<CleanupTask> = groups.into_iter().map(CleanupTask::DeleteGroup).collect();
        if let Some((active, _)) = study
            .build_slot
            .finish_if(|b| removed.contains(&b.node_id), |_| ())
        {
            tasks.push(CleanupTask::StopBuild(active.build_id));
        }
        let mut rows = Vec::new();
        for id in &deleted {
            rows.extend(study.overlays.remove_node(*id));
        }
        let cleared_aliases = study.aliases.write().detach_nodes(&removed);

        info!(study_id = %study_id, count = deleted.len(), "Nodes deleted");
        self.notify(
            study_id,
            StudyUpdate::with_now(study_id, UpdateType::NodesDeleted, deleted.clone())
                .with_payload(json!({ "deleteChildren": delete_children })),
            user,
        );
        if !cleared_aliases.is_empty() {
            self.bus.publish(
                StudyUpdate::with_now(study_id, UpdateType::AliasesUpdated, Vec::new())
                    .with_payload(json!({ "cleared": cleared_aliases })),
            );
        }
        let cleanup = CleanupHandle::merge(
            self.invalidation.release_rows(&rows),
            self.invalidation.spawn_cleanup(tasks),
        );
        Ok(DeleteReport {
            deleted,
            cleared_aliases,
            invalidation,
            cleanup,
        })
    }

    /// Copy a live subtree as a new child of `anchor`, duplicating every modification group.
    pub async fn duplicate_subtree(
        &self,
        study_id: StudyId,
        source: NodeId,
        anchor: NodeId,
        user: &str,
    ) -> Result<TreeNode, ApiError> {
        let study = self.studies.get(study_id)?;
        let originals: Vec<TreeNode> = {
            let tree = study.tree.read();
            let top = tree.live_node(source)?;
            let top_type = top
                .modification_type()
                .ok_or(ApiError::RootMutationForbidden("duplicated"))?;
            check_placement(&tree, top_type, anchor, InsertMode::Child, None)?;
            walker::subtree(&tree, source)
                .into_iter()
                .map(|id| tree.node(id).cloned())
                .collect::<Result<_, _>>()?
        };

        let mut copied_groups: HashMap<NodeId, GroupRef> = HashMap::new();
        for original in &originals {
            let Some(group) = original.group_ref() else {
                continue;
            };
            match self.remote.modifications.duplicate_group(group).await {
                Ok(copy) => {
                    copied_groups.insert(original.id, copy);
                }
                Err(err) => {
                    warn!(study_id = %study_id, error = %err, "Group duplication failed");
                    let leftovers = copied_groups
                        .into_values()
                        .map(CleanupTask::DeleteGroup)
                        .collect();
                    self.invalidation.spawn_cleanup(leftovers);
                    return Err(err);
                }
            }
        }

        let new_ids: HashMap<NodeId, NodeId> = originals
            .iter()
            .map(|node| (node.id, Uuid::new_v4()))
            .collect();
        let top = {
            let mut tree = study.tree.write();
            tree.live_node(anchor)?;
            for original in &originals {
                let (Some(node_type), Some(new_id), Some(group)) = (
                    original.modification_type(),
                    new_ids.get(&original.id),
                    copied_groups.get(&original.id),
                ) else {
                    continue;
                };
                let name = if tree.name_taken(&original.name, None) {
                    tree.unique_name(&original.name)
                } else {
                    original.name.clone()
                };
                let mut copy = TreeNode::modification(
                    *new_id,
                    name,
                    original.description.clone(),
                    *group,
                    node_type,
                );
                copy.column_position = original.column_position;
                tree.add_detached(copy);
            }
            for original in &originals {
                let Some(new_id) = new_ids.get(&original.id) else {
                    continue;
                };
                let parent = if original.id == source {
                    anchor
                } else {
                    match original.parent.and_then(|p| new_ids.get(&p)) {
                        Some(parent) => *parent,
                        None => continue,
                    }
                };
                tree.attach(parent, *new_id, None)?;
            }
            let top_id = new_ids
                .get(&source)
                .copied()
                .ok_or(ApiError::NodeNotFound(source))?;
            tree.node(top_id)?.clone()
        };
        for id in new_ids.values() {
            study.seed_node_overlays(*id);
        }

        info!(study_id = %study_id, source = %source, copy = %top.id, "Subtree duplicated");
        let mut created: Vec<NodeId> = new_ids.values().copied().collect();
        created.sort();
        self.notify(
            study_id,
            StudyUpdate::with_now(study_id, UpdateType::SubtreeDuplicated, created)
                .with_payload(json!({ "source": source, "anchor": anchor, "copy": top.id })),
            user,
        );
        Ok(top)
    }

    pub fn list_stashed(&self, study_id: StudyId) -> Result<Vec<StashedNode>, ApiError> {
        let study = self.studies.get(study_id)?;
        let tree = study.tree.read();
        let mut stashed: Vec<StashedNode> = tree
            .nodes()
            .filter(|node| node.stashed && node.parent.is_none())
            .map(|node| StashedNode {
                node: node.clone(),
                stashed_at: node.stashed_at,
                descendants: walker::subtree(&tree, node.id).len().saturating_sub(1),
            })
            .collect();
        stashed.sort_by(|a, b| b.stashed_at.cmp(&a.stashed_at).then(a.node.name.cmp(&b.node.name)));
        Ok(stashed)
    }

    pub fn unique_node_name(&self, study_id: StudyId, prefix: &str) -> Result<String, ApiError> {
        let study = self.studies.get(study_id)?;
        let name = study.tree.read().unique_name(prefix);
        Ok(name)
    }
}

/// Link the detached node `id` relative to `reference`. Placement must already be checked.
fn place(tree: &mut StudyTree, id: NodeId, reference: NodeId, mode: InsertMode) -> Result<(), ApiError> {
    match mode {
        InsertMode::Child => tree.attach(reference, id, None),
        InsertMode::Before => {
            let (parent, index) = tree
                .detach(reference)
                .ok_or(ApiError::RootMutationForbidden("preceded by another node"))?;
            tree.attach(parent, id, Some(index))?;
            tree.attach(id, reference, None)
        }
        InsertMode::After => {
            let adopted = std::mem::take(&mut tree.node_mut(reference)?.children);
            for child in &adopted {
                tree.node_mut(*child)?.parent = None;
                tree.attach(id, *child, None)?;
            }
            tree.attach(reference, id, None)
        }
    }
}
