//! Build plan derivation and effective status lookup.
//!
//! A node is built by cloning the variant of its nearest built ancestor and replaying every
//! modification group between that ancestor and the node, parent first.

use crate::error::ApiError;
use crate::overlay::OverlayStore;
use crate::status::{BuildStatus, NodeBuildStatus};
use crate::tree::{walker, StudyTree, TreeNode};
use crate::types::{GroupRef, NodeId, ReportId, RootNetworkId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// One modification group to replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayStep {
    pub node_id: NodeId,
    pub group_ref: GroupRef,
    pub excluded_modifications: BTreeSet<Uuid>,
    pub report_id: ReportId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPlan {
    pub node_id: NodeId,
    pub root_network_id: RootNetworkId,
    /// Nearest built ancestor the replay starts from.
    pub origin_node: NodeId,
    /// `None` clones the bare base case of the root network.
    pub origin_variant: Option<String>,
    pub destination_variant: String,
    /// Parent-to-child order, ending with the target node.
    pub steps: Vec<ReplayStep>,
}

impl BuildPlan {
    pub fn group_refs(&self) -> Vec<GroupRef> {
        self.steps.iter().map(|step| step.group_ref).collect()
    }
}

fn row_is_built(
    overlays: &OverlayStore,
    node: &TreeNode,
    root_network_id: RootNetworkId,
) -> bool {
    node.is_root()
        || overlays
            .build_status(node.id, root_network_id)
            .map_or(false, |s| s.is_built())
}

/// Nearest ancestor of `node_id` built on `root_network_id`. The root always qualifies.
pub fn nearest_built_ancestor<'a>(
    tree: &'a StudyTree,
    overlays: &OverlayStore,
    node_id: NodeId,
    root_network_id: RootNetworkId,
) -> Option<&'a TreeNode> {
    walker::ancestors(tree, node_id).find(|node| row_is_built(overlays, node, root_network_id))
}

/// Compute the replay plan building `node_id` on `root_network_id`.
pub fn derive_build_plan(
    tree: &StudyTree,
    overlays: &OverlayStore,
    node_id: NodeId,
    root_network_id: RootNetworkId,
) -> Result<BuildPlan, ApiError> {
    let target = tree.live_node(node_id)?;
    if target.is_root() {
        return Err(ApiError::RootMutationForbidden("built"));
    }
    let destination_variant = overlays
        .get_or_error(node_id, root_network_id)?
        .variant_id
        .ok_or_else(|| ApiError::BadRequest(format!("node {} has no variant", node_id)))?;

    let mut pending: Vec<&TreeNode> = vec![target];
    let mut origin = None;
    for ancestor in walker::ancestors(tree, node_id) {
        if row_is_built(overlays, ancestor, root_network_id) {
            origin = Some(ancestor);
            break;
        }
        pending.push(ancestor);
    }
    let origin = origin.ok_or(ApiError::NodeNotFound(node_id))?;
    let origin_variant = if origin.is_root() {
        None
    } else {
        overlays.get_or_error(origin.id, root_network_id)?.variant_id
    };

    let mut steps = Vec::with_capacity(pending.len());
    for node in pending.into_iter().rev() {
        let group_ref = node
            .group_ref()
            .ok_or(ApiError::RootMutationForbidden("replayed"))?;
        let row = overlays.get_or_error(node.id, root_network_id)?;
        steps.push(ReplayStep {
            node_id: node.id,
            group_ref,
            excluded_modifications: row.excluded_modifications,
            report_id: row.modification_report_id,
        });
    }

    Ok(BuildPlan {
        node_id,
        root_network_id,
        origin_node: origin.id,
        origin_variant,
        destination_variant,
        steps,
    })
}

/// Build status as shown to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveStatus {
    pub node_id: NodeId,
    pub status: NodeBuildStatus,
    /// For a NOT_BUILT node: the nearest built ancestor and its global severity. Informational
    /// only, it is what a build would start from.
    pub ceiling: Option<(NodeId, BuildStatus)>,
}

impl EffectiveStatus {
    /// Status worth displaying: stored global when the node holds a status of its own,
    /// otherwise the inherited ceiling.
    pub fn display_status(&self) -> BuildStatus {
        match (self.status.local, self.ceiling) {
            (BuildStatus::NotBuilt, Some((_, ceiling))) => ceiling,
            (BuildStatus::NotBuilt, None) => BuildStatus::NotBuilt,
            (BuildStatus::Building, _) => BuildStatus::Building,
            _ => self.status.global,
        }
    }
}

pub fn node_build_status(
    tree: &StudyTree,
    overlays: &OverlayStore,
    node_id: NodeId,
    root_network_id: RootNetworkId,
) -> Result<EffectiveStatus, ApiError> {
    let node = tree.node(node_id)?;
    let status = if node.is_root() {
        NodeBuildStatus::built()
    } else {
        overlays
            .build_status(node_id, root_network_id)
            .ok_or(ApiError::NodeNotFound(node_id))?
    };
    let ceiling = if status.local == BuildStatus::NotBuilt {
        nearest_built_ancestor(tree, overlays, node_id, root_network_id).map(|ancestor| {
            let severity = if ancestor.is_root() {
                BuildStatus::Built
            } else {
                overlays
                    .build_status(ancestor.id, root_network_id)
                    .map_or(BuildStatus::Built, |s| s.global)
            };
            (ancestor.id, severity)
        })
    } else {
        None
    };
    Ok(EffectiveStatus {
        node_id,
        status,
        ceiling,
    })
}
