//! Study aggregate and in-memory registry.
//!
//! A [`Study`] bundles the tree arena, its overlays, root networks, aliases and build slot.
//! Lock order is tree, then slot, then overlay row; no guard is held across an await.

use crate::alias::AliasIndex;
use crate::build::slot::BuildSlot;
use crate::error::ApiError;
use crate::overlay::{Overlay, OverlayStore};
use crate::status::BuildStatus;
use crate::store::StudySnapshot;
use crate::tree::{walker, StudyTree};
use crate::types::{NodeId, RootNetworkId, StudyId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

pub const ROOT_NODE_NAME: &str = "Root";

/// A base-case network snapshot the study branches from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootNetwork {
    pub id: RootNetworkId,
    pub name: String,
    /// Network held by the network store for this case.
    pub network_id: Uuid,
}

impl RootNetwork {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            network_id: Uuid::new_v4(),
        }
    }
}

pub struct Study {
    pub id: StudyId,
    pub tree: RwLock<StudyTree>,
    pub overlays: OverlayStore,
    pub root_networks: RwLock<Vec<RootNetwork>>,
    pub aliases: RwLock<AliasIndex>,
    pub build_slot: BuildSlot,
}

impl std::fmt::Debug for Study {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Study")
            .field("id", &self.id)
            .field("nodes", &self.tree.read().len())
            .field("root_networks", &self.root_network_ids())
            .field("build", &self.build_slot.current())
            .finish_non_exhaustive()
    }
}

impl Study {
    /// New study holding only a root node, with a built root row per root network.
    pub fn new(id: StudyId, root_networks: Vec<RootNetwork>) -> Result<Self, ApiError> {
        if root_networks.is_empty() {
            return Err(ApiError::BadRequest(
                "a study needs at least one root network".to_string(),
            ));
        }
        let tree = StudyTree::new(Uuid::new_v4(), ROOT_NODE_NAME);
        let overlays = OverlayStore::new();
        for rn in &root_networks {
            overlays.seed(Overlay::for_root(tree.root_id(), rn.id));
        }
        Ok(Self {
            id,
            tree: RwLock::new(tree),
            overlays,
            root_networks: RwLock::new(root_networks),
            aliases: RwLock::new(AliasIndex::new()),
            build_slot: BuildSlot::new(),
        })
    }

    pub fn root_id(&self) -> NodeId {
        self.tree.read().root_id()
    }

    pub fn root_network_ids(&self) -> Vec<RootNetworkId> {
        self.root_networks.read().iter().map(|rn| rn.id).collect()
    }

    pub fn root_network(&self, root_network_id: RootNetworkId) -> Result<RootNetwork, ApiError> {
        self.root_networks
            .read()
            .iter()
            .find(|rn| rn.id == root_network_id)
            .cloned()
            .ok_or(ApiError::RootNetworkNotFound(root_network_id))
    }

    /// Seed a row on every root network for a node just added to the arena.
    pub(crate) fn seed_node_overlays(&self, node_id: NodeId) {
        for rn in self.root_network_ids() {
            self.overlays.seed(Overlay::for_modification(node_id, rn));
        }
    }

    /// Modification nodes built on `root_network_id`.
    pub fn count_built_nodes(&self, root_network_id: RootNetworkId) -> u32 {
        let root = self.root_id();
        let count = self
            .overlays
            .for_root_network(root_network_id)
            .iter()
            .filter(|o| o.node_id != root && o.build_status.is_built())
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Live nodes whose rows on `root_network_id` have `status` as local status.
    pub fn nodes_with_status(
        &self,
        root_network_id: RootNetworkId,
        status: BuildStatus,
    ) -> Vec<NodeId> {
        let tree = self.tree.read();
        walker::subtree(&tree, tree.root_id())
            .into_iter()
            .filter(|id| {
                self.overlays
                    .build_status(*id, root_network_id)
                    .map_or(false, |s| s.local == status)
            })
            .collect()
    }

    pub fn snapshot(&self) -> StudySnapshot {
        StudySnapshot {
            version: StudySnapshot::VERSION,
            study_id: self.id,
            tree: self.tree.read().clone(),
            overlays: self.overlays.snapshot(),
            root_networks: self.root_networks.read().clone(),
            aliases: self.aliases.read().clone(),
        }
    }

    /// Rebuild a study from a snapshot.
    ///
    /// Rows left in BUILDING lost their callback with the process that wrote them, so they
    /// come back as NOT_BUILT.
    pub fn from_snapshot(snapshot: StudySnapshot) -> Result<Self, ApiError> {
        if snapshot.version != StudySnapshot::VERSION {
            return Err(ApiError::StorageError(
                crate::error::StorageError::Serialization(format!(
                    "unsupported snapshot version {} (expected {})",
                    snapshot.version,
                    StudySnapshot::VERSION
                )),
            ));
        }
        let overlays = snapshot.overlays.into_iter().map(|mut row| {
            if row.build_status.local == BuildStatus::Building {
                warn!(node_id = %row.node_id, "Resetting interrupted build from snapshot");
                row.build_status = row.build_status.apply(BuildStatus::NotBuilt);
            }
            row
        });
        Ok(Self {
            id: snapshot.study_id,
            tree: RwLock::new(snapshot.tree),
            overlays: OverlayStore::from_rows(overlays),
            root_networks: RwLock::new(snapshot.root_networks),
            aliases: RwLock::new(snapshot.aliases),
            build_slot: BuildSlot::new(),
        })
    }
}

/// Studies by id.
#[derive(Default)]
pub struct StudyRegistry {
    studies: RwLock<HashMap<StudyId, Arc<Study>>>,
}

impl StudyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, study: Study) -> Arc<Study> {
        let study = Arc::new(study);
        debug!(study_id = %study.id, "Registering study");
        self.studies.write().insert(study.id, Arc::clone(&study));
        study
    }

    pub fn get(&self, study_id: StudyId) -> Result<Arc<Study>, ApiError> {
        self.studies
            .read()
            .get(&study_id)
            .cloned()
            .ok_or(ApiError::StudyNotFound(study_id))
    }

    pub fn remove(&self, study_id: StudyId) -> Option<Arc<Study>> {
        self.studies.write().remove(&study_id)
    }

    pub fn ids(&self) -> Vec<StudyId> {
        self.studies.read().keys().copied().collect()
    }
}
