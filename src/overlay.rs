//! Overlay Store
//!
//! One row per (node, root network) holding the node's variant, build status and
//! computation result references. Every row has its own lock so status transitions on a node
//! are read-modify-write and single-writer, while unrelated rows proceed in parallel.

use crate::error::ApiError;
use crate::status::NodeBuildStatus;
use crate::types::{stable_report_id, ComputationType, NodeId, ReportId, ResultId, RootNetworkId};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use uuid::Uuid;

pub type OverlayKey = (NodeId, RootNetworkId);

/// Reference to a computation result held by another service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRef {
    pub result_id: ResultId,
    pub report_id: Option<ReportId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overlay {
    pub node_id: NodeId,
    pub root_network_id: RootNetworkId,
    /// `None` only on the root node, whose variant is the bare base case.
    pub variant_id: Option<String>,
    pub build_status: NodeBuildStatus,
    /// Report collecting the node's own modification applications.
    pub modification_report_id: ReportId,
    pub results: BTreeMap<ComputationType, ResultRef>,
    pub excluded_modifications: BTreeSet<Uuid>,
}

impl Overlay {
    /// Row for a root node: always built, no variant of its own.
    pub fn for_root(node_id: NodeId, root_network_id: RootNetworkId) -> Self {
        Self {
            node_id,
            root_network_id,
            variant_id: None,
            build_status: NodeBuildStatus::built(),
            modification_report_id: stable_report_id(node_id, root_network_id),
            results: BTreeMap::new(),
            excluded_modifications: BTreeSet::new(),
        }
    }

    /// Row for a freshly created modification node: not built, new variant name.
    pub fn for_modification(node_id: NodeId, root_network_id: RootNetworkId) -> Self {
        Self {
            node_id,
            root_network_id,
            variant_id: Some(format!("variant_{}", Uuid::new_v4().simple())),
            build_status: NodeBuildStatus::not_built(),
            modification_report_id: stable_report_id(node_id, root_network_id),
            results: BTreeMap::new(),
            excluded_modifications: BTreeSet::new(),
        }
    }

    pub fn key(&self) -> OverlayKey {
        (self.node_id, self.root_network_id)
    }

    pub fn result(&self, kind: ComputationType) -> Option<ResultRef> {
        self.results.get(&kind).copied()
    }

    /// Force the row back to NOT_BUILT and hand back every result reference it held.
    pub fn reset(&mut self) -> Vec<(ComputationType, ResultRef)> {
        self.build_status = NodeBuildStatus::not_built();
        std::mem::take(&mut self.results).into_iter().collect()
    }
}

#[derive(Default)]
pub struct OverlayStore {
    rows: RwLock<HashMap<OverlayKey, Arc<Mutex<Overlay>>>>,
}

impl OverlayStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: impl IntoIterator<Item = Overlay>) -> Self {
        let store = Self::new();
        {
            let mut map = store.rows.write();
            for row in rows {
                map.insert(row.key(), Arc::new(Mutex::new(row)));
            }
        }
        store
    }

    /// Insert a row unless one already exists for its key.
    pub fn seed(&self, overlay: Overlay) {
        self.rows
            .write()
            .entry(overlay.key())
            .or_insert_with(|| Arc::new(Mutex::new(overlay)));
    }

    fn row(&self, node_id: NodeId, root_network_id: RootNetworkId) -> Option<Arc<Mutex<Overlay>>> {
        self.rows.read().get(&(node_id, root_network_id)).cloned()
    }

    pub fn get(&self, node_id: NodeId, root_network_id: RootNetworkId) -> Option<Overlay> {
        self.row(node_id, root_network_id)
            .map(|row| row.lock().clone())
    }

    pub fn get_or_error(
        &self,
        node_id: NodeId,
        root_network_id: RootNetworkId,
    ) -> Result<Overlay, ApiError> {
        self.get(node_id, root_network_id)
            .ok_or(ApiError::NodeNotFound(node_id))
    }

    pub fn build_status(
        &self,
        node_id: NodeId,
        root_network_id: RootNetworkId,
    ) -> Option<NodeBuildStatus> {
        self.row(node_id, root_network_id)
            .map(|row| row.lock().build_status)
    }

    /// Read-modify-write a single row while holding its lock.
    pub fn update<R>(
        &self,
        node_id: NodeId,
        root_network_id: RootNetworkId,
        f: impl FnOnce(&mut Overlay) -> R,
    ) -> Result<R, ApiError> {
        let row = self
            .row(node_id, root_network_id)
            .ok_or(ApiError::NodeNotFound(node_id))?;
        let mut guard = row.lock();
        Ok(f(&mut guard))
    }

    /// Drop every row of a node, returning them.
    pub fn remove_node(&self, node_id: NodeId) -> Vec<Overlay> {
        let mut rows = self.rows.write();
        let keys: Vec<OverlayKey> = rows.keys().filter(|(n, _)| *n == node_id).copied().collect();
        keys.into_iter()
            .filter_map(|key| rows.remove(&key))
            .map(|row| row.lock().clone())
            .collect()
    }

    /// Drop every row of a root network, returning them.
    pub fn remove_root_network(&self, root_network_id: RootNetworkId) -> Vec<Overlay> {
        let mut rows = self.rows.write();
        let keys: Vec<OverlayKey> = rows
            .keys()
            .filter(|(_, rn)| *rn == root_network_id)
            .copied()
            .collect();
        keys.into_iter()
            .filter_map(|key| rows.remove(&key))
            .map(|row| row.lock().clone())
            .collect()
    }

    pub fn for_root_network(&self, root_network_id: RootNetworkId) -> Vec<Overlay> {
        self.rows
            .read()
            .iter()
            .filter(|((_, rn), _)| *rn == root_network_id)
            .map(|(_, row)| row.lock().clone())
            .collect()
    }

    pub fn snapshot(&self) -> Vec<Overlay> {
        self.rows
            .read()
            .values()
            .map(|row| row.lock().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}
