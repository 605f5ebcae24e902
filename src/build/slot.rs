//! Per-study build slot: at most one build in flight per study.

use crate::types::{NodeId, RootNetworkId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The build currently holding a study's slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveBuild {
    /// Token echoed back by the build service; callbacks carrying another token are stale.
    pub build_id: Uuid,
    pub node_id: NodeId,
    pub root_network_id: RootNetworkId,
    pub started_at: DateTime<Utc>,
}

impl ActiveBuild {
    pub fn new(node_id: NodeId, root_network_id: RootNetworkId) -> Self {
        Self {
            build_id: Uuid::new_v4(),
            node_id,
            root_network_id,
            started_at: Utc::now(),
        }
    }

    pub fn targets(&self, node_id: NodeId, root_network_id: RootNetworkId) -> bool {
        self.node_id == node_id && self.root_network_id == root_network_id
    }
}

/// Compare-and-swap cell; the closures passed to its methods run while the slot is locked so
/// the slot change and the matching overlay write are observed together.
#[derive(Debug, Default)]
pub struct BuildSlot {
    current: Mutex<Option<ActiveBuild>>,
}

impl BuildSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<ActiveBuild> {
        self.current.lock().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Occupy the empty slot with `build` and run `f`. Returns the occupant on conflict.
    pub fn try_acquire<R>(
        &self,
        build: ActiveBuild,
        f: impl FnOnce(&ActiveBuild) -> R,
    ) -> Result<R, ActiveBuild> {
        let mut current = self.current.lock();
        if let Some(existing) = current.as_ref() {
            return Err(existing.clone());
        }
        let out = f(&build);
        *current = Some(build);
        Ok(out)
    }

    /// Release the slot if it still holds `build_id`, running `f` on the released build.
    pub fn finish<R>(&self, build_id: Uuid, f: impl FnOnce(&ActiveBuild) -> R) -> Option<R> {
        let mut current = self.current.lock();
        match current.as_ref() {
            Some(active) if active.build_id == build_id => {
                let out = f(active);
                *current = None;
                Some(out)
            }
            _ => None,
        }
    }

    /// Release the slot if its build matches `predicate`.
    pub fn finish_if<R>(
        &self,
        predicate: impl FnOnce(&ActiveBuild) -> bool,
        f: impl FnOnce(&ActiveBuild) -> R,
    ) -> Option<(ActiveBuild, R)> {
        let mut current = self.current.lock();
        let matches = current.as_ref().map_or(false, predicate);
        if !matches {
            return None;
        }
        let active = current.take()?;
        let out = f(&active);
        Some((active, out))
    }
}
