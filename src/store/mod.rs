//! Study Store
//!
//! Durable snapshots of whole studies: the tree arena, every overlay row, the root networks
//! and the alias index. A snapshot is written after mutations by the caller and read back on
//! start.

pub mod persistence;

pub use persistence::SledStudyStore;

use crate::alias::AliasIndex;
use crate::error::StorageError;
use crate::overlay::Overlay;
use crate::study::RootNetwork;
use crate::tree::StudyTree;
use crate::types::StudyId;
use serde::{Deserialize, Serialize};

/// Serialized state of one study.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudySnapshot {
    pub version: u32,
    pub study_id: StudyId,
    pub tree: StudyTree,
    pub overlays: Vec<Overlay>,
    pub root_networks: Vec<RootNetwork>,
    pub aliases: AliasIndex,
}

impl StudySnapshot {
    pub const VERSION: u32 = 1;
}

/// Snapshot storage interface
pub trait SnapshotStore: Send + Sync {
    fn get(&self, study_id: StudyId) -> Result<Option<StudySnapshot>, StorageError>;
    fn put(&self, snapshot: &StudySnapshot) -> Result<(), StorageError>;
    fn delete(&self, study_id: StudyId) -> Result<bool, StorageError>;

    /// Ids of every stored study.
    fn list(&self) -> Result<Vec<StudyId>, StorageError>;
}
