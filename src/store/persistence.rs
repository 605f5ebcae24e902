//! Sled persistence for study snapshots

use crate::error::StorageError;
use crate::store::{SnapshotStore, StudySnapshot};
use crate::types::StudyId;
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

const SNAPSHOT_PREFIX: &str = "study:";

fn snapshot_key(study_id: StudyId) -> String {
    format!("{}{}", SNAPSHOT_PREFIX, study_id)
}

/// Sled-based implementation of [`SnapshotStore`]
pub struct SledStudyStore {
    db: sled::Db,
}

impl SledStudyStore {
    /// Open (or create) the database at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path.as_ref()).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to open sled database: {}", e),
            ))
        })?;
        Ok(Self { db })
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

impl SnapshotStore for SledStudyStore {
    fn get(&self, study_id: StudyId) -> Result<Option<StudySnapshot>, StorageError> {
        match self.db.get(snapshot_key(study_id).as_bytes())? {
            Some(value) => {
                let snapshot: StudySnapshot = bincode::deserialize(&value)?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    fn put(&self, snapshot: &StudySnapshot) -> Result<(), StorageError> {
        let value = bincode::serialize(snapshot)?;
        self.db
            .insert(snapshot_key(snapshot.study_id).as_bytes(), value)?;
        debug!(
            study_id = %snapshot.study_id,
            nodes = snapshot.tree.len(),
            rows = snapshot.overlays.len(),
            "Study snapshot written"
        );
        Ok(())
    }

    fn delete(&self, study_id: StudyId) -> Result<bool, StorageError> {
        Ok(self.db.remove(snapshot_key(study_id).as_bytes())?.is_some())
    }

    fn list(&self) -> Result<Vec<StudyId>, StorageError> {
        let mut ids = Vec::new();
        for item in self.db.scan_prefix(SNAPSHOT_PREFIX.as_bytes()) {
            let (key, _) = item?;
            let raw = String::from_utf8_lossy(&key[SNAPSHOT_PREFIX.len()..]).into_owned();
            let id = Uuid::parse_str(&raw).map_err(|e| {
                StorageError::Serialization(format!("Invalid study key '{}': {}", raw, e))
            })?;
            ids.push(id);
        }
        Ok(ids)
    }
}
