//! Study Tree API
//!
//! Single entry point composing the study registry, the tree mutation, modification and build
//! services, alias management, result bookkeeping and snapshot persistence. Callers that only
//! need one concern can reach the underlying service through the accessors.

use crate::alias::{AliasTarget, NodeAlias};
use crate::build::{BuildOrchestrator, EffectiveStatus};
use crate::config::BuildConfig;
use crate::error::{ApiError, StorageError};
use crate::invalidation::{CleanupHandle, CleanupTask, InvalidationEngine};
use crate::modification::ModificationService;
use crate::mutation::TreeMutationService;
use crate::notification::{ElementUpdate, NotificationBus, StudyUpdate, UpdateType};
use crate::overlay::ResultRef;
use crate::remote::RemoteClients;
use crate::store::{SnapshotStore, StudySnapshot};
use crate::study::{RootNetwork, Study, StudyRegistry};
use crate::tree::{walker, ModificationNodeType, NodeType};
use crate::types::{ComputationType, NodeId, ReportId, ResultId, RootNetworkId, StudyId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

/// One row of a rendered tree, in pre-order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeView {
    pub node_id: NodeId,
    pub parent: Option<NodeId>,
    pub name: String,
    pub depth: usize,
    pub node_type: NodeType,
    pub modification_type: Option<ModificationNodeType>,
    pub status: EffectiveStatus,
}

/// Result bookkeeping outcome.
#[derive(Debug)]
pub struct ResultUpdate {
    /// Reference replaced by the new one, if any.
    pub replaced: Option<ResultRef>,
    /// Deletion of the replaced result.
    pub cleanup: CleanupHandle,
}

pub struct StudyTreeApi {
    studies: Arc<StudyRegistry>,
    remote: RemoteClients,
    bus: NotificationBus,
    invalidation: InvalidationEngine,
    mutations: TreeMutationService,
    modifications: ModificationService,
    builds: BuildOrchestrator,
    store: Option<Arc<dyn SnapshotStore>>,
}

impl StudyTreeApi {
    pub fn new(remote: RemoteClients, bus: NotificationBus, build_config: BuildConfig) -> Self {
        let studies = Arc::new(StudyRegistry::new());
        let invalidation = InvalidationEngine::new(remote.clone(), bus.clone());
        let mutations = TreeMutationService::new(
            Arc::clone(&studies),
            remote.clone(),
            bus.clone(),
            invalidation.clone(),
        );
        let modifications = ModificationService::new(
            Arc::clone(&studies),
            remote.clone(),
            bus.clone(),
            invalidation.clone(),
        );
        let builds = BuildOrchestrator::new(
            Arc::clone(&studies),
            remote.clone(),
            bus.clone(),
            build_config,
        );
        Self {
            studies,
            remote,
            bus,
            invalidation,
            mutations,
            modifications,
            builds,
            store: None,
        }
    }

    /// Persist snapshots through `store`.
    pub fn with_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn studies(&self) -> &Arc<StudyRegistry> {
        &self.studies
    }

    pub fn mutations(&self) -> &TreeMutationService {
        &self.mutations
    }

    pub fn modifications(&self) -> &ModificationService {
        &self.modifications
    }

    pub fn builds(&self) -> &BuildOrchestrator {
        &self.builds
    }

    pub fn invalidation(&self) -> &InvalidationEngine {
        &self.invalidation
    }

    pub fn create_study(
        &self,
        root_networks: Vec<RootNetwork>,
        user: &str,
    ) -> Result<Arc<Study>, ApiError> {
        self.mutations.create_root(root_networks, user)
    }

    pub fn node_status(
        &self,
        study_id: StudyId,
        node_id: NodeId,
        root_network_id: RootNetworkId,
    ) -> Result<EffectiveStatus, ApiError> {
        self.builds.status(study_id, node_id, root_network_id)
    }

    /// The live tree in pre-order with each node's status on one root network.
    pub fn tree_view(
        &self,
        study_id: StudyId,
        root_network_id: RootNetworkId,
    ) -> Result<Vec<NodeView>, ApiError> {
        let study = self.studies.get(study_id)?;
        study.root_network(root_network_id)?;
        let tree = study.tree.read();
        walker::subtree(&tree, tree.root_id())
            .into_iter()
            .map(|id| {
                let node = tree.node(id)?;
                Ok(NodeView {
                    node_id: id,
                    parent: node.parent,
                    name: node.name.clone(),
                    depth: walker::depth(&tree, id),
                    node_type: node.node_type(),
                    modification_type: node.modification_type(),
                    status: crate::build::node_build_status(
                        &tree,
                        &study.overlays,
                        id,
                        root_network_id,
                    )?,
                })
            })
            .collect()
    }

    fn alias_target(study: &Study, node_id: Option<NodeId>) -> Result<Option<AliasTarget>, ApiError> {
        let Some(node_id) = node_id else {
            return Ok(None);
        };
        let tree = study.tree.read();
        let node = tree.live_node(node_id)?;
        Ok(Some(AliasTarget {
            node_id,
            display_name: node.name.clone(),
        }))
    }

    fn publish_aliases(&self, study_id: StudyId, nodes: Vec<NodeId>, alias: &str, user: &str) {
        self.bus.publish(
            StudyUpdate::with_now(study_id, UpdateType::AliasesUpdated, nodes)
                .with_payload(json!({ "alias": alias })),
        );
        self.bus.audit(ElementUpdate::with_now(study_id, user));
    }

    pub fn create_alias(
        &self,
        study_id: StudyId,
        alias: &str,
        node_id: Option<NodeId>,
        user: &str,
    ) -> Result<(), ApiError> {
        let study = self.studies.get(study_id)?;
        let target = Self::alias_target(&study, node_id)?;
        study.aliases.write().create(alias, target)?;
        debug!(study_id = %study_id, alias, "Alias created");
        self.publish_aliases(study_id, node_id.into_iter().collect(), alias, user);
        Ok(())
    }

    /// Point an alias at a live node, or clear it with `None`.
    pub fn update_alias(
        &self,
        study_id: StudyId,
        alias: &str,
        node_id: Option<NodeId>,
        user: &str,
    ) -> Result<(), ApiError> {
        let study = self.studies.get(study_id)?;
        let target = Self::alias_target(&study, node_id)?;
        study.aliases.write().update(alias, target)?;
        self.publish_aliases(study_id, node_id.into_iter().collect(), alias, user);
        Ok(())
    }

    pub fn delete_alias(&self, study_id: StudyId, alias: &str, user: &str) -> Result<(), ApiError> {
        let study = self.studies.get(study_id)?;
        study.aliases.write().delete(alias)?;
        self.publish_aliases(study_id, Vec::new(), alias, user);
        Ok(())
    }

    pub fn list_aliases(&self, study_id: StudyId) -> Result<Vec<NodeAlias>, ApiError> {
        Ok(self.studies.get(study_id)?.aliases.read().list())
    }

    pub fn resolve_alias(
        &self,
        study_id: StudyId,
        alias: &str,
    ) -> Result<Option<AliasTarget>, ApiError> {
        let study = self.studies.get(study_id)?;
        let aliases = study.aliases.read();
        Ok(aliases.resolve(alias)?.cloned())
    }

    /// Record a computation result on a built node, replacing (and deleting) any previous one.
    #[allow(clippy::too_many_arguments)]
    pub fn set_computation_result(
        &self,
        study_id: StudyId,
        node_id: NodeId,
        root_network_id: RootNetworkId,
        kind: ComputationType,
        result_id: ResultId,
        report_id: Option<ReportId>,
        user: &str,
    ) -> Result<ResultUpdate, ApiError> {
        let study = self.studies.get(study_id)?;
        study.root_network(root_network_id)?;
        study.tree.read().live_node(node_id)?;
        let replaced = study.overlays.update(node_id, root_network_id, |o| {
            if !o.build_status.is_built() {
                return Err(ApiError::BadRequest(format!(
                    "node {} is not built on root network {}",
                    node_id, root_network_id
                )));
            }
            let new_ref = ResultRef {
                result_id,
                report_id,
            };
            Ok(o.results.insert(kind, new_ref).filter(|old| *old != new_ref))
        })??;

        let mut tasks = Vec::new();
        if let Some(old) = replaced {
            if let Some(report_id) = old.report_id {
                tasks.push(CleanupTask::DeleteReport(report_id));
            }
            tasks.push(CleanupTask::DeleteResult(kind, old));
        }
        info!(study_id = %study_id, node_id = %node_id, computation = %kind, "Computation result recorded");
        self.bus.publish(
            StudyUpdate::with_now(study_id, UpdateType::ComputationResultUpdated, vec![node_id])
                .on_root_network(root_network_id)
                .with_payload(json!({ "computation": kind.as_str(), "resultId": result_id })),
        );
        self.bus.audit(ElementUpdate::with_now(study_id, user));
        Ok(ResultUpdate {
            replaced,
            cleanup: self.invalidation.spawn_cleanup(tasks),
        })
    }

    pub fn computation_result(
        &self,
        study_id: StudyId,
        node_id: NodeId,
        root_network_id: RootNetworkId,
        kind: ComputationType,
    ) -> Result<Option<ResultRef>, ApiError> {
        let study = self.studies.get(study_id)?;
        Ok(study
            .overlays
            .get_or_error(node_id, root_network_id)?
            .result(kind))
    }

    /// Status of a node's computation as reported by the owning result service.
    pub async fn computation_status(
        &self,
        study_id: StudyId,
        node_id: NodeId,
        root_network_id: RootNetworkId,
        kind: ComputationType,
    ) -> Result<Option<String>, ApiError> {
        let Some(result) = self.computation_result(study_id, node_id, root_network_id, kind)?
        else {
            return Ok(None);
        };
        self.remote.results.get_status(kind, result.result_id).await
    }

    fn store(&self) -> Result<&Arc<dyn SnapshotStore>, ApiError> {
        self.store
            .as_ref()
            .ok_or_else(|| ApiError::ConfigError("No snapshot store configured".to_string()))
    }

    pub fn save_study(&self, study_id: StudyId) -> Result<(), ApiError> {
        let snapshot = self.studies.get(study_id)?.snapshot();
        self.store()?.put(&snapshot)?;
        info!(study_id = %study_id, "Study saved");
        Ok(())
    }

    /// Load a stored study into the registry, replacing any in-memory copy.
    pub fn load_study(&self, study_id: StudyId) -> Result<Arc<Study>, ApiError> {
        let snapshot = self
            .store()?
            .get(study_id)?
            .ok_or(StorageError::SnapshotNotFound(study_id))?;
        let study = self.studies.insert(Study::from_snapshot(snapshot)?);
        info!(study_id = %study_id, "Study loaded");
        Ok(study)
    }

    /// Load every stored study; returns how many were loaded.
    pub fn load_all(&self) -> Result<usize, ApiError> {
        let ids = self.store()?.list()?;
        for id in &ids {
            self.load_study(*id)?;
        }
        Ok(ids.len())
    }

    pub fn export_study(&self, study_id: StudyId) -> Result<StudySnapshot, ApiError> {
        Ok(self.studies.get(study_id)?.snapshot())
    }
}
