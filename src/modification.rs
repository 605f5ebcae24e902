//! Modification operations on a node's group.
//!
//! Forwards every change to the modification service, brackets the call with
//! `UpdateStarted`/`UpdateFinished` notifications and invalidates whatever the change made
//! stale. Replaying modifications into variants is the build service's concern.

use crate::error::ApiError;
use crate::invalidation::{InvalidationEngine, InvalidationReport, InvalidationScope};
use crate::notification::{ElementUpdate, NotificationBus, StudyUpdate, UpdateType};
use crate::remote::{ModificationAction, RemoteClients};
use crate::study::{Study, StudyRegistry};
use crate::types::{GroupRef, NodeId, RootNetworkId, StudyId};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Outcome of a modification move or copy.
#[derive(Debug)]
pub struct MoveReport {
    /// Modification ids held by the target group afterwards.
    pub target_modifications: Vec<Uuid>,
    pub invalidation: InvalidationReport,
}

#[derive(Clone)]
pub struct ModificationService {
    studies: Arc<StudyRegistry>,
    remote: RemoteClients,
    bus: NotificationBus,
    invalidation: InvalidationEngine,
}

impl ModificationService {
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

    fn group_of(study: &Study, node_id: NodeId) -> Result<GroupRef, ApiError> {
        study
            .tree
            .read()
            .live_node(node_id)?
            .group_ref()
            .ok_or(ApiError::RootMutationForbidden("modified"))
    }

    /// Run `call` between the update notifications of `nodes`.
    async fn bracketed<T, F>(
        &self,
        study_id: StudyId,
        nodes: &[NodeId],
        operation: &str,
        call: F,
    ) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        self.bus.publish(
            StudyUpdate::with_now(study_id, UpdateType::UpdateStarted, nodes.to_vec())
                .with_payload(json!({ "operation": operation })),
        );
        let outcome = call.await;
        let payload = match &outcome {
            Ok(_) => json!({ "operation": operation }),
            Err(err) => {
                warn!(study_id = %study_id, operation, error = %err, "Modification call failed");
                json!({ "operation": operation, "error": err.to_string() })
            }
        };
        self.bus.publish(
            StudyUpdate::with_now(study_id, UpdateType::UpdateFinished, nodes.to_vec())
                .with_payload(payload),
        );
        outcome
    }

    fn invalidate_node(&self, study: &Study, node_id: NodeId, user: &str) -> InvalidationReport {
        self.bus.audit(ElementUpdate::with_now(study.id, user));
        self.invalidation.invalidate(
            study,
            &[node_id],
            InvalidationScope::NodeAndDescendants,
            None,
        )
    }

    pub async fn create_modification(
        &self,
        study_id: StudyId,
        node_id: NodeId,
        payload: Value,
        user: &str,
    ) -> Result<(Uuid, InvalidationReport), ApiError> {
        let study = self.studies.get(study_id)?;
        let group = Self::group_of(&study, node_id)?;
        let modification_id = self
            .bracketed(
                study_id,
                &[node_id],
                "create",
                self.remote.modifications.create_modification(group, payload),
            )
            .await?;
        info!(study_id = %study_id, node_id = %node_id, modification_id = %modification_id, "Modification created");
        Ok((modification_id, self.invalidate_node(&study, node_id, user)))
    }

    pub async fn update_modification(
        &self,
        study_id: StudyId,
        node_id: NodeId,
        modification_id: Uuid,
        payload: Value,
        user: &str,
    ) -> Result<InvalidationReport, ApiError> {
        let study = self.studies.get(study_id)?;
        let group = Self::group_of(&study, node_id)?;
        self.bracketed(
            study_id,
            &[node_id],
            "update",
            self.remote
                .modifications
                .update_modification(group, modification_id, payload),
        )
        .await?;
        Ok(self.invalidate_node(&study, node_id, user))
    }

    pub async fn delete_modifications(
        &self,
        study_id: StudyId,
        node_id: NodeId,
        modification_ids: &[Uuid],
        user: &str,
    ) -> Result<InvalidationReport, ApiError> {
        if modification_ids.is_empty() {
            return Err(ApiError::BadRequest(
                "no modification ids given".to_string(),
            ));
        }
        let study = self.studies.get(study_id)?;
        let group = Self::group_of(&study, node_id)?;
        self.bracketed(
            study_id,
            &[node_id],
            "delete",
            self.remote
                .modifications
                .delete_modifications(group, modification_ids),
        )
        .await?;
        Ok(self.invalidate_node(&study, node_id, user))
    }

    /// Move a modification before `before` within its node, or to the end.
    pub async fn reorder_modification(
        &self,
        study_id: StudyId,
        node_id: NodeId,
        modification_id: Uuid,
        before: Option<Uuid>,
        user: &str,
    ) -> Result<InvalidationReport, ApiError> {
        let study = self.studies.get(study_id)?;
        let group = Self::group_of(&study, node_id)?;
        self.bracketed(
            study_id,
            &[node_id],
            "reorder",
            self.remote
                .modifications
                .reorder(group, modification_id, before),
        )
        .await?;
        Ok(self.invalidate_node(&study, node_id, user))
    }

    /// Move or copy modifications from `origin` to `target`.
    ///
    /// The target is invalidated. A move also invalidates what was built on top of the origin,
    /// while the origin's own status is left alone; a copy leaves the origin untouched.
    pub async fn move_modifications(
        &self,
        study_id: StudyId,
        origin: NodeId,
        target: NodeId,
        modification_ids: &[Uuid],
        action: ModificationAction,
        user: &str,
    ) -> Result<MoveReport, ApiError> {
        if modification_ids.is_empty() {
            return Err(ApiError::BadRequest(
                "no modification ids given".to_string(),
            ));
        }
        let study = self.studies.get(study_id)?;
        let origin_group = Self::group_of(&study, origin)?;
        let target_group = Self::group_of(&study, target)?;
        let nodes: Vec<NodeId> = if origin == target {
            vec![target]
        } else {
            vec![origin, target]
        };
        let target_modifications = self
            .bracketed(
                study_id,
                &nodes,
                "move",
                self.remote.modifications.move_or_copy(
                    action,
                    origin_group,
                    target_group,
                    modification_ids,
                ),
            )
            .await?;

        let mut origins = vec![(target, InvalidationScope::NodeAndDescendants)];
        if origin != target && action == ModificationAction::Move {
            origins.push((origin, InvalidationScope::DescendantsOnly));
        }
        self.bus.audit(ElementUpdate::with_now(study_id, user));
        let invalidation = self
            .invalidation
            .invalidate_with_scopes(&study, &origins, None);
        info!(
            study_id = %study_id,
            origin = %origin,
            target = %target,
            action = ?action,
            count = modification_ids.len(),
            "Modifications moved"
        );
        Ok(MoveReport {
            target_modifications,
            invalidation,
        })
    }

    pub async fn list_modifications(
        &self,
        study_id: StudyId,
        node_id: NodeId,
    ) -> Result<Vec<Uuid>, ApiError> {
        let study = self.studies.get(study_id)?;
        let group = Self::group_of(&study, node_id)?;
        self.remote.modifications.list_modifications(group).await
    }

    /// Replace the modifications excluded from replays of `node_id` on one root network.
    pub fn set_excluded_modifications(
        &self,
        study_id: StudyId,
        node_id: NodeId,
        root_network_id: RootNetworkId,
        excluded: BTreeSet<Uuid>,
        user: &str,
    ) -> Result<InvalidationReport, ApiError> {
        let study = self.studies.get(study_id)?;
        study.root_network(root_network_id)?;
        Self::group_of(&study, node_id)?;
        let changed = study.overlays.update(node_id, root_network_id, |o| {
            let changed = o.excluded_modifications != excluded;
            o.excluded_modifications = excluded;
            changed
        })?;
        if !changed {
            return Ok(InvalidationReport::default());
        }
        self.bus.publish(
            StudyUpdate::with_now(
                study_id,
                UpdateType::ExcludedModificationsUpdated,
                vec![node_id],
            )
            .on_root_network(root_network_id),
        );
        self.bus.audit(ElementUpdate::with_now(study_id, user));
        Ok(self.invalidation.invalidate(
            &study,
            &[node_id],
            InvalidationScope::NodeAndDescendants,
            Some(&[root_network_id]),
        ))
    }
}
