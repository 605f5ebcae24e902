//! Build orchestrator: accepts builds, dispatches them and applies their results.
//!
//! Accepting a build only claims the study's build slot and marks the node BUILDING; the
//! replay request is dispatched on a spawned task. Results come back later through
//! [`BuildOrchestrator::on_build_result`], usually fed by the result listener.

use crate::build::plan::{derive_build_plan, node_build_status, BuildPlan, EffectiveStatus};
use crate::build::slot::ActiveBuild;
use crate::config::BuildConfig;
use crate::error::ApiError;
use crate::invalidation::{CleanupTask, InvalidationEngine};
use crate::notification::{ElementUpdate, NotificationBus, StudyUpdate, UpdateType};
use crate::overlay::Overlay;
use crate::remote::{extract_error_message, BuildRequest, RemoteClients};
use crate::status::{ApplicationOutcome, BuildStatus, NodeBuildStatus};
use crate::study::{Study, StudyRegistry};
use crate::types::{NodeId, RootNetworkId, StudyId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Result message delivered by the build service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildResultMessage {
    pub build_id: Uuid,
    pub study_id: StudyId,
    pub node_id: NodeId,
    pub root_network_id: RootNetworkId,
    pub result: BuildResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildResult {
    Succeeded {
        outcome: ApplicationOutcome,
        impacted_element_ids: Vec<String>,
    },
    Failed {
        error: String,
    },
}

/// What happened to a result message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultDisposition {
    Applied(NodeBuildStatus),
    /// The build was stopped or invalidated before its result arrived.
    Superseded,
}

/// An accepted build.
#[derive(Debug)]
pub struct BuildTicket {
    pub build: ActiveBuild,
    pub plan: BuildPlan,
    /// Completes once the request reached the build service (or failed to).
    pub dispatched: JoinHandle<()>,
}

#[derive(Clone)]
pub struct BuildOrchestrator {
    studies: Arc<StudyRegistry>,
    remote: RemoteClients,
    bus: NotificationBus,
    config: BuildConfig,
}

impl BuildOrchestrator {
    pub fn new(
        studies: Arc<StudyRegistry>,
        remote: RemoteClients,
        bus: NotificationBus,
        config: BuildConfig,
    ) -> Self {
        Self {
            studies,
            remote,
            bus,
            config,
        }
    }

    pub fn plan(
        &self,
        study_id: StudyId,
        node_id: NodeId,
        root_network_id: RootNetworkId,
    ) -> Result<BuildPlan, ApiError> {
        let study = self.studies.get(study_id)?;
        study.root_network(root_network_id)?;
        let tree = study.tree.read();
        derive_build_plan(&tree, &study.overlays, node_id, root_network_id)
    }

    pub fn status(
        &self,
        study_id: StudyId,
        node_id: NodeId,
        root_network_id: RootNetworkId,
    ) -> Result<EffectiveStatus, ApiError> {
        let study = self.studies.get(study_id)?;
        study.root_network(root_network_id)?;
        let tree = study.tree.read();
        node_build_status(&tree, &study.overlays, node_id, root_network_id)
    }

    /// Accept a build of `node_id` on `root_network_id` for `user`.
    pub async fn build(
        &self,
        study_id: StudyId,
        node_id: NodeId,
        root_network_id: RootNetworkId,
        user: &str,
    ) -> Result<BuildTicket, ApiError> {
        let study = self.studies.get(study_id)?;
        let root_network = study.root_network(root_network_id)?;
        self.check_buildable(&study, node_id, root_network_id)?;
        if let Some(active) = study.build_slot.current() {
            return Err(ApiError::BuildInProgress {
                study_id,
                node_id: active.node_id,
            });
        }
        self.check_quota(&study, root_network_id, user).await?;

        let plan = {
            let tree = study.tree.read();
            derive_build_plan(&tree, &study.overlays, node_id, root_network_id)?
        };
        let candidate = ActiveBuild::new(node_id, root_network_id);
        let build_id = candidate.build_id;
        let acquired = study
            .build_slot
            .try_acquire(candidate, |active| {
                study.overlays.update(node_id, root_network_id, |o| {
                    o.build_status = o.build_status.apply(BuildStatus::Building);
                    (active.clone(), o.modification_report_id)
                })
            })
            .map_err(|occupant| ApiError::BuildInProgress {
                study_id,
                node_id: occupant.node_id,
            })?;
        let (build, report_id) = match acquired {
            Ok(accepted) => accepted,
            Err(err) => {
                study.build_slot.finish(build_id, |_| ());
                return Err(err);
            }
        };

        info!(
            study_id = %study_id,
            node_id = %node_id,
            root_network_id = %root_network_id,
            steps = plan.steps.len(),
            "Build accepted"
        );
        self.publish_status(&study, node_id, root_network_id);
        self.bus.audit(ElementUpdate::with_now(study_id, user));

        let request = BuildRequest {
            build_id: build.build_id,
            study_id,
            node_id,
            root_network_id,
            network_id: root_network.network_id,
            origin_variant: plan.origin_variant.clone(),
            destination_variant: plan.destination_variant.clone(),
            steps: plan.steps.clone(),
            report_id,
        };
        let dispatched = self.spawn_dispatch(request);
        Ok(BuildTicket {
            build,
            plan,
            dispatched,
        })
    }

    fn check_buildable(
        &self,
        study: &Study,
        node_id: NodeId,
        root_network_id: RootNetworkId,
    ) -> Result<(), ApiError> {
        let tree = study.tree.read();
        let node = tree.node(node_id)?;
        if node.is_root() {
            return Err(ApiError::NodeAlreadyBuilt(node_id));
        }
        if !tree.is_live(node_id) {
            return Err(ApiError::BadRequest(format!(
                "node {} is stashed and cannot be built",
                node_id
            )));
        }
        let status = study
            .overlays
            .build_status(node_id, root_network_id)
            .ok_or(ApiError::NodeNotFound(node_id))?;
        match status.local {
            BuildStatus::NotBuilt => Ok(()),
            BuildStatus::Building => Err(ApiError::BuildInProgress {
                study_id: study.id,
                node_id,
            }),
            _ => Err(ApiError::NodeAlreadyBuilt(node_id)),
        }
    }

    /// A missing or unreadable quota means unlimited.
    async fn check_quota(
        &self,
        study: &Study,
        root_network_id: RootNetworkId,
        user: &str,
    ) -> Result<(), ApiError> {
        let limit = match self.remote.profiles.max_builds(user).await {
            Ok(Some(limit)) => limit,
            Ok(None) => return Ok(()),
            Err(err) => {
                warn!(user, error = %err, "Build quota unreadable, treating as unlimited");
                return Ok(());
            }
        };
        let built = study.count_built_nodes(root_network_id);
        if built >= limit {
            return Err(ApiError::MaxNodeBuildsExceeded { limit, built });
        }
        Ok(())
    }

    fn spawn_dispatch(&self, request: BuildRequest) -> JoinHandle<()> {
        let this = self.clone();
        let timeout_ms = self.config.dispatch_timeout_ms;
        tokio::spawn(async move {
            let build_id = request.build_id;
            let study_id = request.study_id;
            let outcome = tokio::time::timeout(
                Duration::from_millis(timeout_ms),
                this.remote.builds.build(request),
            )
            .await
            .unwrap_or(Err(ApiError::UpstreamTimeout(timeout_ms)));
            match outcome {
                Ok(()) => debug!(build_id = %build_id, "Build dispatched"),
                Err(err) => {
                    let message = match &err {
                        ApiError::Upstream(body) | ApiError::BadRequest(body) => {
                            extract_error_message(body)
                        }
                        other => other.to_string(),
                    };
                    this.fail_build(study_id, build_id, &message);
                }
            }
        })
    }

    /// Phase two of a build: apply the service's answer if the build still holds the slot.
    pub fn on_build_result(
        &self,
        message: BuildResultMessage,
    ) -> Result<ResultDisposition, ApiError> {
        let study = self.studies.get(message.study_id)?;
        match message.result {
            BuildResult::Succeeded {
                outcome,
                impacted_element_ids,
            } => {
                let applied = study.build_slot.finish(message.build_id, |active| {
                    let status = study.overlays.update(
                        active.node_id,
                        active.root_network_id,
                        |o| {
                            o.build_status = o.build_status.apply_outcome(outcome);
                            o.build_status
                        },
                    );
                    (active.clone(), status)
                });
                let Some((active, status)) = applied else {
                    warn!(
                        build_id = %message.build_id,
                        node_id = %message.node_id,
                        "Build result superseded"
                    );
                    return Ok(ResultDisposition::Superseded);
                };
                let status = status?;
                info!(
                    study_id = %study.id,
                    node_id = %active.node_id,
                    status = %status.global,
                    impacted = impacted_element_ids.len(),
                    "Build completed"
                );
                self.publish_status(&study, active.node_id, active.root_network_id);
                self.bus.publish(
                    StudyUpdate::with_now(study.id, UpdateType::BuildCompleted, vec![active.node_id])
                        .on_root_network(active.root_network_id)
                        .with_payload(json!({ "impactedElementIds": impacted_element_ids })),
                );
                Ok(ResultDisposition::Applied(status))
            }
            BuildResult::Failed { error } => {
                let message_text = extract_error_message(&error);
                if self.fail_build(study.id, message.build_id, &message_text) {
                    Ok(ResultDisposition::Applied(NodeBuildStatus::not_built()))
                } else {
                    warn!(build_id = %message.build_id, "Build failure superseded");
                    Ok(ResultDisposition::Superseded)
                }
            }
        }
    }

    /// Reset a failed build to NOT_BUILT and report the error. False if superseded.
    fn fail_build(&self, study_id: StudyId, build_id: Uuid, message: &str) -> bool {
        let Ok(study) = self.studies.get(study_id) else {
            return false;
        };
        let released = study.build_slot.finish(build_id, |active| {
            let reset = study.overlays.update(active.node_id, active.root_network_id, |o| {
                o.build_status = NodeBuildStatus::not_built();
            });
            if let Err(err) = reset {
                warn!(node_id = %active.node_id, error = %err, "Failed build left no row to reset");
            }
            active.clone()
        });
        let Some(active) = released else {
            return false;
        };
        error!(
            study_id = %study_id,
            node_id = %active.node_id,
            error = message,
            "Build failed"
        );
        self.publish_status(&study, active.node_id, active.root_network_id);
        self.bus.publish(
            StudyUpdate::with_now(study_id, UpdateType::BuildFailed, vec![active.node_id])
                .on_root_network(active.root_network_id)
                .with_payload(json!({ "error": message })),
        );
        true
    }

    /// Stop the build running on a node. Returns false when nothing was building there.
    pub async fn stop_build(
        &self,
        study_id: StudyId,
        node_id: NodeId,
        root_network_id: RootNetworkId,
        user: &str,
    ) -> Result<bool, ApiError> {
        let study = self.studies.get(study_id)?;
        study.root_network(root_network_id)?;
        let released = study.build_slot.finish_if(
            |active| active.targets(node_id, root_network_id),
            |_| {
                study.overlays.update(node_id, root_network_id, |o| {
                    o.build_status = NodeBuildStatus::not_built();
                })
            },
        );
        let build_id = match released {
            Some((active, reset)) => {
                reset?;
                Some(active.build_id)
            }
            None => {
                // a BUILDING row without a slot has no remote build left to stop
                let orphaned = study.overlays.update(node_id, root_network_id, |o| {
                    let building = o.build_status.local == BuildStatus::Building;
                    if building {
                        o.build_status = NodeBuildStatus::not_built();
                    }
                    building
                })?;
                if !orphaned {
                    debug!(node_id = %node_id, "Stop requested on a node that is not building");
                    return Ok(false);
                }
                None
            }
        };

        info!(study_id = %study_id, node_id = %node_id, "Build cancelled");
        self.publish_status(&study, node_id, root_network_id);
        self.bus.publish(
            StudyUpdate::with_now(study_id, UpdateType::BuildCancelled, vec![node_id])
                .on_root_network(root_network_id),
        );
        self.bus.audit(ElementUpdate::with_now(study_id, user));

        if let Some(build_id) = build_id {
            let timeout_ms = self.config.stop_timeout_ms;
            let stopped = tokio::time::timeout(
                Duration::from_millis(timeout_ms),
                self.remote.builds.stop(build_id),
            )
            .await
            .unwrap_or(Err(ApiError::UpstreamTimeout(timeout_ms)));
            if let Err(err) = stopped {
                warn!(build_id = %build_id, error = %err, "Remote stop failed");
            }
        }
        Ok(true)
    }

    /// Explicitly set a node's status with the severity merge rule.
    ///
    /// BUILDING is only entered through [`BuildOrchestrator::build`].
    pub fn set_build_status(
        &self,
        study_id: StudyId,
        node_id: NodeId,
        root_network_id: RootNetworkId,
        status: BuildStatus,
    ) -> Result<NodeBuildStatus, ApiError> {
        if status == BuildStatus::Building {
            return Err(ApiError::BadRequest(format!(
                "node {} can only become BUILDING by starting a build",
                node_id
            )));
        }
        let study = self.studies.get(study_id)?;
        self.ensure_modification_node(&study, node_id)?;
        self.write_explicit(&study, node_id, root_network_id, |current| current.apply(status))
    }

    /// Merge a remote application outcome into a node's status.
    pub fn set_application_outcome(
        &self,
        study_id: StudyId,
        node_id: NodeId,
        root_network_id: RootNetworkId,
        outcome: ApplicationOutcome,
    ) -> Result<NodeBuildStatus, ApiError> {
        let study = self.studies.get(study_id)?;
        self.ensure_modification_node(&study, node_id)?;
        self.write_explicit(&study, node_id, root_network_id, |current| {
            current.apply_outcome(outcome)
        })
    }

    /// Write an explicit status. A build running on the row loses the slot in the same
    /// critical section and its remote counterpart is stopped.
    fn write_explicit(
        &self,
        study: &Study,
        node_id: NodeId,
        root_network_id: RootNetworkId,
        merge: impl Fn(NodeBuildStatus) -> NodeBuildStatus,
    ) -> Result<NodeBuildStatus, ApiError> {
        let write = |o: &mut Overlay| {
            o.build_status = merge(o.build_status);
            o.build_status
        };
        let released = study.build_slot.finish_if(
            |active| active.targets(node_id, root_network_id),
            |_| study.overlays.update(node_id, root_network_id, write),
        );
        let merged = match released {
            Some((active, merged)) => {
                info!(
                    study_id = %study.id,
                    node_id = %node_id,
                    build_id = %active.build_id,
                    "Explicit status replaced the running build"
                );
                InvalidationEngine::new(self.remote.clone(), self.bus.clone())
                    .spawn_cleanup(vec![CleanupTask::StopBuild(active.build_id)]);
                merged?
            }
            None => study.overlays.update(node_id, root_network_id, write)?,
        };
        self.publish_status(study, node_id, root_network_id);
        Ok(merged)
    }

    fn ensure_modification_node(&self, study: &Study, node_id: NodeId) -> Result<(), ApiError> {
        if study.tree.read().node(node_id)?.is_root() {
            return Err(ApiError::RootMutationForbidden("given a build status"));
        }
        Ok(())
    }

    fn publish_status(&self, study: &Study, node_id: NodeId, root_network_id: RootNetworkId) {
        self.bus.publish(
            StudyUpdate::with_now(study.id, UpdateType::NodeBuildStatusUpdated, vec![node_id])
                .on_root_network(root_network_id),
        );
    }
}
