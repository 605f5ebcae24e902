//! Invalidation Engine
//!
//! Resets nodes to NOT_BUILT after their content or position changed and cascades into
//! children that were built (or building) on top of them. Each visited row is reset under its
//! own lock; the remote cleanup of cleared result references is spawned and never awaited by
//! the caller.

use crate::build::slot::ActiveBuild;
use crate::notification::{NotificationBus, StudyUpdate, UpdateType};
use crate::overlay::{Overlay, ResultRef};
use crate::remote::RemoteClients;
use crate::status::BuildStatus;
use crate::study::Study;
use crate::types::{ComputationType, GroupRef, NodeId, ReportId, RootNetworkId};
use futures::future::{join_all, BoxFuture, FutureExt};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationScope {
    /// Reset the origin, then cascade.
    NodeAndDescendants,
    /// Leave the origin alone and cascade into its children only.
    DescendantsOnly,
}

/// Remote work scheduled by an invalidation or a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CleanupTask {
    DeleteResult(ComputationType, ResultRef),
    DeleteReport(ReportId),
    StopBuild(uuid::Uuid),
    DeleteGroup(GroupRef),
}

/// Handle on spawned cleanup work. Dropping it detaches the work.
#[derive(Debug, Default)]
pub struct CleanupHandle {
    tasks: Vec<JoinHandle<()>>,
    scheduled: usize,
}

impl CleanupHandle {
    /// Number of remote calls scheduled.
    pub fn scheduled(&self) -> usize {
        self.scheduled
    }

    pub fn merge(mut first: CleanupHandle, second: CleanupHandle) -> CleanupHandle {
        first.tasks.extend(second.tasks);
        first.scheduled += second.scheduled;
        first
    }

    /// Wait for the cleanup calls to settle. Their failures were already logged.
    pub async fn wait(self) {
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "Cleanup task aborted");
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct InvalidationReport {
    /// Invalidated node ids per root network, in visit order.
    pub invalidated: BTreeMap<RootNetworkId, Vec<NodeId>>,
    /// Builds overtaken by the invalidation.
    pub cancelled_builds: Vec<ActiveBuild>,
    pub cleanup: CleanupHandle,
}

impl InvalidationReport {
    pub fn invalidated_on(&self, root_network_id: RootNetworkId) -> &[NodeId] {
        self.invalidated
            .get(&root_network_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.invalidated.values().all(Vec::is_empty)
    }
}

#[derive(Clone)]
pub struct InvalidationEngine {
    remote: RemoteClients,
    bus: NotificationBus,
}

impl InvalidationEngine {
    pub fn new(remote: RemoteClients, bus: NotificationBus) -> Self {
        Self { remote, bus }
    }

    /// Invalidate `origins` on the given root networks (all of them when `None`).
    pub fn invalidate(
        &self,
        study: &Study,
        origins: &[NodeId],
        scope: InvalidationScope,
        root_networks: Option<&[RootNetworkId]>,
    ) -> InvalidationReport {
        let origins: Vec<(NodeId, InvalidationScope)> =
            origins.iter().map(|id| (*id, scope)).collect();
        self.invalidate_with_scopes(study, &origins, root_networks)
    }

    /// One trigger over origins with their own scopes. Origins reset themselves before any
    /// descendants-only walk runs, and no node is visited twice.
    pub fn invalidate_with_scopes(
        &self,
        study: &Study,
        origins: &[(NodeId, InvalidationScope)],
        root_networks: Option<&[RootNetworkId]>,
    ) -> InvalidationReport {
        let mut ordered: Vec<(NodeId, bool)> = origins
            .iter()
            .filter(|(_, scope)| *scope == InvalidationScope::NodeAndDescendants)
            .chain(
                origins
                    .iter()
                    .filter(|(_, scope)| *scope == InvalidationScope::DescendantsOnly),
            )
            .map(|(id, scope)| (*id, *scope == InvalidationScope::NodeAndDescendants))
            .collect();
        ordered.reverse();
        let forced: HashSet<NodeId> = ordered
            .iter()
            .filter(|(_, reset)| *reset)
            .map(|(id, _)| *id)
            .collect();
        let root_networks: Vec<RootNetworkId> = match root_networks {
            Some(ids) => ids.to_vec(),
            None => study.root_network_ids(),
        };
        let mut report = InvalidationReport::default();
        let mut tasks = Vec::new();

        {
            let tree = study.tree.read();
            for rn in &root_networks {
                let mut visited = HashSet::new();
                let mut order = Vec::new();
                let mut stack = ordered.clone();

                while let Some((node_id, reset_self)) = stack.pop() {
                    let Some(node) = tree.get(&node_id) else {
                        continue;
                    };
                    if !visited.insert(node_id) {
                        continue;
                    }
                    if reset_self && !node.is_root() {
                        if let Some(cancelled) =
                            self.reset_row(study, node_id, *rn, &mut tasks)
                        {
                            report.cancelled_builds.push(cancelled);
                        }
                        order.push(node_id);
                    }
                    // Idle children are left as they are, but a build replays its not-built
                    // ancestors without building them, so their descendants are still checked.
                    for child in node.children.iter().rev() {
                        if visited.contains(child) {
                            continue;
                        }
                        let stale = study
                            .overlays
                            .build_status(*child, *rn)
                            .map_or(false, |s| s.local != BuildStatus::NotBuilt);
                        stack.push((*child, stale || forced.contains(child)));
                    }
                }
                debug!(
                    study_id = %study.id,
                    root_network_id = %rn,
                    count = order.len(),
                    "Invalidation walk finished"
                );
                if !order.is_empty() {
                    report.invalidated.insert(*rn, order);
                }
            }
        }

        for (rn, nodes) in &report.invalidated {
            self.publish_reset(study, *rn, nodes);
        }
        for build in &report.cancelled_builds {
            info!(
                study_id = %study.id,
                node_id = %build.node_id,
                "Build cancelled by invalidation"
            );
            self.bus.publish(
                StudyUpdate::with_now(study.id, UpdateType::BuildCancelled, vec![build.node_id])
                    .on_root_network(build.root_network_id),
            );
        }
        report.cleanup = self.spawn_cleanup(tasks);
        report
    }

    /// Force one row to NOT_BUILT, collecting its cleanup. A build running on the row is
    /// released from the slot in the same critical section and returned.
    fn reset_row(
        &self,
        study: &Study,
        node_id: NodeId,
        root_network_id: RootNetworkId,
        tasks: &mut Vec<CleanupTask>,
    ) -> Option<ActiveBuild> {
        let released = study.build_slot.finish_if(
            |active| active.targets(node_id, root_network_id),
            |_| study.overlays.update(node_id, root_network_id, reset_overlay),
        );
        match released {
            Some((active, reset)) => {
                tasks.push(CleanupTask::StopBuild(active.build_id));
                if let Ok(reset) = reset {
                    tasks.extend(reset);
                }
                Some(active)
            }
            None => {
                if let Ok(reset) = study.overlays.update(node_id, root_network_id, reset_overlay) {
                    tasks.extend(reset);
                }
                None
            }
        }
    }

    fn publish_reset(&self, study: &Study, root_network_id: RootNetworkId, nodes: &[NodeId]) {
        self.bus.publish(
            StudyUpdate::with_now(study.id, UpdateType::NodeBuildStatusUpdated, nodes.to_vec())
                .on_root_network(root_network_id),
        );
        for kind in ComputationType::ALL {
            self.bus.publish(
                StudyUpdate::with_now(study.id, UpdateType::ComputationStatusReset, Vec::new())
                    .on_root_network(root_network_id)
                    .with_payload(json!({ "computation": kind.as_str() })),
            );
        }
    }

    /// Schedule cleanup for rows already removed from the store.
    pub fn release_rows(&self, rows: &[Overlay]) -> CleanupHandle {
        let mut tasks = Vec::new();
        for row in rows {
            tasks.extend(row_cleanup(row));
        }
        self.spawn_cleanup(tasks)
    }

    pub(crate) fn spawn_cleanup(&self, tasks: Vec<CleanupTask>) -> CleanupHandle {
        if tasks.is_empty() {
            return CleanupHandle::default();
        }
        let scheduled = tasks.len();
        let futures: Vec<BoxFuture<'static, ()>> = tasks
            .into_iter()
            .map(|task| self.cleanup_future(task))
            .collect();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => CleanupHandle {
                tasks: vec![handle.spawn(async move {
                    join_all(futures).await;
                })],
                scheduled,
            },
            Err(_) => {
                warn!(scheduled, "No async runtime, remote cleanup skipped");
                CleanupHandle::default()
            }
        }
    }

    fn cleanup_future(&self, task: CleanupTask) -> BoxFuture<'static, ()> {
        let remote = self.remote.clone();
        async move {
            let outcome = match &task {
                CleanupTask::DeleteResult(kind, result) => {
                    remote.results.delete_result(*kind, result.result_id).await
                }
                CleanupTask::DeleteReport(report_id) => {
                    remote.reports.delete_report(*report_id).await
                }
                CleanupTask::StopBuild(build_id) => remote.builds.stop(*build_id).await,
                CleanupTask::DeleteGroup(group) => remote.modifications.delete_group(*group).await,
            };
            if let Err(err) = outcome {
                warn!(task = ?task, error = %err, "Remote cleanup failed");
            }
        }
        .boxed()
    }
}

/// Reset a row and list the remote work its old state calls for.
fn reset_overlay(overlay: &mut Overlay) -> Vec<CleanupTask> {
    let was_built = overlay.build_status.is_built();
    let report = overlay.modification_report_id;
    let mut tasks = cleanup_for_results(overlay.reset());
    if was_built {
        tasks.push(CleanupTask::DeleteReport(report));
    }
    tasks
}

fn row_cleanup(row: &Overlay) -> Vec<CleanupTask> {
    let mut tasks = cleanup_for_results(row.results.iter().map(|(k, r)| (*k, *r)).collect());
    if row.variant_id.is_some() && row.build_status.local != BuildStatus::NotBuilt {
        tasks.push(CleanupTask::DeleteReport(row.modification_report_id));
    }
    tasks
}

fn cleanup_for_results(results: Vec<(ComputationType, ResultRef)>) -> Vec<CleanupTask> {
    let mut tasks = Vec::new();
    for (kind, result) in results {
        if let Some(report_id) = result.report_id {
            tasks.push(CleanupTask::DeleteReport(report_id));
        }
        tasks.push(CleanupTask::DeleteResult(kind, result));
    }
    tasks
}
