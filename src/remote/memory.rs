//! In-process collaborators that record every call.
//!
//! Used by the test suites and by the offline CLI. Modification groups are real ordered lists
//! so move/copy/reorder behave like the modification service would.

use crate::error::ApiError;
use crate::remote::{
    BuildClient, BuildRequest, ComputationResultClient, ModificationAction, ModificationClient,
    ProfileClient, ReportClient,
};
use crate::types::{ComputationType, GroupRef, ReportId, ResultId};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    CreateModification { group: GroupRef, modification_id: Uuid },
    UpdateModification { group: GroupRef, modification_id: Uuid },
    DeleteModifications { group: GroupRef, modification_ids: Vec<Uuid> },
    MoveOrCopy {
        action: ModificationAction,
        origin: GroupRef,
        target: GroupRef,
        modification_ids: Vec<Uuid>,
    },
    Reorder { group: GroupRef, modification_id: Uuid },
    DuplicateGroup { source: GroupRef, copy: GroupRef },
    DeleteGroup(GroupRef),
    Build(BuildRequest),
    StopBuild(Uuid),
    DeleteResult { kind: ComputationType, result_id: ResultId },
    DeleteReport(ReportId),
}

#[derive(Default)]
struct State {
    calls: Vec<RemoteCall>,
    groups: HashMap<GroupRef, Vec<Uuid>>,
    payloads: HashMap<Uuid, Value>,
    result_status: HashMap<ResultId, String>,
}

/// Recording implementation of every remote contract.
#[derive(Default)]
pub struct InMemoryRemote {
    state: Mutex<State>,
    max_builds: Mutex<Option<u32>>,
    profile_unreadable: Mutex<bool>,
    build_rejection: Mutex<Option<String>>,
    cleanup_failure: Mutex<bool>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_max_builds(&self, limit: Option<u32>) {
        *self.max_builds.lock() = limit;
    }

    /// Make the profile lookup fail.
    pub fn set_profile_unreadable(&self, unreadable: bool) {
        *self.profile_unreadable.lock() = unreadable;
    }

    /// Make the build service refuse dispatches with `message`.
    pub fn reject_builds(&self, message: Option<String>) {
        *self.build_rejection.lock() = message;
    }

    /// Make result and report deletion fail.
    pub fn fail_cleanup(&self, fail: bool) {
        *self.cleanup_failure.lock() = fail;
    }

    pub fn set_result_status(&self, result_id: ResultId, status: impl Into<String>) {
        self.state
            .lock()
            .result_status
            .insert(result_id, status.into());
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn build_requests(&self) -> Vec<BuildRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RemoteCall::Build(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    /// Result ids passed to `delete_result`, in call order.
    pub fn deleted_results(&self) -> Vec<ResultId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RemoteCall::DeleteResult { result_id, .. } => Some(result_id),
                _ => None,
            })
            .collect()
    }

    pub fn group(&self, group: GroupRef) -> Vec<Uuid> {
        self.state
            .lock()
            .groups
            .get(&group)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, call: RemoteCall) {
        self.state.lock().calls.push(call);
    }

    fn cleanup_result(&self) -> Result<(), ApiError> {
        if *self.cleanup_failure.lock() {
            Err(ApiError::Upstream("cleanup refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ModificationClient for InMemoryRemote {
    async fn create_modification(
        &self,
        group: GroupRef,
        payload: Value,
    ) -> Result<Uuid, ApiError> {
        if !payload.is_object() {
            return Err(ApiError::BadRequest(
                "modification payload must be an object".to_string(),
            ));
        }
        let modification_id = Uuid::new_v4();
        let mut state = self.state.lock();
        state.groups.entry(group).or_default().push(modification_id);
        state.payloads.insert(modification_id, payload);
        state.calls.push(RemoteCall::CreateModification {
            group,
            modification_id,
        });
        Ok(modification_id)
    }

    async fn update_modification(
        &self,
        group: GroupRef,
        modification_id: Uuid,
        payload: Value,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        let known = state
            .groups
            .get(&group)
            .map_or(false, |ids| ids.contains(&modification_id));
        if !known {
            return Err(ApiError::BadRequest(format!(
                "modification {} is not in group {}",
                modification_id, group
            )));
        }
        state.payloads.insert(modification_id, payload);
        state.calls.push(RemoteCall::UpdateModification {
            group,
            modification_id,
        });
        Ok(())
    }

    async fn delete_modifications(
        &self,
        group: GroupRef,
        modification_ids: &[Uuid],
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        if let Some(ids) = state.groups.get_mut(&group) {
            ids.retain(|id| !modification_ids.contains(id));
        }
        for id in modification_ids {
            state.payloads.remove(id);
        }
        state.calls.push(RemoteCall::DeleteModifications {
            group,
            modification_ids: modification_ids.to_vec(),
        });
        Ok(())
    }

    async fn move_or_copy(
        &self,
        action: ModificationAction,
        origin: GroupRef,
        target: GroupRef,
        modification_ids: &[Uuid],
    ) -> Result<Vec<Uuid>, ApiError> {
        let mut state = self.state.lock();
        let available = state.groups.get(&origin).cloned().unwrap_or_default();
        let selected: Vec<Uuid> = modification_ids
            .iter()
            .copied()
            .filter(|id| available.contains(id))
            .collect();
        let landed: Vec<Uuid> = match action {
            ModificationAction::Move => {
                if let Some(ids) = state.groups.get_mut(&origin) {
                    ids.retain(|id| !selected.contains(id));
                }
                selected.clone()
            }
            ModificationAction::Copy => {
                let mut copies = Vec::with_capacity(selected.len());
                for id in &selected {
                    let copy = Uuid::new_v4();
                    if let Some(payload) = state.payloads.get(id).cloned() {
                        state.payloads.insert(copy, payload);
                    }
                    copies.push(copy);
                }
                copies
            }
        };
        state.groups.entry(target).or_default().extend(landed);
        state.calls.push(RemoteCall::MoveOrCopy {
            action,
            origin,
            target,
            modification_ids: modification_ids.to_vec(),
        });
        Ok(state.groups.get(&target).cloned().unwrap_or_default())
    }

    async fn reorder(
        &self,
        group: GroupRef,
        modification_id: Uuid,
        before: Option<Uuid>,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        let ids = state.groups.entry(group).or_default();
        let from = ids
            .iter()
            .position(|id| *id == modification_id)
            .ok_or_else(|| {
                ApiError::BadRequest(format!("modification {} not found", modification_id))
            })?;
        ids.remove(from);
        let to = before
            .and_then(|b| ids.iter().position(|id| *id == b))
            .unwrap_or(ids.len());
        ids.insert(to, modification_id);
        state.calls.push(RemoteCall::Reorder {
            group,
            modification_id,
        });
        Ok(())
    }

    async fn duplicate_group(&self, source: GroupRef) -> Result<GroupRef, ApiError> {
        let copy = Uuid::new_v4();
        let mut state = self.state.lock();
        let ids = state.groups.get(&source).cloned().unwrap_or_default();
        state.groups.insert(copy, ids);
        state.calls.push(RemoteCall::DuplicateGroup { source, copy });
        Ok(copy)
    }

    async fn delete_group(&self, group: GroupRef) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        if let Some(ids) = state.groups.remove(&group) {
            for id in ids {
                state.payloads.remove(&id);
            }
        }
        state.calls.push(RemoteCall::DeleteGroup(group));
        Ok(())
    }

    async fn list_modifications(&self, group: GroupRef) -> Result<Vec<Uuid>, ApiError> {
        Ok(self.group(group))
    }
}

#[async_trait]
impl BuildClient for InMemoryRemote {
    async fn build(&self, request: BuildRequest) -> Result<(), ApiError> {
        self.record(RemoteCall::Build(request));
        match self.build_rejection.lock().clone() {
            Some(message) => Err(ApiError::Upstream(message)),
            None => Ok(()),
        }
    }

    async fn stop(&self, build_id: Uuid) -> Result<(), ApiError> {
        self.record(RemoteCall::StopBuild(build_id));
        Ok(())
    }
}

#[async_trait]
impl ComputationResultClient for InMemoryRemote {
    async fn delete_result(
        &self,
        kind: ComputationType,
        result_id: ResultId,
    ) -> Result<(), ApiError> {
        self.record(RemoteCall::DeleteResult { kind, result_id });
        self.cleanup_result()
    }

    async fn get_status(
        &self,
        _kind: ComputationType,
        result_id: ResultId,
    ) -> Result<Option<String>, ApiError> {
        Ok(self.state.lock().result_status.get(&result_id).cloned())
    }
}

#[async_trait]
impl ReportClient for InMemoryRemote {
    async fn delete_report(&self, report_id: ReportId) -> Result<(), ApiError> {
        self.record(RemoteCall::DeleteReport(report_id));
        self.cleanup_result()
    }
}

#[async_trait]
impl ProfileClient for InMemoryRemote {
    async fn max_builds(&self, _user: &str) -> Result<Option<u32>, ApiError> {
        if *self.profile_unreadable.lock() {
            return Err(ApiError::Upstream("profile service unavailable".to_string()));
        }
        Ok(*self.max_builds.lock())
    }
}
