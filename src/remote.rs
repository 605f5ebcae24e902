//! Remote Collaborators
//!
//! Contracts of the services the tree engine delegates to: the modification service owning
//! each node's ordered modification list, the build service replaying groups into variants,
//! the per-computation result services, the report service and the user profile service.
//! Only the contracts live here; [`http`] talks to real services and [`memory`] records calls
//! in process.

use crate::build::plan::ReplayStep;
use crate::error::ApiError;
use crate::types::{ComputationType, GroupRef, NodeId, ReportId, ResultId, RootNetworkId, StudyId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

pub mod http;
pub mod memory;

pub use http::HttpRemote;
pub use memory::{InMemoryRemote, RemoteCall};

pub const GENERIC_BUILD_ERROR: &str = "The build service failed without details";

/// Whether modifications moved between groups leave the origin group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModificationAction {
    Move,
    Copy,
}

/// Replay request sent to the build service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    /// Echoed back in the result message.
    pub build_id: Uuid,
    pub study_id: StudyId,
    pub node_id: NodeId,
    pub root_network_id: RootNetworkId,
    pub network_id: Uuid,
    pub origin_variant: Option<String>,
    pub destination_variant: String,
    pub steps: Vec<ReplayStep>,
    /// Stable report of the target node.
    pub report_id: ReportId,
}

#[async_trait]
pub trait ModificationClient: Send + Sync {
    async fn create_modification(&self, group: GroupRef, payload: Value)
        -> Result<Uuid, ApiError>;

    async fn update_modification(
        &self,
        group: GroupRef,
        modification_id: Uuid,
        payload: Value,
    ) -> Result<(), ApiError>;

    async fn delete_modifications(
        &self,
        group: GroupRef,
        modification_ids: &[Uuid],
    ) -> Result<(), ApiError>;

    /// Move or copy modifications into `target`, returning the ids now held by `target`.
    async fn move_or_copy(
        &self,
        action: ModificationAction,
        origin: GroupRef,
        target: GroupRef,
        modification_ids: &[Uuid],
    ) -> Result<Vec<Uuid>, ApiError>;

    /// Move `modification_id` before `before` (or to the end) within one group.
    async fn reorder(
        &self,
        group: GroupRef,
        modification_id: Uuid,
        before: Option<Uuid>,
    ) -> Result<(), ApiError>;

    /// Copy a whole group, returning the new group's reference.
    async fn duplicate_group(&self, source: GroupRef) -> Result<GroupRef, ApiError>;

    async fn delete_group(&self, group: GroupRef) -> Result<(), ApiError>;

    async fn list_modifications(&self, group: GroupRef) -> Result<Vec<Uuid>, ApiError>;
}

#[async_trait]
pub trait BuildClient: Send + Sync {
    /// Accept a build; the outcome arrives later as a result message.
    async fn build(&self, request: BuildRequest) -> Result<(), ApiError>;

    async fn stop(&self, build_id: Uuid) -> Result<(), ApiError>;
}

#[async_trait]
pub trait ComputationResultClient: Send + Sync {
    async fn delete_result(&self, kind: ComputationType, result_id: ResultId)
        -> Result<(), ApiError>;

    async fn get_status(
        &self,
        kind: ComputationType,
        result_id: ResultId,
    ) -> Result<Option<String>, ApiError>;
}

#[async_trait]
pub trait ReportClient: Send + Sync {
    async fn delete_report(&self, report_id: ReportId) -> Result<(), ApiError>;
}

#[async_trait]
pub trait ProfileClient: Send + Sync {
    /// Build quota of a user; `None` when the user has no profile or no quota.
    async fn max_builds(&self, user: &str) -> Result<Option<u32>, ApiError>;
}

/// Every collaborator the engine talks to.
#[derive(Clone)]
pub struct RemoteClients {
    pub modifications: Arc<dyn ModificationClient>,
    pub builds: Arc<dyn BuildClient>,
    pub results: Arc<dyn ComputationResultClient>,
    pub reports: Arc<dyn ReportClient>,
    pub profiles: Arc<dyn ProfileClient>,
}

impl RemoteClients {
    /// One object serving every contract.
    pub fn from_shared<T>(remote: Arc<T>) -> Self
    where
        T: ModificationClient
            + BuildClient
            + ComputationResultClient
            + ReportClient
            + ProfileClient
            + 'static,
    {
        Self {
            modifications: remote.clone(),
            builds: remote.clone(),
            results: remote.clone(),
            reports: remote.clone(),
            profiles: remote,
        }
    }
}

/// Best-effort extraction of a readable message from an upstream error body.
///
/// JSON bodies are searched for `message`, `detail` then `error`; other non-empty bodies are
/// returned trimmed.
pub fn extract_error_message(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return GENERIC_BUILD_ERROR.to_string();
    }
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        for key in ["message", "detail", "error"] {
            match map.get(key) {
                Some(Value::String(s)) if !s.trim().is_empty() => return s.trim().to_string(),
                Some(Value::Object(inner)) => {
                    if let Some(Value::String(s)) = inner.get("message") {
                        return s.trim().to_string();
                    }
                }
                _ => {}
            }
        }
        return GENERIC_BUILD_ERROR.to_string();
    }
    trimmed.to_string()
}
