//! Event schema for study notifications.

use crate::types::{NodeId, RootNetworkId, StudyId, UserId};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateType {
    NodeCreated,
    NodeMoved,
    NodesDeleted,
    NodesStashed,
    NodesRestored,
    NodeRenamed,
    ColumnPositionsChanged,
    SubtreeDuplicated,
    NodeBuildStatusUpdated,
    ComputationStatusReset,
    ComputationResultUpdated,
    BuildCompleted,
    BuildFailed,
    BuildCancelled,
    UpdateStarted,
    UpdateFinished,
    ExcludedModificationsUpdated,
    RootNetworkAdded,
    RootNetworkRemoved,
    AliasesUpdated,
}

impl UpdateType {
    pub fn as_str(self) -> &'static str {
        match self {
            UpdateType::NodeCreated => "nodeCreated",
            UpdateType::NodeMoved => "nodeMoved",
            UpdateType::NodesDeleted => "nodesDeleted",
            UpdateType::NodesStashed => "nodesStashed",
            UpdateType::NodesRestored => "nodesRestored",
            UpdateType::NodeRenamed => "nodeRenamed",
            UpdateType::ColumnPositionsChanged => "columnPositionsChanged",
            UpdateType::SubtreeDuplicated => "subtreeDuplicated",
            UpdateType::NodeBuildStatusUpdated => "nodeBuildStatusUpdated",
            UpdateType::ComputationStatusReset => "computationStatusReset",
            UpdateType::ComputationResultUpdated => "computationResultUpdated",
            UpdateType::BuildCompleted => "buildCompleted",
            UpdateType::BuildFailed => "buildFailed",
            UpdateType::BuildCancelled => "buildCancelled",
            UpdateType::UpdateStarted => "updateStarted",
            UpdateType::UpdateFinished => "updateFinished",
            UpdateType::ExcludedModificationsUpdated => "excludedModificationsUpdated",
            UpdateType::RootNetworkAdded => "rootNetworkAdded",
            UpdateType::RootNetworkRemoved => "rootNetworkRemoved",
            UpdateType::AliasesUpdated => "aliasesUpdated",
        }
    }
}

/// Message published on the study-update channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyUpdate {
    pub ts: String,
    pub study_id: StudyId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_network_id: Option<RootNetworkId>,
    pub node_ids: Vec<NodeId>,
    #[serde(rename = "type")]
    pub update_type: UpdateType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl StudyUpdate {
    pub fn with_now(study_id: StudyId, update_type: UpdateType, node_ids: Vec<NodeId>) -> Self {
        Self {
            ts: now_rfc3339(),
            study_id,
            root_network_id: None,
            node_ids,
            update_type,
            payload: None,
        }
    }

    pub fn on_root_network(mut self, root_network_id: RootNetworkId) -> Self {
        self.root_network_id = Some(root_network_id);
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Audit record: who touched which element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementUpdate {
    pub element_id: Uuid,
    pub modified_by: UserId,
    pub modified_at: String,
}

impl ElementUpdate {
    pub fn with_now(element_id: Uuid, modified_by: impl Into<UserId>) -> Self {
        Self {
            element_id,
            modified_by: modified_by.into(),
            modified_at: now_rfc3339(),
        }
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
