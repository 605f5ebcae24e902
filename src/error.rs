//! Error types for the study tree engine.

use crate::types::{NodeId, RootNetworkId, StudyId};
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Study snapshot not found: {0}")]
    SnapshotNotFound(StudyId),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::IoError(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("sled: {}", err),
        ))
    }
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Caller-facing error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    BadRequest,
    UpstreamFailure,
    Internal,
}

/// Errors surfaced by the engine's operations
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Study not found: {0}")]
    StudyNotFound(StudyId),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Root network not found: {0}")]
    RootNetworkNotFound(RootNetworkId),

    #[error("Alias not found: {0}")]
    AliasNotFound(String),

    #[error("Invalid node name: {0}")]
    NodeNameInvalid(String),

    #[error("Invalid node insertion: {0}")]
    InvalidNodeInsertion(String),

    #[error("Root node cannot be {0}")]
    RootMutationForbidden(&'static str),

    #[error("Node {0} has children; stash it with its subtree")]
    NodeHasChildren(NodeId),

    #[error("Node {0} is not a stashed subtree root")]
    NodeNotStashed(NodeId),

    #[error("A build is already running in study {study_id} (node {node_id})")]
    BuildInProgress { study_id: StudyId, node_id: NodeId },

    #[error("MAX_NODE_BUILDS_EXCEEDED: {built} built nodes, limit is {limit}")]
    MaxNodeBuildsExceeded { limit: u32, built: u32 },

    #[error("Node {0} is already built")]
    NodeAlreadyBuilt(NodeId),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Upstream service failed: {0}")]
    Upstream(String),

    #[error("Upstream service timed out after {0} ms")]
    UpstreamTimeout(u64),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::StudyNotFound(_)
            | ApiError::NodeNotFound(_)
            | ApiError::RootNetworkNotFound(_)
            | ApiError::AliasNotFound(_)
            | ApiError::StorageError(StorageError::SnapshotNotFound(_)) => ErrorKind::NotFound,
            ApiError::InvalidNodeInsertion(_)
            | ApiError::RootMutationForbidden(_)
            | ApiError::NodeHasChildren(_)
            | ApiError::BuildInProgress { .. }
            | ApiError::MaxNodeBuildsExceeded { .. } => ErrorKind::Forbidden,
            ApiError::NodeNameInvalid(_)
            | ApiError::NodeNotStashed(_)
            | ApiError::NodeAlreadyBuilt(_)
            | ApiError::BadRequest(_) => ErrorKind::BadRequest,
            ApiError::Upstream(_) | ApiError::UpstreamTimeout(_) => ErrorKind::UpstreamFailure,
            ApiError::ConfigError(_) | ApiError::StorageError(_) => ErrorKind::Internal,
        }
    }

    pub fn is_forbidden(&self) -> bool {
        self.kind() == ErrorKind::Forbidden
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Upstream(err.to_string())
    }
}
