//! Configuration System
//!
//! Layered configuration: built-in defaults, the global config file, workspace files and
//! `STUDY_TREE__` environment variables, in increasing precedence. Validation reports every
//! problem at once.

use crate::logging::LoggingConfig;
use crate::types::ComputationType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudyTreeConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// Build dispatch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Upper bound on the build service accepting a dispatch.
    #[serde(default = "default_dispatch_timeout_ms")]
    pub dispatch_timeout_ms: u64,

    /// Upper bound on the build service acknowledging a stop.
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

fn default_dispatch_timeout_ms() -> u64 {
    30_000
}

fn default_stop_timeout_ms() -> u64 {
    10_000
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            dispatch_timeout_ms: default_dispatch_timeout_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

/// Base URLs of the remote collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_modification_url")]
    pub modification_url: String,

    #[serde(default = "default_build_url")]
    pub build_url: String,

    #[serde(default = "default_report_url")]
    pub report_url: String,

    #[serde(default = "default_profile_url")]
    pub profile_url: String,

    /// Result service per computation, keyed by computation name (`security-analysis`, ...).
    #[serde(default)]
    pub computation_urls: HashMap<String, String>,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_modification_url() -> String {
    "http://localhost:5007".to_string()
}

fn default_build_url() -> String {
    "http://localhost:5007".to_string()
}

fn default_report_url() -> String {
    "http://localhost:5028".to_string()
}

fn default_profile_url() -> String {
    "http://localhost:5033".to_string()
}

fn default_request_timeout_ms() -> u64 {
    20_000
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            modification_url: default_modification_url(),
            build_url: default_build_url(),
            report_url: default_report_url(),
            profile_url: default_profile_url(),
            computation_urls: HashMap::new(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Snapshot store location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".study-tree/store")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Build(String),
    Remote(String, String),
    Storage(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Build(msg) => write!(f, "Build: {}", msg),
            ValidationError::Remote(name, msg) => write!(f, "Remote '{}': {}", name, msg),
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

fn check_url(name: &str, url: &str, errors: &mut Vec<ValidationError>) {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        errors.push(ValidationError::Remote(
            name.to_string(),
            format!("'{}' is not an http(s) URL", url),
        ));
    }
}

impl StudyTreeConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.build.dispatch_timeout_ms == 0 {
            errors.push(ValidationError::Build(
                "dispatch_timeout_ms must be positive".to_string(),
            ));
        }
        if self.build.stop_timeout_ms == 0 {
            errors.push(ValidationError::Build(
                "stop_timeout_ms must be positive".to_string(),
            ));
        }

        check_url("modification", &self.remote.modification_url, &mut errors);
        check_url("build", &self.remote.build_url, &mut errors);
        check_url("report", &self.remote.report_url, &mut errors);
        check_url("profile", &self.remote.profile_url, &mut errors);
        for (name, url) in &self.remote.computation_urls {
            match name.parse::<ComputationType>() {
                Ok(_) => check_url(name, url, &mut errors),
                Err(e) => errors.push(ValidationError::Remote(name.clone(), e)),
            }
        }
        if self.remote.request_timeout_ms == 0 {
            errors.push(ValidationError::Remote(
                "request".to_string(),
                "request_timeout_ms must be positive".to_string(),
            ));
        }

        if self.storage.store_path.as_os_str().is_empty() {
            errors.push(ValidationError::Storage(
                "Store path cannot be empty".to_string(),
            ));
        }

        if !matches!(
            self.logging.level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error" | "off"
        ) {
            errors.push(ValidationError::Logging(format!(
                "Unknown level '{}'",
                self.logging.level
            )));
        }
        if !matches!(self.logging.format.as_str(), "json" | "text") {
            errors.push(ValidationError::Logging(format!(
                "Unknown format '{}'",
                self.logging.format
            )));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
