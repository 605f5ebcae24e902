//! Entry points for loading configuration.

use super::merge::merge_policy;
use super::sources::{env, global_file, workspace_file};
use super::StudyTreeConfig;
use crate::error::ApiError;
use config::{Config, File};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load the layered configuration for a workspace and validate it.
    pub fn load(workspace_root: &Path) -> Result<StudyTreeConfig, ApiError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = env::add_to_builder(builder);
        let config: StudyTreeConfig = builder.build()?.try_deserialize()?;
        debug!(workspace_root = %workspace_root.display(), "Configuration loaded");
        Self::validated(config)
    }

    /// Load a single file on top of the defaults, ignoring every other source.
    pub fn load_from_file(path: &Path) -> Result<StudyTreeConfig, ApiError> {
        let config: StudyTreeConfig = merge_policy::builder_with_defaults()?
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?;
        Self::validated(config)
    }

    /// Defaults only.
    pub fn defaults() -> Result<StudyTreeConfig, ApiError> {
        let config: StudyTreeConfig = Config::builder().build()?.try_deserialize()?;
        Ok(config)
    }

    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }

    fn validated(config: StudyTreeConfig) -> Result<StudyTreeConfig, ApiError> {
        config.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                messages.join("\n")
            ))
        })?;
        Ok(config)
    }
}
