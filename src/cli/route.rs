//! CLI route: run context and the single route table.

use crate::api::StudyTreeApi;
use crate::cli::parse::Commands;
use crate::cli::presentation::{
    format_aliases, format_config, format_plan, format_stashed, format_status, format_studies,
    format_tree, StudySummary,
};
use crate::config::{ConfigLoader, StudyTreeConfig};
use crate::error::{ApiError, StorageError};
use crate::notification::NotificationBus;
use crate::remote::{InMemoryRemote, RemoteClients};
use crate::store::SledStudyStore;
use crate::study::RootNetwork;
use crate::tree::NewNode;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Runtime context for CLI execution: effective config and an offline API over the store.
///
/// Remote collaborators are in-memory, so commands edit and inspect stored snapshots only.
pub struct RunContext {
    api: StudyTreeApi,
    config: StudyTreeConfig,
    store_path: PathBuf,
}

fn resolve_store_path(workspace_root: &Path, configured: &Path) -> PathBuf {
    if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        workspace_root.join(configured)
    }
}

impl RunContext {
    pub fn new(
        workspace_root: PathBuf,
        config_path: Option<PathBuf>,
        store_override: Option<PathBuf>,
    ) -> Result<Self, ApiError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        let store_path = match store_override {
            Some(path) => path,
            None => resolve_store_path(&workspace_root, &config.storage.store_path),
        };
        std::fs::create_dir_all(&store_path)
            .map_err(|e| ApiError::StorageError(StorageError::IoError(e)))?;
        let store = Arc::new(SledStudyStore::new(&store_path)?);

        let remote = RemoteClients::from_shared(Arc::new(InMemoryRemote::new()));
        let api = StudyTreeApi::new(remote, NotificationBus::detached(), config.build.clone())
            .with_store(store);
        let loaded = api.load_all()?;
        debug!(store_path = %store_path.display(), studies = loaded, "Snapshot store opened");

        Ok(Self {
            api,
            config,
            store_path,
        })
    }

    pub fn api(&self) -> &StudyTreeApi {
        &self.api
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        info!(command = command.name(), "Executing command");
        match command {
            Commands::List { format } => {
                let mut summaries: Vec<StudySummary> = self
                    .api
                    .studies()
                    .ids()
                    .into_iter()
                    .map(|id| {
                        let study = self.api.studies().get(id)?;
                        let root_networks = study.root_networks.read().clone();
                        let (nodes, stashed) = {
                            let tree = study.tree.read();
                            let stashed = tree.nodes().filter(|n| n.stashed).count();
                            (tree.len() - stashed, stashed)
                        };
                        Ok(StudySummary {
                            study_id: id,
                            root_networks,
                            nodes,
                            stashed,
                        })
                    })
                    .collect::<Result<_, ApiError>>()?;
                summaries.sort_by_key(|s| s.study_id);
                format_studies(&summaries, *format)
            }
            Commands::Create {
                root_networks,
                user,
            } => {
                let networks = root_networks.iter().map(RootNetwork::new).collect();
                let study = self.api.create_study(networks, user)?;
                self.api.save_study(study.id)?;
                Ok(study.id.to_string())
            }
            Commands::Insert {
                study,
                reference,
                mode,
                name,
                node_type,
                user,
            } => {
                let new_node = NewNode {
                    name: name.clone(),
                    description: None,
                    node_type: (*node_type).into(),
                };
                let node = self
                    .api
                    .mutations()
                    .insert(*study, new_node, *reference, (*mode).into(), user)?;
                self.api.save_study(*study)?;
                Ok(node.id.to_string())
            }
            Commands::Tree {
                study,
                root_network,
                format,
            } => {
                let root_network = match root_network {
                    Some(id) => *id,
                    None => self
                        .api
                        .studies()
                        .get(*study)?
                        .root_network_ids()
                        .first()
                        .copied()
                        .ok_or_else(|| ApiError::BadRequest("study has no root network".to_string()))?,
                };
                format_tree(&self.api.tree_view(*study, root_network)?, *format)
            }
            Commands::Status {
                study,
                node,
                root_network,
                format,
            } => format_status(&self.api.node_status(*study, *node, *root_network)?, *format),
            Commands::Plan {
                study,
                node,
                root_network,
                format,
            } => format_plan(&self.api.builds().plan(*study, *node, *root_network)?, *format),
            Commands::Aliases { study } => Ok(format_aliases(&self.api.list_aliases(*study)?)),
            Commands::Stashed { study } => {
                Ok(format_stashed(&self.api.mutations().list_stashed(*study)?))
            }
            Commands::Export { study } => {
                let snapshot = self.api.export_study(*study)?;
                serde_json::to_string_pretty(&snapshot)
                    .map_err(|e| ApiError::StorageError(StorageError::Serialization(e.to_string())))
            }
            Commands::Config { format } => format_config(&self.config, *format),
        }
    }
}
