//! CLI parse: clap types for study-tree. No behavior; definitions only.

use crate::tree::{InsertMode, ModificationNodeType};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use uuid::Uuid;

/// study-tree CLI - inspect and edit stored study trees
#[derive(Parser)]
#[command(name = "study-tree")]
#[command(about = "Inspect and edit power-grid study modification trees")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root used to find config/ files
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides layered config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Snapshot store directory (overrides storage.store_path)
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlacementArg {
    Before,
    After,
    Child,
}

impl From<PlacementArg> for InsertMode {
    fn from(value: PlacementArg) -> Self {
        match value {
            PlacementArg::Before => InsertMode::Before,
            PlacementArg::After => InsertMode::After,
            PlacementArg::Child => InsertMode::Child,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NodeTypeArg {
    Construction,
    Security,
}

impl From<NodeTypeArg> for ModificationNodeType {
    fn from(value: NodeTypeArg) -> Self {
        match value {
            NodeTypeArg::Construction => ModificationNodeType::Construction,
            NodeTypeArg::Security => ModificationNodeType::Security,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// List stored studies
    List {
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },
    /// Create an empty study with one root network per name
    Create {
        #[arg(long = "root-network", required = true)]
        root_networks: Vec<String>,
        #[arg(long, default_value = "cli")]
        user: String,
    },
    /// Insert a node relative to a reference node
    Insert {
        #[arg(long)]
        study: Uuid,
        #[arg(long)]
        reference: Uuid,
        #[arg(long, value_enum, default_value = "child")]
        mode: PlacementArg,
        #[arg(long)]
        name: String,
        #[arg(long = "type", value_enum, default_value = "construction")]
        node_type: NodeTypeArg,
        #[arg(long, default_value = "cli")]
        user: String,
    },
    /// Show the live tree with build statuses
    Tree {
        #[arg(long)]
        study: Uuid,
        /// Root network to show statuses for (defaults to the first one)
        #[arg(long)]
        root_network: Option<Uuid>,
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },
    /// Show one node's build status
    Status {
        #[arg(long)]
        study: Uuid,
        #[arg(long)]
        node: Uuid,
        #[arg(long)]
        root_network: Uuid,
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },
    /// Show the replay plan a build of the node would use
    Plan {
        #[arg(long)]
        study: Uuid,
        #[arg(long)]
        node: Uuid,
        #[arg(long)]
        root_network: Uuid,
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },
    /// List the aliases of a study
    Aliases {
        #[arg(long)]
        study: Uuid,
    },
    /// List stashed subtrees of a study
    Stashed {
        #[arg(long)]
        study: Uuid,
    },
    /// Print a study snapshot as JSON
    Export {
        #[arg(long)]
        study: Uuid,
    },
    /// Show the effective configuration
    Config {
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },
}

impl Commands {
    /// Command name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Commands::List { .. } => "list",
            Commands::Create { .. } => "create",
            Commands::Insert { .. } => "insert",
            Commands::Tree { .. } => "tree",
            Commands::Status { .. } => "status",
            Commands::Plan { .. } => "plan",
            Commands::Aliases { .. } => "aliases",
            Commands::Stashed { .. } => "stashed",
            Commands::Export { .. } => "export",
            Commands::Config { .. } => "config",
        }
    }
}
