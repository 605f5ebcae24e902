//! CLI presentation: text tables and JSON for each command.

use crate::alias::NodeAlias;
use crate::api::NodeView;
use crate::build::{BuildPlan, EffectiveStatus};
use crate::cli::parse::OutputFormat;
use crate::config::StudyTreeConfig;
use crate::error::{ApiError, StorageError};
use crate::mutation::StashedNode;
use crate::status::BuildStatus;
use crate::study::RootNetwork;
use crate::types::StudyId;
use comfy_table::{presets, Table};
use owo_colors::OwoColorize;
use serde::Serialize;

/// One stored study in `list` output.
#[derive(Debug, Clone, Serialize)]
pub struct StudySummary {
    pub study_id: StudyId,
    pub root_networks: Vec<RootNetwork>,
    pub nodes: usize,
    pub stashed: usize,
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ApiError::StorageError(StorageError::Serialization(e.to_string())))
}

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL);
    table.set_header(header);
    table
}

fn colored_status(status: BuildStatus) -> String {
    let label = status.as_str();
    match status {
        BuildStatus::NotBuilt => label.dimmed().to_string(),
        BuildStatus::Building => label.cyan().to_string(),
        BuildStatus::Built => label.green().to_string(),
        BuildStatus::BuiltWithWarning => label.yellow().to_string(),
        BuildStatus::BuiltWithError => label.red().to_string(),
    }
}

fn short(id: &uuid::Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

pub fn format_studies(studies: &[StudySummary], format: OutputFormat) -> Result<String, ApiError> {
    if format == OutputFormat::Json {
        return to_json(studies);
    }
    if studies.is_empty() {
        return Ok("No stored studies.".to_string());
    }
    let mut table = table(vec!["Study", "Root networks", "Nodes", "Stashed"]);
    for study in studies {
        let names: Vec<&str> = study.root_networks.iter().map(|rn| rn.name.as_str()).collect();
        table.add_row(vec![
            study.study_id.to_string(),
            names.join(", "),
            study.nodes.to_string(),
            study.stashed.to_string(),
        ]);
    }
    Ok(table.to_string())
}

pub fn format_tree(rows: &[NodeView], format: OutputFormat) -> Result<String, ApiError> {
    if format == OutputFormat::Json {
        return to_json(rows);
    }
    let mut table = table(vec!["Node", "Id", "Type", "Status"]);
    for row in rows {
        let kind = match row.modification_type {
            Some(kind) => format!("{:?}", kind),
            None => "Root".to_string(),
        };
        let mut status = colored_status(row.status.display_status());
        if row.status.status.local == BuildStatus::NotBuilt && row.status.ceiling.is_some() {
            status.push_str(" (inherited)");
        }
        table.add_row(vec![
            format!("{}{}", "  ".repeat(row.depth), row.name),
            short(&row.node_id),
            kind,
            status,
        ]);
    }
    Ok(table.to_string())
}

pub fn format_status(status: &EffectiveStatus, format: OutputFormat) -> Result<String, ApiError> {
    if format == OutputFormat::Json {
        return to_json(status);
    }
    let mut lines = vec![
        format!("Node:   {}", status.node_id),
        format!("Local:  {}", colored_status(status.status.local)),
        format!("Global: {}", colored_status(status.status.global)),
    ];
    if let Some((ancestor, severity)) = status.ceiling {
        lines.push(format!(
            "Builds from {} ({})",
            ancestor,
            colored_status(severity)
        ));
    }
    Ok(lines.join("\n"))
}

pub fn format_plan(plan: &BuildPlan, format: OutputFormat) -> Result<String, ApiError> {
    if format == OutputFormat::Json {
        return to_json(plan);
    }
    let origin = plan.origin_variant.as_deref().unwrap_or("base case");
    let mut out = format!(
        "Build {} from {} ({}) into {}\n",
        plan.node_id, plan.origin_node, origin, plan.destination_variant
    );
    let mut table = table(vec!["Step", "Node", "Group", "Excluded"]);
    for (index, step) in plan.steps.iter().enumerate() {
        table.add_row(vec![
            (index + 1).to_string(),
            short(&step.node_id),
            step.group_ref.to_string(),
            step.excluded_modifications.len().to_string(),
        ]);
    }
    out.push_str(&table.to_string());
    Ok(out)
}

pub fn format_aliases(aliases: &[NodeAlias]) -> String {
    if aliases.is_empty() {
        return "No aliases.".to_string();
    }
    let mut table = table(vec!["Alias", "Node", "Name"]);
    for alias in aliases {
        match &alias.target {
            Some(target) => table.add_row(vec![
                alias.alias.clone(),
                target.node_id.to_string(),
                target.display_name.clone(),
            ]),
            None => table.add_row(vec![alias.alias.clone(), "-".to_string(), "-".to_string()]),
        };
    }
    table.to_string()
}

pub fn format_stashed(stashed: &[StashedNode]) -> String {
    if stashed.is_empty() {
        return "Nothing stashed.".to_string();
    }
    let mut table = table(vec!["Node", "Id", "Stashed at", "Descendants"]);
    for entry in stashed {
        let at = entry
            .stashed_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            entry.node.name.clone(),
            entry.node.id.to_string(),
            at,
            entry.descendants.to_string(),
        ]);
    }
    table.to_string()
}

pub fn format_config(config: &StudyTreeConfig, format: OutputFormat) -> Result<String, ApiError> {
    match format {
        OutputFormat::Json => to_json(config),
        OutputFormat::Text => toml::to_string_pretty(config)
            .map_err(|e| ApiError::ConfigError(format!("Failed to render config: {}", e))),
    }
}
