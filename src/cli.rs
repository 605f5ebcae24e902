//! CLI domain: parse, route, output and presentation only.
//! Route handlers delegate to [`crate::api::StudyTreeApi`]; no tree logic lives here.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands, OutputFormat};
pub use presentation::{
    format_aliases, format_config, format_plan, format_stashed, format_status, format_studies,
    format_tree, StudySummary,
};
pub use route::RunContext;
