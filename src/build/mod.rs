//! Build domain: status-aware plans, the per-study slot, orchestration and result intake.

pub mod listener;
pub mod orchestrator;
pub mod plan;
pub mod slot;

pub use listener::{build_result_channel, BuildResultListener};
pub use orchestrator::{
    BuildOrchestrator, BuildResult, BuildResultMessage, BuildTicket, ResultDisposition,
};
pub use plan::{derive_build_plan, node_build_status, BuildPlan, EffectiveStatus, ReplayStep};
pub use slot::{ActiveBuild, BuildSlot};
