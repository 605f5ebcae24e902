//! Result listener: phase two of every build, driven by inbound result messages.

use crate::build::orchestrator::{BuildOrchestrator, BuildResultMessage, ResultDisposition};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Channel the build service adapter pushes result messages into.
pub fn build_result_channel() -> (
    UnboundedSender<BuildResultMessage>,
    UnboundedReceiver<BuildResultMessage>,
) {
    unbounded_channel()
}

pub struct BuildResultListener;

impl BuildResultListener {
    /// Apply every message until all senders are dropped.
    pub fn spawn(
        orchestrator: BuildOrchestrator,
        mut receiver: UnboundedReceiver<BuildResultMessage>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                let build_id = message.build_id;
                match orchestrator.on_build_result(message) {
                    Ok(ResultDisposition::Applied(status)) => {
                        debug!(build_id = %build_id, status = %status.local, "Build result applied")
                    }
                    Ok(ResultDisposition::Superseded) => {}
                    Err(err) => warn!(build_id = %build_id, error = %err, "Build result rejected"),
                }
            }
            debug!("Build result channel closed");
        })
    }
}
