//! Identifier aliases and small shared value types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type StudyId = Uuid;
pub type NodeId = Uuid;
pub type RootNetworkId = Uuid;
/// Opaque reference to the modification group owned by the modification service.
pub type GroupRef = Uuid;
pub type ResultId = Uuid;
pub type ReportId = Uuid;
pub type UserId = String;

/// Computation kinds that keep a result reference on every overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComputationType {
    Loadflow,
    SecurityAnalysis,
    SensitivityAnalysis,
    NonEvacuatedEnergy,
    ShortCircuit,
    OneBusShortCircuit,
    VoltageInit,
    DynamicSimulation,
    DynamicSecurityAnalysis,
    StateEstimation,
}

impl ComputationType {
    pub const ALL: [ComputationType; 10] = [
        ComputationType::Loadflow,
        ComputationType::SecurityAnalysis,
        ComputationType::SensitivityAnalysis,
        ComputationType::NonEvacuatedEnergy,
        ComputationType::ShortCircuit,
        ComputationType::OneBusShortCircuit,
        ComputationType::VoltageInit,
        ComputationType::DynamicSimulation,
        ComputationType::DynamicSecurityAnalysis,
        ComputationType::StateEstimation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ComputationType::Loadflow => "loadflow",
            ComputationType::SecurityAnalysis => "security-analysis",
            ComputationType::SensitivityAnalysis => "sensitivity-analysis",
            ComputationType::NonEvacuatedEnergy => "non-evacuated-energy",
            ComputationType::ShortCircuit => "short-circuit",
            ComputationType::OneBusShortCircuit => "one-bus-short-circuit",
            ComputationType::VoltageInit => "voltage-init",
            ComputationType::DynamicSimulation => "dynamic-simulation",
            ComputationType::DynamicSecurityAnalysis => "dynamic-security-analysis",
            ComputationType::StateEstimation => "state-estimation",
        }
    }
}

impl fmt::Display for ComputationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComputationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ComputationType::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Unknown computation type: {}", s))
    }
}

/// Derive the stable modification report id of a node on a root network.
///
/// The id only depends on the pair, so every rebuild of the same node reuses it.
pub fn stable_report_id(node_id: NodeId, root_network_id: RootNetworkId) -> ReportId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"study-tree/report");
    hasher.update(node_id.as_bytes());
    hasher.update(root_network_id.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest.as_bytes()[..16]);
    uuid::Builder::from_random_bytes(bytes).into_uuid()
}
