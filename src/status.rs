//! Build Status
//!
//! Severity-ordered build states and the merge rules applied whenever a status is set,
//! either explicitly or from a remote application outcome.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Build state of a node on one root network, ordered by severity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    #[default]
    NotBuilt = 0,
    Building = 1,
    Built = 2,
    BuiltWithWarning = 3,
    BuiltWithError = 4,
}

impl BuildStatus {
    /// True for the three terminal built states.
    pub fn is_built(self) -> bool {
        self >= BuildStatus::Built
    }

    /// Statuses that override whatever severity was stored before.
    pub fn forces_reset(self) -> bool {
        matches!(self, BuildStatus::NotBuilt | BuildStatus::Building)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BuildStatus::NotBuilt => "NOT_BUILT",
            BuildStatus::Building => "BUILDING",
            BuildStatus::Built => "BUILT",
            BuildStatus::BuiltWithWarning => "BUILT_WITH_WARNING",
            BuildStatus::BuiltWithError => "BUILT_WITH_ERROR",
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application status reported by the modification or build service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    AllOk,
    WithWarnings,
    WithErrors,
}

impl From<ApplicationStatus> for BuildStatus {
    fn from(value: ApplicationStatus) -> Self {
        match value {
            ApplicationStatus::AllOk => BuildStatus::Built,
            ApplicationStatus::WithWarnings => BuildStatus::BuiltWithWarning,
            ApplicationStatus::WithErrors => BuildStatus::BuiltWithError,
        }
    }
}

/// Outcome of a remote replay: the target node's own modifications (local) and the whole
/// replayed chain (global).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationOutcome {
    pub local: ApplicationStatus,
    pub global: ApplicationStatus,
}

impl ApplicationOutcome {
    pub fn all_ok() -> Self {
        Self {
            local: ApplicationStatus::AllOk,
            global: ApplicationStatus::AllOk,
        }
    }
}

/// Local/global status pair stored on every overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeBuildStatus {
    pub local: BuildStatus,
    pub global: BuildStatus,
}

impl NodeBuildStatus {
    pub fn not_built() -> Self {
        Self::forced(BuildStatus::NotBuilt)
    }

    pub fn built() -> Self {
        Self::forced(BuildStatus::Built)
    }

    /// Both halves set to `status`, ignoring what was stored.
    pub fn forced(status: BuildStatus) -> Self {
        Self {
            local: status,
            global: status,
        }
    }

    pub fn is_built(&self) -> bool {
        self.local.is_built()
    }

    /// Apply an explicit status.
    ///
    /// NOT_BUILT and BUILDING force both halves down; a built status overwrites local and
    /// keeps the most severe global.
    pub fn apply(self, status: BuildStatus) -> Self {
        if status.forces_reset() {
            return Self::forced(status);
        }
        Self {
            local: status,
            global: status.max(self.global),
        }
    }

    /// Merge a remote application outcome with the same rule as [`NodeBuildStatus::apply`].
    pub fn apply_outcome(self, outcome: ApplicationOutcome) -> Self {
        let local = BuildStatus::from(outcome.local);
        let global = BuildStatus::from(outcome.global);
        Self {
            local,
            global: global.max(self.global),
        }
    }
}
