//! Deploy/undeploy orchestration across stages.

pub mod deploy;
pub mod undeploy;

use std::time::Duration;

use crate::clock::{Clock, Interrupt};
use crate::cluster::ClusterClient;
use crate::confirm::Prompter;
use crate::deploy::StageOutcome;
use crate::manifest::ManifestSource;

pub use deploy::{DeployOrchestrator, DeployOutcome, DeployReport};
pub use undeploy::{
    NamespaceStatus, ResidualReport, UndeployOrchestrator, UndeployOutcome, UndeployReport,
};

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_INTERRUPTED: i32 = 130;

/// The external collaborators one run talks to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub client: &'a dyn ClusterClient,
    pub manifests: &'a dyn ManifestSource,
    pub prompter: &'a dyn Prompter,
    pub clock: &'a dyn Clock,
    pub interrupt: &'a Interrupt,
}

/// Timing and selection knobs shared by both paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    /// Health gate polling interval.
    pub poll_interval: Duration,
    /// Bound on namespace creation and deletion waits.
    pub namespace_timeout: Duration,
    /// Label expression carried by every managed workload.
    pub managed_label: String,
    /// Escalation attempts per cleanup task.
    pub retry_budget: u32,
    /// Pause between reconciler attempts.
    pub retry_interval: Duration,
    /// Grace given to lingering pods before they are force-terminated.
    pub pod_grace_period: Duration,
}

impl RunSettings {
    pub fn for_namespace(namespace: &str) -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            namespace_timeout: Duration::from_secs(120),
            managed_label: format!("app.kubernetes.io/part-of={}", namespace),
            retry_budget: 3,
            retry_interval: Duration::from_secs(5),
            pod_grace_period: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Applied,
    PartiallyApplied,
    Failed,
    Skipped,
}

impl StageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StageStatus::Applied => "applied",
            StageStatus::PartiallyApplied => "partially-applied",
            StageStatus::Failed => "failed",
            StageStatus::Skipped => "skipped",
        }
    }
}

impl From<&StageOutcome> for StageStatus {
    fn from(outcome: &StageOutcome) -> Self {
        match outcome {
            StageOutcome::Applied { .. } => StageStatus::Applied,
            StageOutcome::PartiallyApplied { .. } => StageStatus::PartiallyApplied,
            StageOutcome::Failed(_) => StageStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRecord {
    pub name: String,
    pub status: StageStatus,
}

impl StageRecord {
    pub fn new(name: impl Into<String>, status: StageStatus) -> Self {
        Self {
            name: name.into(),
            status,
        }
    }
}
