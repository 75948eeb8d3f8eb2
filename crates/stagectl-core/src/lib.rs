//! Stagectl Core Library
//!
//! Provides the deployment orchestration logic: staged rollout of a
//! multi-service application onto a cluster with health gating, guarded
//! teardown, and forced cleanup of residual resources.

pub mod clock;
pub mod cluster;
pub mod commands;
pub mod config;
pub mod confirm;
pub mod context;
pub mod deploy;
pub mod error;
pub mod manifest;
pub mod orchestration;
pub mod plan;
pub mod status;
pub mod types;

/// Re-exports of commonly used types
pub mod prelude {
    // Run inputs
    pub use crate::config::{ConfigStore, StagectlConfig};
    pub use crate::context::{ForceFlags, RunContext};
    pub use crate::plan::{Criticality, DeployPhase, DeploymentPlan, Readiness, Stage};

    // Collaborators
    pub use crate::clock::{Clock, Interrupt, SystemClock};
    pub use crate::cluster::ClusterClient;
    pub use crate::cluster::kubectl::KubectlClient;
    pub use crate::confirm::{ActionKind, Authorization, ConfirmationGate, Prompter};
    pub use crate::manifest::{DirManifestSource, ManifestSource};

    // Orchestration
    pub use crate::orchestration::{
        Collaborators, DeployOrchestrator, DeployOutcome, DeployReport, UndeployOrchestrator,
        UndeployOutcome, UndeployReport,
    };

    // Model
    pub use crate::types::{GracePeriod, Manifest, ResourceHandle, ResourceState, Selector};
}
