//! High-level commands for stagectl operations.
//!
//! Each command resolves its configuration through a [`CommandContext`] and
//! is designed to be called by the CLI frontend.

pub mod context;
pub mod deploy;
pub mod plan;
pub mod undeploy;

pub use context::{CommandContext, CommonOptions};
pub use deploy::{DeployCommand, DeployOptions};
pub use plan::{PlanCommand, PlanDirection, PlanOptions, PlanReport, PlannedStage};
pub use undeploy::{UndeployCommand, UndeployOptions};

// Re-export status command types from the status module
pub use crate::status::{StageHealth, StatusCommand, StatusReport};
