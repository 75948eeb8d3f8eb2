//! Status collection for a deployed namespace.
//!
//! Read-only: one fresh fetch per stage health selector, no waiting and no
//! prompts. The inferred phase is the last milestone reached by an unbroken
//! run of healthy stages, mirroring how the deploy path advances.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::commands::context::{CommandContext, CommonOptions, load_context};
use crate::plan::{DeployPhase, Stage};
use crate::types::{ResourceHandle, Selector};

// =============================================================================
// Data Structures
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub namespace: String,
    pub namespace_present: bool,
    pub phase: DeployPhase,
    pub stages: Vec<StageHealth>,
    pub checked_at: DateTime<Utc>,
}

impl StatusReport {
    pub fn issues(&self) -> usize {
        self.stages.iter().filter(|s| s.healthy == Some(false)).count()
    }
}

/// Health of one stage's watched resources.
#[derive(Debug, Clone, Serialize)]
pub struct StageHealth {
    pub stage: String,
    pub selector: Option<String>,
    /// `None` for stages without a health check.
    pub healthy: Option<bool>,
    pub resources: Vec<ResourceHandle>,
    pub error: Option<String>,
}

// =============================================================================
// Collection
// =============================================================================

#[derive(Debug)]
pub struct StatusCommand {
    context: CommandContext,
}

impl StatusCommand {
    pub fn new(context: CommandContext) -> Self {
        Self { context }
    }

    pub fn with_defaults(common: &CommonOptions) -> anyhow::Result<Self> {
        Ok(Self::new(load_context(common)?))
    }

    pub fn execute(&self) -> anyhow::Result<StatusReport> {
        let client = self.context.client();
        let namespace = self.context.namespace();

        let namespace_present = client
            .get(&Selector::namespace(namespace))?
            .iter()
            .any(|h| h.state.is_present());

        let stages: Vec<StageHealth> = if namespace_present {
            self.context
                .plan()
                .stages()
                .iter()
                .map(|stage| self.check_stage(stage, namespace))
                .collect()
        } else {
            Vec::new()
        };

        let phase = if namespace_present {
            infer_phase(self.context.plan().stages(), &stages)
        } else {
            DeployPhase::NotStarted
        };

        Ok(StatusReport {
            namespace: namespace.to_string(),
            namespace_present,
            phase,
            stages,
            checked_at: Utc::now(),
        })
    }

    fn check_stage(&self, stage: &Stage, namespace: &str) -> StageHealth {
        let Some(health) = &stage.health else {
            return StageHealth {
                stage: stage.name.clone(),
                selector: None,
                healthy: None,
                resources: Vec::new(),
                error: None,
            };
        };

        let selector = health.selector(namespace);
        debug!(stage = %stage.name, %selector, "checking stage health");
        match self.context.client().get(&selector) {
            Ok(resources) => StageHealth {
                stage: stage.name.clone(),
                selector: Some(selector.to_string()),
                healthy: Some(health.readiness.is_satisfied(&resources)),
                resources,
                error: None,
            },
            Err(err) => StageHealth {
                stage: stage.name.clone(),
                selector: Some(selector.to_string()),
                healthy: Some(false),
                resources: Vec::new(),
                error: Some(err.to_string()),
            },
        }
    }
}

fn infer_phase(stages: &[Stage], health: &[StageHealth]) -> DeployPhase {
    let mut phase = DeployPhase::Namespaced;
    for (stage, observed) in stages.iter().zip(health) {
        if observed.healthy == Some(false) {
            break;
        }
        if let Some(milestone) = stage.milestone {
            phase = phase.max(milestone);
        }
    }
    phase
}
