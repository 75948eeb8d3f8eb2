//! Plan command: show what deploy or undeploy would run, without touching
//! the cluster.

use std::time::Duration;

use serde::Serialize;

use crate::context::ForceFlags;
use crate::plan::{Criticality, DeployPhase, Stage, StageAction};

use super::context::{CommandContext, CommonOptions, load_context};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlanDirection {
    #[default]
    Deploy,
    Undeploy,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlanOptions {
    pub direction: PlanDirection,
    pub flags: ForceFlags,
}

impl PlanOptions {
    pub fn deploy(flags: ForceFlags) -> Self {
        Self {
            direction: PlanDirection::Deploy,
            flags,
        }
    }

    pub fn undeploy(flags: ForceFlags) -> Self {
        Self {
            direction: PlanDirection::Undeploy,
            flags,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedStage {
    pub name: String,
    pub action: &'static str,
    pub resources: Vec<String>,
    /// Health selector, rendered for the run namespace
    pub health: Option<String>,
    #[serde(with = "secs")]
    pub timeout: Duration,
    pub fatal: bool,
    pub milestone: Option<DeployPhase>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub namespace: String,
    pub direction: PlanDirection,
    pub stages: Vec<PlannedStage>,
}

#[derive(Debug)]
pub struct PlanCommand {
    context: CommandContext,
}

impl PlanCommand {
    pub fn new(context: CommandContext) -> Self {
        Self { context }
    }

    pub fn with_defaults(common: &CommonOptions) -> anyhow::Result<Self> {
        Ok(Self::new(load_context(common)?))
    }

    pub fn execute(&self, options: &PlanOptions) -> PlanReport {
        let namespace = self.context.namespace();
        let plan = self.context.plan();
        let stages = match options.direction {
            PlanDirection::Deploy => plan
                .deploy_stages(&options.flags)
                .into_iter()
                .map(|stage| describe(stage, namespace))
                .collect(),
            PlanDirection::Undeploy => plan
                .teardown_stages(&options.flags)
                .iter()
                .map(|stage| describe(stage, namespace))
                .collect(),
        };
        PlanReport {
            namespace: namespace.to_string(),
            direction: options.direction,
            stages,
        }
    }
}

fn describe(stage: &Stage, namespace: &str) -> PlannedStage {
    PlannedStage {
        name: stage.name.clone(),
        action: match stage.action {
            StageAction::Apply => "apply",
            StageAction::Delete => "delete",
        },
        resources: stage
            .resources
            .iter()
            .map(|r| {
                if r.required {
                    r.file.clone()
                } else {
                    format!("{} (optional)", r.file)
                }
            })
            .collect(),
        health: stage
            .health
            .as_ref()
            .map(|h| format!("{} [{:?}]", h.selector(namespace), h.readiness)),
        timeout: stage.timeout,
        fatal: stage.criticality == Criticality::Fatal,
        milestone: stage.milestone,
    }
}

mod secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StagectlConfig;

    fn command() -> PlanCommand {
        let mut config = StagectlConfig::new();
        config.namespace = Some("shop".to_string());
        let context =
            CommandContext::from_config(config, &CommonOptions::default()).unwrap();
        PlanCommand::new(context)
    }

    #[test]
    fn test_deploy_plan_skips_routing_when_asked() {
        let flags = ForceFlags {
            skip_routing: true,
            ..ForceFlags::default()
        };
        let report = command().execute(&PlanOptions::deploy(flags));
        assert!(report.stages.iter().all(|s| s.name != "routing"));
        assert_eq!(report.stages[0].name, "ingress-controller");
    }

    #[test]
    fn test_undeploy_plan_is_reversed_and_best_effort() {
        let report = command().execute(&PlanOptions::undeploy(ForceFlags::default()));
        assert_eq!(report.stages[0].name, "routing");
        assert!(report.stages.iter().all(|s| s.action == "delete" && !s.fatal));
        assert!(report.stages.iter().all(|s| s.name != "ingress-controller"));
    }

    #[test]
    fn test_undeploy_plan_keeps_data_tier() {
        let flags = ForceFlags {
            keep_data: true,
            ..ForceFlags::default()
        };
        let report = command().execute(&PlanOptions::undeploy(flags));
        assert!(report.stages.iter().all(|s| s.name != "stateful-infra"));
    }
}
