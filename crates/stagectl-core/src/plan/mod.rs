//! Deployment plan: the fixed, ordered list of stages for one run.
//!
//! Stage order encodes the dependency tiers of the application. The plan is
//! built once from configuration and never mutated during a run.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::ForceFlags;
use crate::types::{ResourceHandle, Selector, Target};

/// Whether a stage failure halts the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Criticality {
    Fatal,
    BestEffort,
}

/// Deploy-path progress. Each completed stage may advance it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeployPhase {
    NotStarted,
    Namespaced,
    InfraReady,
    BackendReady,
    #[serde(rename = "ai-ready")]
    AIReady,
    FrontendReady,
    RoutingReady,
    Verified,
    Done,
}

impl fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DeployPhase::NotStarted => "NotStarted",
            DeployPhase::Namespaced => "Namespaced",
            DeployPhase::InfraReady => "InfraReady",
            DeployPhase::BackendReady => "BackendReady",
            DeployPhase::AIReady => "AIReady",
            DeployPhase::FrontendReady => "FrontendReady",
            DeployPhase::RoutingReady => "RoutingReady",
            DeployPhase::Verified => "Verified",
            DeployPhase::Done => "Done",
        };
        f.write_str(label)
    }
}

/// Boolean readiness condition over the handles a selector matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Readiness {
    /// At least one match, and every match reports Ready.
    AllReady,
    /// At least one match exists.
    Present,
    /// Nothing matches any more.
    Gone,
}

impl Readiness {
    pub fn is_satisfied(self, handles: &[ResourceHandle]) -> bool {
        match self {
            Readiness::AllReady => {
                !handles.is_empty()
                    && handles
                        .iter()
                        .all(|h| h.state == crate::types::ResourceState::Ready)
            }
            Readiness::Present => handles.iter().any(|h| h.state.is_present()),
            Readiness::Gone => handles.iter().all(|h| !h.state.is_present()),
        }
    }
}

/// What the health gate watches after a stage's resources are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    pub kind: String,
    pub target: Target,
    /// Overrides the run namespace (e.g. a controller in its own namespace).
    pub namespace: Option<String>,
    pub readiness: Readiness,
}

impl HealthCheck {
    pub fn pods(label: impl Into<String>) -> Self {
        Self {
            kind: "pods".to_string(),
            target: Target::Label(label.into()),
            namespace: None,
            readiness: Readiness::AllReady,
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn selector(&self, run_namespace: &str) -> Selector {
        Selector {
            kind: self.kind.clone(),
            namespace: Some(
                self.namespace
                    .clone()
                    .unwrap_or_else(|| run_namespace.to_string()),
            ),
            target: self.target.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageResource {
    pub file: String,
    /// A failing required resource fails the whole stage.
    pub required: bool,
}

impl StageResource {
    pub fn required(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            required: true,
        }
    }

    pub fn optional(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            required: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageAction {
    Apply,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub name: String,
    pub resources: Vec<StageResource>,
    pub health: Option<HealthCheck>,
    pub timeout: Duration,
    pub criticality: Criticality,
    pub action: StageAction,
    /// Deploy phase reached once this stage is healthy.
    pub milestone: Option<DeployPhase>,
    /// Removed on undeploy.
    pub teardown: bool,
    /// Holds persistent data; kept on undeploy with `keep-data`.
    pub data_bearing: bool,
}

impl Stage {
    pub fn new(name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            resources: Vec::new(),
            health: None,
            timeout,
            criticality: Criticality::Fatal,
            action: StageAction::Apply,
            milestone: None,
            teardown: true,
            data_bearing: false,
        }
    }

    pub fn with_resources(mut self, files: &[&str]) -> Self {
        self.resources = files.iter().map(|f| StageResource::required(*f)).collect();
        self
    }

    pub fn with_resource(mut self, resource: StageResource) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn with_health(mut self, health: HealthCheck) -> Self {
        self.health = Some(health);
        self
    }

    pub fn reaching(mut self, phase: DeployPhase) -> Self {
        self.milestone = Some(phase);
        self
    }

    pub fn best_effort(mut self) -> Self {
        self.criticality = Criticality::BestEffort;
        self
    }

    pub fn data_bearing(mut self) -> Self {
        self.data_bearing = true;
        self
    }

    pub fn retained_on_teardown(mut self) -> Self {
        self.teardown = false;
        self
    }

    pub fn is_routing(&self) -> bool {
        self.milestone == Some(DeployPhase::RoutingReady)
    }

    /// The mirror image of this stage for undeploy: best-effort deletion in
    /// reverse resource order, gated on everything being gone.
    fn to_teardown(&self) -> Stage {
        let mut stage = self.clone();
        stage.action = StageAction::Delete;
        stage.criticality = Criticality::BestEffort;
        stage.resources.reverse();
        if let Some(health) = stage.health.as_mut() {
            health.readiness = Readiness::Gone;
        }
        stage
    }
}

#[derive(Debug, Clone)]
pub struct DeploymentPlan {
    stages: Vec<Stage>,
}

impl DeploymentPlan {
    pub fn new(stages: Vec<Stage>) -> anyhow::Result<Self> {
        if stages.is_empty() {
            anyhow::bail!("Deployment plan must contain at least one stage");
        }
        let mut seen = HashSet::new();
        for stage in &stages {
            if !seen.insert(stage.name.as_str()) {
                anyhow::bail!("Duplicate stage name in deployment plan: {}", stage.name);
            }
            if stage.timeout.is_zero() {
                anyhow::bail!("Stage '{}' must have a non-zero timeout", stage.name);
            }
        }
        Ok(Self { stages })
    }

    /// The application's standard dependency tiers after the namespace.
    pub fn standard(default_timeout: Duration) -> Self {
        let stages = vec![
            Stage::new("ingress-controller", default_timeout.min(Duration::from_secs(180)))
                .with_resources(&["ingress-nginx.yaml"])
                .with_health(
                    HealthCheck::pods("app.kubernetes.io/component=controller")
                        .in_namespace("ingress-nginx"),
                )
                .retained_on_teardown(),
            Stage::new("config", default_timeout).with_resources(&["configmap.yaml", "secrets.yaml"]),
            Stage::new("stateful-infra", default_timeout)
                .with_resources(&["postgres.yaml", "redis.yaml", "qdrant.yaml"])
                .with_health(HealthCheck::pods("tier=data"))
                .reaching(DeployPhase::InfraReady)
                .data_bearing(),
            Stage::new("backend", default_timeout)
                .with_resources(&["backend.yaml"])
                .with_health(HealthCheck::pods("app=backend"))
                .reaching(DeployPhase::BackendReady),
            Stage::new("dependent-services", default_timeout * 2)
                .with_resources(&["embedding-service.yaml"])
                .with_health(HealthCheck::pods("app=embedding-service"))
                .reaching(DeployPhase::AIReady),
            Stage::new("frontend", default_timeout)
                .with_resources(&["frontend.yaml"])
                .with_health(HealthCheck::pods("app=frontend"))
                .reaching(DeployPhase::FrontendReady),
            Stage::new("routing", default_timeout.min(Duration::from_secs(60)))
                .with_resources(&["ingress.yaml"])
                .with_health(HealthCheck {
                    kind: "ingress".to_string(),
                    target: Target::All,
                    namespace: None,
                    readiness: Readiness::Present,
                })
                .reaching(DeployPhase::RoutingReady),
        ];
        Self { stages }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Stages to run on deploy, honoring `skip-routing`.
    pub fn deploy_stages(&self, flags: &ForceFlags) -> Vec<&Stage> {
        self.stages
            .iter()
            .filter(|stage| !(flags.skip_routing && stage.is_routing()))
            .collect()
    }

    /// Stages to run on undeploy, in reverse dependency order.
    pub fn teardown_stages(&self, flags: &ForceFlags) -> Vec<Stage> {
        self.stages
            .iter()
            .rev()
            .filter(|stage| stage.teardown)
            .filter(|stage| !(flags.keep_data && stage.data_bearing))
            .map(Stage::to_teardown)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResourceState;

    fn handle(state: ResourceState) -> ResourceHandle {
        ResourceHandle::new("pod", "p", Some("shop"), state)
    }

    #[test]
    fn test_all_ready_requires_matches() {
        assert!(!Readiness::AllReady.is_satisfied(&[]));
        assert!(Readiness::AllReady.is_satisfied(&[handle(ResourceState::Ready)]));
        assert!(!Readiness::AllReady.is_satisfied(&[
            handle(ResourceState::Ready),
            handle(ResourceState::Pending)
        ]));
    }

    #[test]
    fn test_gone_accepts_empty_and_not_found() {
        assert!(Readiness::Gone.is_satisfied(&[]));
        assert!(Readiness::Gone.is_satisfied(&[handle(ResourceState::NotFound)]));
        assert!(!Readiness::Gone.is_satisfied(&[handle(ResourceState::Terminating)]));
    }

    #[test]
    fn test_standard_plan_order() {
        let plan = DeploymentPlan::standard(Duration::from_secs(300));
        let names: Vec<&str> = plan.stages().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "ingress-controller",
                "config",
                "stateful-infra",
                "backend",
                "dependent-services",
                "frontend",
                "routing",
            ]
        );
    }

    #[test]
    fn test_teardown_is_reversed_and_best_effort() {
        let plan = DeploymentPlan::standard(Duration::from_secs(300));
        let teardown = plan.teardown_stages(&ForceFlags::default());
        assert_eq!(teardown.first().map(|s| s.name.as_str()), Some("routing"));
        assert_eq!(teardown.last().map(|s| s.name.as_str()), Some("config"));
        assert!(teardown.iter().all(|s| s.criticality == Criticality::BestEffort));
        assert!(teardown.iter().all(|s| s.action == StageAction::Delete));

        let infra = teardown
            .iter()
            .find(|s| s.name == "stateful-infra")
            .unwrap();
        assert_eq!(infra.resources[0].file, "qdrant.yaml");
        assert_eq!(infra.health.as_ref().unwrap().readiness, Readiness::Gone);
    }

    #[test]
    fn test_keep_data_skips_data_bearing_stages() {
        let plan = DeploymentPlan::standard(Duration::from_secs(300));
        let flags = ForceFlags {
            keep_data: true,
            ..ForceFlags::default()
        };
        let teardown = plan.teardown_stages(&flags);
        assert!(!teardown.iter().any(|s| s.name == "stateful-infra"));
    }

    #[test]
    fn test_skip_routing_filters_routing_stage() {
        let plan = DeploymentPlan::standard(Duration::from_secs(300));
        let flags = ForceFlags {
            skip_routing: true,
            ..ForceFlags::default()
        };
        assert!(!plan.deploy_stages(&flags).iter().any(|s| s.name == "routing"));
    }

    #[test]
    fn test_duplicate_stage_names_rejected() {
        let result = DeploymentPlan::new(vec![
            Stage::new("infra", Duration::from_secs(1)),
            Stage::new("infra", Duration::from_secs(1)),
        ]);
        assert!(result.is_err());
    }
}
