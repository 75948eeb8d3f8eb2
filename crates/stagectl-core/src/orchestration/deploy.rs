//! Deploy path: namespace, then every stage in dependency order, halting on
//! the first fatal failure. Nothing is rolled back on failure; the cluster
//! is left as-is for diagnosis.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::{
    Collaborators, EXIT_FAILURE, EXIT_INTERRUPTED, EXIT_OK, RunSettings, StageRecord, StageStatus,
};
use crate::confirm::{ActionKind, Authorization, ConfirmationGate};
use crate::context::RunContext;
use crate::deploy::{HealthGate, StageExecutor, StageOutcome};
use crate::error::{FailureReason, StageFailure, Warning};
use crate::manifest::namespace_manifest;
use crate::plan::{Criticality, DeployPhase, DeploymentPlan, Readiness, Stage};
use crate::types::{ResourceState, Selector};

const NAMESPACE_STAGE: &str = "namespace";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    Completed,
    /// A fatal stage failed; the run stopped in the report's phase.
    Halted(StageFailure),
    /// The operator declined; nothing was changed.
    UserAbort,
    Interrupted { stage: String },
}

#[derive(Debug, Clone)]
pub struct DeployReport {
    pub namespace: String,
    pub phase: DeployPhase,
    pub outcome: DeployOutcome,
    pub stages: Vec<StageRecord>,
    pub warnings: Vec<Warning>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DeployReport {
    fn new(ctx: &RunContext) -> Self {
        let now = Utc::now();
        Self {
            namespace: ctx.namespace.clone(),
            phase: DeployPhase::NotStarted,
            outcome: DeployOutcome::Completed,
            stages: Vec::new(),
            warnings: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    fn finish(mut self, outcome: DeployOutcome) -> Self {
        self.outcome = outcome;
        self.finished_at = Utc::now();
        self
    }

    /// Name of the stage that halted the run, if any.
    pub fn failed_stage(&self) -> Option<&str> {
        match &self.outcome {
            DeployOutcome::Halted(failure) => Some(&failure.stage),
            DeployOutcome::Interrupted { stage } => Some(stage),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            DeployOutcome::Completed | DeployOutcome::UserAbort => EXIT_OK,
            DeployOutcome::Halted(_) => EXIT_FAILURE,
            DeployOutcome::Interrupted { .. } => EXIT_INTERRUPTED,
        }
    }
}

pub struct DeployOrchestrator<'a> {
    deps: Collaborators<'a>,
    plan: &'a DeploymentPlan,
    settings: RunSettings,
}

impl<'a> DeployOrchestrator<'a> {
    pub fn new(deps: Collaborators<'a>, plan: &'a DeploymentPlan, settings: RunSettings) -> Self {
        Self {
            deps,
            plan,
            settings,
        }
    }

    pub fn run(&self, ctx: &RunContext) -> DeployReport {
        let mut report = DeployReport::new(ctx);
        info!(namespace = %ctx.namespace, tag = %ctx.image_tag, "starting deploy");
        debug!("no run lease is taken; concurrent runs against one namespace are not detected");

        let gate = HealthGate::new(
            self.deps.client,
            self.deps.clock,
            self.deps.interrupt,
            self.settings.poll_interval,
        );
        let executor = StageExecutor::new(self.deps.client, self.deps.manifests, &gate);
        let confirm = ConfirmationGate::new(self.deps.prompter);

        let action = self.classify(ctx);
        if confirm.authorize(action, ctx) == Authorization::Abort {
            info!(namespace = %ctx.namespace, "deploy aborted by operator");
            return report.finish(DeployOutcome::UserAbort);
        }

        if let Err(outcome) = self.ensure_namespace(ctx, &gate) {
            report
                .stages
                .push(StageRecord::new(NAMESPACE_STAGE, StageStatus::Failed));
            return report.finish(outcome);
        }
        report
            .stages
            .push(StageRecord::new(NAMESPACE_STAGE, StageStatus::Applied));
        report.phase = DeployPhase::Namespaced;

        let selected = self.plan.deploy_stages(&ctx.flags);
        for stage in self.plan.stages() {
            if !selected.iter().any(|s| s.name == stage.name) {
                info!(stage = %stage.name, "stage skipped");
                report
                    .stages
                    .push(StageRecord::new(&stage.name, StageStatus::Skipped));
                continue;
            }

            let outcome = executor.run_stage(stage, ctx);
            report
                .stages
                .push(StageRecord::new(&stage.name, StageStatus::from(&outcome)));

            match outcome {
                StageOutcome::Applied { .. } => advance(&mut report, stage),
                StageOutcome::PartiallyApplied { failures, .. } => {
                    for reason in failures {
                        report
                            .warnings
                            .push(Warning::new(&stage.name, reason.to_string()));
                    }
                    advance(&mut report, stage);
                }
                StageOutcome::Failed(failure) if failure.reason.is_interrupt() => {
                    warn!(stage = %stage.name, phase = %report.phase, "deploy interrupted");
                    return report.finish(DeployOutcome::Interrupted {
                        stage: stage.name.clone(),
                    });
                }
                StageOutcome::Failed(failure) if stage.criticality == Criticality::BestEffort => {
                    warn!(stage = %stage.name, %failure, "best-effort stage failed");
                    report
                        .warnings
                        .push(Warning::new(&stage.name, failure.reason.to_string()));
                }
                StageOutcome::Failed(failure) => {
                    error!(stage = %stage.name, phase = %report.phase, %failure, "deploy halted");
                    return report.finish(DeployOutcome::Halted(failure));
                }
            }
        }

        self.verify(ctx, &gate, &selected, &mut report);
        report.phase = DeployPhase::Verified;
        info!(namespace = %ctx.namespace, warnings = report.warnings.len(), "deploy verified");
        report.phase = DeployPhase::Done;
        report.finish(DeployOutcome::Completed)
    }

    /// Redeploy when managed workloads already exist. Unknown counts as existing.
    fn classify(&self, ctx: &RunContext) -> ActionKind {
        let selector = Selector::labeled(
            "deployments,statefulsets",
            &ctx.namespace,
            &self.settings.managed_label,
        );
        match self.deps.client.get(&selector) {
            Ok(handles) if handles.iter().any(|h| h.state.is_present()) => ActionKind::Redeploy,
            Ok(_) => ActionKind::Deploy,
            Err(err) => {
                warn!(error = %err, "could not check for existing workloads");
                ActionKind::Redeploy
            }
        }
    }

    fn ensure_namespace(&self, ctx: &RunContext, gate: &HealthGate<'_>) -> Result<(), DeployOutcome> {
        let manifest = namespace_manifest(&ctx.namespace, &self.settings.managed_label);
        if let Err(source) = self.deps.client.apply(&ctx.namespace, &manifest) {
            let failure = StageFailure {
                stage: NAMESPACE_STAGE.to_string(),
                reason: FailureReason::ApplyFailed {
                    resource: manifest.name,
                    source,
                },
                related: Vec::new(),
                last_observed: Vec::new(),
            };
            error!(%failure, "deploy halted");
            return Err(DeployOutcome::Halted(failure));
        }

        let selector = Selector::namespace(&ctx.namespace);
        let timeout = self.settings.namespace_timeout;
        let outcome = gate.await_ready(&selector, Readiness::AllReady, timeout);
        match outcome.failure(&selector, timeout) {
            None => Ok(()),
            Some(reason) if reason.is_interrupt() => Err(DeployOutcome::Interrupted {
                stage: NAMESPACE_STAGE.to_string(),
            }),
            Some(reason) => Err(DeployOutcome::Halted(StageFailure {
                stage: NAMESPACE_STAGE.to_string(),
                reason,
                related: Vec::new(),
                last_observed: outcome.observed().to_vec(),
            })),
        }
    }

    /// Read-only post-condition check. Problems become warnings.
    fn verify(
        &self,
        ctx: &RunContext,
        gate: &HealthGate<'_>,
        stages: &[&Stage],
        report: &mut DeployReport,
    ) {
        for stage in stages {
            let Some(health) = &stage.health else {
                continue;
            };
            let selector = health.selector(&ctx.namespace);
            match gate.check_once(&selector, health.readiness) {
                Ok((true, _)) => {}
                Ok((false, handles)) => {
                    let states: Vec<String> = handles.iter().map(|h| h.to_string()).collect();
                    let observed = if states.is_empty() {
                        "nothing matched".to_string()
                    } else {
                        states.join(", ")
                    };
                    report.warnings.push(Warning::new(
                        &stage.name,
                        format!("not ready at verification: {}", observed),
                    ));
                }
                Err(err) => report.warnings.push(Warning::new(
                    &stage.name,
                    format!("verification check failed: {}", err),
                )),
            }
        }

        match self
            .deps
            .client
            .get(&Selector::all("endpoints", &ctx.namespace))
        {
            Ok(endpoints) => {
                for ep in endpoints.iter().filter(|h| h.state != ResourceState::Ready) {
                    report.warnings.push(Warning::new(
                        "verify",
                        format!("service '{}' has no ready endpoints", ep.name),
                    ));
                }
            }
            Err(err) => report.warnings.push(Warning::new(
                "verify",
                format!("could not list service endpoints: {}", err),
            )),
        }
    }
}

fn advance(report: &mut DeployReport, stage: &Stage) {
    if let Some(milestone) = stage.milestone {
        report.phase = report.phase.max(milestone);
        info!(stage = %stage.name, phase = %report.phase, "stage complete");
    } else {
        info!(stage = %stage.name, "stage complete");
    }
}
