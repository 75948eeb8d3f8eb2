//! Undeploy path: teardown stages in reverse order, then namespace-wide
//! sweeps, then the namespace itself.
//!
//! Every step is best-effort. Failures are collected as warnings or residual
//! reports and never stop the remaining cleanup. Running undeploy against an
//! already-clean namespace is a no-op that still reports `Cleared`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::{
    Collaborators, EXIT_FAILURE, EXIT_INTERRUPTED, EXIT_OK, RunSettings, StageRecord, StageStatus,
};
use crate::confirm::{ActionKind, Authorization, ConfirmationGate};
use crate::context::RunContext;
use crate::deploy::{CleanupTask, HealthGate, ReconcileOutcome, Reconciler, StageExecutor};
use crate::error::{ClusterError, Warning};
use crate::plan::DeploymentPlan;
use crate::types::{
    GracePeriod, ResourceHandle, ResourceState, Selector, Target, WaitCondition, WaitOutcome,
};

/// Kinds the catch-all sweep never touches.
const SWEEP_EXCLUDED_KINDS: &[&str] = &["events"];
const STORAGE_CLAIM_KIND: &str = "persistentvolumeclaims";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndeployOutcome {
    Cleared,
    ResidualResourcesReported,
    UserAbort,
    Interrupted,
}

/// What happened to the namespace object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceStatus {
    /// The run stopped before reaching the namespace step.
    Untouched,
    /// Did not exist when the run reached it.
    Absent,
    Deleted,
    /// Kept because data was requested to be kept.
    RetainedForData,
    /// Kept because the operator declined its deletion.
    RetainedByOperator,
    /// Deletion was requested but did not finish in time.
    Stuck,
}

impl NamespaceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            NamespaceStatus::Untouched => "untouched",
            NamespaceStatus::Absent => "absent",
            NamespaceStatus::Deleted => "deleted",
            NamespaceStatus::RetainedForData => "retained (keep data)",
            NamespaceStatus::RetainedByOperator => "retained (declined)",
            NamespaceStatus::Stuck => "stuck terminating",
        }
    }
}

/// Resources a cleanup could not remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResidualReport {
    pub scope: String,
    pub selector: Selector,
    pub remaining: Vec<ResourceHandle>,
    pub last_error: Option<ClusterError>,
}

#[derive(Debug, Clone)]
pub struct UndeployReport {
    pub namespace: String,
    pub outcome: UndeployOutcome,
    pub stages: Vec<StageRecord>,
    pub warnings: Vec<Warning>,
    pub residual: Vec<ResidualReport>,
    pub namespace_status: NamespaceStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl UndeployReport {
    fn new(ctx: &RunContext) -> Self {
        let now = Utc::now();
        Self {
            namespace: ctx.namespace.clone(),
            outcome: UndeployOutcome::Cleared,
            stages: Vec::new(),
            warnings: Vec::new(),
            residual: Vec::new(),
            namespace_status: NamespaceStatus::Untouched,
            started_at: now,
            finished_at: now,
        }
    }

    fn finish(mut self, outcome: UndeployOutcome) -> Self {
        self.outcome = outcome;
        self.finished_at = Utc::now();
        self
    }

    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            UndeployOutcome::Cleared | UndeployOutcome::UserAbort => EXIT_OK,
            UndeployOutcome::ResidualResourcesReported => EXIT_FAILURE,
            UndeployOutcome::Interrupted => EXIT_INTERRUPTED,
        }
    }
}

/// Signals that an interrupt stopped the current step.
struct Stopped;

pub struct UndeployOrchestrator<'a> {
    deps: Collaborators<'a>,
    plan: &'a DeploymentPlan,
    settings: RunSettings,
}

impl<'a> UndeployOrchestrator<'a> {
    pub fn new(deps: Collaborators<'a>, plan: &'a DeploymentPlan, settings: RunSettings) -> Self {
        Self {
            deps,
            plan,
            settings,
        }
    }

    pub fn run(&self, ctx: &RunContext) -> UndeployReport {
        let mut report = UndeployReport::new(ctx);
        let flags = &ctx.flags;
        info!(
            namespace = %ctx.namespace,
            keep_data = flags.keep_data,
            force = flags.force_delete,
            "starting undeploy"
        );
        debug!("no run lease is taken; concurrent runs against one namespace are not detected");

        // All up-front authorizations happen before anything is deleted.
        let confirm = ConfirmationGate::new(self.deps.prompter);
        if confirm.authorize(ActionKind::ManagedResourceDeletion, ctx) == Authorization::Abort {
            return report.finish(UndeployOutcome::UserAbort);
        }
        if !flags.keep_data && confirm.authorize(ActionKind::DataDeletion, ctx) == Authorization::Abort
        {
            return report.finish(UndeployOutcome::UserAbort);
        }

        let gate = HealthGate::new(
            self.deps.client,
            self.deps.clock,
            self.deps.interrupt,
            self.settings.poll_interval,
        );
        let executor = StageExecutor::new(self.deps.client, self.deps.manifests, &gate);
        let mut pending = Vec::new();

        for stage in self.plan.teardown_stages(flags) {
            if self.deps.interrupt.is_triggered() {
                return report.finish(UndeployOutcome::Interrupted);
            }
            let outcome = executor.run_stage(&stage, ctx);
            report
                .stages
                .push(StageRecord::new(&stage.name, StageStatus::from(&outcome)));
            if outcome.is_interrupt() {
                warn!(stage = %stage.name, "undeploy interrupted");
                return report.finish(UndeployOutcome::Interrupted);
            }
            for reason in outcome.failures() {
                report
                    .warnings
                    .push(Warning::new(&stage.name, reason.to_string()));
            }
            if outcome.needs_cleanup()
                && let Some(health) = &stage.health
            {
                debug!(stage = %stage.name, "queueing forced cleanup");
                pending.push((
                    stage.name.clone(),
                    CleanupTask::new(health.selector(&ctx.namespace), self.settings.retry_budget),
                ));
            }
        }

        let namespace_exists = self.namespace_exists(ctx, &mut report);
        if namespace_exists && self.sweep_namespace(ctx, &mut report).is_err() {
            return report.finish(UndeployOutcome::Interrupted);
        }

        let reconciler = self.reconciler(self.settings.retry_interval, flags.force_delete);
        for (scope, task) in &pending {
            if self.reconcile(&reconciler, scope, task, &mut report).is_err() {
                return report.finish(UndeployOutcome::Interrupted);
            }
        }

        self.remove_namespace(ctx, &confirm, namespace_exists, &mut report);

        let outcome = if report.residual.is_empty() {
            info!(namespace = %ctx.namespace, "undeploy cleared");
            UndeployOutcome::Cleared
        } else {
            warn!(
                namespace = %ctx.namespace,
                residual = report.residual.len(),
                "undeploy finished with residual resources"
            );
            UndeployOutcome::ResidualResourcesReported
        };
        report.finish(outcome)
    }

    fn reconciler(&self, interval: Duration, allow_force: bool) -> Reconciler<'_> {
        Reconciler::new(
            self.deps.client,
            self.deps.clock,
            self.deps.interrupt,
            interval,
        )
        .allow_force(allow_force)
    }

    /// Unknown existence counts as existing so cleanup is still attempted.
    fn namespace_exists(&self, ctx: &RunContext, report: &mut UndeployReport) -> bool {
        match self.deps.client.get(&Selector::namespace(&ctx.namespace)) {
            Ok(handles) => handles.iter().any(|h| h.state.is_present()),
            Err(err) => {
                report.warnings.push(Warning::new(
                    "namespace",
                    format!("could not check namespace: {}", err),
                ));
                true
            }
        }
    }

    /// Storage claims, then lingering pods, then every remaining namespaced kind.
    ///
    /// With `keep-data` the storage claims and the catch-all are skipped and
    /// the pod sweep excludes the data tiers' pods.
    fn sweep_namespace(
        &self,
        ctx: &RunContext,
        report: &mut UndeployReport,
    ) -> Result<(), Stopped> {
        let ns = &ctx.namespace;
        let budget = self.settings.retry_budget;
        let escalation = self.reconciler(self.settings.retry_interval, ctx.flags.force_delete);

        if !ctx.flags.keep_data {
            let task = CleanupTask::new(
                Selector::labeled(STORAGE_CLAIM_KIND, ns, &self.settings.managed_label),
                budget,
            );
            self.reconcile(&escalation, "storage-claims", &task, report)?;
        }

        // Stragglers are force-terminated once their short grace has passed.
        match self.pod_sweep_label(ctx) {
            Some(label) => {
                let pods = self.reconciler(self.settings.pod_grace_period, true);
                let task = CleanupTask::new(Selector::labeled("pods", ns, label), budget);
                self.reconcile(&pods, "pods", &task, report)?;
            }
            None => info!(namespace = %ns, "pod sweep skipped; data tier pods cannot be told apart"),
        }

        if ctx.flags.keep_data {
            info!(namespace = %ns, "catch-all sweep skipped to keep data tiers");
            return Ok(());
        }

        let kinds = match self.deps.client.discover_deletable_kinds() {
            Ok(kinds) => kinds,
            Err(err) => {
                report.warnings.push(Warning::new(
                    "sweep",
                    format!("could not discover resource kinds: {}", err),
                ));
                return Ok(());
            }
        };
        for kind in kinds.iter().filter(|kind| sweepable(kind)) {
            if self.deps.interrupt.is_triggered() {
                return Err(Stopped);
            }
            debug!(%kind, namespace = %ns, "sweeping kind");
            if let Err(err) = self
                .deps
                .client
                .delete(&Selector::all(kind.as_str(), ns), GracePeriod::Default)
            {
                report
                    .warnings
                    .push(Warning::new("sweep", format!("deleting {}: {}", kind, err)));
            }
        }
        Ok(())
    }

    /// Label for the pod sweep. With `keep-data`, every data-bearing stage's
    /// health label is negated; `None` when one cannot be.
    fn pod_sweep_label(&self, ctx: &RunContext) -> Option<String> {
        let mut label = self.settings.managed_label.clone();
        if !ctx.flags.keep_data {
            return Some(label);
        }
        for stage in self.plan.stages().iter().filter(|s| s.data_bearing) {
            let health = stage.health.as_ref()?;
            if health
                .namespace
                .as_deref()
                .is_some_and(|other| other != ctx.namespace)
            {
                continue;
            }
            let Target::Label(expr) = &health.target else {
                return None;
            };
            label.push(',');
            label.push_str(&negate_label(expr)?);
        }
        Some(label)
    }

    fn reconcile(
        &self,
        reconciler: &Reconciler<'_>,
        scope: &str,
        task: &CleanupTask,
        report: &mut UndeployReport,
    ) -> Result<(), Stopped> {
        match reconciler.reconcile(task) {
            ReconcileOutcome::Cleared => Ok(()),
            ReconcileOutcome::ResidualResourcesReported {
                remaining,
                last_error,
            } => {
                report.residual.push(ResidualReport {
                    scope: scope.to_string(),
                    selector: task.selector.clone(),
                    remaining,
                    last_error,
                });
                Ok(())
            }
            ReconcileOutcome::Interrupted { .. } => Err(Stopped),
        }
    }

    fn remove_namespace(
        &self,
        ctx: &RunContext,
        confirm: &ConfirmationGate<'_>,
        exists: bool,
        report: &mut UndeployReport,
    ) {
        if ctx.flags.keep_data {
            info!(namespace = %ctx.namespace, "namespace retained to keep data");
            report.namespace_status = NamespaceStatus::RetainedForData;
            return;
        }
        if !exists {
            report.namespace_status = NamespaceStatus::Absent;
            return;
        }
        if confirm.authorize(ActionKind::NamespaceDeletion, ctx) == Authorization::Abort {
            report.namespace_status = NamespaceStatus::RetainedByOperator;
            return;
        }

        let selector = Selector::namespace(&ctx.namespace);
        let mut last_error = None;
        if let Err(err) = self.deps.client.delete(&selector, GracePeriod::Default) {
            warn!(namespace = %ctx.namespace, error = %err, "namespace delete failed");
            last_error = Some(err);
        }

        let waited = self.deps.client.wait(
            &selector,
            WaitCondition::Deleted,
            self.settings.namespace_timeout,
        );
        match waited {
            Ok(WaitOutcome::Met) => {
                info!(namespace = %ctx.namespace, "namespace deleted");
                report.namespace_status = NamespaceStatus::Deleted;
            }
            Ok(WaitOutcome::TimedOut) | Err(_) => {
                if let Err(err) = waited {
                    last_error = Some(err);
                }
                let remaining = match self.deps.client.get(&selector) {
                    Ok(handles) => handles
                        .into_iter()
                        .filter(|h| h.state.is_present())
                        .collect::<Vec<_>>(),
                    Err(err) => {
                        last_error = Some(err);
                        vec![ResourceHandle::new(
                            "namespace",
                            &ctx.namespace,
                            None,
                            ResourceState::Terminating,
                        )]
                    }
                };
                if remaining.is_empty() {
                    info!(namespace = %ctx.namespace, "namespace deleted");
                    report.namespace_status = NamespaceStatus::Deleted;
                    return;
                }
                warn!(
                    namespace = %ctx.namespace,
                    timeout = ?self.settings.namespace_timeout,
                    "namespace did not finish terminating"
                );
                report.namespace_status = NamespaceStatus::Stuck;
                report.residual.push(ResidualReport {
                    scope: "namespace".to_string(),
                    selector,
                    remaining,
                    last_error,
                });
            }
        }
    }
}

/// Whether the catch-all sweep deletes this kind. Kinds arrive as
/// `plural[.group]`.
fn sweepable(kind: &str) -> bool {
    let plural = kind.split('.').next().unwrap_or(kind);
    !SWEEP_EXCLUDED_KINDS.contains(&plural)
}

/// `key=value` (or `key==value`) to `key!=value`. Set-based or compound
/// expressions are not negated.
fn negate_label(expr: &str) -> Option<String> {
    if expr.contains(',') || expr.contains('(') {
        return None;
    }
    let (key, value) = expr.split_once('=')?;
    let value = value.strip_prefix('=').unwrap_or(value).trim();
    let key = key.trim();
    if key.is_empty() || key.ends_with('!') || value.is_empty() {
        return None;
    }
    Some(format!("{}!={}", key, value))
}
