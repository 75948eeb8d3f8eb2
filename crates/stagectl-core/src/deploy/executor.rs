//! Execute one stage: apply or delete its resources in list order, then gate
//! on health before the next stage may start.

use tracing::{debug, info, warn};

use super::health::HealthGate;
use crate::cluster::ClusterClient;
use crate::context::RunContext;
use crate::error::{FailureReason, StageFailure};
use crate::manifest::ManifestSource;
use crate::plan::{Criticality, Stage, StageAction, StageResource};
use crate::types::{GracePeriod, Manifest, ResourceHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Applied {
        observed: Vec<ResourceHandle>,
    },
    /// Completed, but with non-fatal failures (optional resources, best-effort health).
    PartiallyApplied {
        failures: Vec<FailureReason>,
        observed: Vec<ResourceHandle>,
    },
    Failed(StageFailure),
}

impl StageOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, StageOutcome::Applied { .. })
    }

    pub fn is_interrupt(&self) -> bool {
        matches!(self, StageOutcome::Failed(f) if f.reason.is_interrupt())
    }

    /// Every failure recorded by this outcome.
    pub fn failures(&self) -> Vec<&FailureReason> {
        match self {
            StageOutcome::Applied { .. } => Vec::new(),
            StageOutcome::PartiallyApplied { failures, .. } => failures.iter().collect(),
            StageOutcome::Failed(failure) => failure.reasons().collect(),
        }
    }

    /// A teardown that did not reach "gone" leaves work for the reconciler.
    pub fn needs_cleanup(&self) -> bool {
        match self {
            StageOutcome::Applied { .. } => false,
            StageOutcome::PartiallyApplied { failures, .. } => {
                failures.iter().any(FailureReason::is_health_timeout)
            }
            StageOutcome::Failed(failure) => !failure.reason.is_interrupt(),
        }
    }
}

pub struct StageExecutor<'a> {
    client: &'a dyn ClusterClient,
    manifests: &'a dyn ManifestSource,
    gate: &'a HealthGate<'a>,
}

impl<'a> StageExecutor<'a> {
    pub fn new(
        client: &'a dyn ClusterClient,
        manifests: &'a dyn ManifestSource,
        gate: &'a HealthGate<'a>,
    ) -> Self {
        Self {
            client,
            manifests,
            gate,
        }
    }

    pub fn run_stage(&self, stage: &Stage, ctx: &RunContext) -> StageOutcome {
        info!(stage = %stage.name, namespace = %ctx.namespace, action = ?stage.action, "running stage");
        match stage.action {
            StageAction::Apply => self.apply_stage(stage, ctx),
            StageAction::Delete => self.delete_stage(stage, ctx),
        }
    }

    fn apply_stage(&self, stage: &Stage, ctx: &RunContext) -> StageOutcome {
        let mut failures = Vec::new();

        for resource in &stage.resources {
            let result = self.load(stage, resource, ctx).and_then(|manifest| {
                debug!(stage = %stage.name, resource = %resource.file, "applying resource");
                self.client
                    .apply(&ctx.namespace, &manifest)
                    .map_err(|source| FailureReason::ApplyFailed {
                        resource: resource.file.clone(),
                        source,
                    })
            });
            if let Err(reason) = result {
                if resource.required {
                    warn!(stage = %stage.name, %reason, "required resource failed; aborting stage");
                    return StageOutcome::Failed(StageFailure {
                        stage: stage.name.clone(),
                        reason,
                        related: Vec::new(),
                        last_observed: Vec::new(),
                    });
                }
                warn!(stage = %stage.name, %reason, "optional resource failed");
                failures.push(reason);
            }
        }

        let observed = match &stage.health {
            Some(health) => {
                let selector = health.selector(&ctx.namespace);
                let outcome = self
                    .gate
                    .await_ready(&selector, health.readiness, stage.timeout);
                if let Some(reason) = outcome.failure(&selector, stage.timeout) {
                    if stage.criticality == Criticality::Fatal || reason.is_interrupt() {
                        return StageOutcome::Failed(StageFailure {
                            stage: stage.name.clone(),
                            reason,
                            related: Vec::new(),
                            last_observed: outcome.observed().to_vec(),
                        });
                    }
                    failures.push(reason);
                }
                outcome.observed().to_vec()
            }
            None => Vec::new(),
        };

        finish(failures, observed)
    }

    /// Delete in list order with ignore-missing semantics; every resource is
    /// attempted even after a failure.
    fn delete_stage(&self, stage: &Stage, ctx: &RunContext) -> StageOutcome {
        let mut failures = Vec::new();

        for resource in &stage.resources {
            let result = self.load(stage, resource, ctx).and_then(|manifest| {
                debug!(stage = %stage.name, resource = %resource.file, "deleting resource");
                self.client
                    .delete_manifest(&ctx.namespace, &manifest, GracePeriod::Default)
                    .map_err(|source| FailureReason::DeleteFailed {
                        resource: resource.file.clone(),
                        source,
                    })
            });
            if let Err(reason) = result {
                warn!(stage = %stage.name, %reason, "teardown of resource failed");
                failures.push(reason);
            }
        }

        if !stage.resources.is_empty() && failures.len() == stage.resources.len() {
            let reason = failures.remove(0);
            return StageOutcome::Failed(StageFailure {
                stage: stage.name.clone(),
                reason,
                related: failures,
                last_observed: Vec::new(),
            });
        }

        let observed = match &stage.health {
            Some(health) => {
                let selector = health.selector(&ctx.namespace);
                let outcome = self
                    .gate
                    .await_ready(&selector, health.readiness, stage.timeout);
                if let Some(reason) = outcome.failure(&selector, stage.timeout) {
                    if reason.is_interrupt() {
                        return StageOutcome::Failed(StageFailure {
                            stage: stage.name.clone(),
                            reason,
                            related: Vec::new(),
                            last_observed: outcome.observed().to_vec(),
                        });
                    }
                    failures.push(reason);
                }
                outcome.observed().to_vec()
            }
            None => Vec::new(),
        };

        finish(failures, observed)
    }

    fn load(
        &self,
        stage: &Stage,
        resource: &StageResource,
        ctx: &RunContext,
    ) -> Result<Manifest, FailureReason> {
        self.manifests
            .load(&stage.name, &resource.file, ctx)
            .map_err(|source| FailureReason::ManifestUnavailable {
                resource: resource.file.clone(),
                source,
            })
    }
}

fn finish(failures: Vec<FailureReason>, observed: Vec<ResourceHandle>) -> StageOutcome {
    if failures.is_empty() {
        StageOutcome::Applied { observed }
    } else {
        StageOutcome::PartiallyApplied { failures, observed }
    }
}
