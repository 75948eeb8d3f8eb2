//! Forced-cleanup reconciler.
//!
//! Drives a selector to "nothing left" by a graceful delete followed by a
//! bounded number of escalated deletes. When the budget runs out the
//! leftovers are reported, never dropped.

use std::time::Duration;

use tracing::{info, warn};

use crate::clock::{Clock, Interrupt};
use crate::cluster::ClusterClient;
use crate::error::ClusterError;
use crate::types::{GracePeriod, ResourceHandle, Selector};

/// Pending cleanup for one resource category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupTask {
    pub selector: Selector,
    /// Maximum number of escalated deletes after the graceful one.
    pub retry_budget: u32,
    /// Grace period used when escalating.
    pub force_grace: GracePeriod,
}

impl CleanupTask {
    pub fn new(selector: Selector, retry_budget: u32) -> Self {
        Self {
            selector,
            retry_budget,
            force_grace: GracePeriod::Zero,
        }
    }

    pub fn with_force_grace(mut self, grace: GracePeriod) -> Self {
        self.force_grace = grace;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Cleared,
    ResidualResourcesReported {
        remaining: Vec<ResourceHandle>,
        last_error: Option<ClusterError>,
    },
    Interrupted {
        remaining: Vec<ResourceHandle>,
    },
}

impl ReconcileOutcome {
    pub fn is_cleared(&self) -> bool {
        matches!(self, ReconcileOutcome::Cleared)
    }
}

pub struct Reconciler<'a> {
    client: &'a dyn ClusterClient,
    clock: &'a dyn Clock,
    interrupt: &'a Interrupt,
    interval: Duration,
    allow_force: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        client: &'a dyn ClusterClient,
        clock: &'a dyn Clock,
        interrupt: &'a Interrupt,
        interval: Duration,
    ) -> Self {
        Self {
            client,
            clock,
            interrupt,
            interval,
            allow_force: true,
        }
    }

    /// Without force, escalation re-issues graceful deletes instead of zero-grace ones.
    pub fn allow_force(mut self, allow: bool) -> Self {
        self.allow_force = allow;
        self
    }

    pub fn reconcile(&self, task: &CleanupTask) -> ReconcileOutcome {
        let selector = &task.selector;
        let mut remaining: Vec<ResourceHandle> = Vec::new();
        let mut last_error = None;
        let mut budget = task.retry_budget;
        let mut graceful_done = false;

        loop {
            if self.interrupt.is_triggered() {
                warn!(%selector, "cleanup interrupted");
                return ReconcileOutcome::Interrupted { remaining };
            }

            match self.client.get(selector) {
                Ok(handles) => {
                    remaining = handles
                        .into_iter()
                        .filter(|h| h.state.is_present())
                        .collect();
                    if remaining.is_empty() {
                        info!(%selector, "cleanup cleared");
                        return ReconcileOutcome::Cleared;
                    }
                }
                Err(err) => {
                    warn!(%selector, error = %err, "could not list resources for cleanup");
                    last_error = Some(err);
                }
            }

            let grace = if !graceful_done {
                graceful_done = true;
                GracePeriod::Default
            } else if budget == 0 {
                warn!(
                    %selector,
                    remaining = remaining.len(),
                    "cleanup retry budget exhausted; residual resources remain"
                );
                return ReconcileOutcome::ResidualResourcesReported {
                    remaining,
                    last_error,
                };
            } else {
                budget -= 1;
                let grace = self.escalation_grace(task);
                info!(%selector, ?grace, attempts_left = budget, "escalating cleanup");
                grace
            };

            if let Err(err) = self.client.delete(selector, grace) {
                warn!(%selector, error = %err, "cleanup delete failed");
                last_error = Some(err);
            }
            self.clock.sleep(self.interval);
        }
    }

    fn escalation_grace(&self, task: &CleanupTask) -> GracePeriod {
        if self.allow_force {
            task.force_grace
        } else {
            GracePeriod::Default
        }
    }
}
