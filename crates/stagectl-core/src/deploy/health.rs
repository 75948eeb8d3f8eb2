//! Health gate: bounded polling for a readiness predicate.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::clock::{Clock, Interrupt};
use crate::cluster::ClusterClient;
use crate::error::{ClusterError, FailureReason};
use crate::plan::Readiness;
use crate::types::{ResourceHandle, Selector};

/// Result of waiting on a readiness predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Ready {
        observed: Vec<ResourceHandle>,
        polls: u32,
    },
    TimedOut {
        observed: Vec<ResourceHandle>,
        polls: u32,
        last_error: Option<ClusterError>,
    },
    Interrupted {
        observed: Vec<ResourceHandle>,
    },
}

impl GateOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, GateOutcome::Ready { .. })
    }

    pub fn observed(&self) -> &[ResourceHandle] {
        match self {
            GateOutcome::Ready { observed, .. }
            | GateOutcome::TimedOut { observed, .. }
            | GateOutcome::Interrupted { observed } => observed,
        }
    }

    /// Describe a non-ready outcome as a failure reason.
    pub fn failure(&self, selector: &Selector, timeout: Duration) -> Option<FailureReason> {
        match self {
            GateOutcome::Ready { .. } => None,
            GateOutcome::TimedOut {
                polls, last_error, ..
            } => Some(FailureReason::HealthTimedOut {
                selector: selector.to_string(),
                timeout,
                polls: *polls,
                last_error: last_error.clone(),
            }),
            GateOutcome::Interrupted { .. } => Some(FailureReason::Interrupted {
                selector: selector.to_string(),
            }),
        }
    }
}

/// Polls the cluster at a fixed interval until a predicate holds.
///
/// Every wait is bounded: the number of polls is fixed up front from the
/// timeout and interval, so a stalled clock cannot make it loop forever.
pub struct HealthGate<'a> {
    client: &'a dyn ClusterClient,
    clock: &'a dyn Clock,
    interrupt: &'a Interrupt,
    poll_interval: Duration,
}

impl<'a> HealthGate<'a> {
    pub fn new(
        client: &'a dyn ClusterClient,
        clock: &'a dyn Clock,
        interrupt: &'a Interrupt,
        poll_interval: Duration,
    ) -> Self {
        Self {
            client,
            clock,
            interrupt,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Wait until everything `selector` matches satisfies `readiness`, or
    /// `timeout` elapses. Read-only.
    pub fn await_ready(
        &self,
        selector: &Selector,
        readiness: Readiness,
        timeout: Duration,
    ) -> GateOutcome {
        let max_polls = max_polls(timeout, self.poll_interval);
        let start = self.clock.now();
        let mut observed = Vec::new();
        let mut last_error = None;
        let mut polls = 0;

        loop {
            if self.interrupt.is_triggered() {
                warn!(%selector, "health wait interrupted");
                return GateOutcome::Interrupted { observed };
            }

            polls += 1;
            match self.client.get(selector) {
                Ok(handles) => {
                    last_error = None;
                    if readiness.is_satisfied(&handles) {
                        info!(%selector, polls, "health gate satisfied");
                        return GateOutcome::Ready {
                            observed: handles,
                            polls,
                        };
                    }
                    debug!(%selector, polls, matched = handles.len(), "not ready yet");
                    observed = handles;
                }
                Err(err) => {
                    debug!(%selector, polls, error = %err, "health poll failed");
                    last_error = Some(err);
                }
            }

            let elapsed = self.clock.now().saturating_sub(start);
            let remaining = timeout.saturating_sub(elapsed);
            if !remaining.is_zero() {
                self.clock.sleep(self.poll_interval.min(remaining));
            }

            let elapsed = self.clock.now().saturating_sub(start);
            if polls >= max_polls || elapsed >= timeout {
                warn!(%selector, polls, ?timeout, "health gate timed out");
                return GateOutcome::TimedOut {
                    observed,
                    polls,
                    last_error,
                };
            }
        }
    }

    /// Evaluate the predicate once, without waiting.
    pub fn check_once(
        &self,
        selector: &Selector,
        readiness: Readiness,
    ) -> Result<(bool, Vec<ResourceHandle>), ClusterError> {
        let handles = self.client.get(selector)?;
        Ok((readiness.is_satisfied(&handles), handles))
    }
}

fn max_polls(timeout: Duration, interval: Duration) -> u32 {
    let ratio = timeout.as_nanos().div_ceil(interval.as_nanos());
    u32::try_from(ratio).unwrap_or(u32::MAX).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_polls_rounds_up() {
        assert_eq!(max_polls(Duration::from_secs(10), Duration::from_secs(2)), 5);
        assert_eq!(max_polls(Duration::from_secs(11), Duration::from_secs(2)), 6);
        assert_eq!(max_polls(Duration::from_secs(1), Duration::from_secs(2)), 1);
        assert_eq!(max_polls(Duration::ZERO, Duration::from_secs(2)), 1);
    }
}
