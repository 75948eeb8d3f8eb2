//! Error types for stagectl
//!
//! Low-level failures are typed with `thiserror` so they can be attached to
//! stage outcomes verbatim. Command and config plumbing uses `anyhow`.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::ResourceHandle;

/// Failure reported by the cluster client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusterError {
    /// The client tool could not be started
    #[error("failed to run {program}: {message}")]
    Spawn { program: String, message: String },

    /// The client tool ran and reported failure
    #[error("{operation} {target} failed: {stderr}")]
    Command {
        operation: String,
        target: String,
        stderr: String,
    },

    /// The client tool produced output that could not be interpreted
    #[error("unexpected output from {operation}: {message}")]
    Parse { operation: String, message: String },
}

/// Failure reported by the manifest source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    #[error("manifest not found: {path}")]
    NotFound { path: PathBuf },

    #[error("failed to read manifest {path}: {message}")]
    Read { path: PathBuf, message: String },
}

/// Why a stage (or one of its resources) did not complete.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    #[error("manifest '{resource}' unavailable: {source}")]
    ManifestUnavailable {
        resource: String,
        source: ManifestError,
    },

    #[error("applying '{resource}' failed: {source}")]
    ApplyFailed {
        resource: String,
        source: ClusterError,
    },

    #[error("deleting '{resource}' failed: {source}")]
    DeleteFailed {
        resource: String,
        source: ClusterError,
    },

    #[error("health gate on {selector} timed out after {timeout:?} ({polls} polls){}", last_error_suffix(.last_error))]
    HealthTimedOut {
        selector: String,
        timeout: Duration,
        polls: u32,
        last_error: Option<ClusterError>,
    },

    #[error("interrupted while waiting on {selector}")]
    Interrupted { selector: String },
}

fn last_error_suffix(error: &Option<ClusterError>) -> String {
    match error {
        Some(err) => format!("; last error: {}", err),
        None => String::new(),
    }
}

impl FailureReason {
    pub fn is_interrupt(&self) -> bool {
        matches!(self, FailureReason::Interrupted { .. })
    }

    pub fn is_health_timeout(&self) -> bool {
        matches!(self, FailureReason::HealthTimedOut { .. })
    }
}

/// A fatal stage failure: which stage, why, and what the cluster last showed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: String,
    pub reason: FailureReason,
    /// Further failures from the same stage, in resource order.
    pub related: Vec<FailureReason>,
    pub last_observed: Vec<ResourceHandle>,
}

impl StageFailure {
    /// The primary reason followed by every related one.
    pub fn reasons(&self) -> impl Iterator<Item = &FailureReason> {
        std::iter::once(&self.reason).chain(&self.related)
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage '{}' failed: {}", self.stage, self.reason)?;
        for reason in &self.related {
            write!(f, "; {}", reason)?;
        }
        if !self.last_observed.is_empty() {
            let states: Vec<String> = self.last_observed.iter().map(|h| h.to_string()).collect();
            write!(f, " [last observed: {}]", states.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for StageFailure {}

/// A non-fatal problem recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub stage: String,
    pub message: String,
}

impl Warning {
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage, self.message)
    }
}
