//! Shared core types used across the cluster boundary, health gate and reconciler.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Last observed state of a cluster resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceState {
    /// Exists but has not reported readiness yet.
    Pending,
    /// Reports ready (or simply exists, for kinds without a readiness notion).
    Ready,
    /// Deletion requested, still present.
    Terminating,
    /// Absent.
    NotFound,
    /// Reports a failed condition.
    Error,
}

impl ResourceState {
    /// Whether the resource still occupies the cluster.
    pub fn is_present(self) -> bool {
        !matches!(self, ResourceState::NotFound)
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResourceState::Pending => "Pending",
            ResourceState::Ready => "Ready",
            ResourceState::Terminating => "Terminating",
            ResourceState::NotFound => "NotFound",
            ResourceState::Error => "Error",
        };
        f.write_str(label)
    }
}

/// A reference to a cluster resource plus the state seen by the last poll.
///
/// Handles are never cached across polls; every check re-fetches them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHandle {
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
    pub state: ResourceState,
}

impl ResourceHandle {
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: Option<&str>,
        state: ResourceState,
    ) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            namespace: namespace.map(str::to_string),
            state,
        }
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.kind, self.name, self.state)
    }
}

/// Which resources of a kind a selector matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Target {
    /// A single resource by name.
    Name(String),
    /// Every resource carrying the label expression (`key=value`).
    Label(String),
    /// Every resource of the kind.
    All,
}

/// Resource selector understood by the cluster client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selector {
    pub kind: String,
    /// `None` for cluster-scoped kinds such as namespaces.
    pub namespace: Option<String>,
    pub target: Target,
}

impl Selector {
    pub fn named(kind: impl Into<String>, namespace: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            namespace: namespace.map(str::to_string),
            target: Target::Name(name.into()),
        }
    }

    pub fn labeled(kind: impl Into<String>, namespace: &str, label: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            namespace: Some(namespace.to_string()),
            target: Target::Label(label.into()),
        }
    }

    pub fn all(kind: impl Into<String>, namespace: &str) -> Self {
        Self {
            kind: kind.into(),
            namespace: Some(namespace.to_string()),
            target: Target::All,
        }
    }

    /// Selector for the namespace object itself.
    pub fn namespace(name: &str) -> Self {
        Self::named("namespace", None, name)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Target::Name(name) => write!(f, "{}/{}", self.kind, name)?,
            Target::Label(label) => write!(f, "{} -l {}", self.kind, label)?,
            Target::All => write!(f, "{} --all", self.kind)?,
        }
        if let Some(ns) = &self.namespace {
            write!(f, " -n {}", ns)?;
        }
        Ok(())
    }
}

/// Grace period for a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GracePeriod {
    /// Let the cluster apply the resource's own grace period.
    Default,
    /// Explicit grace period.
    Seconds(u64),
    /// Immediate, forced removal.
    Zero,
}

impl GracePeriod {
    pub fn is_forced(self) -> bool {
        matches!(self, GracePeriod::Zero)
    }

    pub fn from_duration(duration: Duration) -> Self {
        match duration.as_secs() {
            0 => GracePeriod::Zero,
            secs => GracePeriod::Seconds(secs),
        }
    }
}

/// A named resource definition. The payload is opaque to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub name: String,
    pub payload: String,
}

impl Manifest {
    pub fn new(name: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
        }
    }
}

/// Condition for the cluster-side blocking wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCondition {
    Ready,
    Deleted,
}

/// Result of a cluster-side blocking wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Met,
    TimedOut,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_display() {
        let sel = Selector::labeled("pods", "shop", "tier=data");
        assert_eq!(sel.to_string(), "pods -l tier=data -n shop");
        assert_eq!(Selector::namespace("shop").to_string(), "namespace/shop");
    }

    #[test]
    fn test_grace_from_duration() {
        assert_eq!(GracePeriod::from_duration(Duration::ZERO), GracePeriod::Zero);
        assert_eq!(
            GracePeriod::from_duration(Duration::from_secs(5)),
            GracePeriod::Seconds(5)
        );
    }

    #[test]
    fn test_not_found_is_not_present() {
        assert!(!ResourceState::NotFound.is_present());
        assert!(ResourceState::Terminating.is_present());
    }
}
