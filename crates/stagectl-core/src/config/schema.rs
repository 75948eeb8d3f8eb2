//! Configuration schema for stagectl.toml
//!
//! Every scalar is optional so a project file can override a global file
//! field by field. Effective values (with defaults applied) are read through
//! the accessor methods.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::cluster::kubectl::DEFAULT_REQUEST_TIMEOUT;
use crate::orchestration::RunSettings;
use crate::plan::{DeployPhase, DeploymentPlan, HealthCheck, Readiness, Stage, StageResource};
use crate::types::Target;

pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_MANIFESTS_DIR: &str = "k8s";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;
const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 300;
const DEFAULT_RETRY_BUDGET: u32 = 3;
const DEFAULT_RETRY_INTERVAL_SECS: u64 = 5;
const DEFAULT_POD_GRACE_SECS: u64 = 5;
const DEFAULT_NAMESPACE_TIMEOUT_SECS: u64 = 120;

/// Root configuration structure for stagectl.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StagectlConfig {
    /// Target namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Image registry prefix substituted as `${REGISTRY}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_tag: Option<String>,

    /// Directory holding the manifest files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifests_dir: Option<PathBuf>,

    /// Label expression carried by every managed workload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_label: Option<String>,

    /// Cluster client program
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubectl: Option<String>,

    /// Cluster client context to target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_context: Option<String>,

    #[serde(default)]
    pub health: HealthSettings,

    #[serde(default)]
    pub cleanup: CleanupSettings,

    /// Extra manifest placeholders
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Replaces the built-in plan when non-empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<StageConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_timeout_secs: Option<u64>,

    /// Per-call API bound passed to kubectl as `--request-timeout`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_budget: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_interval_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_grace_period_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_timeout_secs: Option<u64>,
}

/// One `[[stages]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: String,

    /// Manifest files, applied in order
    #[serde(default)]
    pub resources: Vec<ResourceEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthEntry>,

    /// Falls back to `health.default_timeout_secs`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub best_effort: bool,

    /// Deploy phase reached once this stage is healthy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone: Option<DeployPhase>,

    #[serde(default = "default_true")]
    pub teardown: bool,

    #[serde(default)]
    pub data_bearing: bool,
}

/// A stage resource: a bare file name (required) or a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceEntry {
    File(String),
    Detailed {
        file: String,
        #[serde(default = "default_true")]
        required: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthEntry {
    #[serde(default = "default_health_kind")]
    pub kind: String,

    /// Label expression; mutually exclusive with `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Watch a namespace other than the run namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default = "default_readiness")]
    pub readiness: Readiness,
}

fn default_true() -> bool {
    true
}

fn default_health_kind() -> String {
    "pods".to_string()
}

fn default_readiness() -> Readiness {
    Readiness::AllReady
}

impl StagectlConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE)
    }

    pub fn image_tag(&self) -> &str {
        self.image_tag.as_deref().unwrap_or("latest")
    }

    pub fn manifests_dir(&self) -> PathBuf {
        self.manifests_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MANIFESTS_DIR))
    }

    pub fn managed_label(&self) -> String {
        self.managed_label
            .clone()
            .unwrap_or_else(|| format!("app.kubernetes.io/part-of={}", self.namespace()))
    }

    pub fn default_timeout(&self) -> Duration {
        secs(self.health.default_timeout_secs, DEFAULT_STAGE_TIMEOUT_SECS)
    }

    pub fn request_timeout(&self) -> Duration {
        secs(
            self.health.request_timeout_secs,
            DEFAULT_REQUEST_TIMEOUT.as_secs(),
        )
    }

    /// Timing knobs for one run, with defaults filled in.
    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            poll_interval: secs(self.health.poll_interval_secs, DEFAULT_POLL_INTERVAL_SECS),
            namespace_timeout: secs(
                self.cleanup.namespace_timeout_secs,
                DEFAULT_NAMESPACE_TIMEOUT_SECS,
            ),
            managed_label: self.managed_label(),
            retry_budget: self.cleanup.retry_budget.unwrap_or(DEFAULT_RETRY_BUDGET),
            retry_interval: secs(self.cleanup.retry_interval_secs, DEFAULT_RETRY_INTERVAL_SECS),
            pod_grace_period: secs(self.cleanup.pod_grace_period_secs, DEFAULT_POD_GRACE_SECS),
        }
    }

    /// The configured plan, or the built-in one when no stages are listed.
    pub fn plan(&self) -> anyhow::Result<DeploymentPlan> {
        if self.stages.is_empty() {
            return Ok(DeploymentPlan::standard(self.default_timeout()));
        }
        let stages = self
            .stages
            .iter()
            .map(|entry| entry.to_stage(self.default_timeout()))
            .collect::<anyhow::Result<Vec<_>>>()?;
        DeploymentPlan::new(stages).context("Invalid [[stages]] configuration")
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(ns) = &self.namespace {
            validate_namespace(ns)?;
        }

        let non_zero = [
            ("health.poll_interval_secs", self.health.poll_interval_secs),
            ("health.default_timeout_secs", self.health.default_timeout_secs),
            ("health.request_timeout_secs", self.health.request_timeout_secs),
            ("cleanup.retry_interval_secs", self.cleanup.retry_interval_secs),
            (
                "cleanup.namespace_timeout_secs",
                self.cleanup.namespace_timeout_secs,
            ),
        ];
        for (key, value) in non_zero {
            if value == Some(0) {
                anyhow::bail!("{} must be greater than zero", key);
            }
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            stage
                .validate()
                .with_context(|| format!("Invalid stage '{}'", stage.name))?;
            if !seen.insert(stage.name.as_str()) {
                anyhow::bail!("Duplicate stage name: {}", stage.name);
            }
        }
        Ok(())
    }
}

impl StageConfig {
    fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Stage name cannot be empty");
        }
        if self.timeout_secs == Some(0) {
            anyhow::bail!("timeout_secs must be greater than zero");
        }
        if let Some(health) = &self.health {
            if health.label.is_some() && health.name.is_some() {
                anyhow::bail!("Cannot specify both 'label' and 'name' in health");
            }
            if let Some(ns) = &health.namespace {
                validate_namespace(ns)?;
            }
        }
        Ok(())
    }

    fn to_stage(&self, default_timeout: Duration) -> anyhow::Result<Stage> {
        self.validate()
            .with_context(|| format!("Invalid stage '{}'", self.name))?;
        let timeout = self
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(default_timeout);

        let mut stage = Stage::new(&self.name, timeout);
        for entry in &self.resources {
            stage = stage.with_resource(match entry {
                ResourceEntry::File(file) => StageResource::required(file),
                ResourceEntry::Detailed { file, required: true } => StageResource::required(file),
                ResourceEntry::Detailed { file, required: false } => StageResource::optional(file),
            });
        }
        if let Some(health) = &self.health {
            let target = match (&health.label, &health.name) {
                (Some(label), _) => Target::Label(label.clone()),
                (None, Some(name)) => Target::Name(name.clone()),
                (None, None) => Target::All,
            };
            stage = stage.with_health(HealthCheck {
                kind: health.kind.clone(),
                target,
                namespace: health.namespace.clone(),
                readiness: health.readiness,
            });
        }
        if let Some(phase) = self.milestone {
            stage = stage.reaching(phase);
        }
        if self.best_effort {
            stage = stage.best_effort();
        }
        if self.data_bearing {
            stage = stage.data_bearing();
        }
        if !self.teardown {
            stage = stage.retained_on_teardown();
        }
        Ok(stage)
    }
}

/// DNS-1123 label: lowercase alphanumerics and '-', alphanumeric at both ends.
pub fn validate_namespace(name: &str) -> anyhow::Result<()> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let alnum_ends = name
        .chars()
        .next()
        .zip(name.chars().last())
        .is_some_and(|(first, last)| first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric());

    if name.is_empty() || name.len() > 63 || !valid_chars || !alnum_ends {
        anyhow::bail!(
            "Invalid namespace '{}': must be a lowercase DNS-1123 label of at most 63 characters",
            name
        );
    }
    Ok(())
}

fn secs(value: Option<u64>, default: u64) -> Duration {
    Duration::from_secs(value.unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_validation() {
        assert!(validate_namespace("shop").is_ok());
        assert!(validate_namespace("shop-staging-2").is_ok());
        assert!(validate_namespace("").is_err());
        assert!(validate_namespace("Shop").is_err());
        assert!(validate_namespace("-shop").is_err());
        assert!(validate_namespace("shop_prod").is_err());
        assert!(validate_namespace(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_defaults_without_stages_use_standard_plan() {
        let config = StagectlConfig::new();
        let plan = config.plan().unwrap();
        assert_eq!(plan.stages().len(), 7);
        assert_eq!(config.namespace(), DEFAULT_NAMESPACE);
        assert_eq!(config.run_settings().poll_interval, Duration::from_secs(2));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_request_timeout_must_be_positive() {
        let mut config = StagectlConfig::new();
        config.health.request_timeout_secs = Some(10);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());

        config.health.request_timeout_secs = Some(0);
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("health.request_timeout_secs"));
    }

    #[test]
    fn test_stage_entries_build_plan() {
        let config = StagectlConfig {
            health: HealthSettings {
                default_timeout_secs: Some(30),
                ..HealthSettings::default()
            },
            stages: vec![StageConfig {
                name: "infra".to_string(),
                resources: vec![
                    ResourceEntry::File("db.yaml".to_string()),
                    ResourceEntry::Detailed {
                        file: "extras.yaml".to_string(),
                        required: false,
                    },
                ],
                health: Some(HealthEntry {
                    kind: "pods".to_string(),
                    label: Some("tier=data".to_string()),
                    name: None,
                    namespace: None,
                    readiness: Readiness::AllReady,
                }),
                timeout_secs: None,
                best_effort: false,
                milestone: Some(DeployPhase::InfraReady),
                teardown: true,
                data_bearing: true,
            }],
            ..StagectlConfig::default()
        };

        let plan = config.plan().unwrap();
        let stage = &plan.stages()[0];
        assert_eq!(stage.timeout, Duration::from_secs(30));
        assert!(stage.resources[0].required);
        assert!(!stage.resources[1].required);
        assert!(stage.data_bearing);
        assert_eq!(stage.milestone, Some(DeployPhase::InfraReady));
    }
}
