//! Command context providing dependency injection for deploy operations.
//!
//! CommandContext resolves configuration once (files, environment, then
//! command-line overrides) and owns the cluster client and manifest source
//! every command talks to.

use std::path::PathBuf;

use anyhow::Context;
use tracing::debug;

use crate::cluster::{ClusterClient, KubectlClient};
use crate::config::{ConfigStore, StagectlConfig, validate_namespace};
use crate::context::{ForceFlags, RunContext};
use crate::manifest::{DirManifestSource, ManifestSource};
use crate::orchestration::RunSettings;
use crate::plan::DeploymentPlan;

/// Options every command accepts.
#[derive(Debug, Clone, Default)]
pub struct CommonOptions {
    /// Project config file to use instead of `./stagectl.toml`
    pub config_file: Option<PathBuf>,
    pub namespace: Option<String>,
    pub manifests_dir: Option<PathBuf>,
}

impl CommonOptions {
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_manifests_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.manifests_dir = Some(dir.into());
        self
    }
}

/// Dependency injection container for commands.
pub struct CommandContext {
    config: StagectlConfig,
    plan: DeploymentPlan,
    client: Box<dyn ClusterClient>,
    manifests: DirManifestSource,
}

impl CommandContext {
    /// Load config from the default layers and apply `common` on top.
    pub fn with_defaults(common: &CommonOptions) -> anyhow::Result<Self> {
        let mut store = ConfigStore::from_default()?;
        if let Some(path) = &common.config_file {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            store = store.with_project_file(path.clone());
        }
        let config = store.load_with_env()?;
        Self::from_config(config, common)
    }

    /// Build a context from an already-loaded config.
    pub fn from_config(mut config: StagectlConfig, common: &CommonOptions) -> anyhow::Result<Self> {
        if let Some(ns) = &common.namespace {
            validate_namespace(ns)?;
            config.namespace = Some(ns.clone());
        }
        if let Some(dir) = &common.manifests_dir {
            config.manifests_dir = Some(dir.clone());
        }

        let plan = config.plan()?;
        let mut client = KubectlClient::new(config.kubectl.as_deref().unwrap_or("kubectl"))
            .with_request_timeout(config.request_timeout());
        if let Some(kube_context) = &config.kube_context {
            client = client.with_context(kube_context);
        }
        let manifests = DirManifestSource::new(config.manifests_dir());
        debug!(
            namespace = config.namespace(),
            manifests = %manifests.root().display(),
            kubectl = client.program(),
            "resolved command context"
        );

        Ok(Self {
            config,
            plan,
            client: Box::new(client),
            manifests,
        })
    }

    /// Swap the cluster client (used by tests and dry setups).
    pub fn with_client(mut self, client: Box<dyn ClusterClient>) -> Self {
        self.client = client;
        self
    }

    pub fn config(&self) -> &StagectlConfig {
        &self.config
    }

    pub fn namespace(&self) -> &str {
        self.config.namespace()
    }

    pub fn plan(&self) -> &DeploymentPlan {
        &self.plan
    }

    pub fn settings(&self) -> RunSettings {
        self.config.run_settings()
    }

    pub fn client(&self) -> &dyn ClusterClient {
        self.client.as_ref()
    }

    pub fn manifests(&self) -> &dyn ManifestSource {
        &self.manifests
    }

    /// Fail early when the manifest directory is missing entirely.
    pub fn ensure_manifests(&self) -> anyhow::Result<()> {
        let root = self.manifests.root();
        if !root.is_dir() {
            anyhow::bail!("Manifest directory not found: {}", root.display());
        }
        Ok(())
    }

    /// Per-run context with config values and the given overrides.
    pub fn run_context(
        &self,
        image_tag: Option<&str>,
        registry: Option<&str>,
        flags: ForceFlags,
    ) -> RunContext {
        let mut ctx = RunContext::new(self.namespace())
            .with_image_tag(image_tag.unwrap_or(self.config.image_tag()))
            .with_registry(
                registry
                    .or(self.config.registry.as_deref())
                    .unwrap_or_default(),
            )
            .with_flags(flags);
        for (key, value) in &self.config.env {
            ctx = ctx.with_env(key, value);
        }
        ctx
    }
}

impl std::fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandContext")
            .field("namespace", &self.namespace())
            .field("manifests", &self.manifests.root())
            .field("stages", &self.plan.stages().len())
            .finish()
    }
}

/// Loads a context or explains which layer was at fault.
pub fn load_context(common: &CommonOptions) -> anyhow::Result<CommandContext> {
    CommandContext::with_defaults(common).context("Failed to load stagectl configuration")
}
