//! Deploy command implementation.
//!
//! Rolls the configured plan out into the target namespace.

use crate::clock::{Interrupt, SystemClock};
use crate::confirm::Prompter;
use crate::context::ForceFlags;
use crate::orchestration::{Collaborators, DeployOrchestrator, DeployReport};

use super::context::{CommandContext, CommonOptions, load_context};

/// Options for the deploy command
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Image tag to deploy (overrides config)
    pub image_tag: Option<String>,
    /// Image registry prefix (overrides config)
    pub registry: Option<String>,
    /// Leave external routing untouched
    pub skip_routing: bool,
    /// Skip confirmation prompts
    pub assume_yes: bool,
}

impl DeployOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image_tag(mut self, tag: impl Into<String>) -> Self {
        self.image_tag = Some(tag.into());
        self
    }

    pub fn with_registry(mut self, registry: impl Into<String>) -> Self {
        self.registry = Some(registry.into());
        self
    }

    pub fn with_skip_routing(mut self, skip: bool) -> Self {
        self.skip_routing = skip;
        self
    }

    pub fn with_assume_yes(mut self, yes: bool) -> Self {
        self.assume_yes = yes;
        self
    }

    fn flags(&self) -> ForceFlags {
        ForceFlags {
            assume_yes: self.assume_yes,
            skip_routing: self.skip_routing,
            ..ForceFlags::default()
        }
    }
}

/// Deploy command orchestrator
#[derive(Debug)]
pub struct DeployCommand {
    context: CommandContext,
}

impl DeployCommand {
    pub fn new(context: CommandContext) -> Self {
        Self { context }
    }

    pub fn with_defaults(common: &CommonOptions) -> anyhow::Result<Self> {
        Ok(Self::new(load_context(common)?))
    }

    pub fn context(&self) -> &CommandContext {
        &self.context
    }

    /// Execute the deploy.
    ///
    /// Errors are reserved for problems before anything touches the cluster;
    /// stage failures are reported in the returned report.
    pub fn execute(
        &self,
        options: &DeployOptions,
        prompter: &dyn Prompter,
        interrupt: &Interrupt,
    ) -> anyhow::Result<DeployReport> {
        self.context.ensure_manifests()?;

        let ctx = self.context.run_context(
            options.image_tag.as_deref(),
            options.registry.as_deref(),
            options.flags(),
        );
        let clock = SystemClock::new();
        let deps = Collaborators {
            client: self.context.client(),
            manifests: self.context.manifests(),
            prompter,
            clock: &clock,
            interrupt,
        };

        let orchestrator =
            DeployOrchestrator::new(deps, self.context.plan(), self.context.settings());
        Ok(orchestrator.run(&ctx))
    }
}
