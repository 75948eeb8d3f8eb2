//! Undeploy command implementation.
//!
//! Removes everything the plan deployed, sweeps the namespace, then deletes
//! the namespace itself unless data is kept.

use tracing::warn;

use crate::clock::{Interrupt, SystemClock};
use crate::confirm::Prompter;
use crate::context::ForceFlags;
use crate::error::Warning;
use crate::orchestration::{Collaborators, UndeployOrchestrator, UndeployReport};

use super::context::{CommandContext, CommonOptions, load_context};

/// Options for the undeploy command
#[derive(Debug, Clone, Copy, Default)]
pub struct UndeployOptions {
    /// Keep storage claims, stateful tiers and the namespace
    pub keep_data: bool,
    /// Escalate stuck deletions to zero-grace deletes
    pub force_delete: bool,
    /// Skip confirmation prompts
    pub assume_yes: bool,
}

impl UndeployOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keep_data(mut self, keep: bool) -> Self {
        self.keep_data = keep;
        self
    }

    pub fn with_force_delete(mut self, force: bool) -> Self {
        self.force_delete = force;
        self
    }

    pub fn with_assume_yes(mut self, yes: bool) -> Self {
        self.assume_yes = yes;
        self
    }

    fn flags(&self) -> ForceFlags {
        ForceFlags {
            assume_yes: self.assume_yes,
            force_delete: self.force_delete,
            keep_data: self.keep_data,
            skip_routing: false,
        }
    }
}

/// Undeploy command orchestrator
#[derive(Debug)]
pub struct UndeployCommand {
    context: CommandContext,
}

impl UndeployCommand {
    pub fn new(context: CommandContext) -> Self {
        Self { context }
    }

    pub fn with_defaults(common: &CommonOptions) -> anyhow::Result<Self> {
        Ok(Self::new(load_context(common)?))
    }

    pub fn context(&self) -> &CommandContext {
        &self.context
    }

    pub fn execute(
        &self,
        options: &UndeployOptions,
        prompter: &dyn Prompter,
        interrupt: &Interrupt,
    ) -> anyhow::Result<UndeployReport> {
        // Teardown still sweeps by label without manifests.
        let missing_manifests = self.context.ensure_manifests().err();
        if let Some(err) = &missing_manifests {
            warn!(error = %err, "continuing undeploy without manifests");
        }

        let ctx = self.context.run_context(None, None, options.flags());
        let clock = SystemClock::new();
        let deps = Collaborators {
            client: self.context.client(),
            manifests: self.context.manifests(),
            prompter,
            clock: &clock,
            interrupt,
        };

        let orchestrator =
            UndeployOrchestrator::new(deps, self.context.plan(), self.context.settings());
        let mut report = orchestrator.run(&ctx);
        if let Some(err) = missing_manifests {
            report
                .warnings
                .insert(0, Warning::new("manifests", err.to_string()));
        }
        Ok(report)
    }
}
