//! Confirmation gate for destructive or overwrite-risking actions.
//!
//! Prompting is delegated to a [`Prompter`] so frontends can supply a
//! terminal UI and tests can script answers.

use std::fmt;

use tracing::{info, warn};

use crate::context::RunContext;

/// Actions the gate knows how to authorize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// First deploy into an empty namespace.
    Deploy,
    /// Deploy over workloads that already exist.
    Redeploy,
    /// Delete the managed workloads inside the namespace.
    ManagedResourceDeletion,
    /// Delete data-bearing storage claims.
    DataDeletion,
    /// Delete the namespace itself.
    NamespaceDeletion,
}

impl ActionKind {
    pub fn requires_confirmation(self) -> bool {
        !matches!(self, ActionKind::Deploy)
    }

    pub fn is_destructive(self) -> bool {
        matches!(
            self,
            ActionKind::ManagedResourceDeletion
                | ActionKind::DataDeletion
                | ActionKind::NamespaceDeletion
        )
    }

    pub fn prompt(self, ctx: &RunContext) -> String {
        let ns = &ctx.namespace;
        match self {
            ActionKind::Deploy => format!("Deploy into namespace '{}'?", ns),
            ActionKind::Redeploy => format!(
                "Namespace '{}' already has workloads. Overwrite them with tag '{}'?",
                ns, ctx.image_tag
            ),
            ActionKind::ManagedResourceDeletion => {
                format!("Delete all managed resources in namespace '{}'?", ns)
            }
            ActionKind::DataDeletion => format!(
                "Delete persistent data (storage claims) in namespace '{}'? This cannot be undone.",
                ns
            ),
            ActionKind::NamespaceDeletion => format!("Delete namespace '{}' itself?", ns),
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActionKind::Deploy => "deploy",
            ActionKind::Redeploy => "redeploy",
            ActionKind::ManagedResourceDeletion => "managed resource deletion",
            ActionKind::DataDeletion => "data deletion",
            ActionKind::NamespaceDeletion => "namespace deletion",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Proceed,
    Abort,
}

/// Asks the operator a yes/no question.
pub trait Prompter {
    /// `Ok(true)` only for an explicit affirmative answer.
    fn confirm(&self, prompt: &str) -> anyhow::Result<bool>;
}

/// Prompter for non-interactive sessions: declines everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclinePrompter;

impl Prompter for DeclinePrompter {
    fn confirm(&self, _prompt: &str) -> anyhow::Result<bool> {
        Ok(false)
    }
}

/// Decides whether an action proceeds.
///
/// Every call is independent: an earlier "yes" never carries over to a later,
/// different action.
pub struct ConfirmationGate<'a> {
    prompter: &'a dyn Prompter,
}

impl<'a> ConfirmationGate<'a> {
    pub fn new(prompter: &'a dyn Prompter) -> Self {
        Self { prompter }
    }

    pub fn authorize(&self, action: ActionKind, ctx: &RunContext) -> Authorization {
        if ctx.flags.assume_yes {
            info!(%action, "confirmation skipped (assume yes)");
            return Authorization::Proceed;
        }
        if !action.requires_confirmation() {
            return Authorization::Proceed;
        }

        match self.prompter.confirm(&action.prompt(ctx)) {
            Ok(true) => {
                info!(%action, "confirmed by operator");
                Authorization::Proceed
            }
            Ok(false) => {
                info!(%action, "declined by operator");
                Authorization::Abort
            }
            Err(err) => {
                warn!(%action, error = %err, "confirmation prompt failed; treating as decline");
                Authorization::Abort
            }
        }
    }
}
