//! Terminal confirmation prompts.

use anyhow::Result;
use console::{Term, style};
use dialoguer::{Confirm, theme::ColorfulTheme};

use stagectl_core::confirm::Prompter;

/// Asks on the terminal; declines without asking when there is none.
pub struct TerminalPrompter {
    theme: ColorfulTheme,
    interactive: bool,
}

impl TerminalPrompter {
    pub fn detect() -> Self {
        Self::with_interactive(Term::stderr().is_term())
    }

    pub fn with_interactive(interactive: bool) -> Self {
        Self {
            theme: ColorfulTheme::default(),
            interactive,
        }
    }
}

impl Prompter for TerminalPrompter {
    fn confirm(&self, prompt: &str) -> Result<bool> {
        if !self.interactive {
            eprintln!(
                "{} {} (no terminal; pass --yes to confirm)",
                style("declined:").yellow(),
                prompt
            );
            return Ok(false);
        }

        let confirmed = Confirm::with_theme(&self.theme)
            .with_prompt(prompt)
            .default(false)
            .interact_on(&Term::stderr())?;

        Ok(confirmed)
    }
}
