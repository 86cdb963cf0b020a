//! Confirmation flow for mutating runs.
//!
//! Shows what an apply or revert run is about to do and asks before
//! touching the host. Uses dialoguer for terminal UI prompts.

use std::io::{self, Write};

use anyhow::Result;
use console::style;
use dialoguer::{Confirm, theme::ColorfulTheme};

use rigup_core::commands::PlanPreview;
use rigup_core::types::Mode;

/// Summary-and-confirm prompt shown before a run.
pub struct ConfirmFlow<W: Write = io::Stdout> {
    /// Skip the prompt and proceed
    yes: bool,
    /// Where the summary goes
    writer: W,
    /// Theme for dialoguer prompts
    theme: ColorfulTheme,
}

impl<W: Write> ConfirmFlow<W> {
    /// Create a flow that prints its summary to `writer`.
    pub fn with_writer(yes: bool, writer: W) -> Self {
        Self {
            yes,
            writer,
            theme: ColorfulTheme::default(),
        }
    }

    /// Print the preview and return whether the run should go ahead.
    ///
    /// An empty selection needs no confirmation.
    pub fn confirm(&mut self, preview: &PlanPreview) -> Result<bool> {
        self.print_summary(preview)?;

        if preview.steps.is_empty() && preview.irreversible.is_empty() {
            return Ok(true);
        }
        if self.yes {
            return Ok(true);
        }

        let prompt = match preview.mode {
            Mode::Apply => format!("Apply {} step(s) to this host?", preview.steps.len()),
            Mode::Revert => format!("Revert {} step(s) on this host?", preview.steps.len()),
        };
        let confirmed = Confirm::with_theme(&self.theme)
            .with_prompt(prompt)
            .default(false)
            .interact()?;

        Ok(confirmed)
    }

    fn print_summary(&mut self, preview: &PlanPreview) -> Result<()> {
        writeln!(self.writer)?;
        let title = match preview.mode {
            Mode::Apply => "  Apply plan",
            Mode::Revert => "  Revert plan",
        };
        writeln!(self.writer, "{}", style(title).bold().cyan())?;
        writeln!(self.writer, "  ───────────────────────────")?;
        writeln!(self.writer, "  Host:     {}", style(&preview.environment).green())?;
        writeln!(self.writer, "  Plan:     {}", style(&preview.plan).green())?;
        writeln!(self.writer, "  Strategy: {}", style(&preview.strategy).green())?;
        writeln!(self.writer)?;

        if preview.steps.is_empty() && preview.irreversible.is_empty() {
            writeln!(self.writer, "  Nothing to do for this host.")?;
            return Ok(());
        }

        for (idx, step) in preview.steps.iter().enumerate() {
            writeln!(
                self.writer,
                "  {:>2}. {:<28} {} {}",
                idx + 1,
                step.name,
                style(format!("{:<20}", step.category.as_str())).dim(),
                step.action
            )?;
        }
        for name in &preview.irreversible {
            writeln!(
                self.writer,
                "   -  {:<28} {}",
                name,
                style("no revert action defined").yellow()
            )?;
        }
        writeln!(self.writer)?;
        Ok(())
    }
}
