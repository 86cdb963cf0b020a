//! Rigup - provisioning orchestrator for AI workstations
//!
//! Usage:
//!   rigup detect          # Show the detected host
//!   rigup plan            # Preview the steps an apply would run
//!   rigup apply           # Apply the plan to this host
//!   rigup revert          # Undo applied steps in reverse order
//!   rigup log             # Show recent runs from the transcript

mod interactive;

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rigup_core::commands::{
    PlanPreview, ProvisionCommand, ProvisionOptions, ProvisionReport, recent_runs,
};
use rigup_core::context::AppContext;
use rigup_core::detect::Environment;
use rigup_core::executor::StopSignal;
use rigup_core::transcript::{RecordKind, TranscriptRecord};
use rigup_core::types::{Category, Mode, RunStatus, StepStatus};

use crate::interactive::ConfirmFlow;

/// Exit code for failures outside the step loop (bad plan, held lock, lost transcript).
const EXIT_SETUP_FAILURE: u8 = 2;

#[derive(Parser)]
#[command(name = "rigup")]
#[command(about = "Provisioning orchestrator for AI workstations", long_about = None, version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply the plan to this host
    Apply(RunArgs),

    /// Revert applied steps, most recent first
    Revert(RunArgs),

    /// Show the steps a run would execute without running them
    Plan {
        #[command(flatten)]
        selection: SelectionArgs,

        /// Preview a revert run instead of an apply run
        #[arg(long)]
        revert: bool,
    },

    /// Show the detected platform and capabilities
    Detect {
        /// Output format
        #[arg(short = 'o', long, default_value = "table")]
        format: OutputFormat,
    },

    /// Show recent runs from the transcript
    Log {
        /// Number of runs to show
        #[arg(long, default_value_t = 5)]
        runs: usize,

        /// Transcript file
        #[arg(long)]
        transcript: Option<PathBuf>,

        /// Output format
        #[arg(short = 'o', long, default_value = "table")]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
    /// Only show problems
    Quiet,
}

/// Options shared by every command that selects steps.
#[derive(Args)]
struct SelectionArgs {
    /// Plan file (default: <config dir>/rigup/plan.toml, else the built-in plan)
    #[arg(long)]
    plan: Option<PathBuf>,

    /// Installation strategy (e.g. pip, conda)
    #[arg(long)]
    strategy: Option<String>,

    /// Skip a step category (power, service, package, environment-variable, filesystem)
    #[arg(long, value_name = "CATEGORY")]
    skip: Vec<Category>,

    /// Skip a step by name
    #[arg(long = "skip-step", value_name = "NAME")]
    skip_steps: Vec<String>,

    /// Directory for generated artifacts
    #[arg(long)]
    artifacts: Option<PathBuf>,

    /// Transcript file
    #[arg(long)]
    transcript: Option<PathBuf>,

    /// Output format
    #[arg(short = 'o', long, default_value = "table")]
    format: OutputFormat,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    selection: SelectionArgs,

    /// Skip the confirmation prompt (for unattended runs)
    #[arg(short = 'y', long)]
    yes: bool,
}

impl SelectionArgs {
    fn options(&self, mode: Mode) -> ProvisionOptions {
        let mut options = match mode {
            Mode::Apply => ProvisionOptions::apply(),
            Mode::Revert => ProvisionOptions::revert(),
        };
        if let Some(plan) = &self.plan {
            options = options.with_plan(plan);
        }
        if let Some(strategy) = &self.strategy {
            options = options.with_strategy(strategy);
        }
        for category in &self.skip {
            options = options.with_skip(*category);
        }
        for name in &self.skip_steps {
            options = options.with_skip_step(name);
        }
        if let Some(dir) = &self.artifacts {
            options = options.with_artifact_dir(dir);
        }
        if let Some(path) = &self.transcript {
            options = options.with_transcript(path);
        }
        options
    }
}

fn main() -> ExitCode {
    // Initialize tracing; stdout is reserved for command output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rigup=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run_cli(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", style("error:").red().bold(), e);
            ExitCode::from(EXIT_SETUP_FAILURE)
        }
    }
}

fn run_cli(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Apply(args) => run_provision(args, Mode::Apply),
        Commands::Revert(args) => run_provision(args, Mode::Revert),
        Commands::Plan { selection, revert } => {
            let mode = if revert { Mode::Revert } else { Mode::Apply };
            run_plan(&selection, mode)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Detect { format } => {
            run_detect(format)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Log {
            runs,
            transcript,
            format,
        } => {
            run_log(runs, transcript, format)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_provision(args: RunArgs, mode: Mode) -> Result<ExitCode> {
    let format = args.selection.format;
    let options = args.selection.options(mode).with_non_interactive(args.yes);
    let cmd = ProvisionCommand::with_defaults()?;

    let preview = cmd.preview(&options)?;
    if !args.yes && !console::user_attended() && !preview.steps.is_empty() {
        anyhow::bail!("Refusing to change this host without confirmation; pass --yes to run unattended");
    }
    // machine-readable output stays clean when no prompt is needed
    let proceed = if args.yes && !matches!(format, OutputFormat::Table) {
        true
    } else {
        confirm_run(&preview, args.yes, format, io::stdout(), io::stderr())?
    };
    if !proceed {
        eprintln!("Cancelled.");
        return Ok(ExitCode::SUCCESS);
    }

    let stop = StopSignal::new();
    spawn_ctrl_c_watcher(stop.clone());

    let report = cmd.execute(&options, stop)?;
    print_report(&report, format)?;

    Ok(ExitCode::from(report.result.status.exit_code()))
}

/// Show the run summary and ask to proceed. Only table output prints the
/// summary to stdout; other formats keep stdout for the report.
fn confirm_run<O: Write, E: Write>(
    preview: &PlanPreview,
    yes: bool,
    format: OutputFormat,
    stdout: O,
    stderr: E,
) -> Result<bool> {
    match format {
        OutputFormat::Table => ConfirmFlow::with_writer(yes, stdout).confirm(preview),
        OutputFormat::Json | OutputFormat::Quiet => {
            ConfirmFlow::with_writer(yes, stderr).confirm(preview)
        }
    }
}

/// Raise `stop` on Ctrl-C. The running step finishes; no further step starts.
fn spawn_ctrl_c_watcher(stop: StopSignal) {
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::warn!(error = %e, "Ctrl-C handling unavailable");
                return;
            }
        };
        runtime.block_on(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!(
                    "{} stopping after the current step",
                    style("interrupt:").yellow().bold()
                );
                stop.raise();
            }
        });
    });
}

fn print_report(report: &ProvisionReport, format: OutputFormat) -> Result<()> {
    let result = &report.result;
    match format {
        OutputFormat::Table => {
            if result.nothing_to_do() {
                println!("• Nothing to do for {}", report.environment);
            }
            for outcome in &result.outcomes {
                let marker = match outcome.status {
                    StepStatus::Succeeded => style("✓").green(),
                    StepStatus::Warned => style("⚠").yellow(),
                    StepStatus::FailedFatal => style("✗").red(),
                    StepStatus::Skipped => style("-").dim(),
                };
                println!("{} {:<28} {}", marker, outcome.step, outcome.message);
            }
            println!();
            println!("  {}", result.summary());
            println!("  Transcript: {}", report.transcript.display());
            print_status_banner(report);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Quiet => {
            for outcome in result
                .outcomes
                .iter()
                .filter(|o| matches!(o.status, StepStatus::Warned | StepStatus::FailedFatal))
            {
                println!("{}\t{}\t{}", outcome.step, outcome.status, outcome.message);
            }
            if result.status != RunStatus::Completed {
                print_status_banner(report);
            }
        }
    }
    Ok(())
}

fn print_status_banner(report: &ProvisionReport) {
    let result = &report.result;
    match result.status {
        RunStatus::Completed => {
            println!("{} {}", style("✓").green(), style(result.status).green().bold());
        }
        RunStatus::CompletedWithWarnings => {
            println!(
                "{} {}: {} step(s) need attention. Re-running is safe.",
                style("⚠").yellow(),
                style(result.status).yellow().bold(),
                result.summary().warned
            );
        }
        RunStatus::Aborted => {
            let reason = result
                .abort
                .as_ref()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "unknown reason".to_string());
            println!(
                "{} {}: {}",
                style("✗").red(),
                style(result.status).red().bold(),
                reason
            );
            if let Some(fatal) = result.first_fatal() {
                println!("  Fix '{}' and re-run; finished steps report no-op.", fatal.step);
            }
        }
    }
}

fn run_plan(selection: &SelectionArgs, mode: Mode) -> Result<()> {
    let cmd = ProvisionCommand::with_defaults()?;
    let preview = cmd.preview(&selection.options(mode))?;

    match selection.format {
        OutputFormat::Table => print_preview(&preview),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&preview)?),
        OutputFormat::Quiet => {
            for step in &preview.steps {
                println!("{}", step.name);
            }
        }
    }
    Ok(())
}

fn print_preview(preview: &PlanPreview) {
    println!("Host:     {}", preview.environment);
    println!("Plan:     {}", preview.plan);
    println!("Mode:     {}", preview.mode);
    println!("Strategy: {}", preview.strategy);
    println!();

    if preview.steps.is_empty() && preview.irreversible.is_empty() {
        println!("• Nothing to do for this host");
    }
    for (idx, step) in preview.steps.iter().enumerate() {
        println!(
            "{:>3}. {:<28} {:<21} {:<18} {}",
            idx + 1,
            step.name,
            step.category.as_str(),
            step.severity.as_str(),
            step.action
        );
    }
    for name in &preview.irreversible {
        println!("  -  {:<28} skipped: no revert action defined", name);
    }
    if !preview.excluded.is_empty() {
        println!();
        println!("Not selected:");
        for excluded in &preview.excluded {
            println!("  {:<28} {}", excluded.name, excluded.reason);
        }
    }
}

fn run_detect(format: OutputFormat) -> Result<()> {
    let env = rigup_core::detect::detect();
    match format {
        OutputFormat::Table | OutputFormat::Quiet => print_environment(&env),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&env)?),
    }
    Ok(())
}

fn print_environment(env: &Environment) {
    println!("OS:          {}", env.os());
    println!("Arch:        {}", env.arch());
    println!("Accelerator: {}", env.accelerator());
    println!(
        "Elevated:    {}",
        if env.elevated() { "yes" } else { "no" }
    );
}

fn run_log(runs: usize, transcript: Option<PathBuf>, format: OutputFormat) -> Result<()> {
    let path = match transcript {
        Some(path) => path,
        None => AppContext::with_defaults()?.transcript_path(),
    };
    let recent = recent_runs(&path, runs)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&recent)?),
        OutputFormat::Table => {
            if recent.is_empty() {
                println!("No runs recorded in {}", path.display());
            }
            for run in &recent {
                print_run(run);
            }
        }
        OutputFormat::Quiet => {
            for record in recent.iter().flatten().filter(|r| {
                matches!(
                    r.kind,
                    RecordKind::Step(StepStatus::Warned | StepStatus::FailedFatal)
                )
            }) {
                println!("{}", record.to_line());
            }
        }
    }
    Ok(())
}

fn print_run(records: &[TranscriptRecord]) {
    for record in records {
        let time = record.timestamp.format("%Y-%m-%d %H:%M:%S");
        match record.kind {
            RecordKind::RunStart => {
                println!("{} {}", style(format!("▶ {time}")).bold(), record.message);
            }
            RecordKind::RunEnd => println!("{} {}", style(format!("■ {time}")).bold(), record.message),
            RecordKind::Step(status) => {
                println!("  {:<28} {:<13} {}", record.step, status.as_str(), record.message);
            }
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigup_core::commands::PreviewStep;
    use rigup_core::detect::Accelerator;
    use rigup_core::types::{OsFamily, Severity};

    fn preview() -> PlanPreview {
        PlanPreview {
            mode: Mode::Apply,
            strategy: "pip".to_string(),
            plan: "<builtin>".to_string(),
            environment: Environment::new(OsFamily::Linux, "x86_64", Accelerator::None, false),
            steps: vec![PreviewStep {
                name: "hf-home".to_string(),
                category: Category::EnvironmentVariable,
                severity: Severity::WarnAndContinue,
                description: None,
                action: "persist HF_HOME=/data/hf".to_string(),
            }],
            irreversible: Vec::new(),
            excluded: Vec::new(),
        }
    }

    #[test]
    fn json_output_keeps_summary_off_stdout() {
        let mut out = Vec::new();
        let mut err = Vec::new();
        assert!(confirm_run(&preview(), true, OutputFormat::Json, &mut out, &mut err).unwrap());

        assert!(out.is_empty());
        assert!(String::from_utf8(err).unwrap().contains("hf-home"));
    }

    #[test]
    fn table_output_prints_summary_to_stdout() {
        let mut out = Vec::new();
        let mut err = Vec::new();
        assert!(confirm_run(&preview(), true, OutputFormat::Table, &mut out, &mut err).unwrap());

        assert!(String::from_utf8(out).unwrap().contains("hf-home"));
        assert!(err.is_empty());
    }
}
