//! stagectl - staged deploy and teardown of a multi-service application
//!
//! Usage:
//!   stagectl deploy [--image-tag TAG] [--skip-routing] [-y]
//!   stagectl undeploy [--keep-data] [--force] [-y]
//!   stagectl status
//!   stagectl plan [--undeploy]

mod prompt;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stagectl_core::clock::Interrupt;
use stagectl_core::commands::{
    CommonOptions, DeployCommand, DeployOptions, PlanCommand, PlanDirection, PlanOptions,
    PlanReport, StatusCommand, StatusReport, UndeployCommand, UndeployOptions,
};
use stagectl_core::context::ForceFlags;
use stagectl_core::orchestration::{
    DeployOutcome, DeployReport, EXIT_FAILURE, EXIT_INTERRUPTED, EXIT_OK, UndeployOutcome,
    UndeployReport,
};

use crate::prompt::TerminalPrompter;

#[derive(Parser)]
#[command(name = "stagectl", version)]
#[command(about = "Staged deploy and teardown of a multi-service application", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Target namespace (overrides config and STAGECTL_NAMESPACE)
    #[arg(short, long, global = true)]
    namespace: Option<String>,

    /// Project config file (default: ./stagectl.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding the manifest files
    #[arg(long, global = true, value_name = "DIR")]
    manifests_dir: Option<PathBuf>,

    /// Output format
    #[arg(short = 'o', long, global = true, default_value = "table")]
    format: OutputFormat,

    /// More log output (-v debug, -vv trace). RUST_LOG wins when set.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy every stage in dependency order
    Deploy {
        /// Image tag to deploy
        #[arg(long, short = 't')]
        image_tag: Option<String>,
        /// Image registry prefix
        #[arg(long)]
        registry: Option<String>,
        /// Leave external routing untouched
        #[arg(long)]
        skip_routing: bool,
        /// Skip all confirmation prompts (for CI/CD)
        #[arg(short = 'y', long = "yes")]
        assume_yes: bool,
    },

    /// Remove everything deployed, then the namespace
    #[command(alias = "down")]
    Undeploy {
        /// Keep storage claims, stateful tiers and the namespace
        #[arg(long)]
        keep_data: bool,
        /// Escalate stuck deletions to zero-grace deletes
        #[arg(long, short)]
        force: bool,
        /// Skip all confirmation prompts (for CI/CD)
        #[arg(short = 'y', long = "yes")]
        assume_yes: bool,
    },

    /// Show per-stage health of the namespace
    Status,

    /// Show the stages a deploy or undeploy would run
    Plan {
        /// Show the teardown order instead
        #[arg(long)]
        undeploy: bool,
        #[arg(long)]
        skip_routing: bool,
        #[arg(long)]
        keep_data: bool,
    },
}

#[derive(Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
    /// Only show problems
    Quiet,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", style("error:").red().bold(), err);
            EXIT_FAILURE
        }
    };
    std::process::exit(code);
}

fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "stagectl_core=info,stagectl=info,warn",
        1 => "stagectl_core=debug,stagectl=debug,info",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// First Ctrl-C stops after the current poll; a second one exits at once.
fn install_interrupt() -> Result<Interrupt> {
    let interrupt = Interrupt::new();
    let handle = interrupt.clone();
    ctrlc::set_handler(move || {
        if handle.is_triggered() {
            std::process::exit(EXIT_INTERRUPTED);
        }
        eprintln!("interrupt received; stopping after the current step (Ctrl-C again to exit now)");
        handle.trigger();
    })
    .context("Failed to install Ctrl-C handler")?;
    Ok(interrupt)
}

fn run(cli: Cli) -> Result<i32> {
    let global = cli.global;
    let common = CommonOptions {
        config_file: global.config,
        namespace: global.namespace,
        manifests_dir: global.manifests_dir,
    };
    let format = global.format;

    match cli.command {
        Commands::Deploy {
            image_tag,
            registry,
            skip_routing,
            assume_yes,
        } => {
            let mut options = DeployOptions::new()
                .with_skip_routing(skip_routing)
                .with_assume_yes(assume_yes);
            if let Some(tag) = image_tag {
                options = options.with_image_tag(tag);
            }
            if let Some(registry) = registry {
                options = options.with_registry(registry);
            }

            let cmd = DeployCommand::with_defaults(&common)?;
            let interrupt = install_interrupt()?;
            let report = cmd.execute(&options, &TerminalPrompter::detect(), &interrupt)?;
            print_deploy_report(&report, format)?;
            Ok(report.exit_code())
        }
        Commands::Undeploy {
            keep_data,
            force,
            assume_yes,
        } => {
            let options = UndeployOptions::new()
                .with_keep_data(keep_data)
                .with_force_delete(force)
                .with_assume_yes(assume_yes);

            let cmd = UndeployCommand::with_defaults(&common)?;
            let interrupt = install_interrupt()?;
            let report = cmd.execute(&options, &TerminalPrompter::detect(), &interrupt)?;
            print_undeploy_report(&report, format)?;
            Ok(report.exit_code())
        }
        Commands::Status => {
            let report = StatusCommand::with_defaults(&common)?.execute()?;
            print_status(&report, format)?;
            Ok(if format == OutputFormat::Quiet && report.issues() > 0 {
                EXIT_FAILURE
            } else {
                EXIT_OK
            })
        }
        Commands::Plan {
            undeploy,
            skip_routing,
            keep_data,
        } => {
            let flags = ForceFlags {
                skip_routing,
                keep_data,
                ..ForceFlags::default()
            };
            let options = if undeploy {
                PlanOptions::undeploy(flags)
            } else {
                PlanOptions::deploy(flags)
            };
            let report = PlanCommand::with_defaults(&common)?.execute(&options);
            print_plan(&report, format)?;
            Ok(EXIT_OK)
        }
    }
}

// =============================================================================
// Deploy output
// =============================================================================

fn deploy_outcome_label(outcome: &DeployOutcome) -> &'static str {
    match outcome {
        DeployOutcome::Completed => "completed",
        DeployOutcome::Halted(_) => "halted",
        DeployOutcome::UserAbort => "aborted",
        DeployOutcome::Interrupted { .. } => "interrupted",
    }
}

fn print_deploy_report(report: &DeployReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let failure = match &report.outcome {
                DeployOutcome::Halted(failure) => Some(serde_json::json!({
                    "stage": failure.stage,
                    "reason": failure.reason.to_string(),
                    "related": failure.related.iter().map(|r| r.to_string()).collect::<Vec<_>>(),
                    "last_observed": failure.last_observed,
                })),
                _ => None,
            };
            let output = serde_json::json!({
                "namespace": report.namespace,
                "outcome": deploy_outcome_label(&report.outcome),
                "phase": report.phase,
                "failed_stage": report.failed_stage(),
                "failure": failure,
                "stages": report.stages.iter().map(|s| serde_json::json!({
                    "name": s.name,
                    "status": s.status.as_str(),
                })).collect::<Vec<_>>(),
                "warnings": report.warnings.iter().map(|w| serde_json::json!({
                    "stage": w.stage,
                    "message": w.message,
                })).collect::<Vec<_>>(),
                "started_at": report.started_at.to_rfc3339(),
                "finished_at": report.finished_at.to_rfc3339(),
                "exit_code": report.exit_code(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!("Namespace: {}", report.namespace);
            println!();
            print_stage_rows(report.stages.iter().map(|s| (s.name.as_str(), s.status.as_str())));
            print_warnings(&report.warnings);
            print_deploy_result(report);
        }
        OutputFormat::Quiet => {
            print_warnings(&report.warnings);
            if report.exit_code() != EXIT_OK {
                print_deploy_result(report);
            }
        }
    }
    Ok(())
}

fn print_deploy_result(report: &DeployReport) {
    let elapsed = (report.finished_at - report.started_at).num_seconds();
    match &report.outcome {
        DeployOutcome::Completed => println!(
            "{} deploy completed in {}s (phase {})",
            style("✓").green(),
            elapsed,
            report.phase
        ),
        DeployOutcome::UserAbort => println!("Deploy aborted; nothing was changed."),
        DeployOutcome::Halted(failure) => {
            println!(
                "{} deploy halted in phase {} after {}s",
                style("✗").red(),
                report.phase,
                elapsed
            );
            println!("  {}", failure);
            println!("  Nothing was rolled back; inspect the namespace before retrying.");
        }
        DeployOutcome::Interrupted { stage } => println!(
            "{} deploy interrupted during stage '{}' in phase {}",
            style("!").yellow(),
            stage,
            report.phase
        ),
    }
}

// =============================================================================
// Undeploy output
// =============================================================================

fn undeploy_outcome_label(outcome: UndeployOutcome) -> &'static str {
    match outcome {
        UndeployOutcome::Cleared => "cleared",
        UndeployOutcome::ResidualResourcesReported => "residual-resources",
        UndeployOutcome::UserAbort => "aborted",
        UndeployOutcome::Interrupted => "interrupted",
    }
}

fn print_undeploy_report(report: &UndeployReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "namespace": report.namespace,
                "outcome": undeploy_outcome_label(report.outcome),
                "namespace_status": report.namespace_status.as_str(),
                "stages": report.stages.iter().map(|s| serde_json::json!({
                    "name": s.name,
                    "status": s.status.as_str(),
                })).collect::<Vec<_>>(),
                "warnings": report.warnings.iter().map(|w| serde_json::json!({
                    "stage": w.stage,
                    "message": w.message,
                })).collect::<Vec<_>>(),
                "residual": report.residual.iter().map(|r| serde_json::json!({
                    "scope": r.scope,
                    "selector": r.selector.to_string(),
                    "remaining": r.remaining,
                    "last_error": r.last_error.as_ref().map(|e| e.to_string()),
                })).collect::<Vec<_>>(),
                "started_at": report.started_at.to_rfc3339(),
                "finished_at": report.finished_at.to_rfc3339(),
                "exit_code": report.exit_code(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!("Namespace: {}", report.namespace);
            println!();
            print_stage_rows(report.stages.iter().map(|s| (s.name.as_str(), s.status.as_str())));
            print_warnings(&report.warnings);
            print_residual(report);
            print_undeploy_result(report);
        }
        OutputFormat::Quiet => {
            print_warnings(&report.warnings);
            print_residual(report);
        }
    }
    Ok(())
}

fn print_residual(report: &UndeployReport) {
    if report.residual.is_empty() {
        return;
    }
    println!("Residual resources ({}):", report.residual.len());
    for residual in &report.residual {
        println!("  [{}] {}", residual.scope, residual.selector);
        for handle in &residual.remaining {
            println!("      {}", handle);
        }
        if let Some(err) = &residual.last_error {
            println!("      last error: {}", err);
        }
    }
    println!();
}

fn print_undeploy_result(report: &UndeployReport) {
    let elapsed = (report.finished_at - report.started_at).num_seconds();
    match report.outcome {
        UndeployOutcome::Cleared => println!(
            "{} undeploy cleared in {}s (namespace {})",
            style("✓").green(),
            elapsed,
            report.namespace_status.as_str()
        ),
        UndeployOutcome::ResidualResourcesReported => println!(
            "{} undeploy finished with residual resources (namespace {}); retry with --force",
            style("✗").red(),
            report.namespace_status.as_str()
        ),
        UndeployOutcome::UserAbort => println!("Undeploy aborted; nothing was deleted."),
        UndeployOutcome::Interrupted => {
            println!("{} undeploy interrupted; rerun to finish cleanup", style("!").yellow())
        }
    }
}

// =============================================================================
// Shared output helpers
// =============================================================================

fn print_stage_rows<'a>(rows: impl Iterator<Item = (&'a str, &'a str)>) {
    println!("  {:<22} Status", "Stage");
    println!("  {}", "-".repeat(40));
    for (name, status) in rows {
        let status = match status {
            "applied" => style(status).green(),
            "failed" => style(status).red(),
            "skipped" => style(status).dim(),
            _ => style(status).yellow(),
        };
        println!("  {:<22} {}", name, status);
    }
    println!();
}

fn print_warnings(warnings: &[stagectl_core::error::Warning]) {
    if warnings.is_empty() {
        return;
    }
    println!("Warnings ({}):", warnings.len());
    for warning in warnings {
        println!("  {} {}", style("⚠").yellow(), warning);
    }
    println!();
}

// =============================================================================
// Status and plan output
// =============================================================================

fn print_status(report: &StatusReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Table => {
            println!("Namespace: {}", report.namespace);
            if !report.namespace_present {
                println!("Namespace does not exist. Run 'stagectl deploy' to create it.");
                return Ok(());
            }
            println!("Phase: {}", report.phase);
            println!();
            println!("  {:<22} {:<8} Resources", "Stage", "Health");
            println!("  {}", "-".repeat(60));
            for stage in &report.stages {
                let health = match stage.healthy {
                    Some(true) => style("ok").green(),
                    Some(false) => style("not ok").red(),
                    None => style("-").dim(),
                };
                let resources = match &stage.error {
                    Some(err) => err.clone(),
                    None => stage
                        .resources
                        .iter()
                        .map(|h| format!("{} ({})", h.name, h.state))
                        .collect::<Vec<_>>()
                        .join(", "),
                };
                println!("  {:<22} {:<8} {}", stage.stage, health, resources);
            }
            println!();
            if report.issues() > 0 {
                println!("Summary: {} stage(s) not healthy", report.issues());
            } else {
                println!("Summary: all stages healthy");
            }
        }
        OutputFormat::Quiet => {
            for stage in report.stages.iter().filter(|s| s.healthy == Some(false)) {
                println!("{}: not healthy", stage.stage);
            }
        }
    }
    Ok(())
}

fn print_plan(report: &PlanReport, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let direction = match report.direction {
        PlanDirection::Deploy => "Deploy",
        PlanDirection::Undeploy => "Undeploy",
    };
    println!("{} plan for namespace '{}':", direction, report.namespace);
    for (i, stage) in report.stages.iter().enumerate() {
        let criticality = if stage.fatal { "fatal" } else { "best-effort" };
        println!(
            "{:>3}. {} ({}, {}, timeout {}s)",
            i + 1,
            style(&stage.name).bold(),
            stage.action,
            criticality,
            stage.timeout.as_secs()
        );
        for resource in &stage.resources {
            println!("       - {}", resource);
        }
        if let Some(health) = &stage.health {
            println!("       health: {}", health);
        }
        if let Some(milestone) = stage.milestone {
            println!("       reaches: {}", milestone);
        }
    }
    Ok(())
}
