use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use std::path::Path;
use std::process;
use std::sync::Arc;

use archdoc_core::analyzer;
use archdoc_core::cancel::CancelToken;
use archdoc_core::cli::{Cli, Commands};
use archdoc_core::config::EngineConfig;
use archdoc_core::discovery;
use archdoc_core::orchestrator::Orchestrator;
use archdoc_core::pool::WorkFn;
use archdoc_core::types::{RunReport, RunStatus};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let Commands::Scan { path, json, .. } = &cli.command;
    let root = path.clone();
    let json = *json;

    let config = cli.command.apply_to(EngineConfig::load(&root)?);
    config.validate()?;

    let files = discovery::discover(&root, &config)?;
    if files.is_empty() {
        println!("No files to analyze.");
        return Ok(());
    }
    if config.verbose {
        eprintln!("Analyzing {} files...", files.len());
    }

    let work: WorkFn = Arc::new(|p: &Path| analyzer::profile_file(p));
    let cancel = CancelToken::new();
    let orchestrator = Orchestrator::new(config);

    let report = orchestrator.process(&files, &work, &cancel)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report.results)?);
    }
    print_summary(&report);

    if report.is_clean() {
        process::exit(0);
    }
    process::exit(1);
}

fn print_summary(report: &RunReport) {
    eprintln!("---------------------------------------------------");
    eprintln!(
        "processed: {}  skipped: {}  reused: {}  errors: {}  ({:.2}s)",
        report.processed,
        report.skipped.len(),
        report.reused.len(),
        report.errors.len(),
        report.duration.as_secs_f64()
    );

    for err in &report.errors {
        eprintln!("  {} {}: {}", "error".red(), err.path.display(), err.message);
    }

    match report.status {
        RunStatus::Completed if report.errors.is_empty() => {
            eprintln!("{}", "Analysis complete.".green().bold());
        }
        RunStatus::Completed => {
            eprintln!(
                "{}",
                "Analysis complete with per-file errors.".yellow().bold()
            );
        }
        RunStatus::ThresholdExceeded => {
            eprintln!(
                "{}",
                "Stopped early: error threshold reached. Re-running may surface more failures."
                    .red()
                    .bold()
            );
        }
        RunStatus::Cancelled => {
            eprintln!("{}", "Cancelled by user; partial results kept.".yellow().bold());
        }
    }
}
