//! trailscan: endpoint-side IOC scanner.
//!
//! This is the main entry point for the CLI application.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use trailscan::core::config::{Config, ScanContext};
use trailscan::core::error::Result;
use trailscan::core::types::ScanModule;
use trailscan::report::ResultReporter;
use trailscan::rules::{compile_ruleset, RuleFetcher, RuleSet};
use trailscan::scanner::{DiskScanEngine, ProcessMemoryScanEngine};
use trailscan::ui::cli::{Cli, Commands};
use trailscan::utils::logging::{init_logging, LogConfig};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let silent = match &cli.command {
        Commands::DiskScan { silent, .. } | Commands::MemScan { silent, .. } => *silent,
    };
    init_logging(LogConfig::from_flags(cli.verbose, silent));

    let config = Config::load_or_default();
    let ctx = ScanContext::new(&config, silent);
    log::debug!("Reporting as host '{}'", ctx.hostname);

    match cli.command {
        Commands::DiskScan {
            path,
            server,
            rule,
            ..
        } => run_disk_scan(&config, &ctx, path, &server, &rule).await,
        Commands::MemScan { server, rule, .. } => {
            run_mem_scan(&config, &ctx, &server, &rule).await
        }
    }
}

/// Fetch and compile the named rule file. Any failure here aborts the scan.
async fn acquire_rules(config: &Config, server: &str, rule_name: &str) -> Result<RuleSet> {
    let fetcher = RuleFetcher::new(server, &config.server)?;
    let source = fetcher.fetch_rule(rule_name).await?;
    let rules = compile_ruleset(&source)?;
    log::info!("Compiled {} rule(s) from '{}'", rules.len(), rule_name);
    Ok(rules)
}

/// Scan files under a directory and report the matches.
async fn run_disk_scan(
    config: &Config,
    ctx: &ScanContext,
    path: PathBuf,
    server: &str,
    rule_name: &str,
) -> Result<()> {
    let rules = acquire_rules(config, server, rule_name).await?;

    log::info!("Starting disk scan of {}", path.display());
    let batch = DiskScanEngine::new().scan(&path, &rules, ctx);
    log::info!("Disk scan complete: {} match(es)", batch.len());

    let reporter = ResultReporter::new(server, &config.server)?;
    reporter.report(&batch, ScanModule::DiskScan).await;

    Ok(())
}

/// Scan running processes' memory and report the matches.
async fn run_mem_scan(
    config: &Config,
    ctx: &ScanContext,
    server: &str,
    rule_name: &str,
) -> Result<()> {
    let rules = acquire_rules(config, server, rule_name).await?;

    log::info!("Starting memory scan");
    let batch = ProcessMemoryScanEngine::new().scan(&rules, ctx)?;
    log::info!("Memory scan complete: {} match(es)", batch.len());

    let reporter = ResultReporter::new(server, &config.server)?;
    reporter.report(&batch, ScanModule::MemScan).await;

    Ok(())
}
