use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use govopp_core::OpportunityKind;
use govopp_sync::{start_schedule, SyncConfig, SyncPipeline, SyncRunSummary, TargetRegistry};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "govopp")]
#[command(about = "Government scholarship and job opportunity scraper")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scrape every target once, persist new records and exit.
    Run {
        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Run at startup, then on the configured cron schedule (evaluated in UTC;
    /// default 03:00 UTC daily) until interrupted.
    Schedule,
    /// List the configured targets.
    Targets,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = SyncConfig::from_env();

    match cli.command.unwrap_or(Commands::Schedule) {
        Commands::Run { json } => {
            let pipeline = SyncPipeline::from_config(&config).await?;
            let summary = pipeline.run_once().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
        }
        Commands::Schedule => {
            let pipeline = Arc::new(SyncPipeline::from_config(&config).await?);
            let (_flights, mut sched) = start_schedule(pipeline, &config.schedule_cron).await?;
            tokio::signal::ctrl_c()
                .await
                .context("waiting for shutdown signal")?;
            info!("shutdown requested; stopping scheduler");
            sched.shutdown().await.context("stopping scheduler")?;
        }
        Commands::Targets => {
            let registry = TargetRegistry::from_config(&config).await?;
            for target in &registry.targets {
                println!(
                    "{:<32} {:<13} {}",
                    target.name,
                    target.extractor.as_str(),
                    target.url
                );
            }
        }
    }

    Ok(())
}

fn print_summary(summary: &SyncRunSummary) {
    println!(
        "run complete: run_id={} sites={} failed_sites={} extracted={} persistence={}",
        summary.run_id,
        summary.sites.len(),
        summary.failed_sites(),
        summary.extracted,
        if summary.persistence_enabled { "on" } else { "off" }
    );
    for kind in OpportunityKind::ALL {
        let counts = summary.reconcile.partition(kind);
        println!(
            "  {}: attempted={} inserted={} skipped={} failed={}",
            kind.collection(),
            counts.attempted,
            counts.inserted,
            counts.skipped,
            counts.failed
        );
    }
    for site in summary.sites.iter().filter(|s| s.error.is_some()) {
        println!(
            "  site failed: {} ({})",
            site.site,
            site.error.as_deref().unwrap_or_default()
        );
    }
}
