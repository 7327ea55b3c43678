//! Membership sync daemon.
//!
//! `run` sweeps once a day at the configured UTC hour until interrupted.
//! `sweep` runs a single sweep and prints its report as JSON.

#![allow(
    clippy::multiple_crate_versions,
    reason = "Transitive dependencies from reqwest and tracing-subscriber"
)]

mod observability;
mod schedule;

use std::path::PathBuf;

use chrono::Utc;
use clap::{Parser, Subcommand};
use membership_sync::{
    EngineSettings, MembershipEngine, Result, SyncError,
    billing::StripeClient,
    config::SyncConfig,
    platform::DiscordClient,
    store::JsonFileStore,
};
use observability::{HealthStatus, LogFormat, init_observability, report_json};
use tracing::{error, info, warn};

type Engine = MembershipEngine<StripeClient, DiscordClient, JsonFileStore, DiscordClient>;

#[derive(Debug, Parser)]
#[command(name = "membership-sync", version, about)]
struct Cli {
    /// TOML configuration file; environment variables override it.
    #[arg(short, long, env = "MEMBERSHIP_SYNC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sweep every day at the configured hour.
    Run,
    /// Sweep once and exit.
    Sweep,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_observability(LogFormat::from_env());

    match run(cli).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "membership sync stopped");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = SyncConfig::load(cli.config.as_deref())?;
    let engine = build_engine(&config).await?;

    match cli.command {
        Command::Sweep => {
            let report = engine.run_sweep().await?;
            println!("{}", report_json(&report)?);
            Ok(())
        }
        Command::Run => daily(&engine, config.schedule.hour_utc).await,
    }
}

async fn build_engine(config: &SyncConfig) -> Result<Engine> {
    let store_path = config
        .store
        .path
        .as_ref()
        .ok_or_else(|| SyncError::Config("store.path is required".to_owned()))?;

    let billing = StripeClient::from_config(config)?;
    let platform = DiscordClient::from_config(config)?;
    let store = JsonFileStore::open(store_path).await?;

    Ok(MembershipEngine::new(
        billing,
        platform.clone(),
        store,
        platform,
        EngineSettings::from_config(config),
    ))
}

async fn daily(engine: &Engine, hour_utc: u32) -> Result<()> {
    info!(hour_utc, "membership sync daemon started");

    loop {
        let next = schedule::next_daily_run(Utc::now(), hour_utc);
        info!(next_run = %next, "waiting for next sweep");

        tokio::select! {
            () = tokio::time::sleep(schedule::until_next_run(Utc::now(), hour_utc)) => {}
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "failed to listen for shutdown signal");
                }
                info!("shutdown requested");
                return Ok(());
            }
        }

        match engine.run_sweep().await {
            Ok(report) => match HealthStatus::from_report(&report) {
                HealthStatus::Healthy => info!(summary = %report.summary(), "sweep healthy"),
                HealthStatus::Degraded => {
                    warn!(failed = report.failed, summary = %report.summary(), "sweep degraded");
                }
                HealthStatus::Unhealthy => {
                    error!(failed = report.failed, summary = %report.summary(), "sweep unhealthy");
                }
            },
            // Records or roles could not be loaded; the next day retries.
            Err(e) => error!(error = %e, transient = e.is_transient(), "sweep aborted"),
        }
    }
}
