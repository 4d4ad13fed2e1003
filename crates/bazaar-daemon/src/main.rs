use clap::{Parser, Subcommand};
use tracing::{info, warn};

mod app;

use app::Services;

/// Scheduled-job daemon for the bazaar back office.
#[derive(Debug, Parser)]
#[command(name = "bazaard", version)]
struct Cli {
    /// Path to bazaar.toml (falls back to BAZAAR_CONFIG, then ~/.bazaar/bazaar.toml).
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Reconcile the job log, start the sweeps and run until Ctrl-C (default).
    Run,
    /// Run one reconciliation pass and exit. Overdue jobs fire; future jobs
    /// are only reported.
    Reconcile,
    /// Print the pending job log as JSON lines.
    Jobs,
    /// Print queued, unsent notifications as JSON lines.
    Outbox {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "bazaar_daemon=info,bazaar_scheduler=info,bazaar_catalog=info".into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // config: --config > BAZAAR_CONFIG env > ~/.bazaar/bazaar.toml
    let config_path = cli.config.or_else(|| std::env::var("BAZAAR_CONFIG").ok());
    let config = bazaar_core::BazaarConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        bazaar_core::BazaarConfig::default()
    });

    let services = Services::open(config)?;
    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(services).await,
        Command::Reconcile => reconcile_once(services).await,
        Command::Jobs => print_jobs(&services),
        Command::Outbox { limit } => print_outbox(&services, limit),
    }
}

async fn run(services: Services) -> anyhow::Result<()> {
    // Recovery must finish before anything can arm new offer triggers.
    let report = services.recovery().reconcile().await?;
    info!(?report, "job log reconciled");

    bazaar_scheduler::register_sweeps(
        &services.scheduler,
        &services.config.scheduler,
        services.backup.clone(),
        services.expiry.clone(),
    )?;
    services.scheduler.start();
    info!(triggers = services.scheduler.len(), "bazaard running");

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    services.scheduler.stop();
    services.scheduler.wait_idle().await;
    Ok(())
}

async fn reconcile_once(services: Services) -> anyhow::Result<()> {
    let report = services.recovery().reconcile().await?;
    // The scheduler never starts here, so re-armed jobs stay in the log untouched.
    services.scheduler.stop();
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn print_jobs(services: &Services) -> anyhow::Result<()> {
    for job in services.log.list()? {
        println!("{}", serde_json::to_string(&job)?);
    }
    Ok(())
}

fn print_outbox(services: &Services, limit: usize) -> anyhow::Result<()> {
    for message in services.outbox.pending(limit)? {
        println!("{}", serde_json::to_string(&message)?);
    }
    Ok(())
}
