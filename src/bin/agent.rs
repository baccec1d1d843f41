//! Resident agent binary for rotaweek.
//!
//! Runs a startup refresh, arms the cron schedule, and then logs week and
//! error notifications until interrupted. `SIGUSR1` triggers a manual
//! refresh.

use clap::{Parser, Subcommand};
use rotaweek::{
    AgentConfig, HttpWeekFetcher, RefreshOrchestrator, RefreshReason, RefreshScheduler, WeekEvent,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// rotaweek: keeps a personal week schedule fresh.
#[derive(Parser)]
#[command(name = "rotaweek-agent", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Run the agent: startup refresh, then scheduled refreshes.
    Run,
    /// Load and validate the configuration, then print a summary.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rotaweek=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => AgentConfig::from_file(path)?,
        None => {
            let path = AgentConfig::default_config_path();
            if path.exists() {
                AgentConfig::from_file(&path)?
            } else {
                AgentConfig::default()
            }
        }
    };

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_agent(config).await,
        Command::CheckConfig => check_config(&config),
    }
}

/// Run the agent until interrupted.
async fn run_agent(config: AgentConfig) -> anyhow::Result<()> {
    config.validate()?;
    let tz = config.tz()?;

    let fetcher = Arc::new(HttpWeekFetcher::new(&config.fetch)?);
    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
    let orchestrator = Arc::new(RefreshOrchestrator::new(config.clone(), fetcher, event_tx));
    let mut scheduler = RefreshScheduler::new(orchestrator.clone());

    info!("rotaweek-agent starting");
    orchestrator.run_cycle(RefreshReason::Startup).await;
    scheduler.configure(config.refresh_cron.as_deref(), tz);

    let mut refresh_signal =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::user_defined1())?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                break;
            }
            _ = refresh_signal.recv() => {
                info!("manual refresh requested");
                orchestrator.refresh_now().await;
            }
            event = event_rx.recv() => {
                match event {
                    Some(WeekEvent::Data(week)) if !week.fresh => {
                        warn!(
                            week_start = %week.week_start,
                            updated_at = %week.updated_at,
                            "re-serving stale week schedule"
                        );
                    }
                    Some(WeekEvent::Data(week)) => {
                        info!(
                            week_start = %week.week_start,
                            week_rows = week.week_rows,
                            "week schedule updated"
                        );
                    }
                    Some(WeekEvent::Error(failure)) => {
                        error!(
                            reason = %failure.reason,
                            error = %failure.error,
                            "refresh failed"
                        );
                    }
                    None => break,
                }
            }
        }
    }

    scheduler.stop();
    info!("rotaweek-agent shut down cleanly");
    Ok(())
}

/// Validate configuration and print a summary.
fn check_config(config: &AgentConfig) -> anyhow::Result<()> {
    config.validate()?;

    println!("timezone:     {}", config.timezone);
    println!(
        "refresh cron: {}",
        config.refresh_cron.as_deref().unwrap_or("(none, manual only)")
    );
    println!("feed:         {}", config.fetch.base_url);
    println!("employee:     {}", config.fetch.employee);

    if let Some(ref expr) = config.refresh_cron {
        match rotaweek::CronSpec::parse(expr) {
            Ok(spec) => match rotaweek::next_match(&spec, config.tz()?, chrono::Utc::now()) {
                Ok(next) => println!("next run:     {next}"),
                Err(e) => println!("next run:     none ({e})"),
            },
            Err(e) => println!("cron:         invalid ({e})"),
        }
    }

    Ok(())
}
