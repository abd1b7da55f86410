//! throttleq - rate-limited outbound request scheduler
//!
//! CLI entry point for inspecting configuration and simulating load.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info};

use throttleq::cli::{Cli, Command};
use throttleq::config::Config;
use throttleq::simulate::{SimulationOptions, run_simulation};

fn parse_level(level: &str) -> Option<tracing::Level> {
    match level.to_uppercase().as_str() {
        "TRACE" => Some(tracing::Level::TRACE),
        "DEBUG" => Some(tracing::Level::DEBUG),
        "INFO" => Some(tracing::Level::INFO),
        "WARN" | "WARNING" => Some(tracing::Level::WARN),
        "ERROR" => Some(tracing::Level::ERROR),
        _ => None,
    }
}

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<PathBuf> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("throttleq")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => parse_level(s).unwrap_or_else(|| {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
            tracing::Level::INFO
        }),
        None => tracing::Level::INFO,
    };

    let log_path = log_dir.join("throttleq.log");
    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(log_path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    let log_path =
        setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Config => cmd_config(&config),
        Command::Simulate {
            count,
            rate_limit_every,
            fail_every,
            latency_ms,
            interval_ms,
            json,
        } => {
            let options = SimulationOptions {
                count,
                rate_limit_every,
                fail_every,
                latency: Duration::from_millis(latency_ms),
                json,
            };
            cmd_simulate(config, options, interval_ms, &log_path).await
        }
    }
}

fn cmd_config(config: &Config) -> Result<()> {
    debug!("cmd_config: called");
    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    print!("{}", yaml);
    Ok(())
}

async fn cmd_simulate(
    mut config: Config,
    options: SimulationOptions,
    interval_ms: Option<u64>,
    log_path: &std::path::Path,
) -> Result<()> {
    debug!(?options, ?interval_ms, "cmd_simulate: called");
    if let Some(ms) = interval_ms {
        config.scheduler.request_interval_ms = ms;
    }
    let json = options.json;

    let report = run_simulation(config.scheduler, options).await?;

    if json {
        return Ok(());
    }

    println!();
    println!("{}", "Simulation complete".bold());
    println!("  succeeded:      {}", report.succeeded.to_string().green());
    println!("  failed:         {}", report.failed.to_string().red());
    println!("  upstream calls: {}", report.upstream_calls);
    println!("  retries:        {}", report.stats.total_retries);
    println!("  rate limited:   {}", report.stats.total_rate_limited);
    println!("  peak depth:     {}", report.stats.peak_queue_depth);
    println!("  elapsed:        {:.2?}", report.elapsed);
    println!("  log:            {}", log_path.display());
    Ok(())
}
