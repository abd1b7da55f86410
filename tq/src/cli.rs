//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// throttleq - rate-limited outbound request scheduler
#[derive(Parser)]
#[command(
    name = "tq",
    about = "Rate-limited outbound request scheduler for throttled CRM APIs",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the resolved configuration as YAML
    Config,

    /// Push requests through the scheduler against a simulated upstream
    Simulate {
        /// Number of requests to enqueue
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,

        /// Throttle every Nth upstream call with a 429 (0 disables)
        #[arg(long, default_value_t = 4)]
        rate_limit_every: u64,

        /// Fail every Nth upstream call with a 500 (0 disables)
        #[arg(long, default_value_t = 0)]
        fail_every: u64,

        /// Simulated upstream latency in milliseconds
        #[arg(long, default_value_t = 50)]
        latency_ms: u64,

        /// Override the configured request interval in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_simulate() {
        let cli = Cli::try_parse_from([
            "tq",
            "--log-level",
            "debug",
            "simulate",
            "-n",
            "3",
            "--fail-every",
            "2",
            "--interval-ms",
            "10",
        ])
        .unwrap();

        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Command::Simulate {
                count,
                rate_limit_every,
                fail_every,
                interval_ms,
                json,
                ..
            } => {
                assert_eq!(count, 3);
                assert_eq!(rate_limit_every, 4);
                assert_eq!(fail_every, 2);
                assert_eq!(interval_ms, Some(10));
                assert!(!json);
            }
            other => panic!("Expected Simulate, got {other:?}"),
        }
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["tq"]).is_err());
    }
}
