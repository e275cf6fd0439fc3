//! CLI argument parsing for Tracekeeper

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for the final report
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

/// Longest accepted watch duration (one year)
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Parser, Debug)]
#[command(name = "tracekeeper")]
#[command(version)]
#[command(
    about = "Watch host stress through the tracer circuit breaker and report pool usage",
    long_about = None
)]
pub struct Cli {
    /// TOML configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// How long to watch, in seconds
    #[arg(
        short,
        long,
        value_name = "SECS",
        default_value = "30",
        value_parser = clap::value_parser!(u64).range(..=MAX_DURATION_SECS)
    )]
    pub duration: u64,

    /// Override the stress monitoring interval, in milliseconds
    #[arg(short, long, value_name = "MS")]
    pub interval: Option<u64>,

    /// Override the CPU stress duration threshold, in milliseconds
    #[arg(long = "cpu-duration", value_name = "MS")]
    pub cpu_duration: Option<u64>,

    /// Simulated trace records per second pushed through the pools
    #[arg(long, value_name = "N", default_value = "1000")]
    pub load: u64,

    /// Start with recording switched off
    #[arg(long = "no-recording")]
    pub no_recording: bool,

    /// Report format
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Enable debug tracing output to stderr
    #[arg(long)]
    pub debug: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["tracekeeper"]);
        assert!(cli.config.is_none());
        assert_eq!(cli.duration, 30);
        assert_eq!(cli.load, 1000);
        assert_eq!(cli.format, OutputFormat::Text);
        assert!(!cli.no_recording);
        assert!(!cli.debug);
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "tracekeeper",
            "--config",
            "agent.toml",
            "-d",
            "5",
            "--interval",
            "1000",
            "--cpu-duration",
            "60000",
            "--format",
            "json",
            "--no-recording",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("agent.toml")));
        assert_eq!(cli.duration, 5);
        assert_eq!(cli.interval, Some(1000));
        assert_eq!(cli.cpu_duration, Some(60000));
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(cli.no_recording);
    }

    #[test]
    fn test_cli_rejects_overlong_duration() {
        assert!(Cli::try_parse_from(["tracekeeper", "--duration", "18446744073709551615"]).is_err());
        let max = MAX_DURATION_SECS.to_string();
        let cli = Cli::parse_from(["tracekeeper", "--duration", max.as_str()]);
        assert_eq!(cli.duration, MAX_DURATION_SECS);
    }
}
