//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// avsync - audio/video synchronization measurement
#[derive(Parser, Debug)]
#[command(
    name = "avsync",
    author,
    version,
    about = "Audio/video sync marker detection",
    long_about = "Measures audio/video latency from a flashing video marker and a\n\
                  phase-modulated audio tone.\n\n\
                  Generates the test pattern from configuration, runs the detection \n\
                  engine on both paths, and dispatches marker and sync events to the \n\
                  configured sinks."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "AVSYNC_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "AVSYNC_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate the test pattern and measure it
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display tone geometry and pattern timing
    Info(InfoArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON); built-in defaults if absent
    #[arg(short, long, env = "AVSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override generated length (seconds)
    #[arg(long)]
    pub duration: Option<f64>,

    /// Override audio marker delay relative to the video transition (ns)
    #[arg(long, allow_hyphen_values = true)]
    pub audio_delay_ns: Option<i64>,

    /// Pace the capture at the configured frame and sample rates
    #[arg(long)]
    pub realtime: bool,

    /// Stop after this many sync pairings (0 = unlimited)
    #[arg(long, default_value = "0", env = "AVSYNC_MAX_SYNCS")]
    pub max_syncs: u64,

    /// Run timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "AVSYNC_TIMEOUT")]
    pub timeout: u64,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,

    /// Channel buffer size for internal queues
    #[arg(long, default_value = "64", env = "AVSYNC_BUFFER_SIZE")]
    pub buffer_size: usize,

    /// What the capture does when the engine falls behind
    #[arg(long, value_enum, default_value = "block")]
    pub drop_policy: DropPolicyArg,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "AVSYNC_METRICS_PORT")]
    pub metrics_port: u16,
}

#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "avsync.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file; built-in defaults if absent
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// List the first N marker cycles
    #[arg(long, default_value = "0")]
    pub cycles: u64,

    /// Show sink configuration
    #[arg(long)]
    pub sinks: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DropPolicyArg {
    /// Wait for the engine
    #[default]
    Block,
    /// Drop the newest frame or block
    DropNewest,
}

impl From<DropPolicyArg> for ingestion::DropPolicy {
    fn from(policy: DropPolicyArg) -> Self {
        match policy {
            DropPolicyArg::Block => Self::Block,
            DropPolicyArg::DropNewest => Self::DropNewest,
        }
    }
}
