//! CLI argument definitions.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "diffbot", version, about = "Differential-drive wheel controller")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/diffbot_config.toml")]
    pub config: PathBuf,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Log level (error|warn|info|debug|trace); defaults to [logging].level, then info
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Closed-loop drive; prints telemetry as JSON lines
    Drive {
        /// Forward speed command (-255..=255)
        #[arg(long, allow_hyphen_values = true)]
        speed: f64,
        /// Turn command (-1000..=1000), positive turns right
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        turn: f64,
        /// Stop after this many milliseconds (runs until Ctrl-C if omitted)
        #[arg(long, value_name = "MS")]
        duration_ms: Option<u64>,
    },
    /// Open-loop power override of both wheels
    Power {
        /// Left wheel power (-255..=255)
        #[arg(long, allow_hyphen_values = true)]
        left: i32,
        /// Right wheel power (-255..=255)
        #[arg(long, allow_hyphen_values = true)]
        right: i32,
        #[arg(long, value_name = "MS")]
        duration_ms: Option<u64>,
    },
    /// Step response of the left wheel with optional gain overrides
    Tune {
        /// Target speed in pulses per second
        #[arg(long, allow_hyphen_values = true)]
        target: f64,
        #[arg(long)]
        kp: Option<f64>,
        #[arg(long)]
        ki: Option<f64>,
        #[arg(long)]
        kd: Option<f64>,
        #[arg(long, value_name = "MS", default_value_t = 5_000)]
        duration_ms: u64,
        /// Write every control tick to this CSV file
        #[arg(long, value_name = "FILE")]
        csv: Option<PathBuf>,
    },
    /// Validate the config and build both wheels without moving them
    SelfCheck,
}
