//! CLI definitions for cortex.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[clap(
    name = "cortex",
    version,
    about = "Deterministic real-time streaming DSP benchmarking harness\n\nPaced sample replay, sliding windows, in-process or remote kernels, deadline telemetry.",
    long_about = None
)]
pub struct Cli {
    /// Path to cortex.toml config file
    #[clap(long, short, default_value = "cortex.toml")]
    pub config: PathBuf,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the configured benchmark and write telemetry
    Run {
        /// Override the configured run duration, in seconds
        #[clap(long)]
        duration: Option<f64>,

        /// Override the configured repeat count
        #[clap(long)]
        repeats: Option<u32>,
    },

    /// Validate the config file and every kernel entry without running
    Validate,

    /// Print an example cortex.toml to stdout
    Init,

    /// Dry-run the Replayer and Window Assembler alone (no kernels) to
    /// sanity-check pacing, plus report transport readiness
    ReplayCheck {
        /// How long to drive the replayer for, in seconds
        #[clap(long, default_value_t = 5.0)]
        seconds: f64,
    },

    /// Run a kernel's offline calibration pass and persist the resulting
    /// calibration state file
    Calibrate {
        /// Name of the kernel entry (from cortex.toml) to calibrate
        kernel: String,

        /// Number of windows to sample from the dataset for calibration
        #[clap(long, default_value_t = 500)]
        windows: u32,
    },
}
