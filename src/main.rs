//! cortex — deterministic real-time streaming DSP benchmarking harness.
//!
//! Paces replay of a raw sample file, assembles overlapping windows, feeds
//! them to in-process or remote kernels, and records deadline-aware
//! latency telemetry. Run `cortex --help` for usage.

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod calibrate;
mod cli;
mod config;
mod replay_check;
mod run;

use cli::{Cli, Commands};

/// `0` success; `1` configuration/invariant violation; `2` plugin or
/// transport initialization failure; `130` terminated by signal after
/// successful cleanup (handled separately, inside `run::run`).
fn exit_code_for(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<cortex_engine::SchedulerError>() {
            use cortex_engine::SchedulerError::*;
            return match e {
                LoadKernel { .. } | CalibrationState { .. } | Connect { .. } | Handshake { .. } | RemoteInitFailed { .. } => 2,
                InvalidSpec(_) | Replayer(_) => 1,
            };
        }
    }
    1
}

fn main() {
    if let Err(e) = run_cli() {
        eprintln!("Error: {e:?}");
        std::process::exit(exit_code_for(&e));
    }
}

fn run_cli() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .init();

    let cli = Cli::parse();

    if matches!(cli.command, Commands::Init) {
        let example = config::CortexFile::default_example();
        print!("{}", toml::to_string_pretty(&example)?);
        return Ok(());
    }

    if !cli.config.exists() {
        anyhow::bail!(
            "config file '{}' does not exist — run `cortex init > {}` to create one",
            cli.config.display(),
            cli.config.display()
        );
    }
    let file = config::CortexFile::load(&cli.config)?;

    match cli.command {
        Commands::Init => unreachable!("handled above"),
        Commands::Validate => {
            let run_config = file
                .to_run_config()
                .context("config failed validation")?;
            cortex_engine::WindowSpec::new(run_config.fs, run_config.w, run_config.h, run_config.c, run_config.dtype)
                .context("window geometry failed validation")?;
            let ready = run_config.ready_kernels().count();
            println!(
                "cortex.toml is valid: {} kernel(s) configured, {} ready",
                run_config.kernels.len(),
                ready
            );
            for kernel in &run_config.kernels {
                if let cortex_engine::config::KernelStatus::NotReady(reason) = &kernel.status {
                    println!("  - {}: not ready ({reason})", kernel.name);
                }
            }
        }
        Commands::ReplayCheck { seconds } => replay_check::run(&file, seconds)?,
        Commands::Run { duration, repeats } => run::run(&file, duration, repeats)?,
        Commands::Calibrate { kernel, windows } => calibrate::run(&file, &kernel, windows)?,
    }

    Ok(())
}
