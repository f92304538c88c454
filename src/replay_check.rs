//! `cortex replay-check` — dry-run the Replayer and Window Assembler alone
//! (no kernels) to sanity-check pacing, then report transport readiness.

use anyhow::{Context, Result};
use std::net::TcpStream;
use std::time::Duration;

use cortex_engine::config::KernelKind;
use cortex_engine::replayer::Replayer;
use cortex_engine::window::WindowAssembler;
use cortex_engine::{clock, ShutdownFlag, WindowSpec};

use crate::config::CortexFile;

pub fn run(file: &CortexFile, seconds: f64) -> Result<()> {
    let run_config = file.to_run_config()?;

    println!("=== Replayer + Window Assembler ===");
    let spec = WindowSpec::new(run_config.fs, run_config.w, run_config.h, run_config.c, run_config.dtype)
        .context("window geometry failed validation")?;
    let shutdown = ShutdownFlag::new();
    match Replayer::open(&run_config.dataset_path, &spec, shutdown.clone()) {
        Ok(mut replayer) => {
            let mut assembler = WindowAssembler::new(spec, run_config.warmup_seconds);
            let deadline_ns = clock::now_ns() + (seconds * 1_000_000_000.0) as u64;
            let mut windows_assembled: u64 = 0;
            let mut late_hops: u64 = 0;
            replayer.run(
                || clock::now_ns() >= deadline_ns,
                |hop, late| {
                    if late {
                        late_hops += 1;
                    }
                    if assembler.push_hop(hop).is_some() {
                        windows_assembled += 1;
                    }
                },
            );
            println!(
                "  {} — ran for ~{seconds:.1}s: {windows_assembled} window(s) assembled, {late_hops} late hop(s)",
                run_config.dataset_path.display()
            );
        }
        Err(e) => println!("  {}: NOT READABLE ({e})", run_config.dataset_path.display()),
    }

    println!();
    println!("=== Kernels ===");
    for kernel in &run_config.kernels {
        match &kernel.status {
            cortex_engine::config::KernelStatus::NotReady(reason) => {
                println!("  {} ({:?}): SKIPPED — {reason}", kernel.name, kernel.kind);
            }
            cortex_engine::config::KernelStatus::Ready => match kernel.kind {
                KernelKind::Local => {
                    println!("  {} (local): plugin file present at {}", kernel.name, kernel.location);
                }
                KernelKind::Remote => match kernel
                    .location
                    .parse::<std::net::SocketAddr>()
                    .map_err(anyhow::Error::from)
                    .and_then(|addr| TcpStream::connect_timeout(&addr, Duration::from_secs(2)).map_err(Into::into))
                {
                    Ok(_) => println!("  {} (remote): {} is reachable", kernel.name, kernel.location),
                    Err(e) => println!("  {} (remote): {} UNREACHABLE ({e})", kernel.name, kernel.location),
                },
            },
        }
    }

    Ok(())
}
