//! `cortex run` — run the configured benchmark to completion and write
//! telemetry.

use anyhow::{Context, Result};
use cortex_engine::{Scheduler, ShutdownFlag};
use tracing::{info, warn};

use crate::config::CortexFile;

static SHUTDOWN: std::sync::OnceLock<ShutdownFlag> = std::sync::OnceLock::new();

extern "C" fn handle_signal(_sig: libc::c_int) {
    if let Some(flag) = SHUTDOWN.get() {
        flag.signal_set();
    }
}

fn install_signal_handler(flag: ShutdownFlag) {
    SHUTDOWN.set(flag).ok();
    unsafe {
        libc::signal(libc::SIGINT, handle_signal as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handle_signal as libc::sighandler_t);
    }
}

pub fn run(file: &CortexFile, duration_override: Option<f64>, repeats_override: Option<u32>) -> Result<()> {
    let mut run_config = file.to_run_config().context("config failed validation")?;
    if let Some(duration) = duration_override {
        run_config.duration_seconds = duration;
    }
    if let Some(repeats) = repeats_override {
        run_config.repeats = repeats;
    }

    let ready = run_config.ready_kernels().count();
    if ready == 0 {
        anyhow::bail!("no kernel entries are ready — run `cortex validate` to see why");
    }
    info!(kernels = ready, "starting run");

    let shutdown = ShutdownFlag::new();
    install_signal_handler(shutdown.clone());

    let mut scheduler = Scheduler::new(&run_config, shutdown.clone()).context("failed to initialize scheduler")?;
    scheduler.run().context("run failed")?;

    let telemetry = scheduler.into_telemetry();
    let file_name = match run_config.output_format {
        cortex_engine::config::OutputFormat::Ndjson => format!("{}.ndjson", cortex_engine::new_run_id()),
        cortex_engine::config::OutputFormat::Json => format!("{}.json", cortex_engine::new_run_id()),
    };
    let path = telemetry
        .flush_to_file(&run_config.output_dir, &file_name)
        .context("failed to write telemetry")?;
    info!(path = %path.display(), "telemetry written");

    for summary in telemetry.summary() {
        println!(
            "{}: {}/{} windows missed deadline ({:.2}% miss rate)",
            summary.kernel_name,
            summary.deadline_misses,
            summary.measured_windows,
            summary.miss_rate * 100.0
        );
        if let (Some(p50), Some(p95), Some(p99)) = (
            summary.latency_p50_ns,
            summary.latency_p95_ns,
            summary.latency_p99_ns,
        ) {
            println!(
                "  latency p50={:.2}ms p95={:.2}ms p99={:.2}ms",
                p50 as f64 / 1e6,
                p95 as f64 / 1e6,
                p99 as f64 / 1e6
            );
        }
    }

    if shutdown.is_set() {
        warn!("run terminated by signal after successful cleanup");
        std::process::exit(130);
    }
    Ok(())
}
