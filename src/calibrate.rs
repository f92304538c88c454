//! `cortex calibrate` — sample windows from the dataset, run a local
//! kernel's offline `calibrate` export over them, and persist the
//! resulting state file.

use anyhow::{bail, Context, Result};
use std::cell::Cell;
use std::path::Path;

use cortex_engine::config::{KernelKind, KernelStatus};
use cortex_engine::kernel::abi::KernelConfig;
use cortex_engine::kernel::loader::{resolve_plugin_path, KernelHandle};
use cortex_engine::kernel::state::save_calibration_state;
use cortex_engine::replayer::Replayer;
use cortex_engine::window::WindowAssembler;
use cortex_engine::{ShutdownFlag, WindowSpec};

use crate::config::CortexFile;

pub fn run(file: &CortexFile, kernel_name: &str, windows: u32) -> Result<()> {
    let run_config = file.to_run_config()?;
    let entry = run_config
        .kernels
        .iter()
        .find(|k| k.name == kernel_name)
        .with_context(|| format!("no kernel named {kernel_name:?} in config"))?;
    if entry.kind != KernelKind::Local {
        bail!("calibration is only supported for local (in-process) kernels; {kernel_name:?} is remote");
    }
    if entry.status != KernelStatus::Ready {
        bail!("kernel {kernel_name:?} is not ready — run `cortex validate` to see why");
    }

    let spec = WindowSpec::new(run_config.fs, run_config.w, run_config.h, run_config.c, run_config.dtype)
        .context("window geometry failed validation")?;
    let mut replayer = Replayer::open(&run_config.dataset_path, &spec, ShutdownFlag::new())?;
    let mut assembler = WindowAssembler::new(spec, 0.0);

    let mut sampled = Vec::with_capacity(spec.window_elements() * windows as usize);
    let collected = Cell::new(0u32);
    replayer.run(
        || collected.get() >= windows,
        |hop, _late| {
            if collected.get() >= windows {
                return;
            }
            if let Some(window) = assembler.push_hop(hop) {
                sampled.extend_from_slice(window.samples);
                collected.set(collected.get() + 1);
            }
        },
    );
    let collected = collected.get();
    if collected < windows {
        bail!("dataset produced only {collected} of the requested {windows} windows");
    }

    let plugin_path = resolve_plugin_path(Path::new(&entry.location), &entry.name)?;
    let kernel_config = KernelConfig::new(
        run_config.fs,
        run_config.w as u32,
        run_config.h as u32,
        run_config.c as u32,
        run_config.dtype.wire_tag(),
        false,
        entry.params_string.as_bytes(),
        None,
    );
    let (handle, _output_w, _output_c, _capabilities) = KernelHandle::load(&plugin_path, &kernel_config)
        .with_context(|| format!("failed to load kernel {kernel_name:?}"))?;
    if !handle.supports_calibration() {
        bail!("kernel {kernel_name:?} does not export a calibrate symbol");
    }

    let (state_bytes, state_version) = handle
        .calibrate(&kernel_config, &sampled, collected)
        .with_context(|| format!("kernel {kernel_name:?} calibration produced no state"))?;

    let state_path = entry
        .calibration_state_path
        .clone()
        .unwrap_or_else(|| run_config.output_dir.join(format!("{kernel_name}.cortex_state")));
    save_calibration_state(&state_path, cortex_engine::kernel::ABI_VERSION, state_version, &state_bytes)?;
    println!(
        "calibrated {kernel_name:?} on {collected} windows, wrote {} bytes to {}",
        state_bytes.len(),
        state_path.display()
    );
    Ok(())
}
