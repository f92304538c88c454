//! The per-window orchestrator. Builds the window geometry, loads or
//! connects every ready kernel, feeds windows to each in kernel list
//! order, and records one [`TelemetryRecord`] per (window, kernel).
//!
//! The `KernelSlot` tagged union replaces a function-pointer-struct /
//! `dlopen` split with a single enum the scheduler can hold in a
//! homogeneous `Vec` for dynamic kernel dispatch.

use std::path::Path;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock;
use crate::config::{KernelKind, RunConfig};
use crate::kernel::abi::KernelConfig;
use crate::kernel::loader::{resolve_plugin_path, KernelHandle, LoaderError};
use crate::kernel::state::{load_calibration_state, StateError};
use crate::replayer::{Replayer, ReplayerError};
use crate::shutdown::ShutdownFlag;
use crate::spec::{WindowSpec, WindowSpecError};
use crate::telemetry::{TelemetryRecord, TelemetrySink};
use crate::wire::{
    encode_frame, recv_frame, split_into_chunks, Ack, Config as WireConfig, FrameType, Hello, Reassembler,
    ResultMetadata, SessionId, TcpTransport, Transport, WireError,
};
use crate::window::WindowAssembler;

/// Window-processing failures for a single kernel beyond this count
/// disable it for the remainder of the run.
const DEFAULT_FAILURE_THRESHOLD: u64 = 16;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid window geometry: {0}")]
    InvalidSpec(#[from] WindowSpecError),
    #[error("failed to load local kernel {name}: {source}")]
    LoadKernel {
        name: String,
        #[source]
        source: LoaderError,
    },
    #[error("failed to load calibration state for kernel {name}: {source}")]
    CalibrationState {
        name: String,
        #[source]
        source: StateError,
    },
    #[error("failed to connect to remote kernel {name} at {location}: {source}")]
    Connect {
        name: String,
        location: String,
        #[source]
        source: WireError,
    },
    #[error("handshake with remote kernel {name} failed: {source}")]
    Handshake {
        name: String,
        #[source]
        source: WireError,
    },
    #[error("remote kernel {name} rejected init: error_bits={error_bits:#x}")]
    RemoteInitFailed { name: String, error_bits: u32 },
    #[error(transparent)]
    Replayer(#[from] ReplayerError),
}

enum KernelSlot {
    Local {
        handle: KernelHandle,
        output_w: u32,
        output_c: u32,
    },
    Remote {
        transport: Box<dyn Transport>,
        session: SessionId,
        next_sequence: u32,
        output_w: u32,
        output_c: u32,
    },
}

struct ActiveKernel {
    name: String,
    slot: KernelSlot,
    failure_count: u64,
    disabled: bool,
}

pub struct Scheduler {
    spec: WindowSpec,
    kernels: Vec<ActiveKernel>,
    telemetry: TelemetrySink,
    shutdown: ShutdownFlag,
    run_id: String,
    warmup_seconds: f64,
    duration_seconds: f64,
    repeats: u32,
    deadline_override_ns: Option<u64>,
    failure_threshold: u64,
    dataset_path: std::path::PathBuf,
}

impl Scheduler {
    pub fn new(config: &RunConfig, shutdown: ShutdownFlag) -> Result<Self, SchedulerError> {
        let spec = WindowSpec::new(config.fs, config.w, config.h, config.c, config.dtype)?;
        let run_id = clock::new_run_id();

        let mut kernels = Vec::new();
        for entry in config.ready_kernels() {
            let slot = match entry.kind {
                KernelKind::Local => {
                    let calib = match &entry.calibration_state_path {
                        Some(path) => Some(
                            load_calibration_state(path, crate::kernel::abi::ABI_VERSION)
                                .map_err(|source| SchedulerError::CalibrationState {
                                    name: entry.name.clone(),
                                    source,
                                })?
                                .0,
                        ),
                        None => None,
                    };
                    let plugin_path = resolve_plugin_path(Path::new(&entry.location), &entry.name)
                        .map_err(|source| SchedulerError::LoadKernel {
                            name: entry.name.clone(),
                            source,
                        })?;
                    let params_bytes = entry.params_string.as_bytes();
                    let kernel_config = KernelConfig::new(
                        config.fs,
                        config.w as u32,
                        config.h as u32,
                        config.c as u32,
                        config.dtype.wire_tag(),
                        false,
                        params_bytes,
                        calib.as_deref(),
                    );
                    let (handle, output_w, output_c, _capabilities) =
                        KernelHandle::load(&plugin_path, &kernel_config).map_err(|source| SchedulerError::LoadKernel {
                            name: entry.name.clone(),
                            source,
                        })?;
                    info!(kernel = %entry.name, output_w, output_c, "local kernel loaded");
                    KernelSlot::Local {
                        handle,
                        output_w,
                        output_c,
                    }
                }
                KernelKind::Remote => {
                    let mut transport: Box<dyn Transport> =
                        Box::new(TcpTransport::connect(&entry.location).map_err(|source| SchedulerError::Connect {
                            name: entry.name.clone(),
                            location: entry.location.clone(),
                            source,
                        })?);
                    let (hello, ack, session_id) = run_handshake(
                        transport.as_mut(),
                        config,
                        entry,
                    )
                    .map_err(|source| SchedulerError::Handshake {
                        name: entry.name.clone(),
                        source,
                    })?;
                    if !ack.is_success() {
                        return Err(SchedulerError::RemoteInitFailed {
                            name: entry.name.clone(),
                            error_bits: ack.error_bits,
                        });
                    }
                    info!(
                        kernel = %entry.name,
                        adapter = %hello.adapter_name,
                        output_w = ack.output_w,
                        output_c = ack.output_c,
                        "remote kernel handshake complete"
                    );
                    KernelSlot::Remote {
                        transport,
                        session: SessionId {
                            boot_id: hello.adapter_boot_id,
                            session_id,
                        },
                        next_sequence: 0,
                        output_w: ack.output_w,
                        output_c: ack.output_c,
                    }
                }
            };
            kernels.push(ActiveKernel {
                name: entry.name.clone(),
                slot,
                failure_count: 0,
                disabled: false,
            });
        }

        Ok(Self {
            spec,
            kernels,
            telemetry: TelemetrySink::new(),
            shutdown,
            run_id,
            warmup_seconds: config.warmup_seconds,
            duration_seconds: config.duration_seconds,
            repeats: config.repeats.max(1),
            deadline_override_ns: config.deadline_ms.map(|ms| (ms * 1_000_000.0) as u64),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            dataset_path: config.dataset_path.clone(),
        })
    }

    pub fn telemetry(&self) -> &TelemetrySink {
        &self.telemetry
    }

    pub fn into_telemetry(self) -> TelemetrySink {
        self.telemetry
    }

    /// Runs `repeats` independent measured repetitions, each pacing a
    /// fresh [`Replayer`] over the dataset for `duration_seconds`.
    pub fn run(&mut self) -> Result<(), SchedulerError> {
        for repeat_index in 0..self.repeats {
            if self.shutdown.is_set() {
                break;
            }
            self.run_one_repeat(repeat_index)?;
        }
        Ok(())
    }

    fn run_one_repeat(&mut self, repeat_index: u32) -> Result<(), SchedulerError> {
        let mut replayer = Replayer::open(&self.dataset_path, &self.spec, self.shutdown.clone())?;
        let mut assembler = WindowAssembler::new(self.spec, self.warmup_seconds);
        let run_deadline_ns = clock::now_ns() + (self.duration_seconds * 1_000_000_000.0) as u64;
        let shutdown = self.shutdown.clone();

        let kernels = &mut self.kernels;
        let telemetry = &mut self.telemetry;
        let run_id = &self.run_id;
        let spec = self.spec;
        let deadline_override_ns = self.deadline_override_ns;
        let failure_threshold = self.failure_threshold;

        replayer.run(
            || shutdown.is_set() || clock::now_ns() >= run_deadline_ns,
            |hop, late| {
                if let Some(window) = assembler.push_hop(hop) {
                    for kernel in kernels.iter_mut() {
                        if kernel.disabled {
                            continue;
                        }
                        let record = run_window_on_kernel(
                            kernel,
                            window.samples,
                            window.index,
                            repeat_index,
                            window.warmup,
                            run_id,
                            &spec,
                            deadline_override_ns,
                            late,
                        );
                        if record.error_code.is_some() {
                            kernel.failure_count += 1;
                            if kernel.failure_count > failure_threshold && !kernel.disabled {
                                kernel.disabled = true;
                                warn!(kernel = %kernel.name, failures = kernel.failure_count, "kernel disabled after exceeding failure threshold");
                            }
                        }
                        debug!(kernel = %kernel.name, window = window.index, missed = record.deadline_missed, "window processed");
                        telemetry.push(record);
                    }
                }
            },
        );
        Ok(())
    }
}

fn run_window_on_kernel(
    kernel: &mut ActiveKernel,
    input: &[f32],
    window_index: u64,
    repeat_index: u32,
    warmup: bool,
    run_id: &str,
    spec: &WindowSpec,
    deadline_override_ns: Option<u64>,
    pacing_late: bool,
) -> TelemetryRecord {
    let release_ns = clock::now_ns();
    let deadline_ns = release_ns + deadline_override_ns.unwrap_or_else(|| spec.deadline_ns());
    let start_ns = clock::now_ns();

    let (end_ns, error_code) = match &mut kernel.slot {
        KernelSlot::Local {
            handle,
            output_w,
            output_c,
        } => {
            let mut output = vec![0.0f32; (*output_w as usize) * (*output_c as usize)];
            handle.process(input, &mut output);
            (clock::now_ns(), None)
        }
        KernelSlot::Remote {
            transport,
            session,
            next_sequence,
            ..
        } => {
            let timeout_ms = ((deadline_ns.saturating_sub(release_ns)) / 1_000_000).max(1);
            match send_and_receive_window(transport.as_mut(), *next_sequence, input, session, timeout_ms) {
                Ok(()) => {
                    *next_sequence = next_sequence.wrapping_add(1);
                    (clock::now_ns(), None)
                }
                Err(e) => {
                    if matches!(e, WireError::AdapterCrash(_) | WireError::SessionMismatch { .. }) {
                        kernel.disabled = true;
                        warn!(kernel = %kernel.name, error = %e, "kernel disabled immediately on fatal wire error");
                    }
                    (clock::now_ns(), Some(format!("{e}")))
                }
            }
        }
    };

    TelemetryRecord {
        run_id: run_id.to_string(),
        kernel_name: kernel.name.clone(),
        window_index,
        repeat_index,
        warmup,
        release_ns,
        deadline_ns,
        start_ns,
        end_ns,
        deadline_missed: end_ns > deadline_ns,
        w: spec.w as u32,
        h: spec.h as u32,
        c: spec.c as u32,
        fs: spec.fs,
        error_code,
        pacing_late,
    }
}

fn send_and_receive_window(
    transport: &mut dyn Transport,
    sequence: u32,
    input: &[f32],
    session: &SessionId,
    timeout_ms: u64,
) -> Result<(), WireError> {
    let mut bytes = Vec::with_capacity(input.len() * 4);
    for sample in input {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    for chunk in split_into_chunks(sequence, &bytes)? {
        transport.send(&encode_frame(FrameType::WindowChunk, 0, &chunk))?;
    }

    let mut reassembler = Reassembler::new(sequence);
    loop {
        let (header, payload) = recv_frame(transport, timeout_ms)?;
        if header.frame_type != FrameType::ResultChunk {
            return Err(WireError::ProtocolViolation(format!(
                "expected RESULT_CHUNK, got frame_type {:?}",
                header.frame_type
            )));
        }
        if let Some(full) = reassembler.accept(&payload)? {
            let metadata = ResultMetadata::decode(&full)?;
            session.check(metadata.boot_id, metadata.session_id)?;
            return Ok(());
        }
    }
}

fn run_handshake(
    transport: &mut dyn Transport,
    config: &RunConfig,
    entry: &crate::config::KernelEntry,
) -> Result<(Hello, Ack, u64), WireError> {
    let handshake_timeout_ms = 5_000;
    let (header, payload) = recv_frame(transport, handshake_timeout_ms)?;
    if header.frame_type != FrameType::Hello {
        return Err(WireError::ProtocolViolation("expected HELLO first".to_string()));
    }
    let hello = Hello::decode(&payload)?;

    let session_id = clock::now_ns();
    let wire_config = WireConfig {
        session_id,
        fs: config.fs,
        w: config.w as u32,
        h: config.h as u32,
        c: config.c as u32,
        kernel_name: entry.name.clone(),
        params: entry.params_string.clone(),
        calibration_ref: entry
            .calibration_state_path
            .as_ref()
            .map(|p| p.display().to_string()),
    };
    transport.send(&encode_frame(FrameType::Config, 0, &wire_config.encode()))?;

    let (header, payload) = recv_frame(transport, handshake_timeout_ms)?;
    if header.frame_type == FrameType::Error {
        return Err(WireError::AdapterCrash("adapter returned ERROR during handshake".to_string()));
    }
    if header.frame_type != FrameType::Ack {
        return Err(WireError::ProtocolViolation("expected ACK after CONFIG".to_string()));
    }
    let ack = Ack::decode(&payload)?;
    Ok((hello, ack, session_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::Dtype;

    #[test]
    fn scheduler_rejects_invalid_window_spec() {
        let config = RunConfig {
            dataset_path: "samples.raw".into(),
            fs: 0.0,
            c: 1,
            w: 4,
            h: 2,
            dtype: Dtype::F32,
            warmup_seconds: 0.0,
            duration_seconds: 1.0,
            repeats: 1,
            deadline_ms: None,
            kernels: vec![],
            output_dir: "out".into(),
            output_format: crate::config::OutputFormat::Ndjson,
        };
        let err = Scheduler::new(&config, ShutdownFlag::new());
        assert!(matches!(err, Err(SchedulerError::InvalidSpec(_))));
    }
}
