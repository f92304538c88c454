//! Core of a deterministic, single-threaded streaming DSP benchmarking
//! harness: paced sample-file replay, sliding-window assembly, an
//! in-process/remote kernel dispatch layer, and deadline-aware telemetry.
//!
//! This crate is the measurement engine only. Process wiring — CLI
//! parsing, logging initialization, TOML config loading — lives in the
//! `cortex` binary crate; see its `main.rs`.

pub mod clock;
pub mod config;
pub mod dtype;
pub mod kernel;
pub mod params;
pub mod replayer;
pub mod scheduler;
pub mod shutdown;
pub mod spec;
pub mod telemetry;
pub mod wire;
pub mod window;

pub use clock::{new_run_id, now_ns, sleep_until};
pub use config::RunConfig;
pub use dtype::Dtype;
pub use scheduler::{Scheduler, SchedulerError};
pub use shutdown::ShutdownFlag;
pub use spec::{WindowSpec, WindowSpecError};
pub use telemetry::{KernelSummary, TelemetryRecord, TelemetrySink};
