//! The run configuration record consumed by the engine. The CLI's own
//! TOML file format translates into this type; the engine never touches a
//! filesystem path other than `dataset_path` and `output_dir`.

use std::path::PathBuf;

use crate::dtype::Dtype;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelKind {
    Local,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelStatus {
    Ready,
    NotReady(String),
}

/// One configured kernel entry.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelEntry {
    pub kind: KernelKind,
    pub name: String,
    /// `spec_uri` for local plugins, `transport_uri` for remote ones.
    pub location: String,
    pub params_string: String,
    pub status: KernelStatus,
    pub calibration_state_path: Option<PathBuf>,
}

/// The full run configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub dataset_path: PathBuf,
    pub fs: f64,
    pub c: usize,
    pub w: usize,
    pub h: usize,
    pub dtype: Dtype,
    pub warmup_seconds: f64,
    pub duration_seconds: f64,
    pub repeats: u32,
    pub deadline_ms: Option<f64>,
    pub kernels: Vec<KernelEntry>,
    pub output_dir: PathBuf,
    pub output_format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Ndjson,
    Json,
}

impl RunConfig {
    /// Kernel entries whose status is `ready` — entries that are not ready
    /// are skipped entirely; no partial loading is permitted.
    pub fn ready_kernels(&self) -> impl Iterator<Item = &KernelEntry> {
        self.kernels.iter().filter(|k| k.status == KernelStatus::Ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> RunConfig {
        RunConfig {
            dataset_path: PathBuf::from("samples.raw"),
            fs: 16_000.0,
            c: 1,
            w: 160,
            h: 80,
            dtype: Dtype::F32,
            warmup_seconds: 1.0,
            duration_seconds: 10.0,
            repeats: 1,
            deadline_ms: None,
            kernels: vec![
                KernelEntry {
                    kind: KernelKind::Local,
                    name: "fir".to_string(),
                    location: "/opt/kernels".to_string(),
                    params_string: String::new(),
                    status: KernelStatus::Ready,
                    calibration_state_path: None,
                },
                KernelEntry {
                    kind: KernelKind::Remote,
                    name: "goertzel".to_string(),
                    location: "127.0.0.1:9000".to_string(),
                    params_string: String::new(),
                    status: KernelStatus::NotReady("handshake failed".to_string()),
                    calibration_state_path: None,
                },
            ],
            output_dir: PathBuf::from("out"),
            output_format: OutputFormat::Ndjson,
        }
    }

    #[test]
    fn ready_kernels_filters_out_not_ready_entries() {
        let config = sample_config();
        let ready: Vec<_> = config.ready_kernels().collect();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].name, "fir");
    }
}
