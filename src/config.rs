//! `cortex.toml` configuration: the on-disk file format, translated into
//! the engine's typed [`cortex_engine::RunConfig`].

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use cortex_engine::config::{KernelEntry, KernelKind, KernelStatus, OutputFormat, RunConfig};
use cortex_engine::kernel::loader::resolve_plugin_path;
use cortex_engine::Dtype;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CortexFile {
    pub dataset_path: String,
    pub fs: f64,
    pub c: usize,
    pub w: usize,
    pub h: usize,
    #[serde(default = "CortexFile::default_dtype")]
    pub dtype: String,
    #[serde(default)]
    pub warmup_seconds: f64,
    #[serde(default = "CortexFile::default_duration")]
    pub duration_seconds: f64,
    #[serde(default = "CortexFile::default_repeats")]
    pub repeats: u32,
    pub deadline_ms: Option<f64>,
    #[serde(default)]
    pub kernels: Vec<KernelFile>,
    #[serde(default = "CortexFile::default_output_dir")]
    pub output_dir: String,
    #[serde(default = "CortexFile::default_output_format")]
    pub output_format: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KernelFile {
    /// "local" or "remote"
    pub kind: String,
    pub name: String,
    /// `spec_uri` directory for local plugins, `host:port` for remote ones.
    pub location: String,
    #[serde(default)]
    pub params: String,
    #[serde(default)]
    pub calibration_state_path: Option<String>,
    #[serde(default = "KernelFile::default_enabled")]
    pub enabled: bool,
}

impl KernelFile {
    fn default_enabled() -> bool {
        true
    }
}

impl CortexFile {
    fn default_dtype() -> String {
        "f32".to_string()
    }
    fn default_duration() -> f64 {
        60.0
    }
    fn default_repeats() -> u32 {
        1
    }
    fn default_output_dir() -> String {
        "cortex-out".to_string()
    }
    fn default_output_format() -> String {
        "ndjson".to_string()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let cfg: Self =
            toml::from_str(&text).with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(cfg)
    }

    /// Translates the file format into the engine's [`RunConfig`],
    /// resolving each kernel's readiness status (local plugin files are
    /// checked for existence; remote reachability is determined later, at
    /// handshake time inside the Scheduler).
    pub fn to_run_config(&self) -> Result<RunConfig> {
        let dtype = match self.dtype.as_str() {
            "f32" => Dtype::F32,
            other => bail!("unknown dtype {other:?}; only f32 is supported"),
        };
        let output_format = match self.output_format.as_str() {
            "ndjson" => OutputFormat::Ndjson,
            "json" => OutputFormat::Json,
            other => bail!("unknown output_format {other:?}; expected ndjson or json"),
        };

        let mut kernels = Vec::with_capacity(self.kernels.len());
        for entry in &self.kernels {
            let kind = match entry.kind.as_str() {
                "local" => KernelKind::Local,
                "remote" => KernelKind::Remote,
                other => bail!("kernel {:?}: unknown kind {other:?}; expected local or remote", entry.name),
            };
            let status = if !entry.enabled {
                KernelStatus::NotReady("disabled in config".to_string())
            } else if kind == KernelKind::Local {
                let plugin_path = resolve_plugin_path(Path::new(&entry.location), &entry.name)
                    .with_context(|| format!("kernel {:?}: invalid plugin name", entry.name))?;
                if plugin_path.exists() {
                    KernelStatus::Ready
                } else {
                    KernelStatus::NotReady(format!("plugin not found at {}", plugin_path.display()))
                }
            } else {
                KernelStatus::Ready
            };
            kernels.push(KernelEntry {
                kind,
                name: entry.name.clone(),
                location: entry.location.clone(),
                params_string: entry.params.clone(),
                status,
                calibration_state_path: entry.calibration_state_path.as_ref().map(PathBuf::from),
            });
        }

        Ok(RunConfig {
            dataset_path: PathBuf::from(&self.dataset_path),
            fs: self.fs,
            c: self.c,
            w: self.w,
            h: self.h,
            dtype,
            warmup_seconds: self.warmup_seconds,
            duration_seconds: self.duration_seconds,
            repeats: self.repeats,
            deadline_ms: self.deadline_ms,
            kernels,
            output_dir: PathBuf::from(&self.output_dir),
            output_format,
        })
    }

    /// A runnable example config, printed by `cortex init`.
    pub fn default_example() -> Self {
        Self {
            dataset_path: "samples.raw".to_string(),
            fs: 16_000.0,
            c: 1,
            w: 160,
            h: 80,
            dtype: Self::default_dtype(),
            warmup_seconds: 1.0,
            duration_seconds: 60.0,
            repeats: 1,
            deadline_ms: None,
            kernels: vec![
                KernelFile {
                    kind: "local".to_string(),
                    name: "fir_lowpass".to_string(),
                    location: "/opt/cortex/kernels".to_string(),
                    params: "gain: 2.0".to_string(),
                    calibration_state_path: None,
                    enabled: true,
                },
                KernelFile {
                    kind: "remote".to_string(),
                    name: "goertzel".to_string(),
                    location: "127.0.0.1:9000".to_string(),
                    params: String::new(),
                    calibration_state_path: None,
                    enabled: true,
                },
            ],
            output_dir: Self::default_output_dir(),
            output_format: Self::default_output_format(),
        }
    }
}
