//! Telemetry sink: append-only per-window records plus a summary with
//! miss-rate and latency percentiles.
//!
//! The percentile technique — a capped circular buffer sorted only at
//! snapshot time — is grounded on the teacher's `LeadTimeReservoir`
//! (`source_metrics.rs`), simplified from its atomic/mutex-guarded form
//! since CORTEX has a single producer on a single thread.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

const RESERVOIR_CAP: usize = 4096;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to create telemetry output directory {0}: {1}")]
    CreateDir(std::path::PathBuf, std::io::Error),
    #[error("failed to write telemetry file {0}: {1}")]
    Write(std::path::PathBuf, std::io::Error),
    #[error("failed to serialize telemetry record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One measured window, for one kernel.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryRecord {
    pub run_id: String,
    pub kernel_name: String,
    pub window_index: u64,
    pub repeat_index: u32,
    pub warmup: bool,
    pub release_ns: u64,
    pub deadline_ns: u64,
    pub start_ns: u64,
    pub end_ns: u64,
    pub deadline_missed: bool,
    pub w: u32,
    pub h: u32,
    pub c: u32,
    pub fs: f64,
    pub error_code: Option<String>,
    /// Set when the replayer's pacing loop had to skip its sleep for this
    /// hop because the previous hop's work overran the hop period.
    pub pacing_late: bool,
}

struct LatencyReservoir {
    buf: [u64; RESERVOIR_CAP],
    len: usize,
    pos: usize,
}

impl LatencyReservoir {
    fn new() -> Self {
        Self {
            buf: [0; RESERVOIR_CAP],
            len: 0,
            pos: 0,
        }
    }

    fn push(&mut self, latency_ns: u64) {
        self.buf[self.pos] = latency_ns;
        self.pos = (self.pos + 1) % RESERVOIR_CAP;
        if self.len < RESERVOIR_CAP {
            self.len += 1;
        }
    }

    fn percentiles(&self) -> Option<(u64, u64, u64)> {
        if self.len == 0 {
            return None;
        }
        let mut sorted = self.buf[..self.len].to_vec();
        sorted.sort_unstable();
        let n = sorted.len();
        let p50 = sorted[(n * 50 / 100).min(n - 1)];
        let p95 = sorted[(n * 95 / 100).min(n - 1)];
        let p99 = sorted[(n * 99 / 100).min(n - 1)];
        Some((p50, p95, p99))
    }
}

/// Per-kernel miss rate and latency percentiles, over measured (non-warmup)
/// windows only.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct KernelSummary {
    pub kernel_name: String,
    pub measured_windows: u64,
    pub deadline_misses: u64,
    pub miss_rate: f64,
    pub latency_p50_ns: Option<u64>,
    pub latency_p95_ns: Option<u64>,
    pub latency_p99_ns: Option<u64>,
}

/// Append-only in-memory buffer of [`TelemetryRecord`]s for a run, with an
/// NDJSON file writer. Single-producer (the Scheduler); no concurrent
/// reader during the run.
pub struct TelemetrySink {
    records: Vec<TelemetryRecord>,
}

impl TelemetrySink {
    pub fn new() -> Self {
        Self { records: Vec::new() }
    }

    pub fn push(&mut self, record: TelemetryRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[TelemetryRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Writes every record as one NDJSON line, creating `dir` if missing.
    pub fn flush_to_file(&self, dir: &Path, file_name: &str) -> Result<std::path::PathBuf, TelemetryError> {
        fs::create_dir_all(dir).map_err(|e| TelemetryError::CreateDir(dir.to_path_buf(), e))?;
        let path = dir.join(file_name);
        let mut file = fs::File::create(&path).map_err(|e| TelemetryError::Write(path.clone(), e))?;
        for record in &self.records {
            let line = serde_json::to_string(record)?;
            file.write_all(line.as_bytes())
                .and_then(|_| file.write_all(b"\n"))
                .map_err(|e| TelemetryError::Write(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Per-kernel miss rate and latency percentiles over measured
    /// (non-warmup) windows, in first-seen kernel order.
    pub fn summary(&self) -> Vec<KernelSummary> {
        let mut order: Vec<String> = Vec::new();
        let mut reservoirs: std::collections::HashMap<String, LatencyReservoir> = std::collections::HashMap::new();
        let mut measured: std::collections::HashMap<String, u64> = std::collections::HashMap::new();
        let mut misses: std::collections::HashMap<String, u64> = std::collections::HashMap::new();

        for record in &self.records {
            if record.warmup {
                continue;
            }
            if !reservoirs.contains_key(&record.kernel_name) {
                order.push(record.kernel_name.clone());
                reservoirs.insert(record.kernel_name.clone(), LatencyReservoir::new());
                measured.insert(record.kernel_name.clone(), 0);
                misses.insert(record.kernel_name.clone(), 0);
            }
            *measured.get_mut(&record.kernel_name).unwrap() += 1;
            if record.deadline_missed {
                *misses.get_mut(&record.kernel_name).unwrap() += 1;
            }
            let latency_ns = record.end_ns.saturating_sub(record.start_ns);
            reservoirs.get_mut(&record.kernel_name).unwrap().push(latency_ns);
        }

        order
            .into_iter()
            .map(|kernel_name| {
                let measured_windows = measured[&kernel_name];
                let deadline_misses = misses[&kernel_name];
                let miss_rate = if measured_windows == 0 {
                    0.0
                } else {
                    deadline_misses as f64 / measured_windows as f64
                };
                let (p50, p95, p99) = reservoirs[&kernel_name]
                    .percentiles()
                    .map_or((None, None, None), |(p50, p95, p99)| (Some(p50), Some(p95), Some(p99)));
                KernelSummary {
                    kernel_name,
                    measured_windows,
                    deadline_misses,
                    miss_rate,
                    latency_p50_ns: p50,
                    latency_p95_ns: p95,
                    latency_p99_ns: p99,
                }
            })
            .collect()
    }
}

impl Default for TelemetrySink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kernel: &str, warmup: bool, start_ns: u64, end_ns: u64, deadline_ns: u64, index: u64) -> TelemetryRecord {
        TelemetryRecord {
            run_id: "r1".to_string(),
            kernel_name: kernel.to_string(),
            window_index: index,
            repeat_index: 0,
            warmup,
            release_ns: start_ns,
            deadline_ns,
            start_ns,
            end_ns,
            deadline_missed: end_ns > deadline_ns,
            w: 160,
            h: 80,
            c: 1,
            fs: 160.0,
            error_code: None,
            pacing_late: false,
        }
    }

    #[test]
    fn summary_excludes_warmup_windows() {
        let mut sink = TelemetrySink::new();
        sink.push(record("k1", true, 0, 1_000_000, 500_000, 0));
        sink.push(record("k1", false, 0, 100, 500_000, 1));
        let summary = sink.summary();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].measured_windows, 1);
        assert_eq!(summary[0].deadline_misses, 0);
    }

    #[test]
    fn summary_computes_miss_rate() {
        let mut sink = TelemetrySink::new();
        for i in 0..10u64 {
            let end = if i < 3 { 600_000 } else { 100 };
            sink.push(record("k1", false, 0, end, 500_000, i));
        }
        let summary = sink.summary();
        assert_eq!(summary[0].deadline_misses, 3);
        assert!((summary[0].miss_rate - 0.3).abs() < 1e-9);
    }

    #[test]
    fn summary_tracks_multiple_kernels_independently() {
        let mut sink = TelemetrySink::new();
        sink.push(record("k1", false, 0, 600_000, 500_000, 0));
        sink.push(record("k2", false, 0, 100, 500_000, 0));
        let summary = sink.summary();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].kernel_name, "k1");
        assert_eq!(summary[0].deadline_misses, 1);
        assert_eq!(summary[1].kernel_name, "k2");
        assert_eq!(summary[1].deadline_misses, 0);
    }

    #[test]
    fn flush_to_file_writes_ndjson_and_creates_dir() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("nested/telemetry");
        let mut sink = TelemetrySink::new();
        sink.push(record("k1", false, 0, 100, 500_000, 0));
        sink.push(record("k1", false, 0, 200, 500_000, 1));
        let path = sink.flush_to_file(&out_dir, "run.ndjson").unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn empty_sink_has_empty_summary() {
        let sink = TelemetrySink::new();
        assert!(sink.summary().is_empty());
        assert!(sink.is_empty());
    }
}
