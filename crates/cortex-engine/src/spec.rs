//! `WindowSpec` — the immutable shape of a run.

use thiserror::Error;

use crate::dtype::Dtype;

/// Immutable per-run window geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSpec {
    /// Sample rate in Hz.
    pub fs: f64,
    /// Window length in samples.
    pub w: usize,
    /// Hop length in samples.
    pub h: usize,
    /// Channel count.
    pub c: usize,
    pub dtype: Dtype,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowSpecError {
    #[error("sample rate must be > 0, got {0}")]
    NonPositiveFs(String),
    #[error("window length W must be > 0, got {0}")]
    ZeroWindow(usize),
    #[error("hop H must satisfy 0 < H <= W, got H={h} W={w}")]
    InvalidHop { h: usize, w: usize },
    #[error("channel count C must be > 0, got {0}")]
    ZeroChannels(usize),
}

impl WindowSpec {
    pub fn new(fs: f64, w: usize, h: usize, c: usize, dtype: Dtype) -> Result<Self, WindowSpecError> {
        if !(fs > 0.0) || !fs.is_finite() {
            return Err(WindowSpecError::NonPositiveFs(format!("{fs}")));
        }
        if w == 0 {
            return Err(WindowSpecError::ZeroWindow(w));
        }
        if h == 0 || h > w {
            return Err(WindowSpecError::InvalidHop { h, w });
        }
        if c == 0 {
            return Err(WindowSpecError::ZeroChannels(c));
        }
        Ok(Self { fs, w, h, c, dtype })
    }

    /// Window deadline in seconds: H / Fs.
    pub fn deadline_secs(&self) -> f64 {
        self.h as f64 / self.fs
    }

    /// Window deadline in nanoseconds, rounded to the nearest ns.
    pub fn deadline_ns(&self) -> u64 {
        (self.deadline_secs() * 1_000_000_000.0).round() as u64
    }

    /// Number of elements (samples * channels) in one window.
    pub fn window_elements(&self) -> usize {
        self.w * self.c
    }

    /// Number of elements advanced per hop.
    pub fn hop_elements(&self) -> usize {
        self.h * self.c
    }

    /// Byte length of one window buffer for this spec's dtype.
    pub fn window_bytes(&self) -> usize {
        self.window_elements() * self.dtype.element_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_hop() {
        assert_eq!(
            WindowSpec::new(160.0, 160, 0, 64, Dtype::F32).unwrap_err(),
            WindowSpecError::InvalidHop { h: 0, w: 160 }
        );
    }

    #[test]
    fn rejects_hop_greater_than_window() {
        assert!(matches!(
            WindowSpec::new(160.0, 160, 161, 64, Dtype::F32),
            Err(WindowSpecError::InvalidHop { h: 161, w: 160 })
        ));
    }

    #[test]
    fn rejects_non_positive_fs() {
        assert!(WindowSpec::new(0.0, 160, 80, 64, Dtype::F32).is_err());
        assert!(WindowSpec::new(-1.0, 160, 80, 64, Dtype::F32).is_err());
        assert!(WindowSpec::new(f64::NAN, 160, 80, 64, Dtype::F32).is_err());
    }

    #[test]
    fn rejects_zero_channels() {
        assert!(WindowSpec::new(160.0, 160, 80, 0, Dtype::F32).is_err());
    }

    #[test]
    fn deadline_matches_hop_over_fs() {
        let spec = WindowSpec::new(160.0, 160, 80, 64, Dtype::F32).unwrap();
        assert!((spec.deadline_secs() - 0.5).abs() < 1e-9);
        assert_eq!(spec.deadline_ns(), 500_000_000);
    }

    #[test]
    fn window_and_hop_elements() {
        let spec = WindowSpec::new(160.0, 160, 80, 64, Dtype::F32).unwrap();
        assert_eq!(spec.window_elements(), 160 * 64);
        assert_eq!(spec.hop_elements(), 80 * 64);
        assert_eq!(spec.window_bytes(), 160 * 64 * 4);
    }
}
