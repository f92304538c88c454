//! Window Assembler: the rolling buffer that turns a stream of hops into
//! overlapping windows.
//!
//! Grounded on the teacher's ring-buffer dedup cache (`shred-ingest`'s
//! fixed-capacity sliding structures) generalized from a hash-keyed cache
//! into a plain element ring, since CORTEX's assembler has no concurrent
//! writers and needs none of the teacher's locking.

use crate::spec::WindowSpec;

/// One assembled window, borrowed from the assembler's internal buffer.
pub struct WindowView<'a> {
    /// `W * C` elements, sample-major interleaved.
    pub samples: &'a [f32],
    /// Sequence number of this window, starting at 0.
    pub index: u64,
    /// True for the first `ceil(warmup_seconds * Fs / H)` windows.
    pub warmup: bool,
}

/// Accumulates hops of `H*C` elements into overlapping windows of `W*C`
/// elements. Holds exactly `W*C` elements of history; a push that completes
/// the buffer's first fill, or that tops it up after a shift, yields a
/// window.
pub struct WindowAssembler {
    spec: WindowSpec,
    buf: Vec<f32>,
    filled: usize,
    next_index: u64,
    warmup_windows: u64,
}

impl WindowAssembler {
    pub fn new(spec: WindowSpec, warmup_seconds: f64) -> Self {
        let warmup_windows = if warmup_seconds <= 0.0 {
            0
        } else {
            let hop_seconds = spec.h as f64 / spec.fs;
            (warmup_seconds / hop_seconds).ceil() as u64
        };
        Self {
            buf: vec![0.0; spec.window_elements()],
            spec,
            filled: 0,
            next_index: 0,
            warmup_windows,
        }
    }

    pub fn spec(&self) -> &WindowSpec {
        &self.spec
    }

    /// Pushes one hop (`H*C` elements, sample-major) into the buffer. Returns
    /// a window view once enough history has accumulated; `None` while still
    /// warming the ring for the very first window.
    ///
    /// `hop` must be exactly `spec.hop_elements()` long.
    pub fn push_hop(&mut self, hop: &[f32]) -> Option<WindowView<'_>> {
        assert_eq!(hop.len(), self.spec.hop_elements(), "hop length mismatch");

        let w_elems = self.spec.window_elements();
        let h_elems = self.spec.hop_elements();

        if self.filled < w_elems {
            // Still filling the very first window: append in place.
            let start = self.filled;
            self.buf[start..start + h_elems].copy_from_slice(hop);
            self.filled += h_elems;
            if self.filled < w_elems {
                return None;
            }
        } else {
            self.buf.copy_within(h_elems.., 0);
            self.buf[w_elems - h_elems..].copy_from_slice(hop);
        }

        let index = self.next_index;
        self.next_index += 1;
        Some(WindowView {
            samples: &self.buf,
            index,
            warmup: index < self.warmup_windows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::Dtype;

    fn spec(w: usize, h: usize, c: usize) -> WindowSpec {
        WindowSpec::new(100.0, w, h, c, Dtype::F32).unwrap()
    }

    #[test]
    fn disjoint_windows_when_h_equals_w() {
        let mut asm = WindowAssembler::new(spec(4, 4, 1), 0.0);
        let hop1 = [1.0, 2.0, 3.0, 4.0];
        let hop2 = [5.0, 6.0, 7.0, 8.0];
        let w1 = asm.push_hop(&hop1).expect("first window");
        assert_eq!(w1.samples, &hop1);
        assert_eq!(w1.index, 0);
        let w2 = asm.push_hop(&hop2).expect("second window");
        assert_eq!(w2.samples, &hop2);
        assert_eq!(w2.index, 1);
    }

    #[test]
    fn maximal_overlap_when_h_is_one() {
        let mut asm = WindowAssembler::new(spec(4, 1, 1), 0.0);
        assert!(asm.push_hop(&[1.0]).is_none());
        assert!(asm.push_hop(&[2.0]).is_none());
        assert!(asm.push_hop(&[3.0]).is_none());
        let w = asm.push_hop(&[4.0]).expect("buffer now full");
        assert_eq!(w.samples, &[1.0, 2.0, 3.0, 4.0]);
        let w = asm.push_hop(&[5.0]).expect("slid by one");
        assert_eq!(w.samples, &[2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn overlapping_hop_smaller_than_window() {
        let mut asm = WindowAssembler::new(spec(4, 2, 1), 0.0);
        assert!(asm.push_hop(&[1.0, 2.0]).is_none());
        let w = asm.push_hop(&[3.0, 4.0]).expect("full");
        assert_eq!(w.samples, &[1.0, 2.0, 3.0, 4.0]);
        let w = asm.push_hop(&[5.0, 6.0]).expect("hop 3");
        assert_eq!(w.samples, &[3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn multichannel_sample_major_layout() {
        let mut asm = WindowAssembler::new(spec(2, 2, 2), 0.0);
        // Two frames of two channels each: frame0=(1,2), frame1=(3,4).
        let w = asm.push_hop(&[1.0, 2.0, 3.0, 4.0]).expect("full in one hop");
        assert_eq!(w.samples, &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn warmup_windows_are_tagged() {
        // Fs=100, H=1 => hop is 10ms; warmup_seconds=0.025 => ceil(2.5)=3 windows.
        let mut asm = WindowAssembler::new(spec(1, 1, 1), 0.025);
        let w0 = asm.push_hop(&[1.0]).unwrap();
        assert!(w0.warmup);
        let w1 = asm.push_hop(&[2.0]).unwrap();
        assert!(w1.warmup);
        let w2 = asm.push_hop(&[3.0]).unwrap();
        assert!(w2.warmup);
        let w3 = asm.push_hop(&[4.0]).unwrap();
        assert!(!w3.warmup);
    }

    #[test]
    fn zero_warmup_seconds_tags_nothing() {
        let mut asm = WindowAssembler::new(spec(1, 1, 1), 0.0);
        let w = asm.push_hop(&[1.0]).unwrap();
        assert!(!w.warmup);
    }
}
