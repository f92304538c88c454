//! Replayer: paced, rewind-on-EOF reader of a raw sample file.
//!
//! Grounded on the teacher's ingest loop (`shred-ingest`'s packet reader)
//! generalized from "read until the socket is empty" to "read forever,
//! rewinding at end of file", and on its absolute-deadline pacing idiom
//! (`metrics`'s use of `now_ns` rather than accumulating `Duration`s).

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::clock;
use crate::shutdown::ShutdownFlag;
use crate::spec::WindowSpec;

#[derive(Debug, Error)]
pub enum ReplayerError {
    #[error("failed to open sample file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("sample file {path} is smaller than one hop ({hop_bytes} bytes)")]
    TooSmall { path: PathBuf, hop_bytes: usize },
}

pub struct Replayer {
    file: File,
    path: PathBuf,
    hop_bytes: usize,
    hop_elements: usize,
    hop_period_ns: u64,
    hop_buf: Vec<f32>,
    byte_buf: Vec<u8>,
    next_emit_ns: u64,
    shutdown: ShutdownFlag,
}

impl Replayer {
    pub fn open(path: &Path, spec: &WindowSpec, shutdown: ShutdownFlag) -> Result<Self, ReplayerError> {
        let mut file = File::open(path).map_err(|source| ReplayerError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let hop_elements = spec.hop_elements();
        let hop_bytes = hop_elements * 4;
        let len = file
            .seek(SeekFrom::End(0))
            .map_err(|source| ReplayerError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        if (len as usize) < hop_bytes {
            return Err(ReplayerError::TooSmall {
                path: path.to_path_buf(),
                hop_bytes,
            });
        }
        file.seek(SeekFrom::Start(0)).map_err(|source| ReplayerError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let hop_period_ns = (spec.h as f64 / spec.fs * 1_000_000_000.0).round() as u64;
        info!(path = %path.display(), hop_bytes, hop_period_ns, "replayer opened");
        Ok(Self {
            file,
            path: path.to_path_buf(),
            hop_bytes,
            hop_elements,
            hop_period_ns,
            hop_buf: vec![0.0; hop_elements],
            byte_buf: vec![0u8; hop_bytes],
            next_emit_ns: 0,
            shutdown,
        })
    }

    /// Reads the next hop into `self.hop_buf`, rewinding and retrying on
    /// short read or I/O error (never fatal once the file is open).
    fn read_hop(&mut self) {
        loop {
            match self.file.read_exact(&mut self.byte_buf) {
                Ok(()) => {
                    for (chunk, out) in self.byte_buf.chunks_exact(4).zip(self.hop_buf.iter_mut()) {
                        *out = f32::from_ne_bytes(chunk.try_into().unwrap());
                    }
                    return;
                }
                Err(_) => {
                    // EOF or mid-file read error: rewind and retry.
                    debug!(path = %self.path.display(), "rewinding sample file");
                    let _ = self.file.seek(SeekFrom::Start(0));
                }
            }
        }
    }

    /// Runs the pacing loop until `should_stop` returns true or the shutdown
    /// flag is set. `on_hop(samples, late)` is invoked synchronously once per
    /// hop; `late` is true when the previous hop's work overran the hop
    /// period and this emission had to skip its sleep.
    pub fn run(&mut self, mut should_stop: impl FnMut() -> bool, mut on_hop: impl FnMut(&[f32], bool)) {
        self.next_emit_ns = clock::now_ns();
        loop {
            if self.shutdown.is_set() || should_stop() {
                return;
            }
            self.read_hop();

            let late = clock::now_ns() > self.next_emit_ns;
            clock::sleep_until(self.next_emit_ns, &self.shutdown);
            if self.shutdown.is_set() {
                return;
            }

            on_hop(&self.hop_buf, late);
            self.next_emit_ns += self.hop_period_ns;
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
