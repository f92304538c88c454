//! Wire protocol error taxonomy.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum WireError {
    #[error("timed out waiting for data")]
    TimedOut,
    #[error("connection reset")]
    ConnReset,
    #[error("magic not found within the search window")]
    MagicNotFound,
    #[error("protocol version mismatch: got {got}, expected {expected}")]
    VersionMismatch { got: u8, expected: u8 },
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("frame payload of {got} bytes exceeds the {cap} byte cap")]
    FrameTooLarge { got: u32, cap: u32 },
    #[error("destination buffer of {buf_len} bytes is too small for {needed} bytes")]
    BufferTooSmall { buf_len: usize, needed: usize },
    #[error("CRC mismatch: computed {computed:#010x}, frame carried {carried:#010x}")]
    CrcMismatch { computed: u32, carried: u32 },
    #[error("chunk sequence mismatch: got {got}, expected {expected}")]
    ChunkSequenceMismatch { got: u32, expected: u32 },
    #[error("chunk buffer of {buf_len} bytes too small for total_bytes {total_bytes}")]
    ChunkBufferTooSmall { buf_len: usize, total_bytes: u32 },
    #[error("chunk reassembly incomplete: {missing} of {total_bytes} bytes uncovered")]
    ChunkIncomplete { missing: u32, total_bytes: u32 },
    #[error("session mismatch: got ({got_boot}, {got_session}), expected ({expected_boot}, {expected_session})")]
    SessionMismatch {
        got_boot: u64,
        got_session: u64,
        expected_boot: u64,
        expected_session: u64,
    },
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("adapter crashed: {0}")]
    AdapterCrash(String),
}

impl WireError {
    /// Whether this error kind is fatal to the entire run rather than just
    /// the current window.
    pub fn fatal_to_run(&self) -> bool {
        matches!(
            self,
            WireError::MagicNotFound
                | WireError::VersionMismatch { .. }
                | WireError::SessionMismatch { .. }
                | WireError::AdapterCrash(_)
        )
    }
}
