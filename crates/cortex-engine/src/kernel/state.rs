//! Calibration state file I/O: persisting and reloading the opaque blob a
//! kernel's offline `calibrate` pass produces.
//!
//! Header layout mirrors the wire frame header's discipline (fixed-size,
//! little-endian, magic-first) even though it lives on disk rather than on
//! a transport.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::validate_component;

const MAGIC: u32 = 0x434F_5254; // ASCII "CORT"
const HEADER_LEN: usize = 16;
const MAX_PAYLOAD: usize = 256 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("invalid calibration state name: {0}")]
    InvalidName(String),
    #[error("calibration state file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read calibration state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("calibration state file {0} is shorter than the 16-byte header")]
    HeaderTooShort(PathBuf),
    #[error("calibration state file {path} has bad magic or ABI word {got:#010x}")]
    CorruptHeader { path: PathBuf, got: u32 },
    #[error("calibration state payload {got} bytes exceeds the 256 MiB cap")]
    PayloadTooLarge { got: usize },
}

/// Writes `{magic, abi_version, state_version, payload_size}` (16 bytes,
/// little-endian) followed by `payload`. Creates parent directories if
/// missing. `fsync` is not performed.
pub fn save_calibration_state(
    path: &Path,
    abi_version: u32,
    state_version: u32,
    payload: &[u8],
) -> Result<(), StateError> {
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        validate_component(name).map_err(StateError::InvalidName)?;
    }
    if payload.len() > MAX_PAYLOAD {
        return Err(StateError::PayloadTooLarge { got: payload.len() });
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    }
    let mut file = fs::File::create(path).map_err(|source| StateError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut header = [0u8; HEADER_LEN];
    header[0..4].copy_from_slice(&MAGIC.to_le_bytes());
    header[4..8].copy_from_slice(&abi_version.to_le_bytes());
    header[8..12].copy_from_slice(&state_version.to_le_bytes());
    header[12..16].copy_from_slice(&(payload.len() as u32).to_le_bytes());
    file.write_all(&header).map_err(|source| StateError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    file.write_all(payload).map_err(|source| StateError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Reads and validates a calibration state file, returning `(payload,
/// state_version)`. Validates magic, that `abi_version` matches exactly,
/// and the 256 MiB payload cap.
pub fn load_calibration_state(path: &Path, abi_version: u32) -> Result<(Vec<u8>, u32), StateError> {
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        validate_component(name).map_err(StateError::InvalidName)?;
    }
    if !path.exists() {
        return Err(StateError::NotFound(path.to_path_buf()));
    }
    let mut file = fs::File::open(path).map_err(|source| StateError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut header = [0u8; HEADER_LEN];
    file.read_exact(&mut header)
        .map_err(|_| StateError::HeaderTooShort(path.to_path_buf()))?;

    let magic = u32::from_le_bytes(header[0..4].try_into().unwrap());
    if magic != MAGIC {
        return Err(StateError::CorruptHeader { path: path.to_path_buf(), got: magic });
    }
    let got_abi = u32::from_le_bytes(header[4..8].try_into().unwrap());
    if got_abi != abi_version {
        return Err(StateError::CorruptHeader { path: path.to_path_buf(), got: got_abi });
    }
    let state_version = u32::from_le_bytes(header[8..12].try_into().unwrap());
    let payload_size = u32::from_le_bytes(header[12..16].try_into().unwrap()) as usize;
    if payload_size > MAX_PAYLOAD {
        return Err(StateError::PayloadTooLarge { got: payload_size });
    }

    let mut payload = vec![0u8; payload_size];
    file.read_exact(&mut payload).map_err(|source| StateError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok((payload, state_version))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_payload_and_state_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kernel.cortex_state");
        let payload = vec![1u8, 2, 3, 4, 5];
        save_calibration_state(&path, 2, 7, &payload).unwrap();
        let (loaded, state_version) = load_calibration_state(&path, 2).unwrap();
        assert_eq!(loaded, payload);
        assert_eq!(state_version, 7);
    }

    #[test]
    fn round_trips_empty_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.cortex_state");
        save_calibration_state(&path, 2, 1, &[]).unwrap();
        let (loaded, _) = load_calibration_state(&path, 2).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/kernel.cortex_state");
        save_calibration_state(&path, 1, 1, b"x").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn load_rejects_traversal_in_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evil..cortex_state");
        assert!(matches!(load_calibration_state(&path, 1), Err(StateError::InvalidName(_))));
    }

    #[test]
    fn missing_file_is_not_found_not_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.cortex_state");
        assert!(matches!(load_calibration_state(&path, 1), Err(StateError::NotFound(_))));
    }

    #[test]
    fn bad_magic_is_corrupt_header_distinct_from_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.cortex_state");
        fs::write(&path, [0u8; 20]).unwrap();
        assert!(matches!(load_calibration_state(&path, 1), Err(StateError::CorruptHeader { .. })));
    }

    #[test]
    fn abi_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kernel.cortex_state");
        save_calibration_state(&path, 1, 1, b"x").unwrap();
        assert!(matches!(load_calibration_state(&path, 2), Err(StateError::CorruptHeader { .. })));
    }

    #[test]
    fn round_trips_a_large_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("large.cortex_state");
        // Not the full 256 MiB cap, but large enough to exercise multi-buffer
        // reads rather than the single-`read_exact`-of-a-few-bytes path the
        // other tests take.
        let payload: Vec<u8> = (0..4 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
        save_calibration_state(&path, 2, 3, &payload).unwrap();
        let (loaded, state_version) = load_calibration_state(&path, 2).unwrap();
        assert_eq!(loaded, payload);
        assert_eq!(state_version, 3);
    }

    #[test]
    fn rejects_oversized_payload_declared_in_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.cortex_state");
        let mut header = [0u8; HEADER_LEN];
        header[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        header[4..8].copy_from_slice(&1u32.to_le_bytes());
        header[8..12].copy_from_slice(&1u32.to_le_bytes());
        header[12..16].copy_from_slice(&(MAX_PAYLOAD as u32 + 1).to_le_bytes());
        fs::write(&path, header).unwrap();
        assert!(matches!(
            load_calibration_state(&path, 1),
            Err(StateError::PayloadTooLarge { .. })
        ));
    }
}
