//! Kernel plugin ABI and calibration state I/O.

pub mod abi;
pub mod loader;
pub mod state;

pub use abi::{KernelConfig, ABI_VERSION, CAP_OFFLINE_CALIBRATION};
pub use loader::{KernelHandle, LoaderError};
pub use state::{load_calibration_state, save_calibration_state, StateError};

/// Rejects any path component containing `..`, `/`, `\`, or `:`. Shared by
/// the plugin loader (kernel base names) and calibration-state I/O (state
/// file names), both of which build a path from a user-supplied string.
pub(crate) fn validate_component(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("path component is empty".to_string());
    }
    if name.contains("..") || name.contains('/') || name.contains('\\') || name.contains(':') {
        return Err(format!("path component {name:?} contains a forbidden traversal character"));
    }
    Ok(())
}
