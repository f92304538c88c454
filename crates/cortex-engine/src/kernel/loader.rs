//! Plugin discovery and loading via `dlopen`.
//!
//! Grounded on `amenti-labs-openentropy`'s `esoteric-core` crate, the one
//! example repo in the pack that depends on `libloading`; its loader copies
//! function pointers out of the `Library` so the returned handle is free of
//! borrowed-`Symbol` lifetimes, which is the idiom followed here.

use std::ffi::c_void;
use std::path::{Path, PathBuf};

use libloading::Library;
use thiserror::Error;

use super::abi::{CalibrateFn, InitFn, ProcessFn, TeardownFn, ABI_VERSION, CAP_OFFLINE_CALIBRATION};
use super::validate_component;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("invalid kernel name: {0}")]
    InvalidName(String),
    #[error("failed to load shared object {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("shared object {path} is missing required symbol {symbol:?}: {source}")]
    MissingSymbol {
        path: PathBuf,
        symbol: &'static str,
        #[source]
        source: libloading::Error,
    },
    #[error("plugin {path} init() returned a null handle")]
    InitFailed { path: PathBuf },
    #[error("plugin {path} advertises ABI version {got}, host speaks {want}")]
    AbiMismatch { path: PathBuf, got: u32, want: u32 },
}

const PLATFORM_EXT: &str = if cfg!(target_os = "macos") {
    "dylib"
} else if cfg!(target_os = "windows") {
    "dll"
} else {
    "so"
};

/// Builds `<spec_uri>/lib<base>.<ext>` from a kernel name, splitting the
/// name on its first `@` (a version/variant tag that isn't part of the
/// file's base name) and rejecting traversal components.
pub fn resolve_plugin_path(spec_uri: &Path, kernel_name: &str) -> Result<PathBuf, LoaderError> {
    validate_component(kernel_name).map_err(LoaderError::InvalidName)?;
    let base = kernel_name.split('@').next().unwrap_or(kernel_name);
    Ok(spec_uri.join(format!("lib{base}.{PLATFORM_EXT}")))
}

/// An owned, loaded plugin: the `Library` handle plus the function pointers
/// resolved out of it. Fields are declared in the order they must be
/// dropped: function pointers carry no destructor, but `library` must
/// outlive every call made through them, so it is dropped last by virtue of
/// being declared last (Rust drops struct fields in declaration order).
pub struct KernelHandle {
    process: ProcessFn,
    teardown: TeardownFn,
    calibrate: Option<CalibrateFn>,
    instance: *mut c_void,
    library: Library,
}

// The raw instance pointer is only ever dereferenced through `process` /
// `teardown`, which the scheduler calls from a single thread.
unsafe impl Send for KernelHandle {}

impl KernelHandle {
    /// Loads `path`, resolves `init`/`process`/`teardown` (and optionally
    /// `calibrate`), calls `init`, and validates the returned ABI.
    pub fn load(
        path: &Path,
        config: &super::abi::KernelConfig,
    ) -> Result<(Self, u32, u32, u32), LoaderError> {
        let library = unsafe { Library::new(path) }.map_err(|source| LoaderError::Load {
            path: path.to_path_buf(),
            source,
        })?;

        let init: InitFn = unsafe {
            *library
                .get::<InitFn>(b"init\0")
                .map_err(|source| LoaderError::MissingSymbol {
                    path: path.to_path_buf(),
                    symbol: "init",
                    source,
                })?
        };
        let process: ProcessFn = unsafe {
            *library
                .get::<ProcessFn>(b"process\0")
                .map_err(|source| LoaderError::MissingSymbol {
                    path: path.to_path_buf(),
                    symbol: "process",
                    source,
                })?
        };
        let teardown: TeardownFn = unsafe {
            *library
                .get::<TeardownFn>(b"teardown\0")
                .map_err(|source| LoaderError::MissingSymbol {
                    path: path.to_path_buf(),
                    symbol: "teardown",
                    source,
                })?
        };
        let calibrate: Option<CalibrateFn> =
            unsafe { library.get::<CalibrateFn>(b"calibrate\0") }.ok().map(|sym| *sym);

        let mut output_w = 0u32;
        let mut output_c = 0u32;
        let mut capabilities = 0u32;
        let mut plugin_abi_version = 0u32;
        let instance = unsafe {
            init(
                config,
                &mut output_w,
                &mut output_c,
                &mut capabilities,
                &mut plugin_abi_version,
            )
        };
        if instance.is_null() {
            return Err(LoaderError::InitFailed { path: path.to_path_buf() });
        }
        if plugin_abi_version != ABI_VERSION {
            unsafe { teardown(instance) };
            return Err(LoaderError::AbiMismatch {
                path: path.to_path_buf(),
                got: plugin_abi_version,
                want: ABI_VERSION,
            });
        }
        if calibrate.is_some() {
            capabilities |= CAP_OFFLINE_CALIBRATION;
        }

        Ok((
            Self {
                process,
                teardown,
                calibrate,
                instance,
                library,
            },
            output_w,
            output_c,
            capabilities,
        ))
    }

    /// Invokes `process` on `input`, writing into `output`. Caller must size
    /// both buffers per the shapes returned from `load`.
    pub fn process(&self, input: &[f32], output: &mut [f32]) {
        unsafe { (self.process)(self.instance, input.as_ptr(), output.as_mut_ptr()) }
    }

    pub fn supports_calibration(&self) -> bool {
        self.calibrate.is_some()
    }

    /// Runs the optional `calibrate` export over `data` (a flat buffer of
    /// `num_windows` windows), returning the serialized state bytes and its
    /// `state_version`. `None` if this plugin has no `calibrate` symbol.
    pub fn calibrate(
        &self,
        config: &super::abi::KernelConfig,
        data: &[f32],
        num_windows: u32,
    ) -> Option<(Vec<u8>, u32)> {
        let calibrate = self.calibrate?;
        let mut size = 0u32;
        let mut state_version = 0u32;
        let ptr = unsafe { calibrate(config, data.as_ptr(), num_windows, &mut size, &mut state_version) };
        if ptr.is_null() {
            return None;
        }
        let bytes = unsafe { std::slice::from_raw_parts(ptr, size as usize).to_vec() };
        Some((bytes, state_version))
    }
}

impl Drop for KernelHandle {
    fn drop(&mut self) {
        unsafe { (self.teardown)(self.instance) }
    }
}
