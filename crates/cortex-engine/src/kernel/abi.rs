//! The kernel plugin ABI contract: the config record and the four symbols a
//! plugin may export. Only the newer, capability-bearing ABI is supported —
//! there is no bridging to an older `get_info`-based header.

use std::ffi::c_void;

/// ABI version this build speaks. `init` must refuse any other version.
pub const ABI_VERSION: u32 = 2;

/// Bit 0 of the capabilities word returned by `init`: the plugin supports
/// offline calibration via its `calibrate` symbol.
pub const CAP_OFFLINE_CALIBRATION: u32 = 1 << 0;

/// Append-only config record passed to `init` and `calibrate`. Never
/// reorder or remove fields; a plugin uses `struct_size` to know which
/// trailing fields the host has actually filled in.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct KernelConfig {
    pub abi_version: u32,
    pub struct_size: u32,
    pub fs: f64,
    pub w: u32,
    pub h: u32,
    pub c: u32,
    pub dtype: u8,
    pub allow_in_place: u8,
    _reserved: [u8; 2],
    pub params_ptr: *const u8,
    pub params_len: u32,
    pub calib_ptr: *const u8,
    pub calib_len: u32,
}

impl KernelConfig {
    pub fn new(
        fs: f64,
        w: u32,
        h: u32,
        c: u32,
        dtype: u8,
        allow_in_place: bool,
        params: &[u8],
        calib: Option<&[u8]>,
    ) -> Self {
        let (calib_ptr, calib_len) = match calib {
            Some(bytes) => (bytes.as_ptr(), bytes.len() as u32),
            None => (std::ptr::null(), 0),
        };
        Self {
            abi_version: ABI_VERSION,
            struct_size: std::mem::size_of::<KernelConfig>() as u32,
            fs,
            w,
            h,
            c,
            dtype,
            allow_in_place: allow_in_place as u8,
            _reserved: [0; 2],
            params_ptr: params.as_ptr(),
            params_len: params.len() as u32,
            calib_ptr,
            calib_len,
        }
    }
}

/// `init(config) -> (handle, output_w, output_c, capabilities, abi_version)`.
/// A null handle signals initialization failure. `out_abi_version` is the
/// ABI the *plugin* was built against — distinct from `config.abi_version`,
/// which is the ABI the host speaks and is of no use for detecting a stale
/// plugin.
pub type InitFn = unsafe extern "C" fn(
    config: *const KernelConfig,
    out_output_w: *mut u32,
    out_output_c: *mut u32,
    out_capabilities: *mut u32,
    out_abi_version: *mut u32,
) -> *mut c_void;

/// `process(handle, input_ptr, output_ptr)`. Contractually infallible,
/// non-allocating, non-blocking; must not be called concurrently on the
/// same handle.
pub type ProcessFn = unsafe extern "C" fn(handle: *mut c_void, input_ptr: *const f32, output_ptr: *mut f32);

/// `teardown(handle)`. Releases all resources owned by `handle`.
pub type TeardownFn = unsafe extern "C" fn(handle: *mut c_void);

/// `calibrate(config, data_ptr, num_windows) -> (state_ptr, size,
/// state_version)`. Optional; presence implies `CAP_OFFLINE_CALIBRATION`.
pub type CalibrateFn = unsafe extern "C" fn(
    config: *const KernelConfig,
    data_ptr: *const f32,
    num_windows: u32,
    out_size: *mut u32,
    out_state_version: *mut u32,
) -> *mut u8;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_size_matches_the_struct() {
        let cfg = KernelConfig::new(1000.0, 160, 80, 2, 0, false, b"", None);
        assert_eq!(cfg.struct_size as usize, std::mem::size_of::<KernelConfig>());
        assert_eq!(cfg.abi_version, ABI_VERSION);
    }

    #[test]
    fn calib_pointer_is_null_when_absent() {
        let cfg = KernelConfig::new(1000.0, 160, 80, 2, 0, false, b"", None);
        assert!(cfg.calib_ptr.is_null());
        assert_eq!(cfg.calib_len, 0);
    }
}
