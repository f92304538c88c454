//! Handshake (HELLO → CONFIG → ACK) and session identity.
//!
//! RESULT_CHUNK's timing/shape metadata is always packed as a fixed-size
//! prefix in chunk 0's payload, for both the single-frame and chunked
//! paths — there is no separate metadata-only frame.

use super::error::WireError;

pub const ADAPTER_NAME_CAP: usize = 32;
pub const KERNEL_NAME_CAP: usize = 32;
pub const PARAMS_CAP: usize = 256;

fn write_fixed_str(buf: &mut Vec<u8>, s: &str, cap: usize) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(cap.saturating_sub(1));
    buf.extend_from_slice(&bytes[..n]);
    buf.extend(std::iter::repeat(0u8).take(cap - n));
}

fn read_fixed_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// HELLO: adapter → host, advertising identity and capability limits.
#[derive(Debug, Clone, PartialEq)]
pub struct Hello {
    pub adapter_boot_id: u64,
    pub adapter_name: String,
    pub adapter_abi_version: u32,
    pub max_window_samples: u32,
    pub max_channels: u32,
    pub hostname: String,
    pub cpu: String,
    pub os: String,
}

impl Hello {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.adapter_boot_id.to_le_bytes());
        write_fixed_str(&mut buf, &self.adapter_name, ADAPTER_NAME_CAP);
        buf.extend_from_slice(&self.adapter_abi_version.to_le_bytes());
        buf.extend_from_slice(&self.max_window_samples.to_le_bytes());
        buf.extend_from_slice(&self.max_channels.to_le_bytes());
        for field in [&self.hostname, &self.cpu, &self.os] {
            let bytes = field.as_bytes();
            buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            buf.extend_from_slice(bytes);
        }
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut pos = 0usize;
        let need = |pos: usize, n: usize| -> Result<(), WireError> {
            if pos + n > bytes.len() {
                Err(WireError::InvalidFrame("HELLO payload truncated".to_string()))
            } else {
                Ok(())
            }
        };
        need(pos, 8)?;
        let adapter_boot_id = u64::from_le_bytes(bytes[pos..pos + 8].try_into().unwrap());
        pos += 8;
        need(pos, ADAPTER_NAME_CAP)?;
        let adapter_name = read_fixed_str(&bytes[pos..pos + ADAPTER_NAME_CAP]);
        pos += ADAPTER_NAME_CAP;
        need(pos, 12)?;
        let adapter_abi_version = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
        pos += 4;
        let max_window_samples = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
        pos += 4;
        let max_channels = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
        pos += 4;

        let mut fields = Vec::with_capacity(3);
        for _ in 0..3 {
            need(pos, 4)?;
            let len = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap()) as usize;
            pos += 4;
            need(pos, len)?;
            fields.push(String::from_utf8_lossy(&bytes[pos..pos + len]).into_owned());
            pos += len;
        }
        Ok(Self {
            adapter_boot_id,
            adapter_name,
            adapter_abi_version,
            max_window_samples,
            max_channels,
            hostname: fields[0].clone(),
            cpu: fields[1].clone(),
            os: fields[2].clone(),
        })
    }
}

/// CONFIG: host → adapter, selecting the session, geometry, and kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub session_id: u64,
    pub fs: f64,
    pub w: u32,
    pub h: u32,
    pub c: u32,
    pub kernel_name: String,
    pub params: String,
    pub calibration_ref: Option<String>,
}

impl Config {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.session_id.to_le_bytes());
        buf.extend_from_slice(&self.fs.to_le_bytes());
        buf.extend_from_slice(&self.w.to_le_bytes());
        buf.extend_from_slice(&self.h.to_le_bytes());
        buf.extend_from_slice(&self.c.to_le_bytes());
        write_fixed_str(&mut buf, &self.kernel_name, KERNEL_NAME_CAP);
        write_fixed_str(&mut buf, &self.params, PARAMS_CAP);
        match &self.calibration_ref {
            Some(s) => {
                let bytes = s.as_bytes();
                buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                buf.extend_from_slice(bytes);
            }
            None => buf.extend_from_slice(&0u32.to_le_bytes()),
        }
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let fixed_len = 8 + 8 + 4 + 4 + 4 + KERNEL_NAME_CAP + PARAMS_CAP + 4;
        if bytes.len() < fixed_len {
            return Err(WireError::InvalidFrame("CONFIG payload truncated".to_string()));
        }
        let mut pos = 0usize;
        let session_id = u64::from_le_bytes(bytes[pos..pos + 8].try_into().unwrap());
        pos += 8;
        let fs = f64::from_le_bytes(bytes[pos..pos + 8].try_into().unwrap());
        pos += 8;
        let w = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
        pos += 4;
        let h = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
        pos += 4;
        let c = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
        pos += 4;
        let kernel_name = read_fixed_str(&bytes[pos..pos + KERNEL_NAME_CAP]);
        pos += KERNEL_NAME_CAP;
        let params = read_fixed_str(&bytes[pos..pos + PARAMS_CAP]);
        pos += PARAMS_CAP;
        let ref_len = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap()) as usize;
        pos += 4;
        let calibration_ref = if ref_len == 0 {
            None
        } else {
            if bytes.len() < pos + ref_len {
                return Err(WireError::InvalidFrame("CONFIG calibration ref truncated".to_string()));
            }
            Some(String::from_utf8_lossy(&bytes[pos..pos + ref_len]).into_owned())
        };
        Ok(Self {
            session_id,
            fs,
            w,
            h,
            c,
            kernel_name,
            params,
            calibration_ref,
        })
    }
}

/// ACK: adapter → host, confirming output shape or reporting init failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub output_w: u32,
    pub output_c: u32,
    pub error_bits: u32,
}

impl Ack {
    pub fn ok(output_w: u32, output_c: u32) -> Self {
        Self {
            output_w,
            output_c,
            error_bits: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error_bits == 0
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(12);
        buf.extend_from_slice(&self.output_w.to_le_bytes());
        buf.extend_from_slice(&self.output_c.to_le_bytes());
        buf.extend_from_slice(&self.error_bits.to_le_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < 12 {
            return Err(WireError::InvalidFrame("ACK payload truncated".to_string()));
        }
        Ok(Self {
            output_w: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            output_c: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
            error_bits: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
        })
    }
}

pub const RESULT_METADATA_LEN: usize = 8 * 7 + 4 + 4;

/// Timing + shape metadata that always occupies the prefix of RESULT
/// chunk 0's payload. Carries the adapter's view of the session identity
/// so the caller can catch a stale or crossed-over adapter on every single
/// result, not just at handshake time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResultMetadata {
    pub boot_id: u64,
    pub session_id: u64,
    pub t_in: u64,
    pub t_start: u64,
    pub t_end: u64,
    pub t_first_tx: u64,
    pub t_last_tx: u64,
    pub output_length: u32,
    pub output_channels: u32,
}

impl ResultMetadata {
    pub fn encode(&self) -> [u8; RESULT_METADATA_LEN] {
        let mut buf = [0u8; RESULT_METADATA_LEN];
        buf[0..8].copy_from_slice(&self.boot_id.to_le_bytes());
        buf[8..16].copy_from_slice(&self.session_id.to_le_bytes());
        buf[16..24].copy_from_slice(&self.t_in.to_le_bytes());
        buf[24..32].copy_from_slice(&self.t_start.to_le_bytes());
        buf[32..40].copy_from_slice(&self.t_end.to_le_bytes());
        buf[40..48].copy_from_slice(&self.t_first_tx.to_le_bytes());
        buf[48..56].copy_from_slice(&self.t_last_tx.to_le_bytes());
        buf[56..60].copy_from_slice(&self.output_length.to_le_bytes());
        buf[60..64].copy_from_slice(&self.output_channels.to_le_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < RESULT_METADATA_LEN {
            return Err(WireError::InvalidFrame("RESULT metadata prefix truncated".to_string()));
        }
        Ok(Self {
            boot_id: u64::from_le_bytes(bytes[0..8].try_into().unwrap()),
            session_id: u64::from_le_bytes(bytes[8..16].try_into().unwrap()),
            t_in: u64::from_le_bytes(bytes[16..24].try_into().unwrap()),
            t_start: u64::from_le_bytes(bytes[24..32].try_into().unwrap()),
            t_end: u64::from_le_bytes(bytes[32..40].try_into().unwrap()),
            t_first_tx: u64::from_le_bytes(bytes[40..48].try_into().unwrap()),
            t_last_tx: u64::from_le_bytes(bytes[48..56].try_into().unwrap()),
            output_length: u32::from_le_bytes(bytes[56..60].try_into().unwrap()),
            output_channels: u32::from_le_bytes(bytes[60..64].try_into().unwrap()),
        })
    }
}

/// Identifies a handshake's scope: (adapter boot_id, session_id). Any
/// received frame whose identity doesn't match is fatal to the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionId {
    pub boot_id: u64,
    pub session_id: u64,
}

impl SessionId {
    pub fn check(&self, got_boot: u64, got_session: u64) -> Result<(), WireError> {
        if got_boot != self.boot_id || got_session != self.session_id {
            return Err(WireError::SessionMismatch {
                got_boot,
                got_session,
                expected_boot: self.boot_id,
                expected_session: self.session_id,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_round_trips() {
        let hello = Hello {
            adapter_boot_id: 42,
            adapter_name: "dsp-adapter".to_string(),
            adapter_abi_version: 2,
            max_window_samples: 4096,
            max_channels: 64,
            hostname: "host-1".to_string(),
            cpu: "x86_64".to_string(),
            os: "linux".to_string(),
        };
        let bytes = hello.encode();
        assert_eq!(Hello::decode(&bytes).unwrap(), hello);
    }

    #[test]
    fn config_round_trips_with_calibration_ref() {
        let config = Config {
            session_id: 7,
            fs: 16_000.0,
            w: 160,
            h: 80,
            c: 1,
            kernel_name: "fir_lowpass".to_string(),
            params: "gain=2.0".to_string(),
            calibration_ref: Some("fir_lowpass.cortex_state".to_string()),
        };
        let bytes = config.encode();
        assert_eq!(Config::decode(&bytes).unwrap(), config);
    }

    #[test]
    fn config_round_trips_without_calibration_ref() {
        let config = Config {
            session_id: 1,
            fs: 8_000.0,
            w: 64,
            h: 32,
            c: 2,
            kernel_name: "goertzel".to_string(),
            params: String::new(),
            calibration_ref: None,
        };
        let bytes = config.encode();
        assert_eq!(Config::decode(&bytes).unwrap(), config);
    }

    #[test]
    fn ack_round_trips() {
        let ack = Ack::ok(160, 1);
        assert_eq!(Ack::decode(&ack.encode()).unwrap(), ack);
        assert!(ack.is_success());
    }

    #[test]
    fn result_metadata_round_trips() {
        let meta = ResultMetadata {
            boot_id: 42,
            session_id: 7,
            t_in: 1,
            t_start: 2,
            t_end: 3,
            t_first_tx: 4,
            t_last_tx: 5,
            output_length: 160,
            output_channels: 1,
        };
        assert_eq!(ResultMetadata::decode(&meta.encode()).unwrap(), meta);
    }

    #[test]
    fn session_mismatch_is_detected() {
        let session = SessionId {
            boot_id: 1,
            session_id: 2,
        };
        assert!(session.check(1, 2).is_ok());
        assert!(matches!(session.check(1, 3), Err(WireError::SessionMismatch { .. })));
        assert!(matches!(session.check(9, 2), Err(WireError::SessionMismatch { .. })));
    }
}
