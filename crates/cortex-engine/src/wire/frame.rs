//! Wire frame header: magic hunt, header layout, and CRC32 framing.
//!
//! Grounded on the `summit-core` reference file's pairing of a typed error
//! enum with a fixed-size wire header and round-trip tests; the manual
//! `to_le_bytes`/`from_le_bytes` encoding follows the teacher's own
//! `decoder.rs` idiom rather than a zerocopy crate.

use super::error::WireError;

pub const MAGIC: u32 = 0x4352_5458; // "XTRC" little-endian
pub const PROTOCOL_VERSION: u8 = 1;
pub const HEADER_LEN: usize = 16;
pub const SINGLE_FRAME_CAP: u32 = 65_536;
pub const CHUNK_DATA_CAP: u32 = 8_192;
pub const CHUNK_SUBHEADER_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    Hello = 1,
    Config = 2,
    Ack = 3,
    WindowChunk = 4,
    ResultChunk = 5,
    Error = 6,
}

impl TryFrom<u8> for FrameType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(FrameType::Hello),
            2 => Ok(FrameType::Config),
            3 => Ok(FrameType::Ack),
            4 => Ok(FrameType::WindowChunk),
            5 => Ok(FrameType::ResultChunk),
            6 => Ok(FrameType::Error),
            other => Err(WireError::InvalidFrame(format!("unknown frame_type {other}"))),
        }
    }
}

pub const FLAG_LAST: u16 = 1 << 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame_type: FrameType,
    pub flags: u16,
    pub payload_length: u32,
    pub crc32: u32,
}

impl FrameHeader {
    /// Parses a 16-byte header. Does not validate the CRC — that requires
    /// the payload, checked separately by [`verify_crc`].
    pub fn decode(bytes: &[u8; HEADER_LEN]) -> Result<Self, WireError> {
        let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        if magic != MAGIC {
            return Err(WireError::MagicNotFound);
        }
        let version = bytes[4];
        if version != PROTOCOL_VERSION {
            return Err(WireError::VersionMismatch {
                got: version,
                expected: PROTOCOL_VERSION,
            });
        }
        let frame_type = FrameType::try_from(bytes[5])?;
        let flags = u16::from_le_bytes(bytes[6..8].try_into().unwrap());
        let payload_length = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        if payload_length > SINGLE_FRAME_CAP {
            return Err(WireError::FrameTooLarge {
                got: payload_length,
                cap: SINGLE_FRAME_CAP,
            });
        }
        let crc32 = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        Ok(Self {
            frame_type,
            flags,
            payload_length,
            crc32,
        })
    }

    /// Serializes header fields (without payload) to 16 bytes, computing
    /// the CRC over `header[0..12] ++ payload`.
    pub fn encode(frame_type: FrameType, flags: u16, payload: &[u8]) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        bytes[4] = PROTOCOL_VERSION;
        bytes[5] = frame_type as u8;
        bytes[6..8].copy_from_slice(&flags.to_le_bytes());
        bytes[8..12].copy_from_slice(&(payload.len() as u32).to_le_bytes());
        let crc = compute_crc(&bytes[0..12], payload);
        bytes[12..16].copy_from_slice(&crc.to_le_bytes());
        bytes
    }
}

/// CRC32 (IEEE) over `header_prefix ++ payload` — covers `header[0..12]`
/// (everything but the CRC field itself) concatenated with the payload.
pub fn compute_crc(header_prefix: &[u8], payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(header_prefix);
    hasher.update(payload);
    hasher.finalize()
}

pub fn verify_crc(header: &FrameHeader, header_prefix: &[u8], payload: &[u8]) -> Result<(), WireError> {
    let computed = compute_crc(header_prefix, payload);
    if computed != header.crc32 {
        return Err(WireError::CrcMismatch {
            computed,
            carried: header.crc32,
        });
    }
    Ok(())
}

/// Builds a complete frame (header + payload) ready to hand to a transport.
pub fn encode_frame(frame_type: FrameType, flags: u16, payload: &[u8]) -> Vec<u8> {
    let header = FrameHeader::encode(frame_type, flags, payload);
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&header);
    out.extend_from_slice(payload);
    out
}

/// Sliding 32-bit magic hunter: feed bytes one at a time via [`push`];
/// returns `true` once the last four bytes fed equal the little-endian
/// magic. Shifts right and inserts the newest byte into the high byte, so
/// the magic's own little-endian byte order — 0x58, 0x54, 0x52, 0x43 for
/// `0x43525458` — is what the hunter expects to see in stream order.
#[derive(Debug, Default)]
pub struct MagicHunter {
    window: u32,
}

impl MagicHunter {
    pub fn new() -> Self {
        Self { window: 0 }
    }

    pub fn push(&mut self, byte: u8) -> bool {
        self.window = (self.window >> 8) | ((byte as u32) << 24);
        self.window == MAGIC
    }

    pub fn reset(&mut self) {
        self.window = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_hunter_locks_on_after_four_correct_bytes() {
        let mut hunter = MagicHunter::new();
        let bytes = MAGIC.to_le_bytes();
        assert!(!hunter.push(bytes[0]));
        assert!(!hunter.push(bytes[1]));
        assert!(!hunter.push(bytes[2]));
        assert!(hunter.push(bytes[3]));
    }

    #[test]
    fn magic_hunter_ignores_noise_before_magic() {
        let mut hunter = MagicHunter::new();
        for noise in [0xAA, 0xBB, 0xCC, 0xDD, 0xEE] {
            assert!(!hunter.push(noise));
        }
        let bytes = MAGIC.to_le_bytes();
        assert!(!hunter.push(bytes[0]));
        assert!(!hunter.push(bytes[1]));
        assert!(!hunter.push(bytes[2]));
        assert!(hunter.push(bytes[3]));
    }

    #[test]
    fn header_round_trips() {
        let payload = b"hello window";
        let bytes = encode_frame(FrameType::Hello, FLAG_LAST, payload);
        let header = FrameHeader::decode(bytes[0..HEADER_LEN].try_into().unwrap()).unwrap();
        assert_eq!(header.frame_type, FrameType::Hello);
        assert_eq!(header.flags, FLAG_LAST);
        assert_eq!(header.payload_length as usize, payload.len());
        verify_crc(&header, &bytes[0..12], &bytes[HEADER_LEN..]).unwrap();
    }

    #[test]
    fn single_byte_payload_flip_changes_crc() {
        let payload = b"abcdefgh";
        let mut bytes = encode_frame(FrameType::WindowChunk, 0, payload);
        let original_crc = FrameHeader::decode(bytes[0..HEADER_LEN].try_into().unwrap())
            .unwrap()
            .crc32;
        bytes[HEADER_LEN] ^= 0x01;
        let header = FrameHeader::decode(bytes[0..HEADER_LEN].try_into().unwrap()).unwrap();
        assert_eq!(header.crc32, original_crc);
        assert!(verify_crc(&header, &bytes[0..12], &bytes[HEADER_LEN..]).is_err());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = encode_frame(FrameType::Hello, 0, b"x");
        bytes[0] ^= 0xFF;
        assert_eq!(
            FrameHeader::decode(bytes[0..HEADER_LEN].try_into().unwrap()).unwrap_err(),
            WireError::MagicNotFound
        );
    }

    #[test]
    fn rejects_version_mismatch() {
        let mut bytes = encode_frame(FrameType::Hello, 0, b"x");
        bytes[4] = 9;
        assert!(matches!(
            FrameHeader::decode(bytes[0..HEADER_LEN].try_into().unwrap()),
            Err(WireError::VersionMismatch { got: 9, expected: 1 })
        ));
    }

    #[test]
    fn rejects_oversize_payload_length() {
        let mut bytes = encode_frame(FrameType::Hello, 0, b"x");
        bytes[8..12].copy_from_slice(&(SINGLE_FRAME_CAP + 1).to_le_bytes());
        assert!(matches!(
            FrameHeader::decode(bytes[0..HEADER_LEN].try_into().unwrap()),
            Err(WireError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn frame_type_round_trips_through_u8() {
        for ft in [
            FrameType::Hello,
            FrameType::Config,
            FrameType::Ack,
            FrameType::WindowChunk,
            FrameType::ResultChunk,
            FrameType::Error,
        ] {
            assert_eq!(FrameType::try_from(ft as u8).unwrap(), ft);
        }
        assert!(FrameType::try_from(0u8).is_err());
        assert!(FrameType::try_from(7u8).is_err());
    }
}
