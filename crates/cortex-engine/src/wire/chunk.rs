//! Chunked transfer of window/result payloads larger than one frame, and
//! the reassembler that stitches chunks back into a full payload.

use super::error::WireError;
use super::frame::{CHUNK_DATA_CAP, CHUNK_SUBHEADER_LEN, FLAG_LAST};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub sequence: u32,
    pub total_bytes: u32,
    pub offset: u32,
    pub chunk_len: u32,
    pub flags: u32,
}

impl ChunkHeader {
    pub fn is_last(&self) -> bool {
        self.flags & (FLAG_LAST as u32) != 0
    }

    pub fn encode(&self) -> [u8; CHUNK_SUBHEADER_LEN] {
        let mut bytes = [0u8; CHUNK_SUBHEADER_LEN];
        bytes[0..4].copy_from_slice(&self.sequence.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.total_bytes.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.offset.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.chunk_len.to_le_bytes());
        bytes[16..20].copy_from_slice(&self.flags.to_le_bytes());
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < CHUNK_SUBHEADER_LEN {
            return Err(WireError::InvalidFrame("chunk sub-header truncated".to_string()));
        }
        Ok(Self {
            sequence: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            total_bytes: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
            offset: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
            chunk_len: u32::from_le_bytes(bytes[12..16].try_into().unwrap()),
            flags: u32::from_le_bytes(bytes[16..20].try_into().unwrap()),
        })
    }
}

/// Splits `data` (the logical payload of a window or a result) into
/// consecutive chunk frames (sub-header + data), each `<= CHUNK_DATA_CAP`
/// bytes of data, tagged with `sequence` and a monotonic `offset`. The
/// last chunk carries `FLAG_LAST`.
pub fn split_into_chunks(sequence: u32, data: &[u8]) -> Result<Vec<Vec<u8>>, WireError> {
    if data.is_empty() {
        return Err(WireError::InvalidFrame("total_bytes must be > 0".to_string()));
    }
    let total_bytes = data.len() as u32;
    let mut chunks = Vec::new();
    let mut offset = 0u32;
    while offset < total_bytes {
        let remaining = total_bytes - offset;
        let chunk_len = remaining.min(CHUNK_DATA_CAP);
        let is_last = offset + chunk_len >= total_bytes;
        let header = ChunkHeader {
            sequence,
            total_bytes,
            offset,
            chunk_len,
            flags: if is_last { FLAG_LAST as u32 } else { 0 },
        };
        let mut buf = Vec::with_capacity(CHUNK_SUBHEADER_LEN + chunk_len as usize);
        buf.extend_from_slice(&header.encode());
        buf.extend_from_slice(&data[offset as usize..(offset + chunk_len) as usize]);
        chunks.push(buf);
        offset += chunk_len;
    }
    Ok(chunks)
}

/// Reassembles a sequence of chunk frames into their logical payload,
/// tracking byte coverage via a bitmap keyed on `total_bytes` (spec:
/// "Maintain a coverage bitmap to detect gaps").
pub struct Reassembler {
    expected_sequence: u32,
    total_bytes: Option<u32>,
    buffer: Vec<u8>,
    covered: Vec<bool>,
    seen_last: bool,
}

impl Reassembler {
    pub fn new(expected_sequence: u32) -> Self {
        Self {
            expected_sequence,
            total_bytes: None,
            buffer: Vec::new(),
            covered: Vec::new(),
            seen_last: false,
        }
    }

    /// Feeds one chunk's sub-header + data (`CHUNK_SUBHEADER_LEN` bytes of
    /// header followed by `chunk_len` bytes of data). Returns the fully
    /// reassembled payload once `LAST` is observed and coverage is
    /// complete.
    pub fn accept(&mut self, chunk_bytes: &[u8]) -> Result<Option<Vec<u8>>, WireError> {
        let header = ChunkHeader::decode(chunk_bytes)?;
        let data = &chunk_bytes[CHUNK_SUBHEADER_LEN..];
        if data.len() != header.chunk_len as usize {
            return Err(WireError::InvalidFrame("chunk_len does not match data length".to_string()));
        }
        if header.total_bytes == 0 {
            return Err(WireError::InvalidFrame("total_bytes must be > 0".to_string()));
        }
        if header.chunk_len == 0 && header.is_last() && self.buffer.is_empty() && !self.seen_last {
            return Err(WireError::InvalidFrame(
                "first chunk cannot have chunk_len=0 with LAST set".to_string(),
            ));
        }
        if header.sequence != self.expected_sequence {
            return Err(WireError::ChunkSequenceMismatch {
                got: header.sequence,
                expected: self.expected_sequence,
            });
        }
        if let Some(total) = self.total_bytes {
            if total != header.total_bytes {
                return Err(WireError::InvalidFrame("total_bytes changed mid-window".to_string()));
            }
        } else {
            self.total_bytes = Some(header.total_bytes);
            self.buffer = vec![0u8; header.total_bytes as usize];
            self.covered = vec![false; header.total_bytes as usize];
        }

        let offset = header.offset as usize;
        let end = offset
            .checked_add(header.chunk_len as usize)
            .ok_or_else(|| WireError::InvalidFrame("offset + chunk_len overflows".to_string()))?;
        if end > self.buffer.len() {
            return Err(WireError::ChunkBufferTooSmall {
                buf_len: self.buffer.len(),
                total_bytes: header.total_bytes,
            });
        }
        self.buffer[offset..end].copy_from_slice(data);
        for covered in &mut self.covered[offset..end] {
            *covered = true;
        }
        if header.is_last() {
            self.seen_last = true;
        }

        if self.seen_last {
            let missing = self.covered.iter().filter(|c| !**c).count() as u32;
            if missing > 0 {
                return Err(WireError::ChunkIncomplete {
                    missing,
                    total_bytes: header.total_bytes,
                });
            }
            return Ok(Some(std::mem::take(&mut self.buffer)));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk_round_trip() {
        let data: Vec<u8> = (0..64u8).collect();
        let chunks = split_into_chunks(0, &data).unwrap();
        assert_eq!(chunks.len(), 1);
        let mut reassembler = Reassembler::new(0);
        let result = reassembler.accept(&chunks[0]).unwrap();
        assert_eq!(result, Some(data));
    }

    #[test]
    fn multi_chunk_reassembly_is_bit_exact() {
        let data: Vec<u8> = (0..40_000u32).map(|i| (i % 256) as u8).collect();
        let chunks = split_into_chunks(5, &data).unwrap();
        assert_eq!(chunks.len(), (data.len() as u32).div_ceil(CHUNK_DATA_CAP) as usize);
        let mut reassembler = Reassembler::new(5);
        let mut result = None;
        for chunk in &chunks {
            result = reassembler.accept(chunk).unwrap();
        }
        assert_eq!(result, Some(data));
    }

    #[test]
    fn sequence_mismatch_is_rejected() {
        let data = vec![1u8, 2, 3];
        let chunks = split_into_chunks(10, &data).unwrap();
        let mut reassembler = Reassembler::new(20);
        assert!(matches!(
            reassembler.accept(&chunks[0]),
            Err(WireError::ChunkSequenceMismatch { got: 10, expected: 20 })
        ));
    }

    #[test]
    fn gap_at_completion_is_incomplete() {
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 256) as u8).collect();
        let mut chunks = split_into_chunks(0, &data).unwrap();
        chunks.remove(1);
        let mut reassembler = Reassembler::new(0);
        let mut last_result = Ok(None);
        for chunk in &chunks {
            last_result = reassembler.accept(chunk);
            if last_result.is_err() {
                break;
            }
        }
        assert!(matches!(last_result, Err(WireError::ChunkIncomplete { .. })));
    }

    #[test]
    fn zero_total_bytes_is_rejected_at_split() {
        assert!(split_into_chunks(0, &[]).is_err());
    }

    #[test]
    fn first_chunk_zero_len_with_last_is_rejected() {
        let header = ChunkHeader {
            sequence: 0,
            total_bytes: 10,
            offset: 0,
            chunk_len: 0,
            flags: FLAG_LAST as u32,
        };
        let bytes = header.encode().to_vec();
        let mut reassembler = Reassembler::new(0);
        assert!(reassembler.accept(&bytes).is_err());
    }
}
