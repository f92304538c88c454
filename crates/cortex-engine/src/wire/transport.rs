//! Transport abstraction: `send`/`recv`/`close` over an opaque reliable,
//! ordered byte stream.
//!
//! `TcpTransport` is grounded on the teacher's `socket2` usage (there for
//! UDP multicast join options; here repurposed for `SO_RCVTIMEO` /
//! `SO_SNDTIMEO` on a connected TCP stream, since remote adapters speak a
//! TCP-like stream rather than multicast datagrams).

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use socket2::SockRef;

use super::error::WireError;
use super::frame::{FrameHeader, MagicHunter, HEADER_LEN};

/// An opaque, reliable, ordered byte-stream endpoint plus a timeout-bearing
/// `recv`. No framing or datagram-boundary assumption is made above this
/// trait — the wire layer hunts for its own magic.
pub trait Transport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), WireError>;

    /// Fills `buf[..len]`, returning an error on timeout or connection
    /// closure (a zero-length read is treated as `ConnReset`).
    fn recv(&mut self, buf: &mut [u8], len: usize, timeout_ms: u64) -> Result<(), WireError>;

    fn close(&mut self);
}

/// Receives one complete frame (header + payload) off `transport`,
/// performing the sliding magic hunt before parsing the rest of the header.
pub fn recv_frame(transport: &mut dyn Transport, timeout_ms: u64) -> Result<(FrameHeader, Vec<u8>), WireError> {
    let mut hunter = MagicHunter::new();
    let mut one = [0u8; 1];
    loop {
        transport.recv(&mut one, 1, timeout_ms)?;
        if hunter.push(one[0]) {
            break;
        }
    }
    let mut rest = [0u8; HEADER_LEN - 4];
    transport.recv(&mut rest, rest.len(), timeout_ms)?;
    let mut header_bytes = [0u8; HEADER_LEN];
    header_bytes[0..4].copy_from_slice(&super::frame::MAGIC.to_le_bytes());
    header_bytes[4..].copy_from_slice(&rest);
    let header = FrameHeader::decode(&header_bytes)?;

    let mut payload = vec![0u8; header.payload_length as usize];
    if !payload.is_empty() {
        transport.recv(&mut payload, payload.len(), timeout_ms)?;
    }
    super::frame::verify_crc(&header, &header_bytes[0..12], &payload)?;
    Ok((header, payload))
}

/// TCP-backed transport for a remote adapter connection.
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn connect(addr: &str) -> Result<Self, WireError> {
        let stream = TcpStream::connect(addr).map_err(|_| WireError::ConnReset)?;
        stream.set_nodelay(true).ok();
        Ok(Self { stream })
    }

    fn set_recv_timeout(&self, timeout_ms: u64) {
        let sref = SockRef::from(&self.stream);
        let _ = sref.set_read_timeout(Some(Duration::from_millis(timeout_ms)));
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), WireError> {
        self.stream.write_all(bytes).map_err(|_| WireError::ConnReset)
    }

    fn recv(&mut self, buf: &mut [u8], len: usize, timeout_ms: u64) -> Result<(), WireError> {
        self.set_recv_timeout(timeout_ms);
        match self.stream.read_exact(&mut buf[..len]) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {
                Err(WireError::TimedOut)
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(WireError::ConnReset),
            Err(_) => Err(WireError::ConnReset),
        }
    }

    fn close(&mut self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

/// Stdin/stdout transport for a locally spawned adapter process (spec:
/// "The local loopback uses the adapter's stdin/stdout").
pub struct StdioTransport {
    reader: std::io::Stdin,
    writer: std::io::Stdout,
}

impl StdioTransport {
    pub fn new() -> Self {
        Self {
            reader: std::io::stdin(),
            writer: std::io::stdout(),
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for StdioTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), WireError> {
        self.writer.write_all(bytes).map_err(|_| WireError::ConnReset)?;
        self.writer.flush().map_err(|_| WireError::ConnReset)
    }

    fn recv(&mut self, buf: &mut [u8], len: usize, _timeout_ms: u64) -> Result<(), WireError> {
        // Stdio has no portable per-read timeout; the scheduler bounds the
        // overall wait by the per-window deadline instead.
        match self.reader.read_exact(&mut buf[..len]) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(WireError::ConnReset),
            Err(_) => Err(WireError::ConnReset),
        }
    }

    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::frame::{encode_frame, FrameType};
    use std::collections::VecDeque;

    struct MockTransport {
        inbound: VecDeque<u8>,
        outbound: Vec<u8>,
    }

    impl Transport for MockTransport {
        fn send(&mut self, bytes: &[u8]) -> Result<(), WireError> {
            self.outbound.extend_from_slice(bytes);
            Ok(())
        }

        fn recv(&mut self, buf: &mut [u8], len: usize, _timeout_ms: u64) -> Result<(), WireError> {
            if self.inbound.len() < len {
                return Err(WireError::TimedOut);
            }
            for slot in buf.iter_mut().take(len) {
                *slot = self.inbound.pop_front().unwrap();
            }
            Ok(())
        }

        fn close(&mut self) {}
    }

    #[test]
    fn recv_frame_hunts_past_leading_noise() {
        let mut frame = encode_frame(FrameType::Hello, 0, b"payload");
        let mut bytes: Vec<u8> = vec![0xDE, 0xAD, 0xBE, 0xEF];
        bytes.append(&mut frame);
        let mut transport = MockTransport {
            inbound: bytes.into_iter().collect(),
            outbound: Vec::new(),
        };
        let (header, payload) = recv_frame(&mut transport, 1000).unwrap();
        assert_eq!(header.frame_type, FrameType::Hello);
        assert_eq!(payload, b"payload");
    }

    #[test]
    fn recv_frame_times_out_on_short_stream() {
        let mut transport = MockTransport {
            inbound: VecDeque::new(),
            outbound: Vec::new(),
        };
        assert!(matches!(recv_frame(&mut transport, 10), Err(WireError::TimedOut)));
    }
}
