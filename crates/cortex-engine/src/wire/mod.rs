//! Wire protocol and transport: framing, chunking, handshake, and the
//! transport abstraction remote adapters speak over.

pub mod chunk;
pub mod error;
pub mod frame;
pub mod session;
pub mod transport;

pub use chunk::{split_into_chunks, ChunkHeader, Reassembler};
pub use error::WireError;
pub use frame::{encode_frame, FrameHeader, FrameType, MagicHunter, FLAG_LAST};
pub use session::{Ack, Config, Hello, ResultMetadata, SessionId};
pub use transport::{recv_frame, StdioTransport, TcpTransport, Transport};
