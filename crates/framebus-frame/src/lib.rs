//! Message-oriented framing over byte streams.
//!
//! Gives the stream transports message boundaries. Every frame is:
//! - A 2-byte magic number ("FB") for stream synchronization
//! - A 4-byte little-endian payload length
//! - A 2-byte little-endian frame kind (greeting or message)
//!
//! The payload of a `MESSAGE` frame is exactly one serialized message; no
//! partial reads or buffer management leak into user code.

pub mod codec;
pub mod error;
pub mod kind;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use codec::FrameCodec;
pub use codec::{decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use error::{FrameError, Result};
pub use kind::{kind_name, GREETING, MESSAGE};
pub use reader::FrameReader;
pub use writer::FrameWriter;
