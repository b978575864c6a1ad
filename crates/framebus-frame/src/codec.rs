use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::kind::{GREETING, MESSAGE};

/// Bytes before the payload: magic, length, kind.
pub const HEADER_SIZE: usize = 8;

/// "FB"
pub const MAGIC: [u8; 2] = *b"FB";

/// 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// One frame: a kind tag and an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: u16,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(kind: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    pub fn message(payload: impl Into<Bytes>) -> Self {
        Self::new(MESSAGE, payload)
    }

    pub fn greeting(payload: impl Into<Bytes>) -> Self {
        Self::new(GREETING, payload)
    }
}

struct Header {
    len: usize,
    kind: u16,
}

impl Header {
    fn parse(src: &[u8]) -> Result<Self> {
        if src[..2] != MAGIC {
            return Err(FrameError::InvalidMagic);
        }
        Ok(Self {
            len: u32::from_le_bytes([src[2], src[3], src[4], src[5]]) as usize,
            kind: u16::from_le_bytes([src[6], src[7]]),
        })
    }
}

/// Append one frame to `dst`.
///
/// ```text
/// +------+------------+----------+---------+
/// | "FB" | len u32 LE | kind u16 | payload |
/// +------+------------+----------+---------+
/// ```
pub fn encode_frame(kind: u16, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let Ok(len) = u32::try_from(payload.len()) else {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    };
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(len);
    dst.put_u16_le(kind);
    dst.put_slice(payload);
    Ok(())
}

/// Take one complete frame off the front of `src`.
///
/// `Ok(None)` means more bytes are needed; `src` is left untouched then.
/// The length is checked against `max_payload` as soon as the header is
/// in, before the payload is buffered.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }
    let header = Header::parse(src)?;
    if header.len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: header.len,
            max: max_payload,
        });
    }

    let needed = HEADER_SIZE + header.len;
    if src.len() < needed {
        src.reserve(needed - src.len());
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    Ok(Some(Frame::new(header.kind, src.split_to(header.len).freeze())))
}

/// Limits and timeouts for the blocking reader and writer.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    pub max_payload_size: usize,
    pub read_timeout: Option<std::time::Duration>,
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

/// `tokio_util` codec over the same wire format.
#[cfg(feature = "async")]
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_payload: usize,
}

#[cfg(feature = "async")]
impl FrameCodec {
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    pub fn with_max_payload(max_payload: usize) -> Self {
        Self { max_payload }
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload
    }

    pub fn set_max_payload_size(&mut self, limit: usize) {
        self.max_payload = limit;
    }
}

#[cfg(feature = "async")]
impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "async")]
impl tokio_util::codec::Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        decode_frame(src, self.max_payload)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        match self.decode(src)? {
            None if !src.is_empty() => Err(FrameError::ConnectionClosed),
            decoded => Ok(decoded),
        }
    }
}

#[cfg(feature = "async")]
impl tokio_util::codec::Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        if frame.payload.len() > self.max_payload {
            return Err(FrameError::PayloadTooLarge {
                size: frame.payload.len(),
                max: self.max_payload,
            });
        }
        encode_frame(frame.kind, &frame.payload, dst)
    }
}
