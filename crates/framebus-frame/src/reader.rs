use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use framebus_transport::IpcStream;

use crate::codec::{decode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const READ_CHUNK: usize = 8 * 1024;

/// Blocking frame reader over a byte stream.
///
/// Bytes of a frame that arrived only in part survive a read timeout, so a
/// poll loop can keep calling [`FrameReader::read_frame`].
pub struct FrameReader<T> {
    stream: T,
    pending: BytesMut,
    limits: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    pub fn new(stream: T) -> Self {
        Self::with_config(stream, FrameConfig::default())
    }

    pub fn with_config(stream: T, limits: FrameConfig) -> Self {
        Self {
            stream,
            pending: BytesMut::with_capacity(READ_CHUNK),
            limits,
        }
    }

    /// Block until one whole frame is available.
    ///
    /// EOF yields [`FrameError::ConnectionClosed`], an expired socket
    /// timeout yields [`FrameError::Timeout`].
    pub fn read_frame(&mut self) -> Result<Frame> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(frame) = decode_frame(&mut self.pending, self.limits.max_payload_size)? {
                return Ok(frame);
            }
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) if is_timeout(&err) => return Err(FrameError::Timeout),
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Bytes received but not yet returned as a frame.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    pub fn get_ref(&self) -> &T {
        &self.stream
    }

    pub fn set_max_payload_size(&mut self, limit: usize) {
        self.limits.max_payload_size = limit;
    }
}

impl FrameReader<IpcStream> {
    /// Wrap a transport stream, applying the configured read timeout.
    pub fn with_config_ipc(stream: IpcStream, limits: FrameConfig) -> Result<Self> {
        stream
            .set_read_timeout(limits.read_timeout)
            .map_err(from_transport)?;
        Ok(Self::with_config(stream, limits))
    }

    pub fn set_read_timeout(&mut self, timeout: Option<std::time::Duration>) -> Result<()> {
        self.stream
            .set_read_timeout(timeout)
            .map_err(from_transport)?;
        self.limits.read_timeout = timeout;
        Ok(())
    }
}

// SO_RCVTIMEO expiry is WouldBlock on Unix, TimedOut on Windows.
pub(crate) fn is_timeout(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

pub(crate) fn from_transport(err: framebus_transport::TransportError) -> FrameError {
    use framebus_transport::TransportError;
    match err {
        TransportError::Io(io) | TransportError::Accept(io) => FrameError::Io(io),
        TransportError::Bind { source, .. } | TransportError::Connect { source, .. } => {
            FrameError::Io(source)
        }
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use bytes::BufMut;

    use super::*;
    use crate::codec::{encode_frame, MAGIC};
    use crate::kind::MESSAGE;
    use crate::writer::FrameWriter;

    #[test]
    fn read_single_frame() {
        let mut wire = BytesMut::new();
        encode_frame(MESSAGE, b"hello", &mut wire).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.kind, MESSAGE);
        assert_eq!(frame.payload.as_ref(), b"hello");
    }

    #[test]
    fn read_frames_in_order() {
        let mut wire = BytesMut::new();
        for n in 0..3 {
            encode_frame(MESSAGE, format!("msg-{n}").as_bytes(), &mut wire).unwrap();
        }

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        for n in 0..3 {
            let frame = reader.read_frame().unwrap();
            assert_eq!(frame.payload.as_ref(), format!("msg-{n}").as_bytes());
        }
    }

    #[test]
    fn large_payload_spans_many_reads() {
        let payload = vec![0xAB; 64 * 1024];
        let mut wire = BytesMut::new();
        encode_frame(MESSAGE, &payload, &mut wire).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.payload.as_ref(), payload.as_slice());
    }

    #[test]
    fn byte_by_byte_reads() {
        let mut wire = BytesMut::new();
        encode_frame(MESSAGE, b"slow", &mut wire).unwrap();

        let mut reader = FrameReader::new(Trickle {
            bytes: wire.to_vec(),
            pos: 0,
        });
        assert_eq!(reader.read_frame().unwrap().payload.as_ref(), b"slow");
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        assert!(matches!(
            reader.read_frame().unwrap_err(),
            FrameError::ConnectionClosed
        ));
    }

    #[test]
    fn connection_closed_mid_frame() {
        let mut partial = BytesMut::new();
        partial.put_slice(&MAGIC);
        partial.put_u32_le(16);
        partial.put_u16_le(MESSAGE);
        partial.put_slice(b"only-part");

        let mut reader = FrameReader::new(Cursor::new(partial.to_vec()));
        assert!(matches!(
            reader.read_frame().unwrap_err(),
            FrameError::ConnectionClosed
        ));
    }

    #[test]
    fn oversized_frame_rejected() {
        let mut wire = BytesMut::new();
        wire.put_slice(&MAGIC);
        wire.put_u32_le(1024);
        wire.put_u16_le(MESSAGE);

        let cfg = FrameConfig {
            max_payload_size: 16,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(wire.to_vec()), cfg);
        assert!(matches!(
            reader.read_frame().unwrap_err(),
            FrameError::PayloadTooLarge { .. }
        ));
    }

    #[test]
    fn would_block_is_timeout_and_resumes() {
        let mut wire = BytesMut::new();
        encode_frame(MESSAGE, b"resumed", &mut wire).unwrap();
        let bytes = wire.to_vec();

        // Half the frame, a timeout, then the rest.
        let mut reader = FrameReader::new(Stalling {
            first: bytes[..6].to_vec(),
            rest: bytes[6..].to_vec(),
            state: 0,
        });

        assert!(matches!(reader.read_frame().unwrap_err(), FrameError::Timeout));
        assert_eq!(reader.buffered(), 6);
        assert_eq!(reader.read_frame().unwrap().payload.as_ref(), b"resumed");
    }

    #[test]
    fn read_timeout_on_ipc_stream() {
        let listener =
            framebus_transport::Listener::bind(&"tcp://127.0.0.1:0".parse().unwrap()).unwrap();
        let endpoint = listener.local_endpoint().clone();
        let connector = std::thread::spawn(move || framebus_transport::connect(&endpoint).unwrap());
        let stream = listener.accept().unwrap();
        let _client = connector.join().unwrap();

        let cfg = FrameConfig {
            read_timeout: Some(Duration::from_millis(20)),
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config_ipc(stream, cfg).unwrap();
        assert!(matches!(reader.read_frame().unwrap_err(), FrameError::Timeout));
    }

    #[test]
    #[cfg(unix)]
    fn roundtrip_over_socket_pair() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        writer.send(MESSAGE, b"ping").unwrap();
        assert_eq!(reader.read_frame().unwrap().payload.as_ref(), b"ping");
    }

    struct Trickle {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct Stalling {
        first: Vec<u8>,
        rest: Vec<u8>,
        state: u8,
    }

    impl Read for Stalling {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.state += 1;
            let chunk = match self.state {
                1 => std::mem::take(&mut self.first),
                2 => return Err(std::io::Error::from(ErrorKind::WouldBlock)),
                3 => std::mem::take(&mut self.rest),
                _ => Vec::new(),
            };
            buf[..chunk.len()].copy_from_slice(&chunk);
            Ok(chunk.len())
        }
    }
}
