use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use framebus_transport::IpcStream;

use crate::codec::{encode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::reader::{from_transport, is_timeout};

/// Blocking frame writer over a byte stream.
pub struct FrameWriter<T> {
    stream: T,
    scratch: BytesMut,
    limits: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(stream: T) -> Self {
        Self::with_config(stream, FrameConfig::default())
    }

    pub fn with_config(stream: T, limits: FrameConfig) -> Self {
        Self {
            stream,
            scratch: BytesMut::with_capacity(1024),
            limits,
        }
    }

    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.send(frame.kind, frame.payload.as_ref())
    }

    /// Write one frame of `kind` carrying `payload`, then flush.
    ///
    /// A write timeout fails the call; the rest of the frame is not retried.
    pub fn send(&mut self, kind: u16, payload: &[u8]) -> Result<()> {
        let max = self.limits.max_payload_size;
        if payload.len() > max {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max,
            });
        }

        self.scratch.clear();
        encode_frame(kind, payload, &mut self.scratch)?;

        let mut remaining = &self.scratch[..];
        while !remaining.is_empty() {
            match self.stream.write(remaining) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => remaining = &remaining[n..],
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) if is_timeout(&err) => return Err(FrameError::Timeout),
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        loop {
            match self.stream.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.stream
    }

    pub fn into_inner(self) -> T {
        self.stream
    }

    pub fn set_max_payload_size(&mut self, limit: usize) {
        self.limits.max_payload_size = limit;
    }
}

impl FrameWriter<IpcStream> {
    /// Wrap a transport stream, applying the configured write timeout.
    pub fn with_config_ipc(stream: IpcStream, limits: FrameConfig) -> Result<Self> {
        stream
            .set_write_timeout(limits.write_timeout)
            .map_err(from_transport)?;
        Ok(Self::with_config(stream, limits))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::codec::decode_frame;
    use crate::kind::{GREETING, MESSAGE};
    use crate::reader::FrameReader;

    fn written(writer: FrameWriter<Cursor<Vec<u8>>>) -> BytesMut {
        BytesMut::from(writer.into_inner().into_inner().as_slice())
    }

    #[test]
    fn write_single_frame() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send(MESSAGE, b"hello").unwrap();

        let mut wire = written(writer);
        let frame = decode_frame(&mut wire, usize::MAX).unwrap().unwrap();
        assert_eq!(frame.kind, MESSAGE);
        assert_eq!(frame.payload.as_ref(), b"hello");
    }

    #[test]
    fn write_frame_keeps_kind() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.write_frame(&Frame::greeting("hi")).unwrap();
        writer.write_frame(&Frame::message("{}")).unwrap();

        let mut wire = written(writer);
        let first = decode_frame(&mut wire, usize::MAX).unwrap().unwrap();
        let second = decode_frame(&mut wire, usize::MAX).unwrap().unwrap();
        assert_eq!(first.kind, GREETING);
        assert_eq!(second.kind, MESSAGE);
    }

    #[test]
    fn payload_too_large_rejected() {
        let cfg = FrameConfig {
            max_payload_size: 4,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);
        let err = writer.send(MESSAGE, b"oversized").unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
    }

    #[test]
    fn flush_propagates() {
        let sink = FlushTracking::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = FrameWriter::new(sink);

        writer.send(MESSAGE, b"x").unwrap();
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn interrupted_write_retries() {
        let mut writer = FrameWriter::new(FailOnce {
            kind: ErrorKind::Interrupted,
            failed: false,
            data: Vec::new(),
        });
        writer.send(MESSAGE, b"retry").unwrap();
        assert!(!writer.into_inner().data.is_empty());
    }

    #[test]
    fn would_block_write_is_timeout() {
        let mut writer = FrameWriter::new(FailOnce {
            kind: ErrorKind::WouldBlock,
            failed: false,
            data: Vec::new(),
        });
        let err = writer.send(MESSAGE, b"stuck").unwrap_err();
        assert!(matches!(err, FrameError::Timeout));
    }

    #[test]
    fn zero_length_write_is_connection_closed() {
        let mut writer = FrameWriter::new(ZeroWriter);
        let err = writer.send(MESSAGE, b"x").unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn written_bytes_decode_through_reader() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send(MESSAGE, b"z").unwrap();

        let wire = writer.into_inner().into_inner();
        let mut reader = FrameReader::new(Cursor::new(wire));
        assert_eq!(reader.read_frame().unwrap().payload.as_ref(), b"z");
    }

    #[derive(Default)]
    struct FlushTracking {
        flushed: Arc<AtomicBool>,
    }

    impl Write for FlushTracking {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailOnce {
        kind: ErrorKind,
        failed: bool,
        data: Vec<u8>,
    }

    impl Write for FailOnce {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.failed {
                self.failed = true;
                return Err(std::io::Error::from(self.kind));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
