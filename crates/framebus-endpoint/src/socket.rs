//! Blocking REQ and SUB sockets.

use std::time::Duration;

use framebus_frame::{FrameConfig, FrameError, FrameReader, FrameWriter, DEFAULT_MAX_PAYLOAD, MESSAGE};
use framebus_transport::{Endpoint, IpcStream};
use tracing::debug;

use crate::codec;
use crate::error::{EndpointError, Result};
use crate::handshake::{handshake_connect, HandshakeConfig, Pattern};
use crate::message::Message;

// SO_RCVTIMEO rejects a zero duration.
const MIN_SOCKET_TIMEOUT: Duration = Duration::from_millis(1);

fn socket_timeout(timeout: Duration) -> Option<Duration> {
    Some(timeout.max(MIN_SOCKET_TIMEOUT))
}

type Halves = (FrameReader<IpcStream>, FrameWriter<IpcStream>);

fn connect_framed(endpoint: &Endpoint, pattern: Pattern, config: &HandshakeConfig) -> Result<Halves> {
    let stream = framebus_transport::connect(endpoint)?;
    let reader_stream = stream.try_clone()?;

    let frame_config = FrameConfig {
        max_payload_size: config.max_handshake_payload,
        read_timeout: socket_timeout(config.timeout),
        write_timeout: socket_timeout(config.timeout),
    };
    let mut reader = FrameReader::with_config_ipc(reader_stream, frame_config.clone())?;
    let mut writer = FrameWriter::with_config_ipc(stream, frame_config)?;

    let remote = handshake_connect(&mut reader, &mut writer, pattern, config)?;
    // Greetings use a tighter budget; messages get the runtime limit.
    reader.set_max_payload_size(DEFAULT_MAX_PAYLOAD);
    writer.set_max_payload_size(DEFAULT_MAX_PAYLOAD);
    debug!(%endpoint, local = %pattern, remote = %remote.pattern, "socket connected");
    Ok((reader, writer))
}

/// Close without lingering: unsent bytes are discarded and the peer sees a reset.
fn close_stream(stream: &IpcStream) {
    if let Err(err) = stream.set_zero_linger() {
        debug!(error = %err, "failed to disable linger");
    }
    if let Err(err) = stream.shutdown() {
        debug!(error = %err, "socket shutdown failed");
    }
}

/// Blocking request socket: strict send/receive alternation.
pub struct ReqSocket {
    endpoint: Endpoint,
    reader: FrameReader<IpcStream>,
    writer: FrameWriter<IpcStream>,
    awaiting_reply: bool,
}

impl ReqSocket {
    /// Connect to a reply socket and exchange greetings.
    pub fn connect(endpoint: &Endpoint, config: &HandshakeConfig) -> Result<Self> {
        let (reader, writer) = connect_framed(endpoint, Pattern::Req, config)?;
        Ok(Self {
            endpoint: endpoint.clone(),
            reader,
            writer,
            awaiting_reply: false,
        })
    }

    /// Send one request and wait up to `timeout` for its reply.
    ///
    /// After any error the socket is unusable: a reply may still be in
    /// flight, so later calls fail with [`EndpointError::ReplyOutstanding`].
    pub fn request(&mut self, request: &Message, timeout: Duration) -> Result<Message> {
        if self.awaiting_reply {
            return Err(EndpointError::ReplyOutstanding);
        }

        let payload = codec::encode(request)?;
        self.writer.get_ref().set_write_timeout(socket_timeout(timeout))?;
        self.awaiting_reply = true;
        self.writer.send(MESSAGE, &payload)?;

        self.reader.set_read_timeout(socket_timeout(timeout))?;
        let frame = match self.reader.read_frame() {
            Ok(frame) => frame,
            Err(FrameError::Timeout) => return Err(EndpointError::Timeout(timeout)),
            Err(FrameError::ConnectionClosed) => return Err(EndpointError::Disconnected),
            Err(err) => return Err(err.into()),
        };
        if frame.kind != MESSAGE {
            return Err(EndpointError::UnexpectedFrame(frame.kind));
        }

        self.awaiting_reply = false;
        Ok(codec::decode(&frame.payload))
    }

    /// True while a reply is owed to this socket.
    pub fn awaiting_reply(&self) -> bool {
        self.awaiting_reply
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Close immediately, discarding anything unsent.
    pub fn close(self) {
        close_stream(self.writer.get_ref());
    }
}

/// Blocking subscription socket.
pub struct SubSocket {
    endpoint: Endpoint,
    reader: FrameReader<IpcStream>,
    control: IpcStream,
}

impl SubSocket {
    /// Connect to a publish socket; `poll_interval` bounds each [`recv`](Self::recv).
    ///
    /// When this returns, the publisher has registered the subscription.
    pub fn connect(
        endpoint: &Endpoint,
        poll_interval: Duration,
        config: &HandshakeConfig,
    ) -> Result<Self> {
        let (mut reader, writer) = connect_framed(endpoint, Pattern::Sub, config)?;
        reader.set_read_timeout(socket_timeout(poll_interval))?;
        Ok(Self {
            endpoint: endpoint.clone(),
            reader,
            control: writer.into_inner(),
        })
    }

    /// Wait one poll interval for a notification.
    ///
    /// `Ok(None)` means nothing arrived in time.
    pub fn recv(&mut self) -> Result<Option<Message>> {
        match self.reader.read_frame() {
            Ok(frame) if frame.kind == MESSAGE => Ok(Some(codec::decode(&frame.payload))),
            Ok(frame) => Err(EndpointError::UnexpectedFrame(frame.kind)),
            Err(FrameError::Timeout) => Ok(None),
            Err(FrameError::ConnectionClosed) => Err(EndpointError::Disconnected),
            Err(err) => Err(err.into()),
        }
    }

    /// A second handle on the stream; shutting it down unblocks `recv`.
    pub fn shutdown_handle(&self) -> Result<IpcStream> {
        Ok(self.control.try_clone()?)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Close immediately.
    pub fn close(self) {
        close_stream(&self.control);
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use framebus_frame::GREETING;
    use framebus_transport::Listener;
    use serde_json::json;

    use super::*;
    use crate::handshake::handshake_accept;

    fn bind() -> (Listener, Endpoint) {
        let listener = Listener::bind(&"tcp://127.0.0.1:0".parse().expect("endpoint"))
            .expect("listener should bind");
        let endpoint = listener.local_endpoint().clone();
        (listener, endpoint)
    }

    fn accept_framed(listener: &Listener, pattern: Pattern) -> Halves {
        let stream = listener.accept().expect("accept");
        let mut reader = FrameReader::new(stream.try_clone().expect("clone"));
        let mut writer = FrameWriter::new(stream);
        handshake_accept(&mut reader, &mut writer, pattern, &HandshakeConfig::default())
            .expect("server handshake");
        (reader, writer)
    }

    #[test]
    fn request_returns_reply() {
        let (listener, endpoint) = bind();
        let server = thread::spawn(move || {
            let (mut reader, mut writer) = accept_framed(&listener, Pattern::Rep);
            let frame = reader.read_frame().expect("request frame");
            let request = codec::decode(&frame.payload);
            let reply = Message::ok(request.get("x").cloned().unwrap_or_default());
            writer
                .send(MESSAGE, &codec::encode(&reply).expect("encode"))
                .expect("reply");
        });

        let mut socket =
            ReqSocket::connect(&endpoint, &HandshakeConfig::default()).expect("connect");
        let reply = socket
            .request(
                &Message::request("GENERAL").with("x", 7),
                Duration::from_secs(2),
            )
            .expect("request");
        assert_eq!(reply.response(), Some(&json!(7)));
        assert!(!socket.awaiting_reply());
        server.join().expect("server thread");
    }

    #[test]
    fn timeout_leaves_reply_outstanding() {
        let (listener, endpoint) = bind();
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
        let server = thread::spawn(move || {
            let (mut reader, _writer) = accept_framed(&listener, Pattern::Rep);
            let _ = reader.read_frame();
            let _ = done_rx.recv();
        });

        let mut socket =
            ReqSocket::connect(&endpoint, &HandshakeConfig::default()).expect("connect");
        let err = socket
            .request(&Message::request("GENERAL"), Duration::from_millis(50))
            .unwrap_err();
        assert!(err.is_timeout());

        let err = socket
            .request(&Message::request("GENERAL"), Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(err, EndpointError::ReplyOutstanding));

        socket.close();
        done_tx.send(()).expect("release server");
        server.join().expect("server thread");
    }

    #[test]
    fn connect_to_wrong_pattern_fails() {
        let (listener, endpoint) = bind();
        let server = thread::spawn(move || {
            let stream = listener.accept().expect("accept");
            let mut reader = FrameReader::new(stream.try_clone().expect("clone"));
            let mut writer = FrameWriter::new(stream);
            handshake_accept(&mut reader, &mut writer, Pattern::Pub, &HandshakeConfig::default())
        });

        let result = ReqSocket::connect(&endpoint, &HandshakeConfig::default());
        assert!(result.is_err());
        assert!(server.join().expect("server thread").is_err());
    }

    #[test]
    fn sub_recv_polls_and_receives() {
        let (listener, endpoint) = bind();
        let (go_tx, go_rx) = std::sync::mpsc::channel::<()>();
        let server = thread::spawn(move || {
            let (_reader, mut writer) = accept_framed(&listener, Pattern::Pub);
            go_rx.recv().expect("go signal");
            let note = Message::notification("NTF_FRAME").with("index", 1);
            writer
                .send(MESSAGE, &codec::encode(&note).expect("encode"))
                .expect("publish");
            writer
        });

        let mut socket = SubSocket::connect(
            &endpoint,
            Duration::from_millis(20),
            &HandshakeConfig::default(),
        )
        .expect("connect");
        assert!(socket.recv().expect("poll").is_none());

        go_tx.send(()).expect("signal");
        let mut received = None;
        for _ in 0..100 {
            if let Some(msg) = socket.recv().expect("recv") {
                received = Some(msg);
                break;
            }
        }
        let msg = received.expect("notification should arrive");
        assert_eq!(msg.get("index"), Some(&json!(1)));

        let _writer = server.join().expect("server thread");
        socket.close();
    }

    #[test]
    fn sub_recv_rejects_stray_greeting() {
        let (listener, endpoint) = bind();
        let server = thread::spawn(move || {
            let (_reader, mut writer) = accept_framed(&listener, Pattern::Pub);
            writer.send(GREETING, b"{}").expect("stray greeting");
            writer
        });

        let mut socket = SubSocket::connect(
            &endpoint,
            Duration::from_millis(500),
            &HandshakeConfig::default(),
        )
        .expect("connect");
        let _writer = server.join().expect("server thread");
        assert!(matches!(
            socket.recv(),
            Err(EndpointError::UnexpectedFrame(GREETING))
        ));
    }

    #[test]
    fn shutdown_handle_unblocks_recv() {
        let (listener, endpoint) = bind();
        let server = thread::spawn(move || accept_framed(&listener, Pattern::Pub));

        let socket = SubSocket::connect(
            &endpoint,
            Duration::from_secs(10),
            &HandshakeConfig::default(),
        )
        .expect("connect");
        let _halves = server.join().expect("server thread");

        let handle = socket.shutdown_handle().expect("handle");
        let listener_thread = thread::spawn(move || {
            let mut socket = socket;
            socket.recv()
        });
        thread::sleep(Duration::from_millis(50));
        handle.shutdown().expect("shutdown");

        let result = listener_thread.join().expect("listener thread");
        assert!(matches!(result, Err(EndpointError::Disconnected)));
    }
}
