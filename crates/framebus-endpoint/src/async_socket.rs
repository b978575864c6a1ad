//! Tokio REQ and SUB sockets.

use std::time::Duration;

use framebus_frame::{Frame, FrameCodec, FrameError, DEFAULT_MAX_PAYLOAD, MESSAGE};
use framebus_transport::{connect_async, AsyncStream, Endpoint};
use futures_util::{SinkExt, StreamExt};
use tokio_util::codec::Framed;
use tracing::debug;

use crate::codec;
use crate::error::{EndpointError, Result};
use crate::handshake::{nonblocking, HandshakeConfig, Pattern};
use crate::message::Message;

async fn connect_framed(
    endpoint: &Endpoint,
    pattern: Pattern,
    config: &HandshakeConfig,
) -> Result<Framed<AsyncStream, FrameCodec>> {
    let stream = connect_async(endpoint).await?;
    let mut framed = Framed::new(stream, FrameCodec::with_max_payload(DEFAULT_MAX_PAYLOAD));
    let remote = nonblocking::handshake_connect(&mut framed, pattern, config).await?;
    debug!(%endpoint, local = %pattern, remote = %remote.pattern, "socket connected");
    Ok(framed)
}

fn close_framed(framed: Framed<AsyncStream, FrameCodec>) {
    if let Err(err) = framed.get_ref().set_zero_linger() {
        debug!(error = %err, "failed to disable linger");
    }
}

fn to_message(next: Option<std::result::Result<Frame, FrameError>>) -> Result<Message> {
    match next {
        Some(Ok(frame)) if frame.kind == MESSAGE => Ok(codec::decode(&frame.payload)),
        Some(Ok(frame)) => Err(EndpointError::UnexpectedFrame(frame.kind)),
        Some(Err(FrameError::ConnectionClosed)) | None => Err(EndpointError::Disconnected),
        Some(Err(err)) => Err(err.into()),
    }
}

/// Cooperative request socket.
pub struct AsyncReqSocket {
    framed: Framed<AsyncStream, FrameCodec>,
    awaiting_reply: bool,
}

impl AsyncReqSocket {
    pub async fn connect(endpoint: &Endpoint, config: &HandshakeConfig) -> Result<Self> {
        Ok(Self {
            framed: connect_framed(endpoint, Pattern::Req, config).await?,
            awaiting_reply: false,
        })
    }

    /// Send one request and wait up to `timeout` for its reply.
    ///
    /// Any error, or dropping the future mid-flight, leaves the socket
    /// awaiting a reply; it must then be recreated.
    pub async fn request(&mut self, request: &Message, timeout: Duration) -> Result<Message> {
        if self.awaiting_reply {
            return Err(EndpointError::ReplyOutstanding);
        }

        let payload = codec::encode(request)?;
        self.awaiting_reply = true;
        let exchange = async {
            self.framed.send(Frame::message(payload)).await?;
            to_message(self.framed.next().await)
        };
        let reply = match tokio::time::timeout(timeout, exchange).await {
            Ok(reply) => reply?,
            Err(_) => return Err(EndpointError::Timeout(timeout)),
        };
        self.awaiting_reply = false;
        Ok(reply)
    }

    pub fn awaiting_reply(&self) -> bool {
        self.awaiting_reply
    }

    /// Close immediately, discarding anything unsent.
    pub fn close(self) {
        close_framed(self.framed);
    }
}

/// Cooperative subscription socket.
pub struct AsyncSubSocket {
    framed: Framed<AsyncStream, FrameCodec>,
}

impl AsyncSubSocket {
    /// When this resolves, the publisher has registered the subscription.
    pub async fn connect(endpoint: &Endpoint, config: &HandshakeConfig) -> Result<Self> {
        Ok(Self {
            framed: connect_framed(endpoint, Pattern::Sub, config).await?,
        })
    }

    /// Next notification. Cancel-safe.
    pub async fn recv(&mut self) -> Result<Message> {
        to_message(self.framed.next().await)
    }

    /// Wait at most `poll` for a notification; `Ok(None)` when none arrived.
    pub async fn recv_timeout(&mut self, poll: Duration) -> Result<Option<Message>> {
        match tokio::time::timeout(poll, self.recv()).await {
            Ok(message) => message.map(Some),
            Err(_) => Ok(None),
        }
    }

    pub fn close(self) {
        close_framed(self.framed);
    }
}
