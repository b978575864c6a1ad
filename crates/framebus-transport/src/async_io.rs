//! Tokio variants of the transport types (requires the `async` feature).

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tracing::debug;

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};
use crate::listener::{Listener, ListenerInner};
#[cfg(unix)]
use crate::uds::UnixDomainSocket;

/// A bound, listening endpoint driven by tokio.
pub struct AsyncListener {
    inner: AsyncListenerInner,
    endpoint: Endpoint,
}

enum AsyncListenerInner {
    Tcp(tokio::net::TcpListener),
    #[cfg(unix)]
    Unix {
        listener: tokio::net::UnixListener,
        // Held for socket file cleanup on drop.
        _socket: UnixDomainSocket,
    },
}

impl AsyncListener {
    /// Bind and listen on `endpoint`. Must be called inside a tokio runtime.
    pub fn bind(endpoint: &Endpoint) -> Result<Self> {
        let (inner, endpoint) = Listener::bind(endpoint)?.into_parts();
        let inner = match inner {
            ListenerInner::Tcp(listener) => {
                listener.set_nonblocking(true)?;
                AsyncListenerInner::Tcp(tokio::net::TcpListener::from_std(listener)?)
            }
            #[cfg(unix)]
            ListenerInner::Unix(socket) => {
                let listener = socket.try_clone_listener()?;
                listener.set_nonblocking(true)?;
                AsyncListenerInner::Unix {
                    listener: tokio::net::UnixListener::from_std(listener)?,
                    _socket: socket,
                }
            }
        };
        Ok(Self { inner, endpoint })
    }

    /// Accept the next incoming connection.
    pub async fn accept(&self) -> Result<AsyncStream> {
        match &self.inner {
            AsyncListenerInner::Tcp(listener) => {
                let (stream, peer) = listener.accept().await.map_err(TransportError::Accept)?;
                let _ = stream.set_nodelay(true);
                debug!(%peer, "accepted tcp connection");
                Ok(AsyncStream::Tcp(stream))
            }
            #[cfg(unix)]
            AsyncListenerInner::Unix { listener, .. } => {
                let (stream, _addr) = listener.accept().await.map_err(TransportError::Accept)?;
                debug!(endpoint = %self.endpoint, "accepted unix connection");
                Ok(AsyncStream::Unix(stream))
            }
        }
    }

    /// The endpoint this listener is actually bound to.
    pub fn local_endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

/// Connect to a listening endpoint asynchronously.
pub async fn connect_async(endpoint: &Endpoint) -> Result<AsyncStream> {
    let connect_error = |source| TransportError::Connect {
        endpoint: endpoint.to_string(),
        source,
    };
    match endpoint {
        Endpoint::Tcp(authority) => {
            let stream = TcpStream::connect(authority.as_str())
                .await
                .map_err(connect_error)?;
            let _ = stream.set_nodelay(true);
            debug!(%endpoint, "connected over tcp");
            Ok(AsyncStream::Tcp(stream))
        }
        #[cfg(unix)]
        Endpoint::Ipc(path) => {
            let stream = tokio::net::UnixStream::connect(path)
                .await
                .map_err(connect_error)?;
            debug!(%endpoint, "connected to unix domain socket");
            Ok(AsyncStream::Unix(stream))
        }
        #[cfg(not(unix))]
        Endpoint::Ipc(_) => Err(TransportError::UnsupportedScheme("ipc".to_string())),
    }
}

/// A connected tokio stream over TCP or a Unix domain socket.
#[derive(Debug)]
pub enum AsyncStream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(tokio::net::UnixStream),
}

impl AsyncStream {
    /// Discard unsent data when the stream is closed instead of lingering.
    pub fn set_zero_linger(&self) -> Result<()> {
        match self {
            #[cfg(unix)]
            AsyncStream::Tcp(stream) => {
                use std::os::fd::AsRawFd;
                crate::linger::set_zero_linger(stream.as_raw_fd())
            }
            #[cfg(not(unix))]
            AsyncStream::Tcp(_) => Ok(()),
            #[cfg(unix)]
            AsyncStream::Unix(_) => Ok(()),
        }
    }
}

impl AsyncRead for AsyncStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            AsyncStream::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(unix)]
            AsyncStream::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for AsyncStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            AsyncStream::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(unix)]
            AsyncStream::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            AsyncStream::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(unix)]
            AsyncStream::Unix(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            AsyncStream::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(unix)]
            AsyncStream::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}
