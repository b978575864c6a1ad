use std::net::{TcpListener, TcpStream};

use tracing::{debug, info};

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};
use crate::traits::IpcStream;
#[cfg(unix)]
use crate::uds::UnixDomainSocket;

/// A bound, listening endpoint (blocking).
pub struct Listener {
    inner: ListenerInner,
    endpoint: Endpoint,
}

pub(crate) enum ListenerInner {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixDomainSocket),
}

impl Listener {
    /// Bind and listen on `endpoint`.
    ///
    /// For TCP endpoints with port `0` the resolved port is reported by
    /// [`Listener::local_endpoint`].
    pub fn bind(endpoint: &Endpoint) -> Result<Self> {
        match endpoint {
            Endpoint::Tcp(authority) => {
                let listener =
                    TcpListener::bind(authority.as_str()).map_err(|e| TransportError::Bind {
                        endpoint: endpoint.to_string(),
                        source: e,
                    })?;
                let resolved = listener
                    .local_addr()
                    .map(|addr| Endpoint::tcp(addr.to_string()))
                    .map_err(|e| TransportError::Bind {
                        endpoint: endpoint.to_string(),
                        source: e,
                    })?;
                info!(endpoint = %resolved, "listening on tcp");
                Ok(Self {
                    inner: ListenerInner::Tcp(listener),
                    endpoint: resolved,
                })
            }
            #[cfg(unix)]
            Endpoint::Ipc(path) => Ok(Self {
                inner: ListenerInner::Unix(UnixDomainSocket::bind(path)?),
                endpoint: endpoint.clone(),
            }),
            #[cfg(not(unix))]
            Endpoint::Ipc(_) => Err(TransportError::UnsupportedScheme("ipc".to_string())),
        }
    }

    /// Accept an incoming connection (blocking).
    ///
    /// For thread-per-connection servers and blocking test peers; tokio
    /// servers go through `AsyncListener::bind`.
    pub fn accept(&self) -> Result<IpcStream> {
        match &self.inner {
            ListenerInner::Tcp(listener) => {
                let (stream, peer) = listener.accept().map_err(TransportError::Accept)?;
                debug!(%peer, "accepted tcp connection");
                Ok(IpcStream::from_tcp(stream))
            }
            #[cfg(unix)]
            ListenerInner::Unix(socket) => socket.accept(),
        }
    }

    /// The endpoint this listener is actually bound to.
    pub fn local_endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    #[cfg(feature = "async")]
    pub(crate) fn into_parts(self) -> (ListenerInner, Endpoint) {
        (self.inner, self.endpoint)
    }
}

/// Connect to a listening endpoint (blocking).
pub fn connect(endpoint: &Endpoint) -> Result<IpcStream> {
    match endpoint {
        Endpoint::Tcp(authority) => {
            let stream =
                TcpStream::connect(authority.as_str()).map_err(|e| TransportError::Connect {
                    endpoint: endpoint.to_string(),
                    source: e,
                })?;
            debug!(%endpoint, "connected over tcp");
            Ok(IpcStream::from_tcp(stream))
        }
        #[cfg(unix)]
        Endpoint::Ipc(path) => UnixDomainSocket::connect(path),
        #[cfg(not(unix))]
        Endpoint::Ipc(_) => Err(TransportError::UnsupportedScheme("ipc".to_string())),
    }
}
