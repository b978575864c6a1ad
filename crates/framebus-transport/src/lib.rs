//! Endpoint addressing and stream transports.
//!
//! Provides a unified interface over the local transport mechanisms a
//! framebus endpoint can bind to:
//! - TCP sockets (`tcp://host:port`)
//! - Unix domain sockets (`ipc:///path`, Linux/macOS)
//!
//! This is the lowest layer of framebus. Framing and socket patterns build
//! on the [`IpcStream`] (blocking) and `AsyncStream` (tokio) types here.

pub mod endpoint;
pub mod error;
pub mod listener;
pub mod traits;

#[cfg(unix)]
mod linger;

#[cfg(unix)]
pub mod uds;

#[cfg(feature = "async")]
pub mod async_io;

pub use endpoint::{Endpoint, DEFAULT_PUBLISH_ENDPOINT, DEFAULT_REPLY_ENDPOINT};
pub use error::{Result, TransportError};
pub use listener::{connect, Listener};
pub use traits::IpcStream;

#[cfg(unix)]
pub use uds::UnixDomainSocket;

#[cfg(feature = "async")]
pub use async_io::{connect_async, AsyncListener, AsyncStream};
