//! Request/reply and publish/subscribe endpoints.
//!
//! A [`Server`] owns a reply socket and a publish socket. Requests are
//! answered strictly one at a time by a [`RequestHandler`]; notifications
//! fan out to every attached subscriber. [`Client`] is the blocking
//! counterpart, [`AsyncClient`] the tokio one.
//!
//! Messages are JSON objects carried in MESSAGE frames. A connection opens
//! with a GREETING exchange naming the messaging pattern of each side.

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod handshake;
pub mod message;
pub mod socket;

#[cfg(feature = "async")]
pub mod async_client;
#[cfg(feature = "async")]
pub mod async_socket;
#[cfg(feature = "async")]
pub mod publisher;
#[cfg(feature = "async")]
pub mod server;

pub use client::{Client, NotificationCallback, RequestFailure};
pub use config::{
    ClientConfig, ServerConfig, DEFAULT_ERROR_BACKOFF, DEFAULT_POLL_INTERVAL,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_SHUTDOWN_GRACE, DEFAULT_SUBSCRIBER_QUEUE,
};
pub use error::{EndpointError, Result};
pub use handler::{HandlerError, RequestHandler};
pub use handshake::{Greeting, HandshakeConfig, Pattern, PROTOCOL_NAME, PROTOCOL_VERSION};
pub use message::{Message, MessageType, Status};
pub use socket::{ReqSocket, SubSocket};

#[cfg(feature = "async")]
pub use async_client::AsyncClient;
#[cfg(feature = "async")]
pub use async_socket::{AsyncReqSocket, AsyncSubSocket};
#[cfg(feature = "async")]
pub use publisher::Publisher;
#[cfg(feature = "async")]
pub use server::Server;

pub use framebus_transport::Endpoint;
