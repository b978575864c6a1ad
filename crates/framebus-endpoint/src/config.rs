use std::time::Duration;

use framebus_frame::DEFAULT_MAX_PAYLOAD;
use framebus_transport::{Endpoint, DEFAULT_PUBLISH_ENDPOINT, DEFAULT_REPLY_ENDPOINT};

use crate::handshake::HandshakeConfig;

/// Default client receive timeout for one request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);
/// Default notification listener poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Default grace period before background work is cancelled forcibly.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);
/// Default pause after a failed request handler.
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_millis(100);
/// Default per-subscriber notification queue depth.
pub const DEFAULT_SUBSCRIBER_QUEUE: usize = 1024;

/// Server-side endpoint configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Endpoint the reply socket binds.
    pub reply: Endpoint,
    /// Endpoint the publish socket binds.
    pub publish: Endpoint,
    /// Notifications buffered per subscriber before new ones are dropped.
    pub subscriber_queue: usize,
    /// Pause after a handler failure, taken while holding the reply lock.
    pub error_backoff: Duration,
    /// How long `disconnect` waits before aborting background tasks.
    pub shutdown_grace: Duration,
    /// Largest accepted message payload in bytes.
    pub max_payload: usize,
    pub handshake: HandshakeConfig,
}

impl ServerConfig {
    /// Configuration for the given endpoints with default tuning.
    pub fn new(reply: Endpoint, publish: Endpoint) -> Self {
        Self {
            reply,
            publish,
            subscriber_queue: DEFAULT_SUBSCRIBER_QUEUE,
            error_backoff: DEFAULT_ERROR_BACKOFF,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            max_payload: DEFAULT_MAX_PAYLOAD,
            handshake: HandshakeConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(
            Endpoint::tcp(DEFAULT_REPLY_ENDPOINT.trim_start_matches("tcp://")),
            Endpoint::tcp(DEFAULT_PUBLISH_ENDPOINT.trim_start_matches("tcp://")),
        )
    }
}

/// Client-side endpoint configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server reply endpoint the request socket connects to.
    pub reply: Endpoint,
    /// Server publish endpoint the subscription socket connects to.
    pub publish: Endpoint,
    /// Receive deadline for one request.
    pub timeout: Duration,
    /// Listener poll deadline; shutdown is noticed within one interval.
    pub poll_interval: Duration,
    /// How long stopping the listener waits before forcing it.
    pub shutdown_grace: Duration,
    pub handshake: HandshakeConfig,
}

impl ClientConfig {
    /// Configuration for the given endpoints with default tuning.
    pub fn new(reply: Endpoint, publish: Endpoint) -> Self {
        Self {
            reply,
            publish,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            handshake: HandshakeConfig::default(),
        }
    }

    /// Override the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        let server = ServerConfig::default();
        Self::new(server.reply, server.publish)
    }
}
