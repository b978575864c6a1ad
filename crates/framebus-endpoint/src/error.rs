use std::time::Duration;

/// Errors that can occur in endpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] framebus_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] framebus_frame::FrameError),

    /// Greeting exchange failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A value that is not a JSON object was offered as a message.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A frame of an unexpected kind arrived.
    #[error("unexpected frame kind {0}")]
    UnexpectedFrame(u16),

    /// No reply arrived within the deadline.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// A previous request is still waiting for its reply; the socket must be recreated.
    #[error("previous request still awaiting its reply")]
    ReplyOutstanding,

    /// The peer closed the connection.
    #[error("peer disconnected")]
    Disconnected,

    /// Schema validation error.
    #[cfg(feature = "schema")]
    #[error("schema validation error: {0}")]
    Schema(#[from] framebus_schema::SchemaError),
}

impl EndpointError {
    /// True when the error only means "nothing arrived yet".
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            EndpointError::Timeout(_) | EndpointError::Frame(framebus_frame::FrameError::Timeout)
        )
    }
}

pub type Result<T> = std::result::Result<T, EndpointError>;
