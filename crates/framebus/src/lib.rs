//! Request/reply and publish/subscribe messaging with rule-driven configuration.
//!
//! # Crate Structure
//!
//! - [`transport`]: `tcp://` and `ipc://` endpoints, listeners and streams
//! - [`frame`]: Length-prefixed frames with a frame kind
//! - [`endpoint`]: Server, clients and the JSON message model (behind `endpoint` feature)
//! - [`schema`]: Optional JSON Schema validation of requests (behind `schema` feature)
//! - [`config`]: Rule-driven parameter loading (behind `config` feature)

/// Re-export transport types.
pub mod transport {
    pub use framebus_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use framebus_frame::*;
}

/// Re-export endpoint types (requires `endpoint` feature).
#[cfg(feature = "endpoint")]
pub mod endpoint {
    pub use framebus_endpoint::*;
}

/// Re-export schema types (requires `schema` feature).
#[cfg(feature = "schema")]
pub mod schema {
    pub use framebus_schema::*;
}

/// Re-export configuration types (requires `config` feature).
#[cfg(feature = "config")]
pub mod config {
    pub use framebus_config::*;
}
