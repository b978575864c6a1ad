//! Optional JSON Schema validation of framebus requests.
//!
//! Schemas are keyed by the message `type` field. A server holding a
//! [`SchemaRegistry`] rejects requests that violate the schema for their
//! type before the request handler sees them.

pub mod config;
pub mod error;
pub mod registry;
mod strict;

pub use config::RegistryConfig;
pub use error::{Result, SchemaError};
pub use registry::SchemaRegistry;
