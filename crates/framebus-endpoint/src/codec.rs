//! Message wire codec: one message is the UTF-8 JSON text of its object.
//!
//! Message boundaries come from the frame layer; this codec adds no
//! framing, length prefix or checksum of its own.

use bytes::Bytes;
use tracing::debug;

use crate::error::Result;
use crate::message::Message;

/// Serialize a message to its wire payload.
pub fn encode(message: &Message) -> Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(message)?))
}

/// Deserialize a wire payload, failing on anything that is not a JSON object.
pub fn try_decode(payload: &[u8]) -> Result<Message> {
    let value: serde_json::Value = serde_json::from_slice(payload)?;
    Message::from_value(value)
}

/// Deserialize a wire payload.
///
/// Undecodable input becomes `{"status":"error","message":"Invalid message format"}`.
pub fn decode(payload: &[u8]) -> Message {
    match try_decode(payload) {
        Ok(message) => message,
        Err(err) => {
            debug!(error = %err, size = payload.len(), "undecodable message payload");
            Message::invalid_format()
        }
    }
}
