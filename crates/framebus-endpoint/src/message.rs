use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{EndpointError, Result};

/// Message discriminator key.
pub const TYPE_KEY: &str = "type";
/// Response status key (`"ok"` / `"error"`).
pub const STATUS_KEY: &str = "status";
/// Human-readable error text in error responses.
pub const MESSAGE_KEY: &str = "message";
/// Payload returned by `send_request`.
pub const RESPONSE_KEY: &str = "response";

/// Error text for a reply that could not be decoded.
pub const INVALID_MESSAGE_FORMAT: &str = "Invalid message format";
/// Error text returned when the server has no request handler.
pub const HANDLER_NOT_DEFINED: &str = "Handler is not defined";

/// Known message types agreed between the GUI and the processing server.
///
/// The transport never interprets these; any other string round-trips as
/// [`MessageType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageType {
    General,
    Metadata,
    Frame,
    NtfFrame,
    Other(String),
}

impl MessageType {
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::General => "GENERAL",
            MessageType::Metadata => "METADATA",
            MessageType::Frame => "FRAME",
            MessageType::NtfFrame => "NTF_FRAME",
            MessageType::Other(other) => other,
        }
    }
}

impl From<&str> for MessageType {
    fn from(value: &str) -> Self {
        match value {
            "GENERAL" => MessageType::General,
            "METADATA" => MessageType::Metadata,
            "FRAME" => MessageType::Frame,
            "NTF_FRAME" => MessageType::NtfFrame,
            other => MessageType::Other(other.to_string()),
        }
    }
}

impl FromStr for MessageType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(MessageType::from(s))
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::Error => "error",
        }
    }
}

/// A framebus message: a JSON object with a few reserved keys.
///
/// Requests carry `type`, responses always carry `status`, notifications
/// carry `type` and no `status`. Everything else is free-form payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(Map<String, Value>);

impl Message {
    /// An empty message.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// A request of the given type.
    pub fn request(message_type: impl Into<MessageType>) -> Self {
        Self::new().with(TYPE_KEY, message_type.into().as_str())
    }

    /// A notification of the given type.
    pub fn notification(message_type: impl Into<MessageType>) -> Self {
        Self::request(message_type)
    }

    /// A successful response carrying `response`.
    pub fn ok(response: impl Into<Value>) -> Self {
        Self::status_only(Status::Ok).with(RESPONSE_KEY, response)
    }

    /// A response with only a status field.
    pub fn status_only(status: Status) -> Self {
        Self::new().with(STATUS_KEY, status.as_str())
    }

    /// An error response with a human-readable message.
    pub fn error(text: impl Into<String>) -> Self {
        Self::status_only(Status::Error).with(MESSAGE_KEY, text.into())
    }

    /// The reply substituted for anything that fails to decode.
    pub fn invalid_format() -> Self {
        Self::error(INVALID_MESSAGE_FORMAT)
    }

    /// Builder-style field insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The `type` field, if it is a string.
    pub fn message_type(&self) -> Option<MessageType> {
        self.get(TYPE_KEY)
            .and_then(Value::as_str)
            .map(MessageType::from)
    }

    /// The `status` field, if it is `"ok"` or `"error"`.
    pub fn status(&self) -> Option<Status> {
        match self.get(STATUS_KEY).and_then(Value::as_str) {
            Some("ok") => Some(Status::Ok),
            Some("error") => Some(Status::Error),
            _ => None,
        }
    }

    /// True for a response whose status is `"ok"`.
    pub fn is_ok(&self) -> bool {
        self.status() == Some(Status::Ok)
    }

    /// The `response` payload.
    pub fn response(&self) -> Option<&Value> {
        self.get(RESPONSE_KEY)
    }

    /// The `message` text of an error response.
    pub fn error_message(&self) -> Option<&str> {
        self.get(MESSAGE_KEY).and_then(Value::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Generic mapping view of the message.
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Build a message from a generic value; only JSON objects are messages.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(EndpointError::InvalidMessage(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

impl From<Map<String, Value>> for Message {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Message {
    type Error = EndpointError;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(value)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.0) {
            Ok(text) => f.write_str(&text),
            Err(_) => f.write_str("{}"),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
