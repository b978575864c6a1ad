#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// Reading a schema file or directory failed, or a file was refused.
    #[error("schema load: {0}")]
    LoadFailed(String),

    #[error("schema compile: {0}")]
    CompileFailed(String),

    /// Displayed as `<TYPE>: <reasons>`; this text goes back to the client.
    #[error("{message_type}: {message}")]
    ValidationFailed {
        message_type: String,
        message: String,
    },

    #[error("not JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("request has no string 'type'")]
    MissingType,

    #[error("no schema for type '{0}'")]
    NoSchema(String),
}

pub type Result<T> = std::result::Result<T, SchemaError>;
