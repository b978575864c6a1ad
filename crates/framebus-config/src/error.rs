/// Fatal errors from rule evaluation or attribute access.
///
/// Per-attribute validation failures are not errors; they are collected as
/// [`AttributeError`](crate::AttributeError) records instead.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A callable rule value declared more than one parameter.
    #[error("More than 1 attribute is not allowed for validating lambdas")]
    CallableArity { attribute: String, arity: usize },

    /// A callable rule value failed.
    #[error("Exception when retrieve callable value for {attribute}")]
    Callable {
        attribute: String,
        #[source]
        source: crate::rule::CallableError,
    },

    /// A rule record is malformed.
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    /// The attribute is not declared on the object.
    #[error("unknown attribute '{0}'")]
    UnknownAttribute(String),

    /// The attribute was declared twice.
    #[error("attribute '{0}' declared more than once")]
    DuplicateAttribute(String),

    /// Attribute values could not be deserialized into the requested type.
    #[error("failed to extract settings: {0}")]
    Extract(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
