use std::collections::BTreeMap;
use std::fs::{File, Metadata};
use std::io::Read;
use std::path::Path;

use jsonschema::Validator;
use serde_json::Value;
use tracing::debug;

use crate::config::RegistryConfig;
use crate::error::{Result, SchemaError};
use crate::strict::forbid_additional_properties;

const SCHEMA_SUFFIX: &str = ".schema.json";
const TYPE_KEY: &str = "type";
const MAX_REPORTED_ERRORS: usize = 4;

/// Registry of compiled JSON Schema validators keyed by message type.
pub struct SchemaRegistry {
    validators: BTreeMap<String, Validator>,
    config: RegistryConfig,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            validators: BTreeMap::new(),
            config,
        }
    }

    /// Register the schema for `message_type` from JSON text.
    pub fn register(&mut self, message_type: &str, schema_json: &str) -> Result<()> {
        let schema: Value = serde_json::from_str(schema_json)?;
        self.register_value(message_type, &schema)
    }

    /// Register the schema for `message_type`, replacing any earlier one.
    pub fn register_value(&mut self, message_type: &str, schema: &Value) -> Result<()> {
        let mut schema = schema.clone();
        if self.config.strict_mode {
            forbid_additional_properties(&mut schema);
        }

        let compiled = jsonschema::validator_for(&schema)
            .map_err(|err| SchemaError::CompileFailed(format!("{message_type}: {err}")))?;
        self.validators.insert(message_type.to_string(), compiled);
        Ok(())
    }

    /// Registry built from `(type, schema)` pairs.
    pub fn from_embedded(schemas: &[(&str, &str)]) -> Result<Self> {
        let mut registry = Self::new();
        for (message_type, schema) in schemas {
            registry.register(message_type, schema)?;
        }
        Ok(registry)
    }

    pub fn from_directory(path: &Path) -> Result<Self> {
        Self::from_directory_with_config(path, RegistryConfig::default())
    }

    /// Load every `<TYPE>.schema.json` regular file in `path`.
    ///
    /// Other files are skipped. Symlinked schema files, names that are not
    /// a valid message type, and files over the size limit are errors.
    pub fn from_directory_with_config(path: &Path, config: RegistryConfig) -> Result<Self> {
        let mut registry = Self::with_config(config);

        let entries = std::fs::read_dir(path)
            .map_err(|err| SchemaError::LoadFailed(format!("{}: {err}", path.display())))?;

        for entry in entries {
            let entry = entry.map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(stem) = file_name.strip_suffix(SCHEMA_SUFFIX) else {
                continue;
            };

            let entry_path = entry.path();
            let link_meta = std::fs::symlink_metadata(&entry_path)
                .map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
            if link_meta.file_type().is_symlink() {
                return Err(SchemaError::LoadFailed(format!(
                    "refusing to load schema symlink: {file_name}"
                )));
            }
            if !link_meta.is_file() {
                continue;
            }
            if !is_message_type(stem) {
                return Err(SchemaError::LoadFailed(format!(
                    "schema file name is not a message type: {file_name}"
                )));
            }

            if registry.validators.len() >= registry.config.max_schemas_from_directory {
                return Err(SchemaError::LoadFailed(format!(
                    "more than {} schemas in {}",
                    registry.config.max_schemas_from_directory,
                    path.display()
                )));
            }

            let content = read_limited(&entry_path, &link_meta, registry.config.max_schema_file_size)?;
            registry.register(stem, &content)?;
            debug!(message_type = stem, file = %entry_path.display(), "loaded schema");
        }

        Ok(registry)
    }

    /// Validate a decoded message against the schema for its `type`.
    pub fn validate(&self, message: &Value) -> Result<()> {
        let Some(message_type) = message.get(TYPE_KEY).and_then(Value::as_str) else {
            return if self.config.fail_on_missing_schema {
                Err(SchemaError::MissingType)
            } else {
                Ok(())
            };
        };

        let Some(validator) = self.validators.get(message_type) else {
            return if self.config.fail_on_missing_schema {
                Err(SchemaError::NoSchema(message_type.to_string()))
            } else {
                Ok(())
            };
        };

        let mut errors = validator.iter_errors(message);
        let Some(first) = errors.next() else {
            return Ok(());
        };
        let mut text = first.to_string();
        for err in errors.take(MAX_REPORTED_ERRORS - 1) {
            text.push_str("; ");
            text.push_str(&err.to_string());
        }
        Err(SchemaError::ValidationFailed {
            message_type: message_type.to_string(),
            message: text,
        })
    }

    /// Validate a raw JSON payload.
    pub fn validate_bytes(&self, payload: &[u8]) -> Result<()> {
        let value: Value = serde_json::from_slice(payload)?;
        self.validate(&value)
    }

    pub fn has_schema(&self, message_type: &str) -> bool {
        self.validators.contains_key(message_type)
    }

    /// Registered message types, sorted.
    pub fn message_types(&self) -> Vec<&str> {
        self.validators.keys().map(String::as_str).collect()
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn is_message_type(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn read_limited(path: &Path, link_meta: &Metadata, max_bytes: usize) -> Result<String> {
    let file = File::open(path).map_err(|err| {
        SchemaError::LoadFailed(format!("failed opening schema {}: {err}", path.display()))
    })?;
    let opened = file
        .metadata()
        .map_err(|err| SchemaError::LoadFailed(err.to_string()))?;

    #[cfg(unix)]
    {
        if !same_file(link_meta, &opened) {
            return Err(SchemaError::LoadFailed(format!(
                "schema file replaced during load: {}",
                path.display()
            )));
        }
    }
    #[cfg(not(unix))]
    let _ = link_meta;

    if opened.len() > max_bytes as u64 {
        return Err(SchemaError::LoadFailed(format!(
            "schema file too large ({} bytes): {}",
            opened.len(),
            path.display()
        )));
    }

    let mut content = String::new();
    file.take(max_bytes as u64 + 1)
        .read_to_string(&mut content)
        .map_err(|err| {
            SchemaError::LoadFailed(format!("failed reading schema {}: {err}", path.display()))
        })?;
    if content.len() > max_bytes {
        return Err(SchemaError::LoadFailed(format!(
            "schema file grew past the limit while reading: {}",
            path.display()
        )));
    }
    Ok(content)
}

#[cfg(unix)]
fn same_file(a: &Metadata, b: &Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    a.dev() == b.dev() && a.ino() == b.ino()
}
