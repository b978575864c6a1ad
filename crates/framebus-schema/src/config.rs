/// Loading limits and validation policy for a [`crate::SchemaRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Close object schemas that leave `additionalProperties` unset.
    pub strict_mode: bool,
    /// Reject requests with no `type`, or a `type` nobody registered.
    /// Off by default: such requests pass through unchecked.
    pub fail_on_missing_schema: bool,
    pub max_schemas_from_directory: usize,
    /// Per file, in bytes.
    pub max_schema_file_size: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            strict_mode: false,
            fail_on_missing_schema: false,
            max_schemas_from_directory: 256,
            max_schema_file_size: 256 * 1024,
        }
    }
}
