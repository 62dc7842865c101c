//! Interop options (`tandem.toml`)
//!
//! Options control which structural views the engine may create and how
//! diagnostics are rendered. They are read from TOML, either inline or from a
//! file, and every field has a default.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading options
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the options file
    #[error("Failed to read interop options: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse interop options: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize options
    #[error("Failed to serialize interop options: {0}")]
    SerializeError(String),

    /// Validation error
    #[error("Invalid interop options: {0}")]
    ValidationError(String),
}

/// Default width of value descriptions in diagnostics
pub const DEFAULT_VALUE_INFO_LIMIT: usize = 140;

/// Shortest accepted value description width
const MIN_VALUE_INFO_LIMIT: usize = 16;

/// Per-context interop options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct InteropOptions {
    /// Guest values with array elements may be viewed as lists and arrays
    pub allow_list_access: bool,

    /// Guest values with members or elements may be viewed as maps
    pub allow_map_access: bool,

    /// Guest iterables and iterators may be viewed as such
    pub allow_iterator_access: bool,

    /// Guest buffers may be viewed as byte sequences
    pub allow_buffer_access: bool,

    /// Guest values may implement host interfaces
    pub allow_implementations: bool,

    /// Width at which value descriptions in diagnostics are cut
    pub value_info_limit: usize,

    /// Only one thread may be entered in the context at a time
    pub single_threaded: bool,
}

impl Default for InteropOptions {
    fn default() -> Self {
        Self {
            allow_list_access: true,
            allow_map_access: true,
            allow_iterator_access: true,
            allow_buffer_access: true,
            allow_implementations: true,
            value_info_limit: DEFAULT_VALUE_INFO_LIMIT,
            single_threaded: false,
        }
    }
}

impl InteropOptions {
    /// Options that deny every structural view
    pub fn restricted() -> Self {
        Self {
            allow_list_access: false,
            allow_map_access: false,
            allow_iterator_access: false,
            allow_buffer_access: false,
            allow_implementations: false,
            ..Self::default()
        }
    }

    /// Parse options from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse options from a string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let options: InteropOptions = toml::from_str(content)?;
        options.validate()?;
        Ok(options)
    }

    /// Serialize options to TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Validate the options
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.value_info_limit < MIN_VALUE_INFO_LIMIT {
            return Err(ConfigError::ValidationError(format!(
                "value_info_limit must be at least {} (got {})",
                MIN_VALUE_INFO_LIMIT, self.value_info_limit
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_allow_everything() {
        let options = InteropOptions::default();
        assert!(options.allow_list_access);
        assert!(options.allow_map_access);
        assert!(options.allow_iterator_access);
        assert!(options.allow_buffer_access);
        assert!(options.allow_implementations);
        assert_eq!(options.value_info_limit, 140);
        assert!(!options.single_threaded);
    }

    #[test]
    fn test_parse_partial() {
        let options = InteropOptions::from_str(
            r#"
allow_map_access = false
value_info_limit = 64
"#,
        )
        .unwrap();
        assert!(!options.allow_map_access);
        assert!(options.allow_list_access);
        assert_eq!(options.value_info_limit, 64);
    }

    #[test]
    fn test_reject_unknown_field() {
        let result = InteropOptions::from_str("allow_everything = true");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_reject_tiny_limit() {
        let result = InteropOptions::from_str("value_info_limit = 2");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_from_file_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let restricted = InteropOptions::restricted();
        write!(file, "{}", restricted.to_toml_string().unwrap()).unwrap();
        let loaded = InteropOptions::from_file(file.path()).unwrap();
        assert_eq!(loaded, restricted);
    }
}
