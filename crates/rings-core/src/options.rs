//! Configuration (rings.toml)
//!
//! All fields are optional in the file; missing ones take their defaults.
//!
//! ```toml
//! max_copy_depth = 30
//! cache_sweep_threshold = 64
//! max_call_depth = 200
//! max_stack_slots = 65536
//! open_rings_in_children = true
//! ```

use rings_engine::{StateOptions, DEFAULT_MAX_CALL_DEPTH, DEFAULT_MAX_STACK_SIZE};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default bound on table nesting while copying values
pub const DEFAULT_MAX_COPY_DEPTH: usize = 30;

/// Default number of cache insertions between automatic sweeps
pub const DEFAULT_CACHE_SWEEP_THRESHOLD: usize = 64;

/// Errors that can occur while loading options
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Options for a [`Rings`](crate::Rings) manager and every context it creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingsOptions {
    /// Deepest table nesting a single copy may reach
    pub max_copy_depth: usize,

    /// Cache insertions after which all chunk caches are swept
    pub cache_sweep_threshold: usize,

    /// Nested call limit of each context's interpreter
    pub max_call_depth: usize,

    /// Evaluation stack size of each context's interpreter
    pub max_stack_slots: usize,

    /// Install the `rings` library in created contexts as well
    pub open_rings_in_children: bool,
}

impl Default for RingsOptions {
    fn default() -> Self {
        Self {
            max_copy_depth: DEFAULT_MAX_COPY_DEPTH,
            cache_sweep_threshold: DEFAULT_CACHE_SWEEP_THRESHOLD,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_stack_slots: DEFAULT_MAX_STACK_SIZE,
            open_rings_in_children: true,
        }
    }
}

impl RingsOptions {
    /// Load options from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse options from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let options: RingsOptions = toml::from_str(content)?;
        options.validate()?;
        Ok(options)
    }

    /// Check that every limit is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("max_copy_depth", self.max_copy_depth),
            ("cache_sweep_threshold", self.cache_sweep_threshold),
            ("max_call_depth", self.max_call_depth),
            ("max_stack_slots", self.max_stack_slots),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be at least 1",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Interpreter limits for one context
    pub fn state_options(&self) -> StateOptions {
        StateOptions {
            max_call_depth: self.max_call_depth,
            max_stack_slots: self.max_stack_slots,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let options = RingsOptions::default();
        assert_eq!(options.max_copy_depth, 30);
        assert_eq!(options.cache_sweep_threshold, 64);
        assert_eq!(options.max_call_depth, 200);
        assert_eq!(options.max_stack_slots, 65536);
        assert!(options.open_rings_in_children);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let options = RingsOptions::from_toml_str("max_copy_depth = 5\n").unwrap();
        assert_eq!(options.max_copy_depth, 5);
        assert_eq!(options.cache_sweep_threshold, DEFAULT_CACHE_SWEEP_THRESHOLD);
    }

    #[test]
    fn test_rejects_zero_limits() {
        let err = RingsOptions::from_toml_str("max_call_depth = 0").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
        assert!(err.to_string().contains("max_call_depth"));
    }

    #[test]
    fn test_rejects_unknown_types() {
        let err = RingsOptions::from_toml_str("max_copy_depth = \"deep\"").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "open_rings_in_children = false").unwrap();
        let options = RingsOptions::from_file(file.path()).unwrap();
        assert!(!options.open_rings_in_children);
        assert_eq!(options.state_options().max_call_depth, 200);
    }

    #[test]
    fn test_round_trips_through_toml() {
        let options = RingsOptions {
            max_copy_depth: 12,
            ..Default::default()
        };
        let text = toml::to_string(&options).unwrap();
        assert_eq!(RingsOptions::from_toml_str(&text).unwrap(), options);
    }
}
