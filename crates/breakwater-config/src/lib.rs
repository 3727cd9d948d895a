//! # Breakwater Configuration
//!
//! The dependency registry consumed by the health monitor:
//! - Typed dependency descriptors and breaker thresholds with explicit defaults
//! - Multiple formats (YAML, TOML, JSON), detected from the file extension
//! - Validation at load time — a malformed registry fails fast, never at probe time
//! - Per-dependency degradation messages

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod loader;
pub mod types;
pub mod validator;

pub use loader::{load_from_file, load_from_str};
pub use types::{BreakerSettings, DependencyConfig, DependencyKind, MonitorConfig};
pub use validator::validate;

use breakwater_core::{Error, Result};
use std::path::Path;

/// Load and validate a registry from a file
pub fn load<P: AsRef<Path>>(path: P) -> Result<MonitorConfig> {
    load_from_file(path)
}

/// Configuration format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format
    Yaml,
    /// TOML format
    Toml,
    /// JSON format
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::config("Unable to detect config format"))?;

        match ext {
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            "toml" => Ok(ConfigFormat::Toml),
            "json" => Ok(ConfigFormat::Json),
            _ => Err(Error::config(format!("Unsupported config format: {ext}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_detect_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(&PathBuf::from("registry.yaml")).unwrap(),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(&PathBuf::from("registry.toml")).unwrap(),
            ConfigFormat::Toml
        );
        assert_eq!(
            ConfigFormat::from_path(&PathBuf::from("registry.json")).unwrap(),
            ConfigFormat::Json
        );
    }

    #[test]
    fn test_unsupported_format() {
        let result = ConfigFormat::from_path(&PathBuf::from("registry.ini"));
        assert!(result.is_err());
    }
}
