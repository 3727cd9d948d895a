//! Registry loading

use crate::{ConfigFormat, MonitorConfig};
use breakwater_core::{Error, Result};
use std::fs;
use std::path::Path;

/// Load a registry from a file, validating it before returning
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<MonitorConfig> {
    let path = path.as_ref();

    let content = fs::read_to_string(path)
        .map_err(|e| Error::config(format!("Failed to read config file: {e}")))?;

    let format = ConfigFormat::from_path(path)?;

    load_from_str(&content, format)
}

/// Load a registry from a string, validating it before returning
pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<MonitorConfig> {
    let config = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(content)
            .map_err(|e| Error::config(format!("Failed to parse YAML: {e}")))?,
        ConfigFormat::Toml => toml::from_str(content)
            .map_err(|e| Error::config(format!("Failed to parse TOML: {e}")))?,
        ConfigFormat::Json => serde_json::from_str(content)
            .map_err(|e| Error::config(format!("Failed to parse JSON: {e}")))?,
    };

    crate::validator::validate(&config)?;

    Ok(config)
}
