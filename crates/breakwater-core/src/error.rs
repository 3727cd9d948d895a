//! Error types for the Breakwater health engine

/// Result type alias using [`Error`]
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Main error type for the Breakwater health engine
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration error (malformed registry, bad thresholds)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Monitor lifecycle error (double-start, start after stop)
    #[error("Monitor error: {0}")]
    Monitor(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    /// Create a monitor lifecycle error
    pub fn monitor(message: impl Into<String>) -> Self {
        Error::Monitor(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = Error::config("dependency id cannot be empty");
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(
            err.to_string(),
            "Configuration error: dependency id cannot be empty"
        );
    }

    #[test]
    fn test_monitor_error_display() {
        let err = Error::monitor("already running");
        assert_eq!(err.to_string(), "Monitor error: already running");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
