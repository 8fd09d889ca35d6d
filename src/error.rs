use thiserror::Error;

use crate::release::ReleaseError;

/// Unified error type for sweepme operations
#[derive(Error, Debug)]
pub enum SweepMeError {
    #[error("Git operation failed: {0}")]
    Git(#[from] git2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Port error: {0}")]
    Port(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Parameter error: {0}")]
    Parameter(String),

    #[error("Folder error: {0}")]
    Folder(String),

    #[error("Version parsing error: {0}")]
    Version(String),

    #[error("Release check failed: {0}")]
    Release(#[from] ReleaseError),
}

/// Convenience type alias for Results in sweepme
pub type Result<T> = std::result::Result<T, SweepMeError>;

impl SweepMeError {
    /// Create a configuration error with context
    pub fn config(msg: impl Into<String>) -> Self {
        SweepMeError::Config(msg.into())
    }

    /// Create a port error with context
    pub fn port(msg: impl Into<String>) -> Self {
        SweepMeError::Port(msg.into())
    }

    /// Create a driver error with context
    pub fn driver(msg: impl Into<String>) -> Self {
        SweepMeError::Driver(msg.into())
    }

    /// Create a parameter error with context
    pub fn parameter(msg: impl Into<String>) -> Self {
        SweepMeError::Parameter(msg.into())
    }

    /// Create a folder error with context
    pub fn folder(msg: impl Into<String>) -> Self {
        SweepMeError::Folder(msg.into())
    }

    /// Create a version error with context
    pub fn version(msg: impl Into<String>) -> Self {
        SweepMeError::Version(msg.into())
    }
}

impl From<toml::de::Error> for SweepMeError {
    fn from(err: toml::de::Error) -> Self {
        SweepMeError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for SweepMeError {
    fn from(err: toml::ser::Error) -> Self {
        SweepMeError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SweepMeError::config("test config issue");
        assert_eq!(err.to_string(), "Configuration error: test config issue");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SweepMeError = io_err.into();
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_error_from_toml() {
        let parse_err = toml::from_str::<toml::Table>("key = ").unwrap_err();
        let err: SweepMeError = parse_err.into();
        assert!(err.to_string().starts_with("Configuration error"));
    }

    #[test]
    fn test_error_from_release() {
        let err: SweepMeError = ReleaseError::MissingPredecessor {
            target: "v1.5.5.x".to_string(),
        }
        .into();
        assert!(err.to_string().contains("no preceding version"));
    }

    #[test]
    fn test_error_messages_are_descriptive() {
        let error_pairs = vec![
            (SweepMeError::config("x"), "Configuration error"),
            (SweepMeError::port("x"), "Port error"),
            (SweepMeError::driver("x"), "Driver error"),
            (SweepMeError::parameter("x"), "Parameter error"),
            (SweepMeError::folder("x"), "Folder error"),
            (SweepMeError::version("x"), "Version parsing error"),
        ];

        for (err, expected_prefix) in error_pairs {
            let msg = err.to_string();
            assert!(
                msg.starts_with(expected_prefix),
                "Error message should start with '{}', but got '{}'",
                expected_prefix,
                msg
            );
        }
    }

    #[test]
    fn test_error_special_characters_in_messages() {
        let special_chars = vec![
            "message with\nnewline",
            "message with\ttab",
            "message with 'quotes'",
            "message with \\ backslash",
        ];

        for msg in special_chars {
            let err = SweepMeError::port(msg);
            assert!(err.to_string().contains(msg));
        }
    }
}
