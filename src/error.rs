use std::path::PathBuf;
use thiserror::Error;

/// Core library errors
#[derive(Error, Debug)]
pub enum SweepError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Signal handling error: {0}")]
    Signal(#[from] nix::Error),
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, SweepError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = ConfigError::Invalid("poll interval must be positive".into());
        assert!(err.to_string().contains("poll interval"));
    }

    #[test]
    fn error_conversion() {
        let config_err = ConfigError::Invalid("test".into());
        let sweep_err: SweepError = config_err.into();
        assert!(matches!(sweep_err, SweepError::Config(_)));
    }

    #[test]
    fn signal_error_conversion() {
        let sweep_err: SweepError = nix::Error::EPERM.into();
        assert!(matches!(sweep_err, SweepError::Signal(_)));
        assert!(sweep_err.to_string().contains("Signal"));
    }
}
