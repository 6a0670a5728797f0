//! Core error types for postcode-sweep.
//!
//! Key and configuration failures are separate enums so callers can decide
//! which of them are fatal.

use thiserror::Error;

/// Errors raised while parsing or expanding search keys.
///
/// None of these abort a run: the offending key is dropped with a warning.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// The string is not a postal code prefix
    #[error("invalid search key '{key}': {reason}")]
    InvalidKey {
        /// Offending input
        key: String,
        /// Why it was rejected
        reason: String,
    },

    /// Refinement rank outside 1..=3
    #[error("invalid rank {0}: must be 1, 2 or 3")]
    InvalidRank(u8),

    /// Key length does not match the rank's required input length
    #[error("key '{key}' has length {actual}, rank {rank} expects {expected}")]
    LengthMismatch {
        /// Offending key
        key: String,
        /// Requested rank
        rank: u8,
        /// Required input length for the rank
        expected: usize,
        /// Actual key length
        actual: usize,
    },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to determine config directory path
    #[error("could not determine config directory (XDG base directories not available)")]
    NoConfigDir,

    /// Config file not found
    #[error("config file not found at {path}")]
    NotFound {
        /// Path where config was expected
        path: String,
    },

    /// Failed to parse TOML
    #[error("failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    /// I/O error reading config
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("invalid config value for {field}: {reason}")]
    InvalidValue {
        /// Field name
        field: String,
        /// Reason for invalidity
        reason: String,
    },
}

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = KeyError::InvalidRank(4);
        assert_eq!(err.to_string(), "invalid rank 4: must be 1, 2 or 3");

        let err = KeyError::LengthMismatch {
            key: "K1A0".to_string(),
            rank: 1,
            expected: 3,
            actual: 4,
        };
        assert_eq!(err.to_string(), "key 'K1A0' has length 4, rank 1 expects 3");

        let err = ConfigError::NoConfigDir;
        assert_eq!(
            err.to_string(),
            "could not determine config directory (XDG base directories not available)"
        );
    }
}
