//! Unified error types for the seamark core library.
//!
//! Every failure mode in this crate degrades to a well-defined state
//! (defaults, a dropped entry, a disconnect) rather than halting the node,
//! so these variants exist mostly to carry context to logs and to the HTTP
//! boundary.

use std::path::PathBuf;
use thiserror::Error;

/// The unified error type for all seamark core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// A beacon address did not canonicalize to the expected form.
    #[error("Invalid beacon address: '{0}'. Expected colon-separated form 'aa:bb:cc:dd:ee:ff'.")]
    InvalidBeaconAddress(String),

    /// An error occurred while persisting or reading data.
    #[error("Persistence error at {}: {message}", .path.display())]
    Persistence {
        /// Path that was being read or written.
        path: PathBuf,
        /// Underlying failure description.
        message: String,
    },

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for seamark core operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns `true` if this error is the caller's fault (malformed
    /// input), as opposed to a failure of the node itself. The HTTP
    /// boundary maps this to 4xx vs. 5xx.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigParse(_) | Self::InvalidBeaconAddress(_))
    }

    /// A stable machine-readable code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigParse(_) => "config_parse_failed",
            Self::InvalidBeaconAddress(_) => "invalid_beacon_address",
            Self::Persistence { .. } => "persistence_failed",
            Self::Io(_) => "io_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoErr, ErrorKind};

    #[test]
    fn test_config_error_classification() {
        assert!(Error::ConfigParse("syntax error".into()).is_config_error());
        assert!(Error::InvalidBeaconAddress("zz".into()).is_config_error());
        assert!(!Error::Io(IoErr::new(ErrorKind::NotFound, "x")).is_config_error());
        assert!(!Error::Persistence {
            path: PathBuf::from("/tmp/cfg.toml"),
            message: "disk full".into(),
        }
        .is_config_error());
    }

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(
            Error::ConfigParse("bad".into()).error_code(),
            "config_parse_failed"
        );
        assert_eq!(
            Error::InvalidBeaconAddress("bad".into()).error_code(),
            "invalid_beacon_address"
        );
        assert_eq!(
            Error::Io(IoErr::new(ErrorKind::NotFound, "x")).error_code(),
            "io_error"
        );
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
