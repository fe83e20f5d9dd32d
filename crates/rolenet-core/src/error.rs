//! Error types shared by the transports and payload codecs.
//!
//! The session manager itself never returns these: bind and connect failures are
//! reported as booleans or transport events. They exist for the layers underneath.

use std::{io, result::Result as StdResult};

use thiserror::Error;

/// Result type alias using [`ErrorKind`].
pub type Result<T> = StdResult<T, ErrorKind>;

/// Errors raised by transports and codecs.
#[derive(Error, Debug)]
pub enum ErrorKind {
    /// Wrapper around a std io error.
    #[error("An IO error occurred: {0}")]
    Io(#[from] io::Error),
    /// An address could not be parsed or resolved.
    #[error("Could not resolve address {0}")]
    InvalidAddress(String),
    /// The requested port is already bound by another listener.
    #[error("Port {0} is already in use")]
    AddressInUse(u16),
    /// Nothing is listening at the target of a connect.
    #[error("Connection refused by {0}")]
    ConnectionRefused(String),
    /// The listener is already bound.
    #[error("Listener is already bound")]
    AlreadyListening,
    /// An operation requires an active connection or bound listener.
    #[error("Transport is not active")]
    NotActive,
    /// An error payload was shorter than the encoded error code.
    #[error("Error payload too short: expected {expected} bytes, got {actual}")]
    ErrorPayloadTooShort {
        /// Bytes needed to decode the payload.
        expected: usize,
        /// Bytes actually received.
        actual: usize,
    },
}

impl ErrorKind {
    /// Maps the error onto the integer code carried by transport error events.
    ///
    /// OS errors keep their raw code; everything else gets a stable negative code.
    pub fn error_code(&self) -> i32 {
        match self {
            ErrorKind::Io(err) => err.raw_os_error().unwrap_or(-1),
            ErrorKind::InvalidAddress(_) => -2,
            ErrorKind::AddressInUse(_) => -3,
            ErrorKind::ConnectionRefused(_) => -4,
            ErrorKind::AlreadyListening => -5,
            ErrorKind::NotActive => -6,
            ErrorKind::ErrorPayloadTooShort { .. } => -7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_keeps_os_code() {
        let err = ErrorKind::from(io::Error::from_raw_os_error(111));
        assert_eq!(err.error_code(), 111);
    }

    #[test]
    fn test_synthetic_io_error_has_fallback_code() {
        let err = ErrorKind::from(io::Error::new(io::ErrorKind::Other, "boom"));
        assert_eq!(err.error_code(), -1);
    }

    #[test]
    fn test_display() {
        let err = ErrorKind::ErrorPayloadTooShort { expected: 4, actual: 1 };
        assert_eq!(err.to_string(), "Error payload too short: expected 4 bytes, got 1");
        assert_eq!(ErrorKind::AddressInUse(7770).to_string(), "Port 7770 is already in use");
    }
}
