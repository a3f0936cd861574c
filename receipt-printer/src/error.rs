//! Error types for the printer library

use thiserror::Error;

/// Device error raised by transports and the raster pipeline.
///
/// None of these are retried inside the library.
#[derive(Debug, Error)]
pub enum PrintError {
    /// Device is absent, unplugged or refuses the connection
    #[error("Printer not connected: {0}")]
    NotConnected(String),

    /// Timeout waiting for the device
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Roll paper sensor reports paper end
    #[error("Printer is out of paper")]
    OutOfPaper,

    /// Any other device or data failure
    #[error("Unrecoverable printer error: {0}")]
    Unrecoverable(String),

    /// Invalid printer configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl From<std::io::Error> for PrintError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::NotFound
            | ErrorKind::PermissionDenied
            | ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::BrokenPipe => PrintError::NotConnected(err.to_string()),
            ErrorKind::TimedOut | ErrorKind::WouldBlock => PrintError::Timeout(err.to_string()),
            _ => PrintError::Unrecoverable(err.to_string()),
        }
    }
}

/// Result type for printer operations
pub type PrintResult<T> = Result<T, PrintError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_io_error_classification() {
        assert!(matches!(
            PrintError::from(Error::from(ErrorKind::NotFound)),
            PrintError::NotConnected(_)
        ));
        assert!(matches!(
            PrintError::from(Error::from(ErrorKind::ConnectionRefused)),
            PrintError::NotConnected(_)
        ));
        assert!(matches!(
            PrintError::from(Error::from(ErrorKind::TimedOut)),
            PrintError::Timeout(_)
        ));
        assert!(matches!(
            PrintError::from(Error::other("garbled")),
            PrintError::Unrecoverable(_)
        ));
    }
}
