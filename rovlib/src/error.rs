//! Error definitions for the ROV control software

use thiserror::Error;

/// ROV error types
#[derive(Error, Debug)]
pub enum RovError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid UTF-8 payload: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Peer closed the connection")]
    PeerClosed,

    #[error("Frame error: {0}")]
    Frame(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RovError {
    /// Transport errors force a session reset. Everything else is a
    /// per-message condition the session is expected to survive.
    pub fn is_transport(&self) -> bool {
        matches!(self, RovError::Io(_) | RovError::PeerClosed)
    }
}

/// Result type alias for ROV operations
pub type RovResult<T> = Result<T, RovError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RovError::Config("test".to_string());
        assert_eq!(format!("{}", err), "Configuration error: test");
    }

    #[test]
    fn test_transport_classification() {
        assert!(RovError::PeerClosed.is_transport());
        assert!(RovError::Io(std::io::Error::from(std::io::ErrorKind::ConnectionReset)).is_transport());
        assert!(!RovError::Frame("bad header".to_string()).is_transport());
        assert!(!RovError::Config("bad port".to_string()).is_transport());
    }
}
