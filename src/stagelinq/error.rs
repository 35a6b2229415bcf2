//! Error types for the StagelinQ client.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by discovery, the control connection and data sessions.
#[derive(Debug, Error)]
pub enum Error {
    /// Nothing arrived before the deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Message ended before a field could be read.
    #[error("truncated message: {what} needs {needed} bytes, {remaining} left")]
    Truncated {
        what: &'static str,
        needed: usize,
        remaining: usize,
    },

    /// Length prefix larger than we are willing to buffer.
    #[error("frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),

    /// Well-formed frame with content we do not understand.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// State value was not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for errors caused by a deadline rather than a broken peer.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Timeout(_) => true,
            Error::Io(e) => e.kind() == io::ErrorKind::TimedOut,
            _ => false,
        }
    }

    /// Map a read failure, folding EOF into [`Error::ConnectionClosed`].
    pub(crate) fn from_read(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Error::ConnectionClosed
        } else {
            Error::Io(err)
        }
    }
}

/// Result type for StagelinQ operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_classification() {
        assert!(Error::Timeout(Duration::from_secs(5)).is_timeout());
        assert!(Error::Io(io::Error::new(io::ErrorKind::TimedOut, "slow")).is_timeout());
        assert!(!Error::ConnectionClosed.is_timeout());
        assert!(!Error::InvalidMessage("bad".into()).is_timeout());
    }

    #[test]
    fn test_eof_maps_to_connection_closed() {
        let err = Error::from_read(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        assert!(matches!(err, Error::ConnectionClosed));

        let err = Error::from_read(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(matches!(err, Error::Io(_)));
    }
}
