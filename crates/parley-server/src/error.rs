//! Server runtime error types.

use std::fmt;

/// Errors that can occur in the server runtime.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (unparseable or unbindable address, etc.).
    ///
    /// Fatal: prevents server startup. Fix configuration and restart.
    Config(String),

    /// Transport/network error on the listener.
    ///
    /// Errors on individual connections never surface here; they tear down
    /// that one connection.
    Transport(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listener_io_errors_are_transport_errors() {
        let err = ServerError::from(std::io::Error::other("too many open files"));
        assert!(matches!(err, ServerError::Transport(_)));
        assert_eq!(err.to_string(), "transport error: too many open files");
    }

    #[test]
    fn config_error_display() {
        let err = ServerError::Config("max_connections must be at least 1".to_string());
        assert_eq!(err.to_string(), "configuration error: max_connections must be at least 1");
    }
}
