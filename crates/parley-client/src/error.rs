//! Client error types.

use parley_proto::{ErrorReply, ProtocolError};
use thiserror::Error;

/// Errors from the client transport and session flow.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Could not reach the server.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// Address as given on the command line
        addr: String,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// Socket or terminal I/O failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The server sent bytes that do not decode.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The server closed the connection mid-handshake.
    #[error("server closed the connection")]
    Closed,

    /// The server answered with a frame that makes no sense here.
    #[error("unexpected reply from server: {0}")]
    UnexpectedReply(String),

    /// The server refused the request.
    #[error("server error ({:?}): {}", .0.code, .0.message)]
    Server(ErrorReply),
}
