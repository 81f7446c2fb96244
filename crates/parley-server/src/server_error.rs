//! Driver error types.
//!
//! These are invariant failures inside the dispatcher. Anything a peer can
//! cause (bad frames, taken nicknames, unknown recipients) is answered with an
//! `ERROR` frame or a teardown action instead.

use std::fmt;

use parley_proto::ProtocolError;

use crate::{registry::RegistryError, session::SessionId};

/// Errors that can occur while the driver processes an event.
#[derive(Debug)]
pub enum DriverError {
    /// Session already registered.
    ///
    /// The runtime handed out an id that is still live. Ids must never be
    /// reused; this is a logic bug in the runtime.
    SessionAlreadyExists(SessionId),

    /// Registry rejected an operation the driver believed valid.
    ///
    /// Indicates the driver and registry disagree about session state.
    Registry(RegistryError),

    /// A reply generated by the server could not be encoded.
    ///
    /// Only possible with a configuration that allows nicknames long enough
    /// to overflow a member list.
    Encode(ProtocolError),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionAlreadyExists(id) => write!(f, "session already exists: {id}"),
            Self::Registry(err) => write!(f, "registry error: {err}"),
            Self::Encode(err) => write!(f, "encode error: {err}"),
        }
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Registry(err) => Some(err),
            Self::Encode(err) => Some(err),
            Self::SessionAlreadyExists(_) => None,
        }
    }
}

impl From<RegistryError> for DriverError {
    fn from(err: RegistryError) -> Self {
        Self::Registry(err)
    }
}

impl From<ProtocolError> for DriverError {
    fn from(err: ProtocolError) -> Self {
        Self::Encode(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_error_display() {
        let err = DriverError::SessionAlreadyExists(42);
        assert_eq!(err.to_string(), "session already exists: 42");

        let err = DriverError::Registry(RegistryError::SessionNotFound(7));
        assert_eq!(err.to_string(), "registry error: session 7 not found");
    }
}
