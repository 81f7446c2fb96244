//! Per-connection session records and nickname validation.
//!
//! A connection whose role is not yet known (no first frame) is not a session:
//! the driver tracks it separately until `CONNECT` or `MON_CONNECT` arrives.
//! Once registered, a chat session moves from [`ChatState::AwaitingNickname`]
//! to [`ChatState::Active`] exactly once. Removal from the registry is the
//! terminal state; ids are never reused, so nothing further is dispatched.

use std::{fmt, net::SocketAddr};

use thiserror::Error;

/// Opaque connection identifier, unique across chat and monitor sessions for
/// the lifetime of the server.
pub type SessionId = u64;

/// Chat session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    /// `CONNECT` acknowledged, waiting for a valid nickname claim
    AwaitingNickname,
    /// Nickname claimed, may send and receive messages
    Active,
}

impl fmt::Display for ChatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingNickname => f.write_str("awaiting nickname"),
            Self::Active => f.write_str("active"),
        }
    }
}

/// A connected chat client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSession {
    /// Session identifier
    pub id: SessionId,
    /// Remote address
    pub peer: SocketAddr,
    /// Claimed nickname, set once on entering [`ChatState::Active`]
    pub nickname: Option<String>,
    /// Current state
    pub state: ChatState,
}

impl ChatSession {
    /// New session awaiting its nickname.
    pub fn new(id: SessionId, peer: SocketAddr) -> Self {
        Self { id, peer, nickname: None, state: ChatState::AwaitingNickname }
    }

    /// True once a nickname has been claimed.
    pub fn is_active(&self) -> bool {
        self.state == ChatState::Active
    }
}

/// A connected read-only monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSession {
    /// Session identifier
    pub id: SessionId,
    /// Remote address
    pub peer: SocketAddr,
    /// Only traffic involving this nickname is delivered
    pub filter: Option<String>,
}

impl MonitorSession {
    /// New monitor with an optional nickname filter.
    pub fn new(id: SessionId, peer: SocketAddr, filter: Option<String>) -> Self {
        Self { id, peer, filter }
    }

    /// Whether a broadcast from `sender` should reach this monitor.
    pub fn wants_broadcast(&self, sender: &str) -> bool {
        self.filter.as_deref().is_none_or(|f| f == sender)
    }

    /// Whether a direct message between `sender` and `recipient` should reach
    /// this monitor.
    pub fn wants_direct(&self, sender: &str, recipient: &str) -> bool {
        self.filter.as_deref().is_none_or(|f| f == sender || f == recipient)
    }
}

/// Why a nickname claim was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NicknameError {
    /// Zero-length nickname.
    #[error("nickname is empty")]
    Empty,

    /// Longer than the configured limit (in bytes).
    #[error("nickname is {length} bytes, maximum is {max}")]
    TooLong {
        /// Actual length in bytes
        length: usize,
        /// Configured maximum
        max: usize,
    },

    /// Not valid UTF-8.
    #[error("nickname is not valid UTF-8")]
    InvalidUtf8,

    /// Contains whitespace or a control character.
    #[error("nickname contains forbidden character {0:?}")]
    ForbiddenCharacter(char),
}

/// Check a nickname claim and return it as a `String`.
pub fn validate_nickname(raw: &[u8], max_len: usize) -> Result<String, NicknameError> {
    if raw.is_empty() {
        return Err(NicknameError::Empty);
    }
    if raw.len() > max_len {
        return Err(NicknameError::TooLong { length: raw.len(), max: max_len });
    }

    let name = std::str::from_utf8(raw).map_err(|_| NicknameError::InvalidUtf8)?;
    if let Some(c) = name.chars().find(|c| c.is_whitespace() || c.is_control()) {
        return Err(NicknameError::ForbiddenCharacter(c));
    }

    Ok(name.to_string())
}
