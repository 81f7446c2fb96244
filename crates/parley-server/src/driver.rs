//! Server driver.
//!
//! Sans-IO protocol dispatcher. Takes [`ServerEvent`]s from the runtime,
//! applies them to the [`SessionRegistry`] and returns [`ServerAction`]s for
//! the runtime to execute. Every registry mutation and every fan-out for one
//! event is produced by a single synchronous `process_event` call, so no
//! partial fan-out is ever observable.
//!
//! # Chat state machine
//!
//! ```text
//! pending --CONNECT--> AwaitingNickname --SET_NICKNAME--> Active
//!    |                        |                             |
//!    +-------- teardown ------+-------- teardown -----------+--> removed
//! ```
//!
//! `DISCONNECT` is honoured in every state. Any other frame not allowed in the
//! current state gets `ERROR(PROTOCOL_VIOLATION)` and the connection is torn
//! down.

use std::{collections::HashMap, fmt, net::SocketAddr, time::Duration};

use bytes::Bytes;
use parley_proto::{
    ChatFrame, ClientRequest, ErrorCode, ErrorReply, Frame, MAX_FIELD_LEN, MonitorFrame,
    MonitorMessage, ProtocolError, ServerReply,
};

use crate::{
    env::Environment,
    registry::{RegistryError, RemovedSession, SessionRegistry},
    server_error::DriverError,
    session::{ChatState, SessionId, validate_nickname},
};

/// Driver configuration
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Maximum concurrent connections, pending ones included
    pub max_connections: usize,
    /// Maximum nickname length in bytes
    pub max_nickname_len: usize,
    /// Deliver broadcasts back to their sender
    pub echo_to_sender: bool,
    /// Send `MEMBER_JOINED` / `MEMBER_LEFT` notices
    pub announce_membership: bool,
    /// Treat `SET_NICKNAME` as an implicit `CONNECT` on a new connection
    pub lenient_connect: bool,
    /// Close connections that send no first frame within this time
    pub handshake_timeout: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_connections: 1024,
            max_nickname_len: 32,
            echo_to_sender: false,
            announce_membership: true,
            lenient_connect: false,
            handshake_timeout: Duration::from_secs(30),
        }
    }
}

impl DriverConfig {
    /// Longest nickname limit a server may be configured with.
    pub const NICKNAME_LEN_LIMIT: usize = 255;

    /// Check that every reply the limits allow still fits in one frame.
    ///
    /// A full `MEMBERS` list spends a 2-byte length prefix per nickname.
    ///
    /// # Errors
    ///
    /// Describes the first limit that is out of range.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_connections == 0 {
            return Err("max_connections must be at least 1".to_string());
        }
        if self.max_nickname_len == 0 || self.max_nickname_len > Self::NICKNAME_LEN_LIMIT {
            return Err(format!(
                "max_nickname_len must be between 1 and {}, got {}",
                Self::NICKNAME_LEN_LIMIT,
                self.max_nickname_len
            ));
        }

        let members_len = self.max_connections.saturating_mul(2 + self.max_nickname_len);
        if members_len > MAX_FIELD_LEN {
            return Err(format!(
                "{} members with {}-byte nicknames need {members_len} bytes, maximum is {MAX_FIELD_LEN}",
                self.max_connections, self.max_nickname_len
            ));
        }

        Ok(())
    }
}

/// Why a connection is being closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer closed the socket
    PeerClosed,
    /// Peer sent `DISCONNECT` or `MON_DISCONNECT`
    Disconnect,
    /// Peer broke the protocol
    ProtocolViolation(String),
    /// Socket read or write failed
    Io(String),
    /// No first frame within the handshake timeout
    HandshakeTimeout,
    /// Connection limit reached
    ServerFull,
    /// Server is shutting down
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed => f.write_str("peer closed connection"),
            Self::Disconnect => f.write_str("peer disconnected"),
            Self::ProtocolViolation(reason) => write!(f, "protocol violation: {reason}"),
            Self::Io(err) => write!(f, "i/o error: {err}"),
            Self::HandshakeTimeout => f.write_str("handshake timeout"),
            Self::ServerFull => f.write_str("max connections exceeded"),
            Self::Shutdown => f.write_str("server shutting down"),
        }
    }
}

/// Events that the server driver processes.
///
/// These are produced by the runtime (or directly by tests).
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A new connection was accepted
    ConnectionAccepted {
        /// Unique id assigned by the runtime, never reused
        session_id: SessionId,
        /// Remote address
        peer: SocketAddr,
    },

    /// A complete frame was decoded from a connection
    FrameReceived {
        /// Connection that sent the frame
        session_id: SessionId,
        /// The received frame
        frame: Frame,
    },

    /// The connection's byte stream could not be decoded
    DecodeFailed {
        /// Connection that sent the bad bytes
        session_id: SessionId,
        /// Decoder error
        error: ProtocolError,
    },

    /// A connection was closed (by peer or I/O error)
    ConnectionClosed {
        /// Connection that was closed
        session_id: SessionId,
        /// Reason for closure
        reason: CloseReason,
    },

    /// Periodic tick for housekeeping
    Tick,

    /// Server is shutting down
    Shutdown,
}

/// Actions that the server driver produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAction {
    /// Send a frame to one session
    SendToSession {
        /// Target session
        session_id: SessionId,
        /// Frame to send
        frame: Frame,
    },

    /// Send the same frame to several sessions
    Broadcast {
        /// Target sessions
        session_ids: Vec<SessionId>,
        /// Frame to send
        frame: Frame,
    },

    /// Close a connection after flushing frames already queued for it
    CloseConnection {
        /// Session to close
        session_id: SessionId,
        /// Reason for closure
        reason: CloseReason,
    },

    /// Report a lifecycle transition to observers
    Lifecycle(LifecycleEvent),

    /// Log a message
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
    },
}

/// Structured connection lifecycle transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Connection accepted, role not yet known
    Accepted {
        /// Session id
        session_id: SessionId,
        /// Remote address
        peer: SocketAddr,
    },
    /// Chat client completed `CONNECT`
    ChatConnected {
        /// Session id
        session_id: SessionId,
    },
    /// Chat client claimed a nickname
    NicknameClaimed {
        /// Session id
        session_id: SessionId,
        /// Claimed nickname
        nickname: String,
    },
    /// Monitor attached
    MonitorAttached {
        /// Session id
        session_id: SessionId,
        /// Nickname filter, if any
        filter: Option<String>,
    },
    /// Connection torn down
    TornDown {
        /// Session id
        session_id: SessionId,
        /// Nickname, if the session had claimed one
        nickname: Option<String>,
        /// Why it was closed
        reason: CloseReason,
    },
}

/// Log levels for server actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

/// Connection accepted but not yet identified as chat or monitor.
#[derive(Debug, Clone, Copy)]
struct PendingConnection<I> {
    peer: SocketAddr,
    accepted_at: I,
}

/// Action-based server driver.
pub struct ServerDriver<E: Environment> {
    env: E,
    config: DriverConfig,
    /// Connections with no first frame yet
    pending: HashMap<SessionId, PendingConnection<E::Instant>>,
    registry: SessionRegistry,
    shutting_down: bool,
}

impl<E: Environment> ServerDriver<E> {
    /// Create a new server driver.
    pub fn new(env: E, config: DriverConfig) -> Self {
        Self {
            env,
            config,
            pending: HashMap::new(),
            registry: SessionRegistry::new(),
            shutting_down: false,
        }
    }

    /// Process a server event and return actions to execute.
    ///
    /// This is the main entry point for the server driver.
    pub fn process_event(&mut self, event: ServerEvent) -> Result<Vec<ServerAction>, DriverError> {
        match event {
            ServerEvent::ConnectionAccepted { session_id, peer } => {
                self.handle_connection_accepted(session_id, peer)
            },
            ServerEvent::FrameReceived { session_id, frame } => {
                self.handle_frame_received(session_id, frame)
            },
            ServerEvent::DecodeFailed { session_id, error } => {
                self.handle_decode_failed(session_id, &error)
            },
            ServerEvent::ConnectionClosed { session_id, reason } => {
                self.teardown(session_id, reason)
            },
            ServerEvent::Tick => Ok(self.handle_tick()),
            ServerEvent::Shutdown => self.handle_shutdown(),
        }
    }

    fn handle_connection_accepted(
        &mut self,
        session_id: SessionId,
        peer: SocketAddr,
    ) -> Result<Vec<ServerAction>, DriverError> {
        if self.pending.contains_key(&session_id) || self.registry.contains(session_id) {
            return Err(DriverError::SessionAlreadyExists(session_id));
        }

        if self.shutting_down {
            return Ok(vec![ServerAction::CloseConnection {
                session_id,
                reason: CloseReason::Shutdown,
            }]);
        }

        if self.connection_count() >= self.config.max_connections {
            return Ok(vec![
                ServerAction::CloseConnection { session_id, reason: CloseReason::ServerFull },
                ServerAction::Log {
                    level: LogLevel::Warn,
                    message: format!(
                        "rejected connection {session_id} from {peer}: limit of {} reached",
                        self.config.max_connections
                    ),
                },
            ]);
        }

        self.pending.insert(session_id, PendingConnection { peer, accepted_at: self.env.now() });

        Ok(vec![ServerAction::Lifecycle(LifecycleEvent::Accepted { session_id, peer })])
    }

    fn handle_frame_received(
        &mut self,
        session_id: SessionId,
        frame: Frame,
    ) -> Result<Vec<ServerAction>, DriverError> {
        if let Some(pending) = self.pending.remove(&session_id) {
            return self.handle_first_frame(session_id, pending.peer, frame);
        }

        match frame {
            Frame::Chat(frame) if self.registry.chat(session_id).is_some() => {
                self.handle_chat_frame(session_id, &frame)
            },
            Frame::Monitor(frame) if self.registry.monitor(session_id).is_some() => {
                self.handle_monitor_frame(session_id, &frame)
            },
            _ if self.registry.contains(session_id) => {
                self.violation(session_id, "frame does not match the session's framing")
            },
            // Frames can race a teardown the runtime has not finished yet
            _ => Ok(vec![ServerAction::Log {
                level: LogLevel::Debug,
                message: format!("dropped frame for closed session {session_id}"),
            }]),
        }
    }

    /// First frame decides the connection's role.
    fn handle_first_frame(
        &mut self,
        session_id: SessionId,
        peer: SocketAddr,
        frame: Frame,
    ) -> Result<Vec<ServerAction>, DriverError> {
        match frame {
            Frame::Chat(frame) => match ClientRequest::from_frame(&frame) {
                Ok(ClientRequest::Connect) => {
                    self.registry.register_chat(session_id, peer)?;
                    Ok(vec![
                        reply(session_id, ServerReply::Connected)?,
                        ServerAction::Lifecycle(LifecycleEvent::ChatConnected { session_id }),
                    ])
                },
                Ok(ClientRequest::SetNickname(raw)) if self.config.lenient_connect => {
                    self.registry.register_chat(session_id, peer)?;
                    let mut actions =
                        vec![ServerAction::Lifecycle(LifecycleEvent::ChatConnected { session_id })];
                    actions.extend(self.claim_nickname(session_id, &raw)?);
                    Ok(actions)
                },
                Ok(ClientRequest::Disconnect) => {
                    Ok(closed_before_handshake(session_id, CloseReason::Disconnect))
                },
                Ok(request) => {
                    let reason = format!("expected Connect, got {:?}", request.opcode());
                    reject_before_handshake(session_id, reason)
                },
                Err(err) => reject_before_handshake(session_id, err.to_string()),
            },
            Frame::Monitor(frame) => match MonitorMessage::from_frame(&frame) {
                Ok(MonitorMessage::Connect { filter }) => {
                    self.registry.register_monitor(session_id, peer, filter.clone())?;
                    Ok(vec![ServerAction::Lifecycle(LifecycleEvent::MonitorAttached {
                        session_id,
                        filter,
                    })])
                },
                Ok(MonitorMessage::Disconnect) => {
                    Ok(closed_before_handshake(session_id, CloseReason::Disconnect))
                },
                Ok(message) => {
                    let reason = format!("expected Connect, got {:?}", message.opcode());
                    Ok(closed_before_handshake(session_id, CloseReason::ProtocolViolation(reason)))
                },
                Err(err) => Ok(closed_before_handshake(
                    session_id,
                    CloseReason::ProtocolViolation(err.to_string()),
                )),
            },
        }
    }

    fn handle_chat_frame(
        &mut self,
        session_id: SessionId,
        frame: &ChatFrame,
    ) -> Result<Vec<ServerAction>, DriverError> {
        let request = match ClientRequest::from_frame(frame) {
            Ok(request) => request,
            Err(err) => return self.violation(session_id, &err.to_string()),
        };

        let state = match self.registry.chat(session_id) {
            Some(session) => session.state,
            None => return Ok(Vec::new()),
        };

        match (state, request) {
            (_, ClientRequest::Disconnect) => self.teardown(session_id, CloseReason::Disconnect),
            (ChatState::AwaitingNickname, ClientRequest::SetNickname(raw)) => {
                self.claim_nickname(session_id, &raw)
            },
            (ChatState::Active, ClientRequest::SendMessage(text)) => {
                self.broadcast_message(session_id, text)
            },
            (ChatState::Active, ClientRequest::SendDirectMessage { recipient, text }) => {
                self.direct_message(session_id, &recipient, text)
            },
            (ChatState::Active, ClientRequest::GetMembers) => {
                match ServerReply::Members(self.registry.list_nicknames()).into_frame() {
                    Ok(frame) => {
                        Ok(vec![ServerAction::SendToSession { session_id, frame: frame.into() }])
                    },
                    Err(err) => too_large(session_id, &err),
                }
            },
            (state, request) => self.violation(
                session_id,
                &format!("{:?} not allowed while {state}", request.opcode()),
            ),
        }
    }

    fn handle_monitor_frame(
        &mut self,
        session_id: SessionId,
        frame: &MonitorFrame,
    ) -> Result<Vec<ServerAction>, DriverError> {
        match MonitorMessage::from_frame(frame) {
            Ok(MonitorMessage::Disconnect) => self.teardown(session_id, CloseReason::Disconnect),
            Ok(message) => self.violation(
                session_id,
                &format!("{:?} not accepted from a monitor", message.opcode()),
            ),
            Err(err) => self.violation(session_id, &err.to_string()),
        }
    }

    fn claim_nickname(
        &mut self,
        session_id: SessionId,
        raw: &[u8],
    ) -> Result<Vec<ServerAction>, DriverError> {
        let nickname = match validate_nickname(raw, self.config.max_nickname_len) {
            Ok(nickname) => nickname,
            Err(err) => {
                return Ok(vec![
                    error_reply(session_id, ErrorReply::invalid_nickname(err.to_string()))?,
                    ServerAction::Log {
                        level: LogLevel::Debug,
                        message: format!("session {session_id} sent invalid nickname: {err}"),
                    },
                ]);
            },
        };

        match self.registry.set_nickname(session_id, nickname.clone()) {
            Ok(()) => {},
            Err(RegistryError::NicknameTaken(name)) => {
                return Ok(vec![error_reply(session_id, ErrorReply::nickname_taken(&name))?]);
            },
            Err(err) => return Err(err.into()),
        }

        let mut actions = vec![reply(session_id, ServerReply::NicknameAccepted(nickname.clone()))?];

        if self.config.announce_membership {
            let others: Vec<SessionId> =
                self.registry.active_chat_sessions().filter(|&id| id != session_id).collect();
            if !others.is_empty() {
                let frame = ServerReply::MemberJoined(nickname.clone()).into_frame()?;
                actions.push(ServerAction::Broadcast { session_ids: others, frame: frame.into() });
            }
        }

        actions.push(ServerAction::Lifecycle(LifecycleEvent::NicknameClaimed {
            session_id,
            nickname,
        }));

        Ok(actions)
    }

    fn broadcast_message(
        &mut self,
        session_id: SessionId,
        text: Bytes,
    ) -> Result<Vec<ServerAction>, DriverError> {
        let sender = self.nickname_of(session_id)?;

        // Encode both feeds before fanning anything out
        let chat = ServerReply::Message { sender: sender.clone(), text: text.clone() }.into_frame();
        let monitor = MonitorMessage::Message { sender: sender.clone(), text }.into_frame();
        let (chat, monitor) = match (chat, monitor) {
            (Ok(chat), Ok(monitor)) => (chat, monitor),
            (Err(err), _) | (_, Err(err)) => return too_large(session_id, &err),
        };

        let mut actions = Vec::new();

        let members: Vec<SessionId> = self
            .registry
            .active_chat_sessions()
            .filter(|&id| self.config.echo_to_sender || id != session_id)
            .collect();
        if !members.is_empty() {
            actions.push(ServerAction::Broadcast { session_ids: members, frame: chat.into() });
        }

        let monitors = self.matching_monitors(|m| m.wants_broadcast(&sender));
        if !monitors.is_empty() {
            actions.push(ServerAction::Broadcast { session_ids: monitors, frame: monitor.into() });
        }

        Ok(actions)
    }

    fn direct_message(
        &mut self,
        session_id: SessionId,
        recipient: &[u8],
        text: Bytes,
    ) -> Result<Vec<ServerAction>, DriverError> {
        let sender = self.nickname_of(session_id)?;

        let name = std::str::from_utf8(recipient).ok();
        let target = name.and_then(|n| self.registry.find_by_nickname(n).map(|id| (n, id)));
        let Some((recipient, recipient_id)) = target else {
            let error = match name {
                Some(n) if n.len() <= self.config.max_nickname_len => {
                    ErrorReply::recipient_not_found(n)
                },
                _ => ErrorReply::new(ErrorCode::RecipientNotFound, "no such member"),
            };
            return Ok(vec![error_reply(session_id, error)?]);
        };

        let chat =
            ServerReply::DirectMessage { sender: sender.clone(), text: text.clone() }.into_frame();
        let monitor = MonitorMessage::DirectMessage { sender: sender.clone(), text }.into_frame();
        let (chat, monitor) = match (chat, monitor) {
            (Ok(chat), Ok(monitor)) => (chat, monitor),
            (Err(err), _) | (_, Err(err)) => return too_large(session_id, &err),
        };

        let mut actions =
            vec![ServerAction::SendToSession { session_id: recipient_id, frame: chat.into() }];

        let monitors = self.matching_monitors(|m| m.wants_direct(&sender, recipient));
        if !monitors.is_empty() {
            actions.push(ServerAction::Broadcast { session_ids: monitors, frame: monitor.into() });
        }

        Ok(actions)
    }

    fn handle_decode_failed(
        &mut self,
        session_id: SessionId,
        error: &ProtocolError,
    ) -> Result<Vec<ServerAction>, DriverError> {
        let reason = CloseReason::ProtocolViolation(error.to_string());

        if self.pending.remove(&session_id).is_some() {
            return Ok(closed_before_handshake(session_id, reason));
        }

        let mut actions = Vec::new();
        if self.registry.chat(session_id).is_some() {
            let notice = match error {
                ProtocolError::LengthOverflow { .. } => {
                    ErrorReply::message_too_large(error.to_string())
                },
                _ => ErrorReply::protocol_violation(error.to_string()),
            };
            actions.push(error_reply(session_id, notice)?);
        }
        actions.extend(self.teardown(session_id, reason)?);

        Ok(actions)
    }

    /// Send `ERROR(PROTOCOL_VIOLATION)` to a chat session, then tear it down.
    fn violation(
        &mut self,
        session_id: SessionId,
        reason: &str,
    ) -> Result<Vec<ServerAction>, DriverError> {
        let mut actions = Vec::new();
        if self.registry.chat(session_id).is_some() {
            actions.push(error_reply(session_id, ErrorReply::protocol_violation(reason))?);
        }
        actions.extend(
            self.teardown(session_id, CloseReason::ProtocolViolation(reason.to_string()))?,
        );
        Ok(actions)
    }

    /// Remove a connection and announce its departure.
    ///
    /// Idempotent: tearing down an unknown or already removed id produces no
    /// actions.
    fn teardown(
        &mut self,
        session_id: SessionId,
        reason: CloseReason,
    ) -> Result<Vec<ServerAction>, DriverError> {
        if self.pending.remove(&session_id).is_some() {
            return Ok(closed_before_handshake(session_id, reason));
        }

        let Some(removed) = self.registry.remove(session_id) else {
            return Ok(Vec::new());
        };

        let mut actions =
            vec![ServerAction::CloseConnection { session_id, reason: reason.clone() }];

        let nickname = match removed {
            RemovedSession::Chat(session) => session.nickname,
            RemovedSession::Monitor(_) => None,
        };

        if let Some(nickname) = &nickname
            && self.config.announce_membership
            && !self.shutting_down
        {
            let members: Vec<SessionId> = self.registry.active_chat_sessions().collect();
            if !members.is_empty() {
                let frame = ServerReply::MemberLeft(nickname.clone()).into_frame()?;
                actions.push(ServerAction::Broadcast { session_ids: members, frame: frame.into() });
            }
        }

        actions.push(ServerAction::Lifecycle(LifecycleEvent::TornDown {
            session_id,
            nickname,
            reason,
        }));

        Ok(actions)
    }

    /// Close connections that never sent a first frame.
    fn handle_tick(&mut self) -> Vec<ServerAction> {
        let now = self.env.now();
        let timeout = self.config.handshake_timeout;

        let mut expired: Vec<SessionId> = self
            .pending
            .iter()
            .filter(|(_, pending)| now - pending.accepted_at >= timeout)
            .map(|(&id, _)| id)
            .collect();
        expired.sort_unstable();

        let mut actions = Vec::new();
        for session_id in expired {
            self.pending.remove(&session_id);
            actions.extend(closed_before_handshake(session_id, CloseReason::HandshakeTimeout));
        }
        actions
    }

    /// Notify chat clients, then close everything.
    fn handle_shutdown(&mut self) -> Result<Vec<ServerAction>, DriverError> {
        self.shutting_down = true;

        let mut actions = Vec::new();

        let mut chats: Vec<SessionId> = self.registry.all_chat_sessions().collect();
        chats.sort_unstable();
        if !chats.is_empty() {
            let notice = ServerReply::Error(ErrorReply::shutting_down()).into_frame()?;
            actions.push(ServerAction::Broadcast { session_ids: chats, frame: notice.into() });
        }

        let mut all: Vec<SessionId> = self
            .pending
            .keys()
            .copied()
            .chain(self.registry.all_chat_sessions())
            .chain(self.registry.all_monitor_sessions().map(|m| m.id))
            .collect();
        all.sort_unstable();

        for session_id in all {
            actions.extend(self.teardown(session_id, CloseReason::Shutdown)?);
        }

        Ok(actions)
    }

    fn nickname_of(&self, session_id: SessionId) -> Result<String, DriverError> {
        self.registry
            .chat(session_id)
            .and_then(|session| session.nickname.clone())
            .ok_or(DriverError::Registry(RegistryError::SessionNotFound(session_id)))
    }

    fn matching_monitors(
        &self,
        wants: impl Fn(&crate::session::MonitorSession) -> bool,
    ) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> =
            self.registry.all_monitor_sessions().filter(|m| wants(*m)).map(|m| m.id).collect();
        ids.sort_unstable();
        ids
    }

    /// Session registry (read-only).
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Driver configuration.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Connections that have not sent their first frame.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// All live connections, pending ones included.
    pub fn connection_count(&self) -> usize {
        self.pending.len() + self.registry.session_count()
    }

    /// Whether `Shutdown` has been processed.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }
}

impl<E: Environment> fmt::Debug for ServerDriver<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerDriver")
            .field("pending_count", &self.pending.len())
            .field("session_count", &self.registry.session_count())
            .field("shutting_down", &self.shutting_down)
            .finish()
    }
}

fn reply(session_id: SessionId, reply: ServerReply) -> Result<ServerAction, DriverError> {
    Ok(ServerAction::SendToSession { session_id, frame: reply.into_frame()?.into() })
}

fn error_reply(session_id: SessionId, error: ErrorReply) -> Result<ServerAction, DriverError> {
    reply(session_id, ServerReply::Error(error))
}

fn too_large(
    session_id: SessionId,
    err: &ProtocolError,
) -> Result<Vec<ServerAction>, DriverError> {
    Ok(vec![error_reply(session_id, ErrorReply::message_too_large(err.to_string()))?])
}

fn closed_before_handshake(session_id: SessionId, reason: CloseReason) -> Vec<ServerAction> {
    vec![
        ServerAction::CloseConnection { session_id, reason: reason.clone() },
        ServerAction::Lifecycle(LifecycleEvent::TornDown { session_id, nickname: None, reason }),
    ]
}

/// A chat-framed first frame that is not `CONNECT`.
fn reject_before_handshake(
    session_id: SessionId,
    reason: String,
) -> Result<Vec<ServerAction>, DriverError> {
    let mut actions = vec![error_reply(session_id, ErrorReply::protocol_violation(reason.clone()))?];
    actions.extend(closed_before_handshake(session_id, CloseReason::ProtocolViolation(reason)));
    Ok(actions)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    };

    use parley_proto::{ChatOpcode, ErrorCode};

    use super::*;

    /// Manual clock: time only moves when the test says so.
    #[derive(Clone, Default)]
    struct TestEnv {
        millis: Arc<AtomicU64>,
    }

    impl TestEnv {
        fn advance(&self, by: Duration) {
            self.millis.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
        }
    }

    impl Environment for TestEnv {
        type Instant = Duration;

        fn now(&self) -> Duration {
            Duration::from_millis(self.millis.load(Ordering::SeqCst))
        }
    }

    fn peer() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 50000))
    }

    fn chat(request: ClientRequest) -> Frame {
        Frame::Chat(request.into_frame().unwrap())
    }

    fn accept(driver: &mut ServerDriver<TestEnv>, session_id: SessionId) {
        driver.process_event(ServerEvent::ConnectionAccepted { session_id, peer: peer() }).unwrap();
    }

    fn send(
        driver: &mut ServerDriver<TestEnv>,
        session_id: SessionId,
        request: ClientRequest,
    ) -> Vec<ServerAction> {
        driver
            .process_event(ServerEvent::FrameReceived { session_id, frame: chat(request) })
            .unwrap()
    }

    fn replies_to(actions: &[ServerAction], target: SessionId) -> Vec<ServerReply> {
        actions
            .iter()
            .filter_map(|action| match action {
                ServerAction::SendToSession { session_id, frame: Frame::Chat(frame) }
                    if *session_id == target =>
                {
                    Some(ServerReply::from_frame(frame).unwrap())
                },
                _ => None,
            })
            .collect()
    }

    #[test]
    fn accept_creates_pending_connection() {
        let mut driver = ServerDriver::new(TestEnv::default(), DriverConfig::default());

        let actions = driver
            .process_event(ServerEvent::ConnectionAccepted { session_id: 1, peer: peer() })
            .unwrap();

        assert_eq!(driver.pending_count(), 1);
        assert_eq!(driver.registry().session_count(), 0);
        assert_eq!(actions, vec![ServerAction::Lifecycle(LifecycleEvent::Accepted {
            session_id: 1,
            peer: peer(),
        })]);
    }

    #[test]
    fn duplicate_session_id_is_an_error() {
        let mut driver = ServerDriver::new(TestEnv::default(), DriverConfig::default());
        accept(&mut driver, 1);

        let result =
            driver.process_event(ServerEvent::ConnectionAccepted { session_id: 1, peer: peer() });
        assert!(matches!(result, Err(DriverError::SessionAlreadyExists(1))));
    }

    #[test]
    fn rejects_when_max_connections_exceeded() {
        let config = DriverConfig { max_connections: 2, ..Default::default() };
        let mut driver = ServerDriver::new(TestEnv::default(), config);

        accept(&mut driver, 1);
        accept(&mut driver, 2);

        let actions = driver
            .process_event(ServerEvent::ConnectionAccepted { session_id: 3, peer: peer() })
            .unwrap();

        assert_eq!(driver.connection_count(), 2);
        assert!(matches!(actions[0], ServerAction::CloseConnection {
            session_id: 3,
            reason: CloseReason::ServerFull
        }));
    }

    #[test]
    fn connect_is_acknowledged() {
        let mut driver = ServerDriver::new(TestEnv::default(), DriverConfig::default());
        accept(&mut driver, 1);

        let actions = send(&mut driver, 1, ClientRequest::Connect);

        assert_eq!(replies_to(&actions, 1), vec![ServerReply::Connected]);
        assert_eq!(driver.pending_count(), 0);
        assert_eq!(driver.registry().chat(1).map(|s| s.state), Some(ChatState::AwaitingNickname));
    }

    #[test]
    fn first_frame_must_be_connect() {
        let mut driver = ServerDriver::new(TestEnv::default(), DriverConfig::default());
        accept(&mut driver, 1);

        let actions = send(&mut driver, 1, ClientRequest::SendMessage(Bytes::from_static(b"hi")));

        let replies = replies_to(&actions, 1);
        assert!(matches!(
            replies.as_slice(),
            [ServerReply::Error(ErrorReply { code: ErrorCode::ProtocolViolation, .. })]
        ));
        assert!(actions.iter().any(|a| matches!(a, ServerAction::CloseConnection {
            session_id: 1,
            reason: CloseReason::ProtocolViolation(_)
        })));
        assert_eq!(driver.connection_count(), 0);
    }

    #[test]
    fn lenient_connect_accepts_nickname_first() {
        let config = DriverConfig { lenient_connect: true, ..Default::default() };
        let mut driver = ServerDriver::new(TestEnv::default(), config);
        accept(&mut driver, 1);

        let actions =
            send(&mut driver, 1, ClientRequest::SetNickname(Bytes::from_static(b"alice")));

        assert_eq!(replies_to(&actions, 1), vec![ServerReply::NicknameAccepted(
            "alice".to_string()
        )]);
        assert_eq!(driver.registry().find_by_nickname("alice"), Some(1));
    }

    #[test]
    fn handshake_timeout_closes_silent_connections() {
        let env = TestEnv::default();
        let mut driver = ServerDriver::new(env.clone(), DriverConfig::default());
        accept(&mut driver, 1);

        env.advance(Duration::from_secs(10));
        accept(&mut driver, 2);

        env.advance(Duration::from_secs(25));
        let actions = driver.process_event(ServerEvent::Tick).unwrap();

        assert_eq!(actions[0], ServerAction::CloseConnection {
            session_id: 1,
            reason: CloseReason::HandshakeTimeout,
        });
        assert_eq!(driver.pending_count(), 1);

        env.advance(Duration::from_secs(5));
        let actions = driver.process_event(ServerEvent::Tick).unwrap();
        assert!(matches!(actions[0], ServerAction::CloseConnection { session_id: 2, .. }));
        assert_eq!(driver.connection_count(), 0);
    }

    #[test]
    fn connected_sessions_are_not_timed_out() {
        let env = TestEnv::default();
        let mut driver = ServerDriver::new(env.clone(), DriverConfig::default());
        accept(&mut driver, 1);
        send(&mut driver, 1, ClientRequest::Connect);

        env.advance(Duration::from_secs(60));
        assert!(driver.process_event(ServerEvent::Tick).unwrap().is_empty());
        assert_eq!(driver.registry().chat_count(), 1);
    }

    #[test]
    fn disconnect_in_awaiting_nickname() {
        let mut driver = ServerDriver::new(TestEnv::default(), DriverConfig::default());
        accept(&mut driver, 1);
        send(&mut driver, 1, ClientRequest::Connect);

        let actions = send(&mut driver, 1, ClientRequest::Disconnect);

        assert_eq!(actions[0], ServerAction::CloseConnection {
            session_id: 1,
            reason: CloseReason::Disconnect,
        });
        assert!(replies_to(&actions, 1).is_empty());
        assert_eq!(driver.registry().session_count(), 0);
    }

    #[test]
    fn message_before_nickname_is_a_violation() {
        let mut driver = ServerDriver::new(TestEnv::default(), DriverConfig::default());
        accept(&mut driver, 1);
        send(&mut driver, 1, ClientRequest::Connect);

        let actions = send(&mut driver, 1, ClientRequest::GetMembers);

        assert!(matches!(
            replies_to(&actions, 1).as_slice(),
            [ServerReply::Error(ErrorReply { code: ErrorCode::ProtocolViolation, .. })]
        ));
        assert_eq!(driver.registry().session_count(), 0);
    }

    #[test]
    fn server_reply_types_from_client_are_violations() {
        let mut driver = ServerDriver::new(TestEnv::default(), DriverConfig::default());
        accept(&mut driver, 1);
        send(&mut driver, 1, ClientRequest::Connect);

        let frame = ChatFrame::new(ChatOpcode::Members, Bytes::new()).unwrap();
        let actions = driver
            .process_event(ServerEvent::FrameReceived { session_id: 1, frame: frame.into() })
            .unwrap();

        assert!(actions.iter().any(|a| matches!(a, ServerAction::CloseConnection { .. })));
        assert_eq!(driver.registry().session_count(), 0);
    }

    #[test]
    fn teardown_is_idempotent() {
        let mut driver = ServerDriver::new(TestEnv::default(), DriverConfig::default());
        accept(&mut driver, 1);
        send(&mut driver, 1, ClientRequest::Connect);

        let first = driver
            .process_event(ServerEvent::ConnectionClosed {
                session_id: 1,
                reason: CloseReason::PeerClosed,
            })
            .unwrap();
        let second = driver
            .process_event(ServerEvent::ConnectionClosed {
                session_id: 1,
                reason: CloseReason::PeerClosed,
            })
            .unwrap();

        assert_eq!(first.len(), 2);
        assert!(second.is_empty());
    }

    #[test]
    fn late_frames_for_closed_sessions_are_dropped() {
        let mut driver = ServerDriver::new(TestEnv::default(), DriverConfig::default());

        let actions = send(&mut driver, 42, ClientRequest::GetMembers);

        assert!(matches!(actions.as_slice(), [ServerAction::Log { level: LogLevel::Debug, .. }]));
    }

    #[test]
    fn decode_failure_on_pending_closes_without_reply() {
        let mut driver = ServerDriver::new(TestEnv::default(), DriverConfig::default());
        accept(&mut driver, 1);

        let actions = driver
            .process_event(ServerEvent::DecodeFailed {
                session_id: 1,
                error: ProtocolError::UnexpectedOpcode(0x7F00),
            })
            .unwrap();

        assert!(replies_to(&actions, 1).is_empty());
        assert!(matches!(actions[0], ServerAction::CloseConnection { session_id: 1, .. }));
    }

    #[test]
    fn oversized_inbound_frame_reports_message_too_large() {
        let mut driver = ServerDriver::new(TestEnv::default(), DriverConfig::default());
        accept(&mut driver, 1);
        send(&mut driver, 1, ClientRequest::Connect);

        let actions = driver
            .process_event(ServerEvent::DecodeFailed {
                session_id: 1,
                error: ProtocolError::LengthOverflow {
                    field: "data_length",
                    length: 65_000,
                    max: 60_000,
                },
            })
            .unwrap();

        assert!(matches!(
            replies_to(&actions, 1).as_slice(),
            [ServerReply::Error(ErrorReply { code: ErrorCode::MessageTooLarge, .. })]
        ));
        assert_eq!(driver.registry().session_count(), 0);
    }

    #[test]
    fn shutdown_refuses_new_connections() {
        let mut driver = ServerDriver::new(TestEnv::default(), DriverConfig::default());
        driver.process_event(ServerEvent::Shutdown).unwrap();

        let actions = driver
            .process_event(ServerEvent::ConnectionAccepted { session_id: 1, peer: peer() })
            .unwrap();

        assert!(driver.is_shutting_down());
        assert_eq!(actions, vec![ServerAction::CloseConnection {
            session_id: 1,
            reason: CloseReason::Shutdown,
        }]);
    }

    #[test]
    fn default_config_is_valid() {
        assert_eq!(DriverConfig::default().validate(), Ok(()));
    }

    #[test]
    fn member_list_must_fit_in_one_frame() {
        let config = DriverConfig { max_nickname_len: 200, ..Default::default() };
        let err = config.validate().unwrap_err();
        assert!(err.contains("maximum is 60000"), "{err}");

        let config = DriverConfig { max_connections: 250, max_nickname_len: 200, ..Default::default() };
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn nickname_limit_is_bounded() {
        let config = DriverConfig { max_connections: 1, max_nickname_len: 1000, ..Default::default() };
        assert!(config.validate().is_err());

        let config = DriverConfig { max_nickname_len: 0, ..Default::default() };
        assert!(config.validate().is_err());

        let config = DriverConfig { max_connections: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }
}
