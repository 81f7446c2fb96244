//! Session registry for chat clients and monitors.
//!
//! Chat and monitor sessions share one id space. A reverse index maps claimed
//! nicknames to their session for O(1) direct-message routing, and a roster
//! keeps active members in the order they claimed their nicknames.
//!
//! All mutation happens on the event-loop task, so the registry is a plain
//! owned value with no interior locking.

use std::{collections::HashMap, net::SocketAddr};

use thiserror::Error;

use crate::session::{ChatSession, ChatState, MonitorSession, SessionId};

/// Registry operation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The id is already live as a chat or monitor session.
    #[error("session {0} already registered")]
    SessionExists(SessionId),

    /// No chat session with this id.
    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    /// Another chat session holds the nickname.
    #[error("nickname {0} is already taken")]
    NicknameTaken(String),

    /// The session already claimed a nickname.
    #[error("session {0} already has a nickname")]
    NicknameAlreadySet(SessionId),
}

/// A session removed from the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovedSession {
    /// Removed chat client
    Chat(ChatSession),
    /// Removed monitor
    Monitor(MonitorSession),
}

impl RemovedSession {
    /// Session id of the removed record.
    pub fn id(&self) -> SessionId {
        match self {
            Self::Chat(session) => session.id,
            Self::Monitor(session) => session.id,
        }
    }
}

/// Registry of live chat and monitor sessions.
///
/// # Invariants
///
/// - An id appears in at most one of the chat and monitor tables.
/// - `nicknames[n] == id` iff `chats[id].nickname == Some(n)`.
/// - `roster` holds exactly the active chat sessions, in claim order.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    chats: HashMap<SessionId, ChatSession>,
    monitors: HashMap<SessionId, MonitorSession>,
    /// Nickname → session id (reverse index)
    nicknames: HashMap<String, SessionId>,
    /// Active sessions in nickname claim order
    roster: Vec<SessionId>,
}

impl SessionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a chat client awaiting its nickname.
    pub fn register_chat(
        &mut self,
        session_id: SessionId,
        peer: SocketAddr,
    ) -> Result<(), RegistryError> {
        if self.contains(session_id) {
            return Err(RegistryError::SessionExists(session_id));
        }
        self.chats.insert(session_id, ChatSession::new(session_id, peer));
        Ok(())
    }

    /// Register a monitor with an optional nickname filter.
    pub fn register_monitor(
        &mut self,
        session_id: SessionId,
        peer: SocketAddr,
        filter: Option<String>,
    ) -> Result<(), RegistryError> {
        if self.contains(session_id) {
            return Err(RegistryError::SessionExists(session_id));
        }
        self.monitors.insert(session_id, MonitorSession::new(session_id, peer, filter));
        Ok(())
    }

    /// Claim `nickname` for a chat session and make it active.
    ///
    /// Validation of the nickname's content is the caller's job.
    pub fn set_nickname(
        &mut self,
        session_id: SessionId,
        nickname: String,
    ) -> Result<(), RegistryError> {
        let session =
            self.chats.get_mut(&session_id).ok_or(RegistryError::SessionNotFound(session_id))?;

        if session.nickname.is_some() {
            return Err(RegistryError::NicknameAlreadySet(session_id));
        }
        if self.nicknames.contains_key(&nickname) {
            return Err(RegistryError::NicknameTaken(nickname));
        }

        session.nickname = Some(nickname.clone());
        session.state = ChatState::Active;
        self.nicknames.insert(nickname, session_id);
        self.roster.push(session_id);
        Ok(())
    }

    /// Session holding `nickname`. O(1) via the reverse index.
    pub fn find_by_nickname(&self, nickname: &str) -> Option<SessionId> {
        self.nicknames.get(nickname).copied()
    }

    /// Claimed nicknames in claim order.
    pub fn list_nicknames(&self) -> Vec<String> {
        self.roster
            .iter()
            .filter_map(|id| self.chats.get(id).and_then(|s| s.nickname.clone()))
            .collect()
    }

    /// Remove a session of either kind.
    ///
    /// Idempotent: removing an absent id returns `None` and changes nothing.
    pub fn remove(&mut self, session_id: SessionId) -> Option<RemovedSession> {
        if let Some(session) = self.chats.remove(&session_id) {
            if let Some(nickname) = &session.nickname {
                self.nicknames.remove(nickname);
                self.roster.retain(|&id| id != session_id);
            }
            return Some(RemovedSession::Chat(session));
        }

        self.monitors.remove(&session_id).map(RemovedSession::Monitor)
    }

    /// Chat session by id.
    pub fn chat(&self, session_id: SessionId) -> Option<&ChatSession> {
        self.chats.get(&session_id)
    }

    /// Monitor session by id.
    pub fn monitor(&self, session_id: SessionId) -> Option<&MonitorSession> {
        self.monitors.get(&session_id)
    }

    /// Whether the id is live in either table.
    pub fn contains(&self, session_id: SessionId) -> bool {
        self.chats.contains_key(&session_id) || self.monitors.contains_key(&session_id)
    }

    /// Every chat session id, active or not.
    pub fn all_chat_sessions(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.chats.keys().copied()
    }

    /// Active chat session ids in claim order.
    pub fn active_chat_sessions(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.roster.iter().copied()
    }

    /// Every monitor session.
    pub fn all_monitor_sessions(&self) -> impl Iterator<Item = &MonitorSession> + '_ {
        self.monitors.values()
    }

    /// Number of chat sessions.
    pub fn chat_count(&self) -> usize {
        self.chats.len()
    }

    /// Number of active chat sessions.
    pub fn active_count(&self) -> usize {
        self.roster.len()
    }

    /// Number of monitor sessions.
    pub fn monitor_count(&self) -> usize {
        self.monitors.len()
    }

    /// Total number of sessions.
    pub fn session_count(&self) -> usize {
        self.chats.len() + self.monitors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 40000))
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = SessionRegistry::new();

        registry.register_chat(1, peer()).unwrap();
        registry.register_monitor(2, peer(), None).unwrap();

        assert!(registry.chat(1).is_some());
        assert!(registry.monitor(2).is_some());
        assert!(registry.chat(2).is_none());
        assert_eq!(registry.session_count(), 2);
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn ids_are_shared_between_tables() {
        let mut registry = SessionRegistry::new();

        registry.register_chat(1, peer()).unwrap();
        assert_eq!(registry.register_monitor(1, peer(), None), Err(RegistryError::SessionExists(1)));
        assert_eq!(registry.register_chat(1, peer()), Err(RegistryError::SessionExists(1)));

        registry.register_monitor(2, peer(), None).unwrap();
        assert_eq!(registry.register_chat(2, peer()), Err(RegistryError::SessionExists(2)));
    }

    #[test]
    fn nickname_claim_activates_session() {
        let mut registry = SessionRegistry::new();
        registry.register_chat(1, peer()).unwrap();

        registry.set_nickname(1, "alice".to_string()).unwrap();

        let session = registry.chat(1).unwrap();
        assert!(session.is_active());
        assert_eq!(session.nickname.as_deref(), Some("alice"));
        assert_eq!(registry.find_by_nickname("alice"), Some(1));
    }

    #[test]
    fn nickname_uniqueness() {
        let mut registry = SessionRegistry::new();
        registry.register_chat(1, peer()).unwrap();
        registry.register_chat(2, peer()).unwrap();

        registry.set_nickname(1, "alice".to_string()).unwrap();
        assert_eq!(
            registry.set_nickname(2, "alice".to_string()),
            Err(RegistryError::NicknameTaken("alice".to_string()))
        );
        assert!(!registry.chat(2).unwrap().is_active());

        registry.set_nickname(2, "bob".to_string()).unwrap();
        assert_eq!(registry.find_by_nickname("bob"), Some(2));
    }

    #[test]
    fn nickname_is_set_once() {
        let mut registry = SessionRegistry::new();
        registry.register_chat(1, peer()).unwrap();
        registry.set_nickname(1, "alice".to_string()).unwrap();

        assert_eq!(
            registry.set_nickname(1, "alicia".to_string()),
            Err(RegistryError::NicknameAlreadySet(1))
        );
        assert_eq!(registry.find_by_nickname("alicia"), None);
    }

    #[test]
    fn set_nickname_unknown_session() {
        let mut registry = SessionRegistry::new();
        registry.register_monitor(5, peer(), None).unwrap();

        assert_eq!(
            registry.set_nickname(5, "mon".to_string()),
            Err(RegistryError::SessionNotFound(5))
        );
    }

    #[test]
    fn list_in_claim_order() {
        let mut registry = SessionRegistry::new();
        for id in [10, 20, 30] {
            registry.register_chat(id, peer()).unwrap();
        }

        registry.set_nickname(30, "carol".to_string()).unwrap();
        registry.set_nickname(10, "alice".to_string()).unwrap();
        registry.set_nickname(20, "bob".to_string()).unwrap();

        assert_eq!(registry.list_nicknames(), vec!["carol", "alice", "bob"]);
        assert_eq!(registry.active_chat_sessions().collect::<Vec<_>>(), vec![30, 10, 20]);
    }

    #[test]
    fn remove_cleans_up_reverse_index() {
        let mut registry = SessionRegistry::new();
        registry.register_chat(1, peer()).unwrap();
        registry.set_nickname(1, "alice".to_string()).unwrap();

        let removed = registry.remove(1).unwrap();
        assert!(matches!(removed, RemovedSession::Chat(ref s) if s.nickname.as_deref() == Some("alice")));
        assert_eq!(registry.find_by_nickname("alice"), None);
        assert!(registry.list_nicknames().is_empty());

        // Nickname is free again
        registry.register_chat(2, peer()).unwrap();
        registry.set_nickname(2, "alice".to_string()).unwrap();
    }

    #[test]
    fn remove_is_idempotent() {
        let mut registry = SessionRegistry::new();
        registry.register_monitor(1, peer(), Some("bob".to_string())).unwrap();

        assert!(matches!(registry.remove(1), Some(RemovedSession::Monitor(_))));
        assert_eq!(registry.remove(1), None);
        assert_eq!(registry.remove(99), None);
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn all_chat_sessions_includes_inactive() {
        let mut registry = SessionRegistry::new();
        registry.register_chat(1, peer()).unwrap();
        registry.register_chat(2, peer()).unwrap();
        registry.set_nickname(2, "bob".to_string()).unwrap();

        let mut all: Vec<_> = registry.all_chat_sessions().collect();
        all.sort_unstable();
        assert_eq!(all, vec![1, 2]);
        assert_eq!(registry.active_chat_sessions().collect::<Vec<_>>(), vec![2]);
    }
}
