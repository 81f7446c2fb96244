//! Fuzz target for the server dispatcher
//!
//! Drives `ServerDriver` with arbitrary event sequences: connections opening
//! and closing, well-formed and malformed frames, ticks, and shutdown.
//!
//! # Invariants
//!
//! - `process_event` never panics and never returns an error for events the
//!   runtime can produce
//! - Every claimed nickname maps back to the session holding it
//! - Frames are only ever addressed to live sessions
//! - No connection outlives shutdown

#![no_main]

use std::{
    collections::HashSet,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use arbitrary::Arbitrary;
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use parley_proto::{ChatFrame, ClientRequest, Frame, MonitorMessage, ProtocolError};
use parley_server::{
    CloseReason, DriverConfig, Environment, ServerAction, ServerDriver, ServerEvent,
};

#[derive(Clone, Default)]
struct FuzzEnv {
    millis: Arc<AtomicU64>,
}

impl Environment for FuzzEnv {
    type Instant = Duration;

    fn now(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Arbitrary)]
enum Op {
    Accept,
    Connect(u8),
    SetNickname(u8, u8),
    Say(u8, Vec<u8>),
    Whisper(u8, u8, Vec<u8>),
    GetMembers(u8),
    Disconnect(u8),
    MonitorConnect(u8, Option<u8>),
    MonitorDisconnect(u8),
    RawChat(u8, u16, Vec<u8>),
    DecodeFailed(u8),
    Closed(u8),
    Advance(u16),
    Tick,
}

const NAMES: [&str; 4] = ["alice", "bob", "carol", "a b"];

fuzz_target!(|ops: Vec<Op>| {
    let env = FuzzEnv::default();
    let config = DriverConfig { max_connections: 8, ..Default::default() };
    let mut driver = ServerDriver::new(env.clone(), config);

    let peer = SocketAddr::from(([127, 0, 0, 1], 1));
    let mut next_id = 1u64;
    let mut open: HashSet<u64> = HashSet::new();

    let id = |n: u8| u64::from(n % 16) + 1;
    let name = |n: u8| Bytes::from_static(NAMES[usize::from(n) % NAMES.len()].as_bytes());
    let chat = |r: ClientRequest| r.into_frame().ok().map(Frame::Chat);

    for op in ops {
        let event = match op {
            Op::Accept => {
                let session_id = next_id;
                next_id += 1;
                open.insert(session_id);
                Some(ServerEvent::ConnectionAccepted { session_id, peer })
            },
            Op::Connect(s) => chat(ClientRequest::Connect)
                .map(|frame| ServerEvent::FrameReceived { session_id: id(s), frame }),
            Op::SetNickname(s, n) => chat(ClientRequest::SetNickname(name(n)))
                .map(|frame| ServerEvent::FrameReceived { session_id: id(s), frame }),
            Op::Say(s, text) => chat(ClientRequest::SendMessage(text.into()))
                .map(|frame| ServerEvent::FrameReceived { session_id: id(s), frame }),
            Op::Whisper(s, n, text) => chat(ClientRequest::SendDirectMessage {
                recipient: name(n),
                text: text.into(),
            })
            .map(|frame| ServerEvent::FrameReceived { session_id: id(s), frame }),
            Op::GetMembers(s) => chat(ClientRequest::GetMembers)
                .map(|frame| ServerEvent::FrameReceived { session_id: id(s), frame }),
            Op::Disconnect(s) => chat(ClientRequest::Disconnect)
                .map(|frame| ServerEvent::FrameReceived { session_id: id(s), frame }),
            Op::MonitorConnect(s, filter) => {
                let filter = filter.map(|n| NAMES[usize::from(n) % NAMES.len()].to_string());
                MonitorMessage::Connect { filter }
                    .into_frame()
                    .ok()
                    .map(|frame| ServerEvent::FrameReceived { session_id: id(s), frame: frame.into() })
            },
            Op::MonitorDisconnect(s) => MonitorMessage::Disconnect
                .into_frame()
                .ok()
                .map(|frame| ServerEvent::FrameReceived { session_id: id(s), frame: frame.into() }),
            Op::RawChat(s, opcode, payload) => ChatFrame::with_raw_opcode(opcode, payload)
                .ok()
                .map(|frame| ServerEvent::FrameReceived { session_id: id(s), frame: frame.into() }),
            Op::DecodeFailed(s) => Some(ServerEvent::DecodeFailed {
                session_id: id(s),
                error: ProtocolError::UnexpectedOpcode(0xFFFF),
            }),
            Op::Closed(s) => Some(ServerEvent::ConnectionClosed {
                session_id: id(s),
                reason: CloseReason::PeerClosed,
            }),
            Op::Advance(ms) => {
                env.millis.fetch_add(u64::from(ms) * 100, Ordering::SeqCst);
                None
            },
            Op::Tick => Some(ServerEvent::Tick),
        };

        let Some(event) = event else { continue };
        let actions = driver.process_event(event).expect("driver invariant violated");
        check(&driver, &actions, &mut open);
    }

    let actions = driver.process_event(ServerEvent::Shutdown).expect("shutdown");
    check(&driver, &actions, &mut open);
    assert_eq!(driver.connection_count(), 0, "connections survived shutdown");
    assert!(open.is_empty(), "runtime would still hold sockets");
});

fn check(driver: &ServerDriver<FuzzEnv>, actions: &[ServerAction], open: &mut HashSet<u64>) {
    for action in actions {
        match action {
            ServerAction::SendToSession { session_id, .. } => {
                assert!(open.contains(session_id), "frame to closed session {session_id}");
            },
            ServerAction::Broadcast { session_ids, .. } => {
                assert!(!session_ids.is_empty(), "empty broadcast");
                for session_id in session_ids {
                    assert!(open.contains(session_id), "broadcast to closed session {session_id}");
                }
            },
            ServerAction::CloseConnection { session_id, .. } => {
                assert!(open.remove(session_id), "double close of {session_id}");
            },
            ServerAction::Lifecycle(_) | ServerAction::Log { .. } => {},
        }
    }

    let registry = driver.registry();
    for nickname in registry.list_nicknames() {
        let holder = registry.find_by_nickname(&nickname).expect("indexed nickname");
        assert_eq!(
            registry.chat(holder).and_then(|s| s.nickname.as_deref()),
            Some(nickname.as_str())
        );
    }
}
