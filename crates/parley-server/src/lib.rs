//! Parley chat server.
//!
//! TCP runtime around a sans-IO protocol dispatcher. One listener accepts both
//! chat clients and read-only monitors; the first frame on a connection
//! decides which it is.
//!
//! # Architecture
//!
//! The [`ServerDriver`] holds all protocol state and turns [`ServerEvent`]s
//! into [`ServerAction`]s without doing any I/O. [`Server`] owns the driver,
//! the listener and the table of connection handles on a single event-loop
//! task, and executes the actions. Per-connection reader and writer tasks only
//! move bytes and events through channels.
//!
//! # Components
//!
//! - [`ServerDriver`]: Action-based dispatcher (pure logic, no I/O)
//! - [`SessionRegistry`]: Chat and monitor sessions with a nickname index
//! - [`Server`]: Runtime that executes driver actions over TCP
//! - [`SystemEnv`]: Production clock

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod connection;
mod driver;
mod env;
mod error;
mod registry;
mod server_error;
mod session;

use std::{collections::HashMap, net::SocketAddr, time::Duration};

use bytes::Bytes;
use connection::{ConnectionHandle, QueueError};
pub use driver::{
    CloseReason, DriverConfig, LifecycleEvent, LogLevel, ServerAction, ServerDriver, ServerEvent,
};
pub use env::{Environment, SystemEnv};
pub use error::ServerError;
use parley_proto::Frame;
pub use registry::{RegistryError, RemovedSession, SessionRegistry};
pub use server_error::DriverError;
pub use session::{
    ChatSession, ChatState, MonitorSession, NicknameError, SessionId, validate_nickname,
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

/// Capacity of the channel carrying events from connection tasks.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// First pause after a failed accept; doubles per consecutive failure.
const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(10);

/// Longest pause between accept attempts.
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "127.0.0.1:8888")
    pub bind_address: String,
    /// Housekeeping interval; also bounds how long shutdown can go unnoticed
    pub tick_interval: Duration,
    /// How long closing connections may take to flush on shutdown
    pub shutdown_grace: Duration,
    /// Driver configuration (limits, policies, timeouts)
    pub driver: DriverConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8888".to_string(),
            tick_interval: Duration::from_secs(2),
            shutdown_grace: Duration::from_secs(1),
            driver: DriverConfig::default(),
        }
    }
}

/// Production Parley server.
///
/// Wraps `ServerDriver` with a TCP listener and the system clock.
pub struct Server {
    /// The action-based server driver
    driver: ServerDriver<SystemEnv>,
    /// TCP listener for chat clients and monitors
    listener: TcpListener,
    config: ServerRuntimeConfig,
    /// Optional observer for lifecycle events
    lifecycle: Option<mpsc::UnboundedSender<LifecycleEvent>>,
}

impl Server {
    /// Create and bind a new server.
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        config.driver.validate().map_err(ServerError::Config)?;

        let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
            ServerError::Config(format!("invalid bind address '{}': {e}", config.bind_address))
        })?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Config(format!("failed to bind {addr}: {e}")))?;

        Ok(Self::from_listener(listener, config))
    }

    /// Create a server on an already-bound listener.
    ///
    /// `config.bind_address` is ignored. The driver limits are checked when
    /// the server starts running.
    pub fn from_listener(listener: TcpListener, config: ServerRuntimeConfig) -> Self {
        let driver = ServerDriver::new(SystemEnv::new(), config.driver.clone());
        Self { driver, listener, config, lifecycle: None }
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Subscribe to lifecycle events.
    ///
    /// Only one observer is supported; calling this again replaces it.
    pub fn lifecycle_events(&mut self) -> mpsc::UnboundedReceiver<LifecycleEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lifecycle = Some(tx);
        rx
    }

    /// Run the server until `shutdown` is cancelled.
    ///
    /// On cancellation every chat client is told the server is shutting down,
    /// then all connections are closed. Queued frames get up to
    /// `shutdown_grace` to flush.
    ///
    /// # Errors
    ///
    /// `ServerError::Config` if the driver limits are out of range.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ServerError> {
        self.config.driver.validate().map_err(ServerError::Config)?;
        tracing::info!("Server starting on {}", self.local_addr()?);

        let Self { driver, listener, config, lifecycle } = self;
        let (events_tx, mut events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let mut runtime = Runtime {
            driver,
            connections: HashMap::new(),
            closing: Vec::new(),
            events: events_tx,
            lifecycle,
        };

        let mut tick = tokio::time::interval(config.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut next_session_id: SessionId = 1;
        let mut accept_failures: u32 = 0;
        let mut accept_paused_until: Option<Instant> = None;

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            tokio::select! {
                biased;

                () = shutdown.cancelled() => break,

                accepted = listener.accept(), if accept_paused_until.is_none() => match accepted {
                    Ok((stream, peer)) => {
                        accept_failures = 0;
                        let session_id = next_session_id;
                        next_session_id += 1;
                        runtime.accept(session_id, stream, peer);
                    },
                    Err(e) => {
                        let pause = accept_backoff(accept_failures);
                        accept_failures = accept_failures.saturating_add(1);
                        tracing::error!("Accept error: {}, retrying in {:?}", e, pause);
                        accept_paused_until = Some(Instant::now() + pause);
                    },
                },

                () = tokio::time::sleep_until(accept_paused_until.unwrap_or_else(Instant::now)),
                    if accept_paused_until.is_some() => accept_paused_until = None,

                Some(event) = events_rx.recv() => runtime.dispatch(event),

                _ = tick.tick() => {
                    runtime.dispatch(ServerEvent::Tick);
                    runtime.closing.retain(|writer| !writer.is_finished());
                },
            }
        }

        tracing::info!("Server shutting down");
        runtime.dispatch(ServerEvent::Shutdown);
        runtime.drain(config.shutdown_grace).await;

        Ok(())
    }
}

/// State owned by the event-loop task.
struct Runtime {
    driver: ServerDriver<SystemEnv>,
    /// Live connections by session id
    connections: HashMap<SessionId, ConnectionHandle>,
    /// Writers flushing their last frames
    closing: Vec<JoinHandle<()>>,
    events: mpsc::Sender<ServerEvent>,
    lifecycle: Option<mpsc::UnboundedSender<LifecycleEvent>>,
}

impl Runtime {
    fn accept(&mut self, session_id: SessionId, stream: TcpStream, peer: SocketAddr) {
        let handle = ConnectionHandle::spawn(session_id, stream, self.events.clone());
        self.connections.insert(session_id, handle);
        self.dispatch(ServerEvent::ConnectionAccepted { session_id, peer });
    }

    fn dispatch(&mut self, event: ServerEvent) {
        match self.driver.process_event(event) {
            Ok(actions) => self.execute(actions),
            Err(e) => tracing::warn!("Event processing error: {}", e),
        }
    }

    /// Execute server actions.
    ///
    /// Sessions whose outbound queue overflowed are torn down afterwards as
    /// if their socket had failed.
    fn execute(&mut self, actions: Vec<ServerAction>) {
        let mut stalled = Vec::new();

        for action in actions {
            match action {
                ServerAction::SendToSession { session_id, frame } => {
                    if let Some(bytes) = encode(&frame) {
                        self.send(session_id, bytes, &mut stalled);
                    }
                },

                ServerAction::Broadcast { session_ids, frame } => {
                    // Encode once, share the buffer
                    if let Some(bytes) = encode(&frame) {
                        for session_id in session_ids {
                            self.send(session_id, bytes.clone(), &mut stalled);
                        }
                    }
                },

                ServerAction::CloseConnection { session_id, reason } => {
                    tracing::debug!(session_id, %reason, "closing connection");
                    if let Some(handle) = self.connections.remove(&session_id) {
                        self.closing.push(handle.close());
                    }
                },

                ServerAction::Lifecycle(event) => {
                    log_lifecycle(&event);
                    if let Some(observer) = &self.lifecycle
                        && observer.send(event).is_err()
                    {
                        self.lifecycle = None;
                    }
                },

                ServerAction::Log { level, message } => match level {
                    LogLevel::Debug => tracing::debug!("{}", message),
                    LogLevel::Info => tracing::info!("{}", message),
                    LogLevel::Warn => tracing::warn!("{}", message),
                    LogLevel::Error => tracing::error!("{}", message),
                },
            }
        }

        for session_id in stalled {
            let reason = CloseReason::Io("outbound queue full".to_string());
            self.dispatch(ServerEvent::ConnectionClosed { session_id, reason });
        }
    }

    fn send(&mut self, session_id: SessionId, bytes: Bytes, stalled: &mut Vec<SessionId>) {
        let Some(handle) = self.connections.get(&session_id) else {
            tracing::warn!("SendToSession: session {} not found", session_id);
            return;
        };

        match handle.send(bytes) {
            Ok(()) => {},
            // A dead writer reports its own ConnectionClosed
            Err(QueueError::Closed) => tracing::debug!(session_id, "writer already gone"),
            Err(QueueError::Full) => {
                tracing::warn!(session_id, "outbound queue full, dropping connection");
                // The writer may be stuck on the socket, so it gets no chance to flush
                if let Some(handle) = self.connections.remove(&session_id) {
                    handle.abort();
                }
                stalled.push(session_id);
            },
        }
    }

    /// Wait for closing writers, then abort whatever is left.
    async fn drain(mut self, grace: Duration) {
        for (_, handle) in self.connections.drain() {
            self.closing.push(handle.close());
        }

        let writers = std::mem::take(&mut self.closing);
        let aborts: Vec<_> = writers.iter().map(JoinHandle::abort_handle).collect();

        let flushed = tokio::time::timeout(grace, async {
            for writer in writers {
                let _ = writer.await;
            }
        })
        .await;

        if flushed.is_err() {
            tracing::warn!("Shutdown grace period elapsed, aborting remaining writers");
            for abort in aborts {
                abort.abort();
            }
        }
    }
}

/// Pause before the next accept after `failures` consecutive errors.
fn accept_backoff(failures: u32) -> Duration {
    ACCEPT_BACKOFF_MIN.saturating_mul(1 << failures.min(16)).min(ACCEPT_BACKOFF_MAX)
}

fn encode(frame: &Frame) -> Option<Bytes> {
    match frame.to_bytes() {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            tracing::error!("Failed to encode outbound frame: {}", e);
            None
        },
    }
}

fn log_lifecycle(event: &LifecycleEvent) {
    match event {
        LifecycleEvent::Accepted { session_id, peer } => {
            tracing::info!(session_id, %peer, "connection accepted");
        },
        LifecycleEvent::ChatConnected { session_id } => {
            tracing::info!(session_id, "chat client connected");
        },
        LifecycleEvent::NicknameClaimed { session_id, nickname } => {
            tracing::info!(session_id, nickname = %nickname, "nickname claimed");
        },
        LifecycleEvent::MonitorAttached { session_id, filter } => {
            tracing::info!(session_id, filter = ?filter, "monitor attached");
        },
        LifecycleEvent::TornDown { session_id, nickname, reason } => {
            tracing::info!(session_id, nickname = ?nickname, %reason, "connection torn down");
        },
    }
}
