//! Per-connection socket tasks.
//!
//! Each accepted TCP stream is split into a reader task and a writer task.
//! The reader feeds a [`FrameDecoder`] and forwards every complete frame, in
//! order, to the event loop. The writer drains a FIFO queue of encoded frames.
//! Neither task touches the registry; they only exchange bytes and events.

use bytes::Bytes;
use parley_proto::FrameDecoder;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};

use crate::{
    driver::{CloseReason, ServerEvent},
    session::SessionId,
};

/// Read chunk reserved ahead of each socket read.
const READ_CHUNK: usize = 4096;

/// Encoded frames that may wait for one slow socket.
pub(crate) const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Why a frame could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QueueError {
    /// The peer is not draining its socket
    Full,
    /// The writer has exited
    Closed,
}

/// Event loop side of one connection.
#[derive(Debug)]
pub(crate) struct ConnectionHandle {
    outbound: mpsc::Sender<Bytes>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl ConnectionHandle {
    /// Split `stream` and start its reader and writer tasks.
    pub(crate) fn spawn(
        session_id: SessionId,
        stream: TcpStream,
        events: mpsc::Sender<ServerEvent>,
    ) -> Self {
        let (read_half, write_half) = stream.into_split();
        let (outbound, queue) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);

        let reader = tokio::spawn(read_loop(session_id, read_half, events.clone()));
        let writer = tokio::spawn(write_loop(session_id, write_half, queue, events));

        Self { outbound, reader, writer }
    }

    /// Queue an encoded frame without waiting.
    pub(crate) fn send(&self, bytes: Bytes) -> Result<(), QueueError> {
        self.outbound.try_send(bytes).map_err(|e| match e {
            TrySendError::Full(_) => QueueError::Full,
            TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    /// Stop reading and let the writer flush what is already queued.
    ///
    /// Returns the writer task so the caller can bound how long it waits.
    pub(crate) fn close(self) -> JoinHandle<()> {
        self.reader.abort();
        drop(self.outbound);
        self.writer
    }

    /// Stop both tasks, dropping anything still queued.
    pub(crate) fn abort(self) {
        self.reader.abort();
        self.writer.abort();
    }
}

async fn read_loop(
    session_id: SessionId,
    mut socket: OwnedReadHalf,
    events: mpsc::Sender<ServerEvent>,
) {
    let mut decoder = FrameDecoder::new();

    let reason = loop {
        decoder.buffer_mut().reserve(READ_CHUNK);
        match socket.read_buf(decoder.buffer_mut()).await {
            Ok(0) => break CloseReason::PeerClosed,
            Ok(_) => {},
            Err(e) => break CloseReason::Io(e.to_string()),
        }

        loop {
            match decoder.next_frame() {
                Ok(Some(frame)) => {
                    let event = ServerEvent::FrameReceived { session_id, frame };
                    if events.send(event).await.is_err() {
                        return;
                    }
                },
                Ok(None) => break,
                Err(error) => {
                    // Nothing after a bad frame can be trusted
                    let _ = events.send(ServerEvent::DecodeFailed { session_id, error }).await;
                    return;
                },
            }
        }
    };

    tracing::debug!(session_id, %reason, "reader finished");
    let _ = events.send(ServerEvent::ConnectionClosed { session_id, reason }).await;
}

async fn write_loop(
    session_id: SessionId,
    mut socket: OwnedWriteHalf,
    mut queue: mpsc::Receiver<Bytes>,
    events: mpsc::Sender<ServerEvent>,
) {
    while let Some(bytes) = queue.recv().await {
        if let Err(e) = socket.write_all(&bytes).await {
            tracing::debug!(session_id, error = %e, "write failed");
            let reason = CloseReason::Io(e.to_string());
            let _ = events.send(ServerEvent::ConnectionClosed { session_id, reason }).await;
            return;
        }
    }

    // Queue closed by the event loop: everything queued has been written
    let _ = socket.shutdown().await;
}
