//! TCP transport for the client.
//!
//! A connection is split into a [`FrameReader`] and a [`FrameWriter`] so the
//! session loop can wait on server frames while it writes requests.

use parley_proto::{Frame, FrameDecoder, Framing};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
};

use crate::error::ClientError;

/// Read chunk reserved ahead of each socket read.
const READ_CHUNK: usize = 4096;

/// Receiving half: reassembles frames from the socket.
#[derive(Debug)]
pub struct FrameReader {
    socket: OwnedReadHalf,
    decoder: FrameDecoder,
}

impl FrameReader {
    /// Next complete frame, or `None` once the server closes the connection.
    ///
    /// Cancel safe: bytes already read stay buffered in the decoder.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, ClientError> {
        loop {
            if let Some(frame) = self.decoder.next_frame()? {
                return Ok(Some(frame));
            }

            self.decoder.buffer_mut().reserve(READ_CHUNK);
            if self.socket.read_buf(self.decoder.buffer_mut()).await? == 0 {
                return Ok(None);
            }
        }
    }
}

/// Sending half.
#[derive(Debug)]
pub struct FrameWriter {
    socket: OwnedWriteHalf,
}

impl FrameWriter {
    /// Encode and send one frame.
    pub async fn send(&mut self, frame: impl Into<Frame>) -> Result<(), ClientError> {
        let bytes = frame.into().to_bytes()?;
        self.socket.write_all(&bytes).await?;
        Ok(())
    }

    /// Close the sending direction.
    pub async fn shutdown(&mut self) -> Result<(), ClientError> {
        self.socket.shutdown().await?;
        Ok(())
    }
}

/// Connect to a Parley server.
///
/// `framing` fixes how inbound frames are parsed: chat clients only ever
/// receive chat frames, monitors only monitor frames.
pub async fn connect(
    addr: &str,
    framing: Framing,
) -> Result<(FrameReader, FrameWriter), ClientError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| ClientError::Connect { addr: addr.to_string(), source })?;
    stream.set_nodelay(true)?;

    tracing::debug!("connected to {}", addr);

    let (read_half, write_half) = stream.into_split();
    Ok((
        FrameReader { socket: read_half, decoder: FrameDecoder::with_framing(framing) },
        FrameWriter { socket: write_half },
    ))
}
