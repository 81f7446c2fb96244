//! Read-only monitor session.
//!
//! Attaches with `MON_CONNECT` (optionally filtered to one nickname) and
//! prints every message the server forwards. Input is only watched for
//! `quit`.

use parley_proto::{Frame, Framing, MonitorMessage};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::{
    error::ClientError,
    render::{render_monitor, write_line},
    transport::{self, FrameReader, FrameWriter},
};

/// A connected monitor.
#[derive(Debug)]
pub struct MonitorClient {
    reader: FrameReader,
    writer: FrameWriter,
}

impl MonitorClient {
    /// Connect and attach as a monitor.
    ///
    /// The server sends no acknowledgement.
    pub async fn connect(addr: &str, filter: Option<String>) -> Result<Self, ClientError> {
        let (reader, mut writer) = transport::connect(addr, Framing::Monitor).await?;
        writer.send(MonitorMessage::Connect { filter }.into_frame()?).await?;
        Ok(Self { reader, writer })
    }

    /// Next forwarded message, or `None` once the server closes.
    pub async fn next_message(&mut self) -> Result<Option<MonitorMessage>, ClientError> {
        next_message(&mut self.reader).await
    }

    /// Print forwarded messages until `quit`, shutdown, or the server
    /// closing.
    pub async fn run<R, W>(
        mut self,
        input: R,
        mut output: W,
        shutdown: CancellationToken,
    ) -> Result<(), ClientError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        let mut input_open = true;

        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => return detach(&mut self.writer).await,

                message = next_message(&mut self.reader) => match message? {
                    Some(message) => {
                        if let Some(line) = render_monitor(&message) {
                            write_line(&mut output, &line).await?;
                        }
                    },
                    None => {
                        write_line(&mut output, "Server closed the connection").await?;
                        return Ok(());
                    },
                },

                line = lines.next_line(), if input_open => match line? {
                    Some(line) if line.trim() == "quit" => return detach(&mut self.writer).await,
                    Some(_) => {},
                    // Keep printing until Ctrl-C
                    None => input_open = false,
                },
            }
        }
    }
}

async fn next_message(reader: &mut FrameReader) -> Result<Option<MonitorMessage>, ClientError> {
    match reader.next_frame().await? {
        Some(Frame::Monitor(frame)) => Ok(Some(MonitorMessage::from_frame(&frame)?)),
        Some(Frame::Chat(frame)) => {
            Err(ClientError::UnexpectedReply(format!("chat frame {:?}", frame.opcode())))
        },
        None => Ok(None),
    }
}

async fn detach(writer: &mut FrameWriter) -> Result<(), ClientError> {
    writer.send(MonitorMessage::Disconnect.into_frame()?).await?;
    writer.shutdown().await
}
