//! Interactive chat session.
//!
//! ```text
//! connect ──CONNECT/CONNECTED──> nickname prompt ──NICKNAME_ACCEPTED──> chat loop
//!                                   ^          |
//!                                   +-- taken / invalid: prompt again
//! ```
//!
//! The chat loop multiplexes input lines, server frames and the shutdown
//! token. Leaving for any local reason (`quit`, end of input, Ctrl-C) sends
//! `DISCONNECT` first.

use parley_proto::{ClientRequest, ErrorCode, ErrorReply, Frame, Framing, ServerReply};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::{
    command::{Command, parse_line},
    error::ClientError,
    render::{render_reply, write_line, write_prompt},
    transport::{self, FrameReader, FrameWriter},
};

/// Prompt shown before reading a nickname.
const NICKNAME_PROMPT: &str = "Enter chat nickname: ";

/// Result of a nickname claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NicknameOutcome {
    /// The server accepted the nickname
    Accepted(String),
    /// Taken or invalid; the session may try again
    Rejected(ErrorReply),
}

/// A connected chat client.
#[derive(Debug)]
pub struct ChatClient {
    reader: FrameReader,
    writer: FrameWriter,
}

impl ChatClient {
    /// Connect and complete the `CONNECT` handshake.
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        let (reader, writer) = transport::connect(addr, Framing::Chat).await?;
        let mut client = Self { reader, writer };

        client.send(ClientRequest::Connect).await?;
        match client.next_reply().await? {
            Some(ServerReply::Connected) => Ok(client),
            Some(ServerReply::Error(error)) => Err(ClientError::Server(error)),
            Some(other) => Err(ClientError::UnexpectedReply(format!("{other:?}"))),
            None => Err(ClientError::Closed),
        }
    }

    /// Send one request.
    pub async fn send(&mut self, request: ClientRequest) -> Result<(), ClientError> {
        self.writer.send(request.into_frame()?).await
    }

    /// Next reply from the server, or `None` once it closes the connection.
    pub async fn next_reply(&mut self) -> Result<Option<ServerReply>, ClientError> {
        next_reply(&mut self.reader).await
    }

    /// Claim a nickname and wait for the verdict.
    pub async fn claim_nickname(&mut self, nickname: &str) -> Result<NicknameOutcome, ClientError> {
        let nickname = nickname.as_bytes().to_vec();
        self.send(ClientRequest::SetNickname(nickname.into())).await?;

        loop {
            match self.next_reply().await? {
                Some(ServerReply::NicknameAccepted(name)) => {
                    return Ok(NicknameOutcome::Accepted(name));
                },
                Some(ServerReply::Error(error))
                    if matches!(error.code, ErrorCode::NicknameTaken | ErrorCode::InvalidNickname) =>
                {
                    return Ok(NicknameOutcome::Rejected(error));
                },
                Some(ServerReply::Error(error)) => return Err(ClientError::Server(error)),
                Some(other) => tracing::debug!("ignoring {:?} before nickname is set", other),
                None => return Err(ClientError::Closed),
            }
        }
    }

    /// Run the interactive session until the user leaves or the server closes.
    ///
    /// `nickname` is tried first if given; the user is prompted after a
    /// rejection or when it is `None`.
    pub async fn run<R, W>(
        mut self,
        input: R,
        mut output: W,
        nickname: Option<String>,
        shutdown: CancellationToken,
    ) -> Result<(), ClientError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        let mut candidate = nickname;

        loop {
            let name = match candidate.take() {
                Some(name) => name,
                None => {
                    write_prompt(&mut output, NICKNAME_PROMPT).await?;
                    let line = tokio::select! {
                        biased;
                        () = shutdown.cancelled() => None,
                        line = lines.next_line() => line?,
                    };
                    match line {
                        Some(line) => line,
                        None => return disconnect(&mut self.writer).await,
                    }
                },
            };

            match self.claim_nickname(name.trim()).await? {
                NicknameOutcome::Accepted(name) => {
                    write_line(&mut output, &format!("Joined as {name}")).await?;
                    break;
                },
                NicknameOutcome::Rejected(error) => write_line(&mut output, &error.message).await?,
            }
        }

        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => return disconnect(&mut self.writer).await,

                reply = next_reply(&mut self.reader) => match reply? {
                    Some(reply) => {
                        if let Some(line) = render_reply(&reply) {
                            write_line(&mut output, &line).await?;
                        }
                    },
                    None => {
                        write_line(&mut output, "Server closed the connection").await?;
                        return Ok(());
                    },
                },

                line = lines.next_line() => {
                    let Some(line) = line? else {
                        return disconnect(&mut self.writer).await;
                    };
                    match parse_line(&line) {
                        Ok(Some(Command::Quit)) => return disconnect(&mut self.writer).await,
                        Ok(Some(command)) => {
                            self.writer.send(command.into_request().into_frame()?).await?;
                        },
                        Ok(None) => {},
                        Err(e) => write_line(&mut output, &e.to_string()).await?,
                    }
                },
            }
        }
    }
}

async fn next_reply(reader: &mut FrameReader) -> Result<Option<ServerReply>, ClientError> {
    match reader.next_frame().await? {
        Some(Frame::Chat(frame)) => Ok(Some(ServerReply::from_frame(&frame)?)),
        Some(Frame::Monitor(frame)) => {
            Err(ClientError::UnexpectedReply(format!("monitor frame {:?}", frame.opcode())))
        },
        None => Ok(None),
    }
}

async fn disconnect(writer: &mut FrameWriter) -> Result<(), ClientError> {
    writer.send(ClientRequest::Disconnect.into_frame()?).await?;
    writer.shutdown().await
}
