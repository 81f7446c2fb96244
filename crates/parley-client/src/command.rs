//! Chat input line parsing.
//!
//! | Input          | Request               |
//! |----------------|-----------------------|
//! | `quit`         | `DISCONNECT`          |
//! | `LIST`         | `GET_MEMBERS`         |
//! | `/nick text`   | `SEND_DIRECT_MESSAGE` |
//! | anything else  | `SEND_MESSAGE`        |

use bytes::Bytes;
use parley_proto::ClientRequest;
use thiserror::Error;

/// Longest input line accepted from the terminal, in bytes.
pub const MAX_INPUT_LINE: usize = 2048;

/// A parsed chat input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Leave the chat
    Quit,
    /// Ask for the member list
    List,
    /// Message one member
    Direct {
        /// Recipient nickname
        recipient: String,
        /// Message text
        text: String,
    },
    /// Message everyone
    Broadcast(String),
}

impl Command {
    /// Request that carries out this command.
    pub fn into_request(self) -> ClientRequest {
        match self {
            Self::Quit => ClientRequest::Disconnect,
            Self::List => ClientRequest::GetMembers,
            Self::Direct { recipient, text } => ClientRequest::SendDirectMessage {
                recipient: Bytes::from(recipient),
                text: Bytes::from(text),
            },
            Self::Broadcast(text) => ClientRequest::SendMessage(Bytes::from(text)),
        }
    }
}

/// Input lines that cannot be sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Line exceeds [`MAX_INPUT_LINE`].
    #[error("line is {length} bytes, maximum is {max}")]
    LineTooLong {
        /// Actual length in bytes
        length: usize,
        /// Maximum accepted
        max: usize,
    },

    /// `/` with no nickname after it.
    #[error("direct messages need a nickname: /nick text")]
    MissingRecipient,
}

/// Parse one input line.
///
/// Returns `Ok(None)` for blank lines.
pub fn parse_line(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim_end_matches(['\r', '\n']);

    if line.len() > MAX_INPUT_LINE {
        return Err(CommandError::LineTooLong { length: line.len(), max: MAX_INPUT_LINE });
    }
    if line.trim().is_empty() {
        return Ok(None);
    }

    let command = match line {
        "quit" => Command::Quit,
        "LIST" => Command::List,
        _ => match line.strip_prefix('/') {
            Some(rest) => {
                let (recipient, text) = rest.split_once(' ').unwrap_or((rest, ""));
                if recipient.is_empty() {
                    return Err(CommandError::MissingRecipient);
                }
                Command::Direct { recipient: recipient.to_string(), text: text.to_string() }
            },
            None => Command::Broadcast(line.to_string()),
        },
    };

    Ok(Some(command))
}
