//! Chat protocol messages.

use bytes::{BufMut, Bytes};

use super::{expect_empty, put_prefixed, split_prefixed, utf8};
use crate::{
    ChatFrame, ChatOpcode,
    errors::{ProtocolError, Result},
};

/// Messages a chat client sends to the server.
///
/// Nicknames stay raw bytes here: whether a nickname is acceptable (UTF-8,
/// length, characters) is a server decision reported with
/// [`ErrorCode::InvalidNickname`], not a framing error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    /// Opens a chat connection
    Connect,
    /// Claims a nickname
    SetNickname(Bytes),
    /// Broadcast to every active member
    SendMessage(Bytes),
    /// Message to one member
    SendDirectMessage {
        /// Recipient nickname
        recipient: Bytes,
        /// Message bytes
        text: Bytes,
    },
    /// Asks for the member list
    GetMembers,
    /// Leaves the chat
    Disconnect,
}

impl ClientRequest {
    /// Frame type for this request.
    #[must_use]
    pub const fn opcode(&self) -> ChatOpcode {
        match self {
            Self::Connect => ChatOpcode::Connect,
            Self::SetNickname(_) => ChatOpcode::SetNickname,
            Self::SendMessage(_) => ChatOpcode::SendMessage,
            Self::SendDirectMessage { .. } => ChatOpcode::SendDirectMessage,
            Self::GetMembers => ChatOpcode::GetMembers,
            Self::Disconnect => ChatOpcode::Disconnect,
        }
    }

    /// Encode into a chat frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FieldTooLarge` if a field exceeds
    ///   [`crate::MAX_FIELD_LEN`]
    pub fn into_frame(self) -> Result<ChatFrame> {
        let opcode = self.opcode();
        let payload = match self {
            Self::Connect | Self::GetMembers | Self::Disconnect => Bytes::new(),
            Self::SetNickname(bytes) | Self::SendMessage(bytes) => bytes,
            Self::SendDirectMessage { recipient, text } => {
                let mut buf = Vec::with_capacity(2 + recipient.len() + text.len());
                put_prefixed(&mut buf, "recipient", &recipient)?;
                buf.put_slice(&text);
                Bytes::from(buf)
            },
        };
        ChatFrame::new(opcode, payload)
    }

    /// Parse a request frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnexpectedOpcode` if the type is unknown or is a
    ///   server reply
    /// - `ProtocolError::MalformedPayload` if the payload does not match the
    ///   type
    pub fn from_frame(frame: &ChatFrame) -> Result<Self> {
        let raw = frame.header.opcode();
        let opcode = ChatOpcode::from_u16(raw).ok_or(ProtocolError::UnexpectedOpcode(raw))?;
        let payload = &frame.payload;

        let request = match opcode {
            ChatOpcode::Connect => {
                expect_empty(payload, raw)?;
                Self::Connect
            },
            ChatOpcode::SetNickname => Self::SetNickname(payload.clone()),
            ChatOpcode::SendMessage => Self::SendMessage(payload.clone()),
            ChatOpcode::SendDirectMessage => {
                let (recipient, text) = split_prefixed(payload, "recipient")?;
                Self::SendDirectMessage { recipient, text }
            },
            ChatOpcode::GetMembers => {
                expect_empty(payload, raw)?;
                Self::GetMembers
            },
            ChatOpcode::Disconnect => {
                expect_empty(payload, raw)?;
                Self::Disconnect
            },
            ChatOpcode::Connected
            | ChatOpcode::NicknameAccepted
            | ChatOpcode::Message
            | ChatOpcode::DirectMessage
            | ChatOpcode::Members
            | ChatOpcode::MemberJoined
            | ChatOpcode::MemberLeft
            | ChatOpcode::Error => return Err(ProtocolError::UnexpectedOpcode(raw)),
        };

        Ok(request)
    }
}

/// Messages the server sends to a chat client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerReply {
    /// Acknowledges `Connect`
    Connected,
    /// Nickname claim succeeded
    NicknameAccepted(String),
    /// Broadcast from another member
    Message {
        /// Sender nickname
        sender: String,
        /// Message bytes
        text: Bytes,
    },
    /// Direct message from another member
    DirectMessage {
        /// Sender nickname
        sender: String,
        /// Message bytes
        text: Bytes,
    },
    /// Active members in join order
    Members(Vec<String>),
    /// A member claimed a nickname
    MemberJoined(String),
    /// A member left
    MemberLeft(String),
    /// Request failed
    Error(ErrorReply),
}

impl ServerReply {
    /// Frame type for this reply.
    #[must_use]
    pub const fn opcode(&self) -> ChatOpcode {
        match self {
            Self::Connected => ChatOpcode::Connected,
            Self::NicknameAccepted(_) => ChatOpcode::NicknameAccepted,
            Self::Message { .. } => ChatOpcode::Message,
            Self::DirectMessage { .. } => ChatOpcode::DirectMessage,
            Self::Members(_) => ChatOpcode::Members,
            Self::MemberJoined(_) => ChatOpcode::MemberJoined,
            Self::MemberLeft(_) => ChatOpcode::MemberLeft,
            Self::Error(_) => ChatOpcode::Error,
        }
    }

    /// Encode into a chat frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FieldTooLarge` if the payload exceeds
    ///   [`crate::MAX_FIELD_LEN`] (e.g. a long message plus attribution)
    pub fn into_frame(self) -> Result<ChatFrame> {
        let opcode = self.opcode();
        let payload = match self {
            Self::Connected => Bytes::new(),
            Self::NicknameAccepted(name) | Self::MemberJoined(name) | Self::MemberLeft(name) => {
                Bytes::from(name.into_bytes())
            },
            Self::Message { sender, text } | Self::DirectMessage { sender, text } => {
                let mut buf = Vec::with_capacity(2 + sender.len() + text.len());
                put_prefixed(&mut buf, "sender", sender.as_bytes())?;
                buf.put_slice(&text);
                Bytes::from(buf)
            },
            Self::Members(names) => {
                let mut buf = Vec::with_capacity(names.iter().map(|n| 2 + n.len()).sum());
                for name in &names {
                    put_prefixed(&mut buf, "member", name.as_bytes())?;
                }
                Bytes::from(buf)
            },
            Self::Error(reply) => {
                let mut buf = Vec::with_capacity(2 + reply.message.len());
                buf.put_u16(reply.code.to_u16());
                buf.put_slice(reply.message.as_bytes());
                Bytes::from(buf)
            },
        };
        ChatFrame::new(opcode, payload)
    }

    /// Parse a reply frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnexpectedOpcode` if the type is unknown or is a
    ///   client request
    /// - `ProtocolError::MalformedPayload` if the payload does not match the
    ///   type
    pub fn from_frame(frame: &ChatFrame) -> Result<Self> {
        let raw = frame.header.opcode();
        let opcode = ChatOpcode::from_u16(raw).ok_or(ProtocolError::UnexpectedOpcode(raw))?;
        let payload = &frame.payload;

        let reply = match opcode {
            ChatOpcode::Connected => {
                expect_empty(payload, raw)?;
                Self::Connected
            },
            ChatOpcode::NicknameAccepted => Self::NicknameAccepted(utf8(payload, "nickname")?),
            ChatOpcode::MemberJoined => Self::MemberJoined(utf8(payload, "nickname")?),
            ChatOpcode::MemberLeft => Self::MemberLeft(utf8(payload, "nickname")?),
            ChatOpcode::Message => {
                let (sender, text) = split_prefixed(payload, "sender")?;
                Self::Message { sender: utf8(&sender, "sender")?, text }
            },
            ChatOpcode::DirectMessage => {
                let (sender, text) = split_prefixed(payload, "sender")?;
                Self::DirectMessage { sender: utf8(&sender, "sender")?, text }
            },
            ChatOpcode::Members => {
                let mut names = Vec::new();
                let mut rest = payload.clone();
                while !rest.is_empty() {
                    let (name, tail) = split_prefixed(&rest, "member")?;
                    names.push(utf8(&name, "member")?);
                    rest = tail;
                }
                Self::Members(names)
            },
            ChatOpcode::Error => Self::Error(ErrorReply::decode(payload)?),
            ChatOpcode::Connect
            | ChatOpcode::SetNickname
            | ChatOpcode::SendMessage
            | ChatOpcode::SendDirectMessage
            | ChatOpcode::GetMembers
            | ChatOpcode::Disconnect => return Err(ProtocolError::UnexpectedOpcode(raw)),
        };

        Ok(reply)
    }
}

/// Reason codes carried by `ERROR` replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    /// Another member holds the nickname
    NicknameTaken = 1,
    /// No member with the direct message's recipient nickname
    RecipientNotFound = 2,
    /// Nickname is empty, too long, not UTF-8 or has forbidden characters
    InvalidNickname = 3,
    /// Frame type not allowed in the current state; the server disconnects
    ProtocolViolation = 4,
    /// Message too large once attributed
    MessageTooLarge = 5,
    /// Server is going away
    ShuttingDown = 6,
}

impl ErrorCode {
    /// Parse a raw code. `None` if unrecognized.
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::NicknameTaken),
            2 => Some(Self::RecipientNotFound),
            3 => Some(Self::InvalidNickname),
            4 => Some(Self::ProtocolViolation),
            5 => Some(Self::MessageTooLarge),
            6 => Some(Self::ShuttingDown),
            _ => None,
        }
    }

    /// Raw wire value.
    #[must_use]
    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

/// Payload of an `ERROR` reply: `[code: u16][UTF-8 message]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReply {
    /// What went wrong
    pub code: ErrorCode,
    /// Human-readable detail
    pub message: String,
}

impl ErrorReply {
    /// Build an error reply.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    /// Nickname already claimed.
    pub fn nickname_taken(nickname: &str) -> Self {
        Self::new(ErrorCode::NicknameTaken, format!("nickname {nickname} is already taken"))
    }

    /// Direct message recipient is not connected.
    pub fn recipient_not_found(nickname: &str) -> Self {
        Self::new(ErrorCode::RecipientNotFound, format!("no member named {nickname}"))
    }

    /// Nickname rejected by validation.
    pub fn invalid_nickname(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidNickname, reason)
    }

    /// Frame not allowed in the current state.
    pub fn protocol_violation(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::ProtocolViolation, reason)
    }

    /// Attributed message does not fit in a frame.
    pub fn message_too_large(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::MessageTooLarge, reason)
    }

    /// Server shutdown notice.
    pub fn shutting_down() -> Self {
        Self::new(ErrorCode::ShuttingDown, "server is shutting down")
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        let Some((&[hi, lo], message)) = payload.split_first_chunk::<2>() else {
            return Err(ProtocolError::MalformedPayload("error code missing".to_string()));
        };
        let raw = u16::from_be_bytes([hi, lo]);
        let code = ErrorCode::from_u16(raw)
            .ok_or_else(|| ProtocolError::MalformedPayload(format!("unknown error code {raw}")))?;
        Ok(Self { code, message: utf8(message, "error message")? })
    }
}
