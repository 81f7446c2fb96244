//! Monitor feed messages.

use bytes::Bytes;

use super::{expect_empty, utf8};
use crate::{
    MonitorFrame, MonitorOpcode,
    errors::{ProtocolError, Result},
};

/// Messages exchanged on a monitor connection.
///
/// `Connect` and `Disconnect` flow monitor to server; `Message` and
/// `DirectMessage` flow server to monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorMessage {
    /// Attach as a monitor, optionally filtered to one nickname
    Connect {
        /// Only traffic involving this nickname is delivered
        filter: Option<String>,
    },
    /// A broadcast chat message
    Message {
        /// Sender nickname
        sender: String,
        /// Message bytes
        text: Bytes,
    },
    /// A direct chat message
    DirectMessage {
        /// Sender nickname
        sender: String,
        /// Message bytes
        text: Bytes,
    },
    /// Monitor is leaving
    Disconnect,
}

impl MonitorMessage {
    /// Frame type for this message.
    #[must_use]
    pub const fn opcode(&self) -> MonitorOpcode {
        match self {
            Self::Connect { .. } => MonitorOpcode::Connect,
            Self::Message { .. } => MonitorOpcode::Message,
            Self::DirectMessage { .. } => MonitorOpcode::DirectMessage,
            Self::Disconnect => MonitorOpcode::Disconnect,
        }
    }

    /// Encode into a monitor frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FieldTooLarge` if a trailer exceeds
    ///   [`crate::MAX_FIELD_LEN`]
    pub fn into_frame(self) -> Result<MonitorFrame> {
        let opcode = self.opcode();
        match self {
            Self::Connect { filter } => {
                let nickname = filter.map(|f| Bytes::from(f.into_bytes())).unwrap_or_default();
                MonitorFrame::new(opcode, nickname, Bytes::new())
            },
            Self::Message { sender, text } | Self::DirectMessage { sender, text } => {
                MonitorFrame::new(opcode, Bytes::from(sender.into_bytes()), text)
            },
            Self::Disconnect => MonitorFrame::new(opcode, Bytes::new(), Bytes::new()),
        }
    }

    /// Parse a monitor frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnexpectedOpcode` if the type is unknown
    /// - `ProtocolError::MalformedPayload` if a nickname is not UTF-8 or a
    ///   control frame carries data
    pub fn from_frame(frame: &MonitorFrame) -> Result<Self> {
        let raw = frame.header.opcode();
        let opcode = MonitorOpcode::from_u16(raw).ok_or(ProtocolError::UnexpectedOpcode(raw))?;

        let message = match opcode {
            MonitorOpcode::Connect => {
                expect_empty(&frame.payload, raw)?;
                let filter = if frame.nickname.is_empty() {
                    None
                } else {
                    Some(utf8(&frame.nickname, "filter")?)
                };
                Self::Connect { filter }
            },
            MonitorOpcode::Message => Self::Message {
                sender: utf8(&frame.nickname, "sender")?,
                text: frame.payload.clone(),
            },
            MonitorOpcode::DirectMessage => Self::DirectMessage {
                sender: utf8(&frame.nickname, "sender")?,
                text: frame.payload.clone(),
            },
            MonitorOpcode::Disconnect => {
                expect_empty(&frame.nickname, raw)?;
                expect_empty(&frame.payload, raw)?;
                Self::Disconnect
            },
        };

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_round_trip() {
        let cases = [
            MonitorMessage::Connect { filter: None },
            MonitorMessage::Connect { filter: Some("bob".to_string()) },
            MonitorMessage::Message { sender: "alice".to_string(), text: Bytes::from_static(b"hi") },
            MonitorMessage::DirectMessage {
                sender: "alice".to_string(),
                text: Bytes::from_static(b"psst"),
            },
            MonitorMessage::Disconnect,
        ];

        for message in cases {
            let frame = message.clone().into_frame().expect("should encode");
            assert_eq!(MonitorMessage::from_frame(&frame), Ok(message));
        }
    }

    #[test]
    fn sender_travels_in_nickname_trailer() {
        let frame = MonitorMessage::Message {
            sender: "alice".to_string(),
            text: Bytes::from_static(b"hi"),
        }
        .into_frame()
        .expect("should encode");

        assert_eq!(frame.header.nickname_length(), 5);
        assert_eq!(frame.header.data_length(), 2);
        assert_eq!(frame.nickname, Bytes::from_static(b"alice"));
    }

    #[test]
    fn empty_filter_means_none() {
        let frame = MonitorFrame::new(MonitorOpcode::Connect, Bytes::new(), Bytes::new())
            .expect("empty");
        assert_eq!(MonitorMessage::from_frame(&frame), Ok(MonitorMessage::Connect { filter: None }));
    }

    #[test]
    fn invalid_utf8_sender_is_malformed() {
        let frame = MonitorFrame::new(MonitorOpcode::Message, Bytes::from_static(&[0xC3]), Bytes::new())
            .expect("small");
        assert!(matches!(
            MonitorMessage::from_frame(&frame),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }
}
