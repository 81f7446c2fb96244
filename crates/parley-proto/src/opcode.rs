//! Frame type codes.
//!
//! Chat types live in `0x0000..=0x01FF` and monitor types in
//! `0x0200..=0x02FF`. The ranges never overlap, which is what lets the server
//! tell a chat client from a monitor by the first frame alone.

/// Frame types carried in [`crate::ChatHeader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ChatOpcode {
    // Client -> server
    /// First frame of a chat connection
    Connect = 0x0001,
    /// Claim a nickname
    SetNickname = 0x0002,
    /// Broadcast a message to everyone
    SendMessage = 0x0003,
    /// Send a message to one nickname
    SendDirectMessage = 0x0004,
    /// Request the member list
    GetMembers = 0x0005,
    /// Leave the chat
    Disconnect = 0x0006,

    // Server -> client
    /// Acknowledges `Connect`
    Connected = 0x0101,
    /// Nickname claim succeeded
    NicknameAccepted = 0x0102,
    /// Attributed broadcast message
    Message = 0x0103,
    /// Attributed direct message
    DirectMessage = 0x0104,
    /// Member list reply
    Members = 0x0105,
    /// Someone claimed a nickname
    MemberJoined = 0x0106,
    /// Someone left
    MemberLeft = 0x0107,
    /// Error reply with code and reason
    Error = 0x01FF,
}

impl ChatOpcode {
    /// Upper bound (inclusive) of the chat type range.
    pub const RANGE_END: u16 = 0x01FF;

    /// Parse a raw type. `None` if unrecognized.
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::Connect),
            0x0002 => Some(Self::SetNickname),
            0x0003 => Some(Self::SendMessage),
            0x0004 => Some(Self::SendDirectMessage),
            0x0005 => Some(Self::GetMembers),
            0x0006 => Some(Self::Disconnect),
            0x0101 => Some(Self::Connected),
            0x0102 => Some(Self::NicknameAccepted),
            0x0103 => Some(Self::Message),
            0x0104 => Some(Self::DirectMessage),
            0x0105 => Some(Self::Members),
            0x0106 => Some(Self::MemberJoined),
            0x0107 => Some(Self::MemberLeft),
            0x01FF => Some(Self::Error),
            _ => None,
        }
    }

    /// Raw wire value.
    #[must_use]
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// True for types a client sends to the server.
    #[must_use]
    pub fn is_client_request(self) -> bool {
        self.to_u16() < 0x0100
    }
}

/// Frame types carried in [`crate::MonitorHeader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MonitorOpcode {
    /// First frame of a monitor connection, nickname is the optional filter
    Connect = 0x0201,
    /// Attributed broadcast message
    Message = 0x0202,
    /// Attributed direct message
    DirectMessage = 0x0203,
    /// Monitor is leaving
    Disconnect = 0x0204,
}

impl MonitorOpcode {
    /// Lower bound (inclusive) of the monitor type range.
    pub const RANGE_START: u16 = 0x0200;

    /// Upper bound (inclusive) of the monitor type range.
    pub const RANGE_END: u16 = 0x02FF;

    /// Parse a raw type. `None` if unrecognized.
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0201 => Some(Self::Connect),
            0x0202 => Some(Self::Message),
            0x0203 => Some(Self::DirectMessage),
            0x0204 => Some(Self::Disconnect),
            _ => None,
        }
    }

    /// Raw wire value.
    #[must_use]
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// True if `value` falls in the monitor type range.
    #[must_use]
    pub fn in_range(value: u16) -> bool {
        (Self::RANGE_START..=Self::RANGE_END).contains(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAT: [ChatOpcode; 14] = [
        ChatOpcode::Connect,
        ChatOpcode::SetNickname,
        ChatOpcode::SendMessage,
        ChatOpcode::SendDirectMessage,
        ChatOpcode::GetMembers,
        ChatOpcode::Disconnect,
        ChatOpcode::Connected,
        ChatOpcode::NicknameAccepted,
        ChatOpcode::Message,
        ChatOpcode::DirectMessage,
        ChatOpcode::Members,
        ChatOpcode::MemberJoined,
        ChatOpcode::MemberLeft,
        ChatOpcode::Error,
    ];

    const MONITOR: [MonitorOpcode; 4] = [
        MonitorOpcode::Connect,
        MonitorOpcode::Message,
        MonitorOpcode::DirectMessage,
        MonitorOpcode::Disconnect,
    ];

    #[test]
    fn chat_opcodes_parse_back() {
        for op in CHAT {
            assert_eq!(ChatOpcode::from_u16(op.to_u16()), Some(op));
            assert!(op.to_u16() <= ChatOpcode::RANGE_END);
        }
    }

    #[test]
    fn monitor_opcodes_parse_back() {
        for op in MONITOR {
            assert_eq!(MonitorOpcode::from_u16(op.to_u16()), Some(op));
            assert!(MonitorOpcode::in_range(op.to_u16()));
        }
    }

    #[test]
    fn ranges_do_not_overlap() {
        for op in CHAT {
            assert!(!MonitorOpcode::in_range(op.to_u16()));
        }
    }

    #[test]
    fn request_direction() {
        assert!(ChatOpcode::SendDirectMessage.is_client_request());
        assert!(!ChatOpcode::Members.is_client_request());
        assert!(!ChatOpcode::Error.is_client_request());
    }

    #[test]
    fn unknown_values() {
        assert_eq!(ChatOpcode::from_u16(0x0000), None);
        assert_eq!(ChatOpcode::from_u16(0x0201), None);
        assert_eq!(MonitorOpcode::from_u16(0x0001), None);
    }
}
