//! Frames: a fixed header plus the raw trailer bytes it describes.
//!
//! Frames are pure data holders. They guarantee that the header lengths match
//! the trailers they carry, nothing more. Typed interpretation lives in
//! [`crate::payloads`].

use bytes::{BufMut, Bytes};

use crate::{
    ChatHeader, ChatOpcode, MonitorHeader, MonitorOpcode,
    errors::{ProtocolError, Result},
    header::encodable_len,
};

/// Chat protocol frame.
///
/// Layout on the wire: `[ChatHeader: 4 bytes] + [payload]`.
///
/// # Invariants
///
/// - `payload.len()` equals `header.data_length()`. Enforced by
///   [`ChatFrame::new`] and [`ChatFrame::decode`].
/// - `payload.len()` never exceeds [`crate::MAX_FIELD_LEN`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatFrame {
    /// Frame header
    pub header: ChatHeader,

    /// Raw payload bytes
    pub payload: Bytes,
}

impl ChatFrame {
    /// Build a frame, computing `data_length` from the payload.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FieldTooLarge` if the payload exceeds
    ///   [`crate::MAX_FIELD_LEN`]
    pub fn new(opcode: ChatOpcode, payload: impl Into<Bytes>) -> Result<Self> {
        Self::with_raw_opcode(opcode.to_u16(), payload)
    }

    /// Like [`ChatFrame::new`] but with an unchecked type value.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FieldTooLarge` if the payload exceeds
    ///   [`crate::MAX_FIELD_LEN`]
    pub fn with_raw_opcode(opcode: u16, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        let data_length = encodable_len("payload", payload.len())?;

        let mut header = ChatHeader::new(opcode, 0);
        header.set_data_length(data_length);

        Ok(Self { header, payload })
    }

    /// Frame type, if recognized.
    #[must_use]
    pub fn opcode(&self) -> Option<ChatOpcode> {
        ChatOpcode::from_u16(self.header.opcode())
    }

    /// Bytes this frame occupies on the wire.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        ChatHeader::SIZE + self.payload.len()
    }

    /// Write `[header] + [payload]` into `dst`.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FieldTooLarge` if the payload exceeds
    ///   [`crate::MAX_FIELD_LEN`]
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        debug_assert_eq!(self.payload.len(), usize::from(self.header.data_length()));

        encodable_len("payload", self.payload.len())?;

        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.payload);

        Ok(())
    }

    /// Decode one frame from the front of `bytes`. Trailing bytes are ignored.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooShort` if the header or payload is incomplete
    /// - `ProtocolError::LengthOverflow` if the declared length is too large
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = ChatHeader::from_bytes(bytes)?;
        let total = header.frame_len();

        let payload = bytes
            .get(ChatHeader::SIZE..total)
            .ok_or(ProtocolError::FrameTooShort { expected: total, actual: bytes.len() })?;

        Ok(Self { header: *header, payload: Bytes::copy_from_slice(payload) })
    }
}

/// Monitor feed frame.
///
/// Layout on the wire: `[MonitorHeader: 6 bytes] + [nickname] + [payload]`.
///
/// # Invariants
///
/// - `nickname.len()` equals `header.nickname_length()` and `payload.len()`
///   equals `header.data_length()`.
/// - Neither trailer exceeds [`crate::MAX_FIELD_LEN`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorFrame {
    /// Frame header
    pub header: MonitorHeader,

    /// Attributed nickname (sender, or filter for `Connect`)
    pub nickname: Bytes,

    /// Raw payload bytes
    pub payload: Bytes,
}

impl MonitorFrame {
    /// Build a frame, computing both lengths from the trailers.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FieldTooLarge` if either trailer exceeds
    ///   [`crate::MAX_FIELD_LEN`]
    pub fn new(
        opcode: MonitorOpcode,
        nickname: impl Into<Bytes>,
        payload: impl Into<Bytes>,
    ) -> Result<Self> {
        let nickname = nickname.into();
        let payload = payload.into();
        let nickname_length = encodable_len("nickname", nickname.len())?;
        let data_length = encodable_len("payload", payload.len())?;

        let mut header = MonitorHeader::new(opcode.to_u16(), 0, 0);
        header.set_lengths(data_length, nickname_length);

        Ok(Self { header, nickname, payload })
    }

    /// Frame type, if recognized.
    #[must_use]
    pub fn opcode(&self) -> Option<MonitorOpcode> {
        MonitorOpcode::from_u16(self.header.opcode())
    }

    /// Bytes this frame occupies on the wire.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        MonitorHeader::SIZE + self.nickname.len() + self.payload.len()
    }

    /// Write `[header] + [nickname] + [payload]` into `dst`.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FieldTooLarge` if either trailer exceeds
    ///   [`crate::MAX_FIELD_LEN`]
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        debug_assert_eq!(self.nickname.len(), usize::from(self.header.nickname_length()));
        debug_assert_eq!(self.payload.len(), usize::from(self.header.data_length()));

        encodable_len("nickname", self.nickname.len())?;
        encodable_len("payload", self.payload.len())?;

        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.nickname);
        dst.put_slice(&self.payload);

        Ok(())
    }

    /// Decode one frame from the front of `bytes`. Trailing bytes are ignored.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooShort` if the header or a trailer is
    ///   incomplete
    /// - `ProtocolError::LengthOverflow` if a declared length is too large
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = MonitorHeader::from_bytes(bytes)?;
        let total = header.frame_len();
        let nickname_end = MonitorHeader::SIZE + usize::from(header.nickname_length());

        let short = ProtocolError::FrameTooShort { expected: total, actual: bytes.len() };
        let nickname = bytes.get(MonitorHeader::SIZE..nickname_end).ok_or(short.clone())?;
        let payload = bytes.get(nickname_end..total).ok_or(short)?;

        Ok(Self {
            header: *header,
            nickname: Bytes::copy_from_slice(nickname),
            payload: Bytes::copy_from_slice(payload),
        })
    }
}

/// A decoded frame of either framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Chat protocol frame
    Chat(ChatFrame),
    /// Monitor feed frame
    Monitor(MonitorFrame),
}

impl Frame {
    /// Raw type value from the header.
    #[must_use]
    pub fn raw_opcode(&self) -> u16 {
        match self {
            Self::Chat(frame) => frame.header.opcode(),
            Self::Monitor(frame) => frame.header.opcode(),
        }
    }

    /// Bytes this frame occupies on the wire.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Chat(frame) => frame.encoded_len(),
            Self::Monitor(frame) => frame.encoded_len(),
        }
    }

    /// Encode into `dst` using the frame's own framing.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FieldTooLarge` if a trailer is too large
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        match self {
            Self::Chat(frame) => frame.encode(dst),
            Self::Monitor(frame) => frame.encode(dst),
        }
    }

    /// Encode into a fresh buffer.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FieldTooLarge` if a trailer is too large
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode(&mut buf)?;
        Ok(Bytes::from(buf))
    }
}

impl From<ChatFrame> for Frame {
    fn from(frame: ChatFrame) -> Self {
        Self::Chat(frame)
    }
}

impl From<MonitorFrame> for Frame {
    fn from(frame: MonitorFrame) -> Self {
        Self::Monitor(frame)
    }
}
