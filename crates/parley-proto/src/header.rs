//! Fixed frame headers with zero-copy parsing.
//!
//! Both headers are stored as raw Big Endian byte arrays so they can be cast
//! straight from network bytes. Accessors do the byte-order conversion; no
//! other code in the workspace looks at raw header bytes.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::{ProtocolError, Result};

/// Largest variable-length field either framing accepts or emits.
///
/// Bounds the memory a single peer can make us buffer. Kept below
/// `u16::MAX` so every length that passes encode also passes decode.
pub const MAX_FIELD_LEN: usize = 60_000;

/// Chat frame header: `[type: u16][data_length: u16]`.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct ChatHeader {
    opcode: [u8; 2],
    data_length: [u8; 2],
}

impl ChatHeader {
    /// Size of the serialized header.
    pub const SIZE: usize = 4;

    /// Header for `opcode` with the given payload length.
    #[must_use]
    pub fn new(opcode: u16, data_length: u16) -> Self {
        Self { opcode: opcode.to_be_bytes(), data_length: data_length.to_be_bytes() }
    }

    /// Parse a header from the front of `bytes` (zero-copy).
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooShort` if fewer than [`Self::SIZE`] bytes
    /// - `ProtocolError::LengthOverflow` if `data_length` exceeds
    ///   [`MAX_FIELD_LEN`]
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::FrameTooShort { expected: Self::SIZE, actual: bytes.len() })?
            .0;

        check_length("data_length", header.data_length())?;

        Ok(header)
    }

    /// Serialize header to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(IntoBytes::as_bytes(self));
        arr
    }

    /// Frame type as raw u16.
    #[must_use]
    pub fn opcode(&self) -> u16 {
        u16::from_be_bytes(self.opcode)
    }

    /// Declared payload length.
    #[must_use]
    pub fn data_length(&self) -> u16 {
        u16::from_be_bytes(self.data_length)
    }

    /// Header plus declared payload.
    #[must_use]
    pub fn frame_len(&self) -> usize {
        Self::SIZE + usize::from(self.data_length())
    }

    pub(crate) fn set_data_length(&mut self, length: u16) {
        self.data_length = length.to_be_bytes();
    }
}

impl std::fmt::Debug for ChatHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatHeader")
            .field("opcode", &format!("{:#06x}", self.opcode()))
            .field("data_length", &self.data_length())
            .finish()
    }
}

impl PartialEq for ChatHeader {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for ChatHeader {}

/// Monitor frame header: `[type: u16][data_length: u16][nickname_length: u16]`.
///
/// The nickname trailer comes before the payload on the wire.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct MonitorHeader {
    opcode: [u8; 2],
    data_length: [u8; 2],
    nickname_length: [u8; 2],
}

impl MonitorHeader {
    /// Size of the serialized header.
    pub const SIZE: usize = 6;

    /// Header for `opcode` with the given trailer lengths.
    #[must_use]
    pub fn new(opcode: u16, data_length: u16, nickname_length: u16) -> Self {
        Self {
            opcode: opcode.to_be_bytes(),
            data_length: data_length.to_be_bytes(),
            nickname_length: nickname_length.to_be_bytes(),
        }
    }

    /// Parse a header from the front of `bytes` (zero-copy).
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooShort` if fewer than [`Self::SIZE`] bytes
    /// - `ProtocolError::LengthOverflow` if either length exceeds
    ///   [`MAX_FIELD_LEN`]
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::FrameTooShort { expected: Self::SIZE, actual: bytes.len() })?
            .0;

        check_length("data_length", header.data_length())?;
        check_length("nickname_length", header.nickname_length())?;

        Ok(header)
    }

    /// Serialize header to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(IntoBytes::as_bytes(self));
        arr
    }

    /// Frame type as raw u16.
    #[must_use]
    pub fn opcode(&self) -> u16 {
        u16::from_be_bytes(self.opcode)
    }

    /// Declared payload length.
    #[must_use]
    pub fn data_length(&self) -> u16 {
        u16::from_be_bytes(self.data_length)
    }

    /// Declared nickname length.
    #[must_use]
    pub fn nickname_length(&self) -> u16 {
        u16::from_be_bytes(self.nickname_length)
    }

    /// Header plus both declared trailers.
    #[must_use]
    pub fn frame_len(&self) -> usize {
        Self::SIZE + usize::from(self.nickname_length()) + usize::from(self.data_length())
    }

    pub(crate) fn set_lengths(&mut self, data_length: u16, nickname_length: u16) {
        self.data_length = data_length.to_be_bytes();
        self.nickname_length = nickname_length.to_be_bytes();
    }
}

impl std::fmt::Debug for MonitorHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorHeader")
            .field("opcode", &format!("{:#06x}", self.opcode()))
            .field("data_length", &self.data_length())
            .field("nickname_length", &self.nickname_length())
            .finish()
    }
}

impl PartialEq for MonitorHeader {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for MonitorHeader {}

fn check_length(field: &'static str, length: u16) -> Result<()> {
    let length = usize::from(length);
    if length > MAX_FIELD_LEN {
        return Err(ProtocolError::LengthOverflow { field, length, max: MAX_FIELD_LEN });
    }
    Ok(())
}

/// Convert an outbound field length to its wire form.
pub(crate) fn encodable_len(field: &'static str, length: usize) -> Result<u16> {
    if length > MAX_FIELD_LEN {
        return Err(ProtocolError::FieldTooLarge { field, length, max: MAX_FIELD_LEN });
    }
    u16::try_from(length).map_err(|_| ProtocolError::FieldTooLarge {
        field,
        length,
        max: MAX_FIELD_LEN,
    })
}
