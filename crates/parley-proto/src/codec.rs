//! Stream decoding with a growable per-connection receive buffer.

use bytes::{Buf, BytesMut};

use crate::{
    ChatFrame, ChatOpcode, Frame, MonitorFrame, MonitorOpcode,
    errors::{ProtocolError, Result},
};

/// Which header layout a connection speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// 4-byte chat header
    Chat,
    /// 6-byte monitor header
    Monitor,
}

impl Framing {
    /// Pick the framing from the type of a connection's first frame.
    ///
    /// Returns `None` for values outside both type ranges.
    #[must_use]
    pub fn detect(opcode: u16) -> Option<Self> {
        if MonitorOpcode::in_range(opcode) {
            Some(Self::Monitor)
        } else if opcode <= ChatOpcode::RANGE_END {
            Some(Self::Chat)
        } else {
            None
        }
    }
}

/// Turns a byte stream into complete frames.
///
/// Bytes are appended as they arrive; [`FrameDecoder::next_frame`] yields
/// frames until the buffer holds only a partial one. The framing is fixed by
/// the first frame unless set up front with [`FrameDecoder::with_framing`].
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
    framing: Option<Framing>,
}

impl FrameDecoder {
    /// Decoder that detects its framing from the first frame.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder locked to one framing.
    #[must_use]
    pub fn with_framing(framing: Framing) -> Self {
        Self { buffer: BytesMut::new(), framing: Some(framing) }
    }

    /// Framing in use, once known.
    #[must_use]
    pub fn framing(&self) -> Option<Framing> {
        self.framing
    }

    /// Receive buffer, for reading straight from a socket.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Append received bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes buffered but not yet decoded.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partially received frame.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Decode the next complete frame.
    ///
    /// `Ok(None)` means more bytes are needed. A frame is only consumed from
    /// the buffer once it decodes successfully.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnexpectedOpcode` if the first frame's type is in
    ///   neither range
    /// - `ProtocolError::LengthOverflow` if a declared length is too large
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let framing = match self.framing {
            Some(framing) => framing,
            None => {
                let Some(&[hi, lo]) = self.buffer.first_chunk::<2>() else {
                    return Ok(None);
                };
                let opcode = u16::from_be_bytes([hi, lo]);
                let framing =
                    Framing::detect(opcode).ok_or(ProtocolError::UnexpectedOpcode(opcode))?;
                self.framing = Some(framing);
                framing
            },
        };

        let decoded = match framing {
            Framing::Chat => ChatFrame::decode(&self.buffer).map(Frame::Chat),
            Framing::Monitor => MonitorFrame::decode(&self.buffer).map(Frame::Monitor),
        };

        match decoded {
            Ok(frame) => {
                self.buffer.advance(frame.encoded_len());
                Ok(Some(frame))
            },
            Err(err) if err.is_incomplete() => Ok(None),
            Err(err) => Err(err),
        }
    }
}
