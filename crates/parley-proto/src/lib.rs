//! Parley wire protocol.
//!
//! Two independent framings share one TCP listener:
//!
//! - Chat frames: `[type: u16][data_length: u16]` followed by the payload.
//!   Spoken by chat clients in both directions.
//! - Monitor frames: `[type: u16][data_length: u16][nickname_length: u16]`
//!   followed by the attributed nickname and then the payload. Spoken by
//!   read-only monitors.
//!
//! All multi-byte integers are Big Endian. The framing of a new connection is
//! decided by the type of its first frame (see [`Framing::detect`]).
//!
//! # Layers
//!
//! - [`ChatHeader`] / [`MonitorHeader`]: fixed headers, parsed zero-copy.
//! - [`ChatFrame`] / [`MonitorFrame`]: header plus raw trailer bytes. The
//!   server routes on these without interpreting payloads it does not need.
//! - [`payloads`]: typed messages ([`ClientRequest`], [`ServerReply`],
//!   [`MonitorMessage`]) converted to and from frames.
//! - [`FrameDecoder`]: per-connection receive buffer that turns a byte stream
//!   into complete frames.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod codec;
mod errors;
mod frame;
mod header;
mod opcode;
pub mod payloads;

pub use codec::{FrameDecoder, Framing};
pub use errors::{ProtocolError, Result};
pub use frame::{ChatFrame, Frame, MonitorFrame};
pub use header::{ChatHeader, MAX_FIELD_LEN, MonitorHeader};
pub use opcode::{ChatOpcode, MonitorOpcode};
pub use payloads::{ClientRequest, ErrorCode, ErrorReply, MonitorMessage, ServerReply};
