//! Typed messages carried inside frames.
//!
//! Headers are parsed zero-copy; payloads are small hand-laid binary
//! structures. Variable-length fields inside a payload carry a `u16` Big
//! Endian length prefix, except for the final field which runs to the end of
//! the payload.
//!
//! # Invariants
//!
//! Each message variant maps to exactly one frame type (enforced by match
//! exhaustiveness) and `from_frame(into_frame(m)) == m`.

pub mod chat;
pub mod monitor;

use bytes::{BufMut, Bytes};

pub use chat::{ClientRequest, ErrorCode, ErrorReply, ServerReply};
pub use monitor::MonitorMessage;

use crate::{
    errors::{ProtocolError, Result},
    header::encodable_len,
};

/// Write `[len: u16][bytes]`.
fn put_prefixed(dst: &mut impl BufMut, field: &'static str, bytes: &[u8]) -> Result<()> {
    let len = encodable_len(field, bytes.len())?;
    dst.put_u16(len);
    dst.put_slice(bytes);
    Ok(())
}

/// Split `[len: u16][field][rest]` into `(field, rest)` without copying.
fn split_prefixed(bytes: &Bytes, field: &'static str) -> Result<(Bytes, Bytes)> {
    let Some(&[hi, lo]) = bytes.first_chunk::<2>() else {
        return Err(ProtocolError::MalformedPayload(format!("{field} length prefix missing")));
    };
    let end = 2 + usize::from(u16::from_be_bytes([hi, lo]));
    if bytes.len() < end {
        return Err(ProtocolError::MalformedPayload(format!(
            "{field} length {} overruns payload of {} bytes",
            end - 2,
            bytes.len() - 2
        )));
    }
    Ok((bytes.slice(2..end), bytes.slice(end..)))
}

/// Interpret a nickname field as UTF-8.
fn utf8(bytes: &[u8], field: &'static str) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| ProtocolError::MalformedPayload(format!("{field} is not valid UTF-8")))
}

/// Reject trailing bytes on types that carry no payload.
fn expect_empty(payload: &[u8], opcode: u16) -> Result<()> {
    if payload.is_empty() {
        Ok(())
    } else {
        Err(ProtocolError::MalformedPayload(format!(
            "type {opcode:#06x} carries no payload, got {} bytes",
            payload.len()
        )))
    }
}
