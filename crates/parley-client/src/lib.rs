//! Parley terminal clients.
//!
//! Two roles share one TCP transport:
//!
//! - [`ChatClient`]: claims a nickname, then sends broadcasts, direct messages
//!   and member-list requests typed as lines of input
//! - [`MonitorClient`]: read-only feed of the server's traffic, optionally
//!   filtered to one nickname
//!
//! Input and output are generic async streams, so sessions run the same
//! against a terminal or an in-memory pipe.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod chat;
mod command;
mod error;
mod monitor;
mod render;
mod transport;

pub use chat::{ChatClient, NicknameOutcome};
pub use command::{Command, CommandError, MAX_INPUT_LINE, parse_line};
pub use error::ClientError;
pub use monitor::MonitorClient;
pub use render::{render_monitor, render_reply};
pub use transport::{FrameReader, FrameWriter, connect};
