//! Wire model for the streaming SMTP endpoint
//!
//! Inbound records are commands issued by the client, outbound records are
//! events produced by the gateway. Both travel as newline-delimited JSON.

pub mod codec;
pub mod command;
pub mod event;

pub use codec::{decode_command, decode_commands, decode_event, encode_command, encode_event, DecodeError};
pub use command::{Command, CommandRecord, EmailAddress, SimpleEmail};
pub use event::{ConnectionKind, ErrorCode, Event, EventRecord};
