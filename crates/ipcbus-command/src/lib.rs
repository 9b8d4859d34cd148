//! Command vocabulary of the ipcbus register protocol.
//!
//! Each frame carries exactly one command: `cmd(1) | len(2 LE) | payload`.
//! Requests are ECHO, READ, WRITE and SETCLR; responses are READ_RESP and
//! ACK, where an ACK with a non-OK error code doubles as a NACK.
//!
//! The `len` field is always derived from the command's contents and must
//! match exactly on receipt.

pub mod code;
pub mod command;
pub mod error;

pub use code::{CommandCode, ErrorCode, Width};
pub use command::{Command, HEADER_LEN, MAX_ECHO_LEN, MAX_RW_COUNT};
pub use error::{CommandError, Result};
