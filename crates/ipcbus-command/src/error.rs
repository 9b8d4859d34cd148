use crate::code::{CommandCode, ErrorCode};

/// Errors raised while building, serializing or parsing a command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// Fewer bytes than the `cmd | len` header.
    #[error("command truncated ({0} bytes, header needs 3)")]
    Truncated(usize),

    /// The `len` field disagrees with the number of payload bytes received.
    #[error("bad command length: header declares {declared} payload bytes, {actual} present")]
    BadCmdLen { declared: usize, actual: usize },

    /// Unknown command code.
    #[error("unknown command code {0:#04x}")]
    BadCmd(u8),

    /// Payload size disagrees with what the command and its fields imply.
    #[error("bad payload length for {cmd}: {actual} bytes, expected {expected}")]
    BadPayloadLen {
        cmd: CommandCode,
        expected: usize,
        actual: usize,
    },

    /// Address is not a multiple of the access width.
    #[error("address {addr:#010x} not aligned to {width}-byte access")]
    NotAligned { addr: u32, width: usize },

    /// Access width other than 1, 2 or 4 bytes.
    #[error("unsupported access width {0}")]
    BadWidth(u8),

    /// Element count outside `1..=256`.
    #[error("count {0} outside 1..=256")]
    BadCount(usize),

    /// A value or mask has bits above the access width.
    #[error("value {value:#x} does not fit in {width} bytes")]
    ValueOverflow { value: u32, width: usize },
}

impl CommandError {
    /// Protocol error code reported to the peer for this failure.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            CommandError::Truncated(_) | CommandError::BadCmdLen { .. } => ErrorCode::BadCmdLen,
            CommandError::BadCmd(_) => ErrorCode::BadCmd,
            CommandError::BadPayloadLen { .. }
            | CommandError::ValueOverflow { .. } => ErrorCode::BadPayloadLen,
            CommandError::NotAligned { .. } => ErrorCode::NotAligned,
            CommandError::BadWidth(_) => ErrorCode::BadWidth,
            CommandError::BadCount(_) => ErrorCode::BadCount,
        }
    }
}

pub type Result<T> = std::result::Result<T, CommandError>;
