//! Command codes, error codes and access widths.

use std::fmt;

use crate::error::CommandError;

/// First byte of every command.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCode {
    Echo = 0x01,
    Read = 0x02,
    Write = 0x03,
    SetClr = 0x04,
    ReadResp = 0x05,
    Ack = 0x06,
}

impl CommandCode {
    /// Wire name of the command.
    pub fn name(self) -> &'static str {
        match self {
            CommandCode::Echo => "ECHO",
            CommandCode::Read => "READ",
            CommandCode::Write => "WRITE",
            CommandCode::SetClr => "SETCLR",
            CommandCode::ReadResp => "READ_RESP",
            CommandCode::Ack => "ACK",
        }
    }

    /// True for commands the master sends.
    pub fn is_request(self) -> bool {
        !matches!(self, CommandCode::ReadResp | CommandCode::Ack)
    }
}

impl TryFrom<u8> for CommandCode {
    type Error = CommandError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(CommandCode::Echo),
            0x02 => Ok(CommandCode::Read),
            0x03 => Ok(CommandCode::Write),
            0x04 => Ok(CommandCode::SetClr),
            0x05 => Ok(CommandCode::ReadResp),
            0x06 => Ok(CommandCode::Ack),
            other => Err(CommandError::BadCmd(other)),
        }
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result code carried in an ACK.
///
/// Codes outside the known table are kept as `Unknown` so a peer's answer
/// is never lost, only left uninterpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Ok,
    BadCmdLen,
    BadCmd,
    BadPayloadLen,
    BadAddr,
    NotAligned,
    BadWidth,
    BadCount,
    FlashReadErr,
    FlashEraseErr,
    FlashWriteErr,
    Unknown(u8),
}

impl ErrorCode {
    /// Wire name of the code.
    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::Ok => "OK",
            ErrorCode::BadCmdLen => "BAD_CMD_LEN",
            ErrorCode::BadCmd => "BAD_CMD",
            ErrorCode::BadPayloadLen => "BAD_PAYLOAD_LEN",
            ErrorCode::BadAddr => "BAD_ADDR",
            ErrorCode::NotAligned => "NOT_ALIGNED",
            ErrorCode::BadWidth => "BAD_WIDTH",
            ErrorCode::BadCount => "BAD_COUNT",
            ErrorCode::FlashReadErr => "FLASH_READ_ERR",
            ErrorCode::FlashEraseErr => "FLASH_ERASE_ERR",
            ErrorCode::FlashWriteErr => "FLASH_WRITE_ERR",
            ErrorCode::Unknown(_) => "UNKNOWN",
        }
    }

    /// Byte sent on the wire.
    pub fn raw(self) -> u8 {
        match self {
            ErrorCode::Ok => 0x00,
            ErrorCode::BadCmdLen => 0x01,
            ErrorCode::BadCmd => 0x02,
            ErrorCode::BadPayloadLen => 0x03,
            ErrorCode::BadAddr => 0x04,
            ErrorCode::NotAligned => 0x05,
            ErrorCode::BadWidth => 0x06,
            ErrorCode::BadCount => 0x07,
            ErrorCode::FlashReadErr => 0x08,
            ErrorCode::FlashEraseErr => 0x09,
            ErrorCode::FlashWriteErr => 0x0A,
            ErrorCode::Unknown(raw) => raw,
        }
    }

    pub fn is_ok(self) -> bool {
        self == ErrorCode::Ok
    }
}

impl From<u8> for ErrorCode {
    fn from(value: u8) -> Self {
        match value {
            0x00 => ErrorCode::Ok,
            0x01 => ErrorCode::BadCmdLen,
            0x02 => ErrorCode::BadCmd,
            0x03 => ErrorCode::BadPayloadLen,
            0x04 => ErrorCode::BadAddr,
            0x05 => ErrorCode::NotAligned,
            0x06 => ErrorCode::BadWidth,
            0x07 => ErrorCode::BadCount,
            0x08 => ErrorCode::FlashReadErr,
            0x09 => ErrorCode::FlashEraseErr,
            0x0A => ErrorCode::FlashWriteErr,
            other => ErrorCode::Unknown(other),
        }
    }
}

impl From<ErrorCode> for u8 {
    fn from(code: ErrorCode) -> Self {
        code.raw()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::Unknown(raw) => write!(f, "UNKNOWN({raw:#04x})"),
            known => f.write_str(known.name()),
        }
    }
}

/// Register access width.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    U8 = 1,
    U16 = 2,
    U32 = 4,
}

impl Width {
    /// Access size in bytes.
    pub fn bytes(self) -> usize {
        self as usize
    }

    /// Largest value representable at this width.
    pub fn max_value(self) -> u32 {
        match self {
            Width::U8 => u8::MAX as u32,
            Width::U16 => u16::MAX as u32,
            Width::U32 => u32::MAX,
        }
    }

    pub fn fits(self, value: u32) -> bool {
        value <= self.max_value()
    }

    pub fn is_aligned(self, addr: u32) -> bool {
        addr % self as u32 == 0
    }
}

impl TryFrom<u8> for Width {
    type Error = CommandError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Width::U8),
            2 => Ok(Width::U16),
            4 => Ok(Width::U32),
            other => Err(CommandError::BadWidth(other)),
        }
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit", self.bytes() * 8)
    }
}
