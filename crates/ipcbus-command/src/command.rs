use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use ipcbus_frame::{MAX_CMD_LEN, MIN_CMD_LEN};

use crate::code::{CommandCode, ErrorCode, Width};
use crate::error::{CommandError, Result};

/// Size of the `cmd | len` header.
pub const HEADER_LEN: usize = MIN_CMD_LEN;

/// Largest ECHO payload that still fits in one frame.
pub const MAX_ECHO_LEN: usize = MAX_CMD_LEN - HEADER_LEN;

/// Maximum element count of a READ, WRITE or READ_RESP.
pub const MAX_RW_COUNT: usize = 256;

/// `addr(4) width(1) count(2)`
const RW_FIXED_LEN: usize = 7;
/// `addr(4) width(1)`
const SETCLR_FIXED_LEN: usize = 5;
const ACK_LEN: usize = 2;

/// One decoded command.
///
/// Values are carried as `u32` regardless of width; serialization rejects
/// any value with bits above the access width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Echo {
        data: Bytes,
    },
    Read {
        addr: u32,
        width: Width,
        count: u16,
    },
    Write {
        addr: u32,
        width: Width,
        values: Vec<u32>,
    },
    SetClr {
        addr: u32,
        width: Width,
        mask: u32,
        val: u32,
    },
    ReadResp {
        addr: u32,
        width: Width,
        values: Vec<u32>,
    },
    /// `req` stays raw so a NACK can name a command code we do not know.
    Ack {
        req: u8,
        err: ErrorCode,
    },
}

impl Command {
    /// Acknowledge `req` with `err`.
    pub fn ack(req: CommandCode, err: ErrorCode) -> Self {
        Command::Ack { req: req as u8, err }
    }

    /// Negative acknowledgment for a request that failed to decode.
    pub fn nack(raw_req: u8, cause: &CommandError) -> Self {
        Command::Ack {
            req: raw_req,
            err: cause.error_code(),
        }
    }

    pub fn code(&self) -> CommandCode {
        match self {
            Command::Echo { .. } => CommandCode::Echo,
            Command::Read { .. } => CommandCode::Read,
            Command::Write { .. } => CommandCode::Write,
            Command::SetClr { .. } => CommandCode::SetClr,
            Command::ReadResp { .. } => CommandCode::ReadResp,
            Command::Ack { .. } => CommandCode::Ack,
        }
    }

    /// Payload length implied by the fields; this is what goes in `len`.
    pub fn payload_len(&self) -> usize {
        match self {
            Command::Echo { data } => data.len(),
            Command::Read { .. } => RW_FIXED_LEN,
            Command::Write { width, values, .. } | Command::ReadResp { width, values, .. } => {
                RW_FIXED_LEN + values.len() * width.bytes()
            }
            Command::SetClr { width, .. } => SETCLR_FIXED_LEN + 2 * width.bytes(),
            Command::Ack { .. } => ACK_LEN,
        }
    }

    /// Check count, alignment and value ranges.
    pub fn validate(&self) -> Result<()> {
        match self {
            Command::Echo { data } => {
                if data.is_empty() || data.len() > MAX_ECHO_LEN {
                    return Err(CommandError::BadPayloadLen {
                        cmd: CommandCode::Echo,
                        expected: data.len().clamp(1, MAX_ECHO_LEN),
                        actual: data.len(),
                    });
                }
            }
            Command::Read { addr, width, count } => {
                check_count(*count as usize)?;
                check_aligned(*addr, *width)?;
            }
            Command::Write {
                addr,
                width,
                values,
            }
            | Command::ReadResp {
                addr,
                width,
                values,
            } => {
                check_count(values.len())?;
                check_aligned(*addr, *width)?;
                for value in values {
                    check_fits(*value, *width)?;
                }
            }
            Command::SetClr {
                addr,
                width,
                mask,
                val,
            } => {
                check_aligned(*addr, *width)?;
                check_fits(*mask, *width)?;
                check_fits(*val, *width)?;
            }
            Command::Ack { .. } => {}
        }
        Ok(())
    }

    /// Append the wire form of this command to `dst`.
    ///
    /// Nothing is written when validation fails.
    pub fn serialize(&self, dst: &mut BytesMut) -> Result<()> {
        self.validate()?;

        let len = self.payload_len();
        dst.reserve(HEADER_LEN + len);
        dst.put_u8(self.code() as u8);
        dst.put_u16_le(len as u16);

        match self {
            Command::Echo { data } => dst.put_slice(data),
            Command::Read { addr, width, count } => {
                dst.put_u32_le(*addr);
                dst.put_u8(*width as u8);
                dst.put_u16_le(*count);
            }
            Command::Write {
                addr,
                width,
                values,
            }
            | Command::ReadResp {
                addr,
                width,
                values,
            } => {
                dst.put_u32_le(*addr);
                dst.put_u8(*width as u8);
                dst.put_u16_le(values.len() as u16);
                for value in values {
                    put_value(dst, *width, *value);
                }
            }
            Command::SetClr {
                addr,
                width,
                mask,
                val,
            } => {
                dst.put_u32_le(*addr);
                dst.put_u8(*width as u8);
                put_value(dst, *width, *mask);
                put_value(dst, *width, *val);
            }
            Command::Ack { req, err } => {
                dst.put_u8(*req);
                dst.put_u8(err.raw());
            }
        }
        Ok(())
    }

    /// Serialize into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload_len());
        self.serialize(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Parse one unstuffed command.
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(CommandError::Truncated(bytes.len()));
        }
        let code = CommandCode::try_from(bytes[0])?;
        let declared = u16::from_le_bytes([bytes[1], bytes[2]]) as usize;
        let mut payload = &bytes[HEADER_LEN..];
        if declared != payload.len() {
            return Err(CommandError::BadCmdLen {
                declared,
                actual: payload.len(),
            });
        }

        let bad_len = |expected: usize, actual: usize| CommandError::BadPayloadLen {
            cmd: code,
            expected,
            actual,
        };

        let cmd = match code {
            CommandCode::Echo => {
                if payload.is_empty() || payload.len() > MAX_ECHO_LEN {
                    return Err(bad_len(payload.len().clamp(1, MAX_ECHO_LEN), payload.len()));
                }
                Command::Echo {
                    data: Bytes::copy_from_slice(payload),
                }
            }
            CommandCode::Read => {
                if payload.len() != RW_FIXED_LEN {
                    return Err(bad_len(RW_FIXED_LEN, payload.len()));
                }
                let addr = payload.get_u32_le();
                let width = Width::try_from(payload.get_u8())?;
                let count = payload.get_u16_le();
                check_count(count as usize)?;
                check_aligned(addr, width)?;
                Command::Read { addr, width, count }
            }
            CommandCode::Write | CommandCode::ReadResp => {
                if payload.len() < RW_FIXED_LEN {
                    return Err(bad_len(RW_FIXED_LEN, payload.len()));
                }
                let total = payload.len();
                let addr = payload.get_u32_le();
                let width = Width::try_from(payload.get_u8())?;
                let count = payload.get_u16_le() as usize;
                check_count(count)?;
                let expected = RW_FIXED_LEN + count * width.bytes();
                if total != expected {
                    return Err(bad_len(expected, total));
                }
                check_aligned(addr, width)?;
                let values = (0..count).map(|_| get_value(&mut payload, width)).collect();
                if code == CommandCode::Write {
                    Command::Write {
                        addr,
                        width,
                        values,
                    }
                } else {
                    Command::ReadResp {
                        addr,
                        width,
                        values,
                    }
                }
            }
            CommandCode::SetClr => {
                if payload.len() < SETCLR_FIXED_LEN {
                    return Err(bad_len(SETCLR_FIXED_LEN, payload.len()));
                }
                let total = payload.len();
                let addr = payload.get_u32_le();
                let width = Width::try_from(payload.get_u8())?;
                let expected = SETCLR_FIXED_LEN + 2 * width.bytes();
                if total != expected {
                    return Err(bad_len(expected, total));
                }
                check_aligned(addr, width)?;
                let mask = get_value(&mut payload, width);
                let val = get_value(&mut payload, width);
                Command::SetClr {
                    addr,
                    width,
                    mask,
                    val,
                }
            }
            CommandCode::Ack => {
                if payload.len() != ACK_LEN {
                    return Err(bad_len(ACK_LEN, payload.len()));
                }
                let req = payload.get_u8();
                let err = ErrorCode::from(payload.get_u8());
                Command::Ack { req, err }
            }
        };
        Ok(cmd)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Echo { data } => write!(f, "ECHO len={}", data.len()),
            Command::Read { addr, width, count } => {
                write!(f, "READ addr={addr:#010x} width={} count={count}", width.bytes())
            }
            Command::Write {
                addr,
                width,
                values,
            } => write!(
                f,
                "WRITE addr={addr:#010x} width={} count={}",
                width.bytes(),
                values.len()
            ),
            Command::SetClr {
                addr,
                width,
                mask,
                val,
            } => write!(
                f,
                "SETCLR addr={addr:#010x} width={} mask={mask:#x} val={val:#x}",
                width.bytes()
            ),
            Command::ReadResp {
                addr,
                width,
                values,
            } => write!(
                f,
                "READ_RESP addr={addr:#010x} width={} count={}",
                width.bytes(),
                values.len()
            ),
            Command::Ack { req, err } => match CommandCode::try_from(*req) {
                Ok(code) => write!(f, "ACK req={code} err={err}"),
                Err(_) => write!(f, "ACK req={req:#04x} err={err}"),
            },
        }
    }
}

fn check_count(count: usize) -> Result<()> {
    if count == 0 || count > MAX_RW_COUNT {
        return Err(CommandError::BadCount(count));
    }
    Ok(())
}

fn check_aligned(addr: u32, width: Width) -> Result<()> {
    if !width.is_aligned(addr) {
        return Err(CommandError::NotAligned {
            addr,
            width: width.bytes(),
        });
    }
    Ok(())
}

fn check_fits(value: u32, width: Width) -> Result<()> {
    if !width.fits(value) {
        return Err(CommandError::ValueOverflow {
            value,
            width: width.bytes(),
        });
    }
    Ok(())
}

fn put_value(dst: &mut BytesMut, width: Width, value: u32) {
    match width {
        Width::U8 => dst.put_u8(value as u8),
        Width::U16 => dst.put_u16_le(value as u16),
        Width::U32 => dst.put_u32_le(value),
    }
}

// Callers have already checked that `width` bytes remain.
fn get_value(src: &mut &[u8], width: Width) -> u32 {
    match width {
        Width::U8 => src.get_u8() as u32,
        Width::U16 => src.get_u16_le() as u32,
        Width::U32 => src.get_u32_le(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_wire_layout() {
        let cmd = Command::Read {
            addr: 0x4000_1000,
            width: Width::U32,
            count: 2,
        };
        let bytes = cmd.to_bytes().unwrap();
        assert_eq!(
            bytes.as_ref(),
            [0x02, 0x07, 0x00, 0x00, 0x10, 0x00, 0x40, 0x04, 0x02, 0x00]
        );
        assert_eq!(Command::deserialize(&bytes).unwrap(), cmd);
    }

    #[test]
    fn setclr_wire_layout_uses_width_sized_fields() {
        let cmd = Command::SetClr {
            addr: 0x2002,
            width: Width::U16,
            mask: 0x00F0,
            val: 0x0030,
        };
        let bytes = cmd.to_bytes().unwrap();
        assert_eq!(
            bytes.as_ref(),
            [0x04, 0x09, 0x00, 0x02, 0x20, 0x00, 0x00, 0x02, 0xF0, 0x00, 0x30, 0x00]
        );
        assert_eq!(Command::deserialize(&bytes).unwrap(), cmd);
    }

    #[test]
    fn write_len_is_computed_from_values() {
        let cmd = Command::Write {
            addr: 0x10,
            width: Width::U8,
            values: vec![0xAA, 0xBB, 0xCC],
        };
        let bytes = cmd.to_bytes().unwrap();
        assert_eq!(&bytes[..3], [0x03, 10, 0x00]);
        assert_eq!(&bytes[bytes.len() - 3..], [0xAA, 0xBB, 0xCC]);
        assert_eq!(Command::deserialize(&bytes).unwrap(), cmd);
    }

    #[test]
    fn largest_write_fills_max_cmd_len() {
        let cmd = Command::Write {
            addr: 0,
            width: Width::U32,
            values: vec![0xDEAD_BEEF; MAX_RW_COUNT],
        };
        assert_eq!(cmd.to_bytes().unwrap().len(), MAX_CMD_LEN);
    }

    #[test]
    fn ack_and_nack() {
        let ack = Command::ack(CommandCode::Write, ErrorCode::Ok);
        assert_eq!(ack.to_bytes().unwrap().as_ref(), [0x06, 0x02, 0x00, 0x03, 0x00]);

        let nack = Command::nack(0x42, &CommandError::BadCmd(0x42));
        assert_eq!(
            nack,
            Command::Ack {
                req: 0x42,
                err: ErrorCode::BadCmd
            }
        );
        assert_eq!(nack.to_string(), "ACK req=0x42 err=BAD_CMD");
    }

    #[test]
    fn ack_with_unlisted_error_code_still_decodes() {
        let bytes = [0x06, 0x02, 0x00, 0x03, 0x0B];
        let ack = Command::deserialize(&bytes).unwrap();
        assert_eq!(
            ack,
            Command::Ack {
                req: 0x03,
                err: ErrorCode::Unknown(0x0B)
            }
        );
        assert_eq!(ack.to_bytes().unwrap().as_ref(), bytes);
        assert_eq!(ack.to_string(), "ACK req=WRITE err=UNKNOWN(0x0b)");
    }

    #[test]
    fn validate_rejects_misaligned_before_serializing() {
        let cmd = Command::Write {
            addr: 0x1001,
            width: Width::U32,
            values: vec![1],
        };
        let mut buf = BytesMut::new();
        let err = cmd.serialize(&mut buf).unwrap_err();
        assert_eq!(
            err,
            CommandError::NotAligned {
                addr: 0x1001,
                width: 4
            }
        );
        assert_eq!(err.error_code(), ErrorCode::NotAligned);
        assert!(buf.is_empty());
    }

    #[test]
    fn validate_rejects_bad_counts_and_values() {
        let too_many = Command::Write {
            addr: 0,
            width: Width::U8,
            values: vec![0; MAX_RW_COUNT + 1],
        };
        assert_eq!(too_many.validate(), Err(CommandError::BadCount(257)));

        let none = Command::Read {
            addr: 0,
            width: Width::U8,
            count: 0,
        };
        assert_eq!(none.validate(), Err(CommandError::BadCount(0)));

        let wide = Command::SetClr {
            addr: 0,
            width: Width::U8,
            mask: 0x1FF,
            val: 0,
        };
        assert!(matches!(
            wide.validate(),
            Err(CommandError::ValueOverflow { value: 0x1FF, .. })
        ));

        let empty_echo = Command::Echo { data: Bytes::new() };
        assert!(matches!(
            empty_echo.validate(),
            Err(CommandError::BadPayloadLen { .. })
        ));
    }

    #[test]
    fn deserialize_rejects_len_disagreeing_with_bytes() {
        // Declares 7 payload bytes, carries 6.
        let short = [0x02, 0x07, 0x00, 0x00, 0x10, 0x00, 0x40, 0x04, 0x02];
        assert_eq!(
            Command::deserialize(&short),
            Err(CommandError::BadCmdLen {
                declared: 7,
                actual: 6
            })
        );
        assert_eq!(Command::deserialize(&[0x02, 0x00]), Err(CommandError::Truncated(2)));
    }

    #[test]
    fn deserialize_rejects_len_disagreeing_with_count() {
        // WRITE count=2 width=4 but only one value present; len matches bytes.
        let bytes = [
            0x03, 0x0B, 0x00, 0x00, 0x00, 0x00, 0x00, 0x04, 0x02, 0x00, 0x01, 0x02, 0x03, 0x04,
        ];
        let err = Command::deserialize(&bytes).unwrap_err();
        assert_eq!(
            err,
            CommandError::BadPayloadLen {
                cmd: CommandCode::Write,
                expected: 15,
                actual: 11
            }
        );
        assert_eq!(err.error_code(), ErrorCode::BadPayloadLen);

        // READ with a trailing extra byte.
        let bytes = [0x02, 0x08, 0x00, 0, 0, 0, 0, 0x01, 0x01, 0x00, 0xFF];
        assert!(matches!(
            Command::deserialize(&bytes),
            Err(CommandError::BadPayloadLen { expected: 7, actual: 8, .. })
        ));

        // ACK with three payload bytes.
        let bytes = [0x06, 0x03, 0x00, 0x03, 0x00, 0x00];
        assert!(matches!(
            Command::deserialize(&bytes),
            Err(CommandError::BadPayloadLen { expected: 2, .. })
        ));
    }

    #[test]
    fn deserialize_field_violations_map_to_error_codes() {
        let bad_width = [0x02, 0x07, 0x00, 0, 0, 0, 0, 0x03, 0x01, 0x00];
        let err = Command::deserialize(&bad_width).unwrap_err();
        assert_eq!(err, CommandError::BadWidth(3));
        assert_eq!(err.error_code(), ErrorCode::BadWidth);

        let bad_count = [0x02, 0x07, 0x00, 0, 0, 0, 0, 0x01, 0x01, 0x01];
        let err = Command::deserialize(&bad_count).unwrap_err();
        assert_eq!(err, CommandError::BadCount(257));
        assert_eq!(err.error_code(), ErrorCode::BadCount);

        let misaligned = [0x02, 0x07, 0x00, 0x01, 0x10, 0, 0, 0x04, 0x01, 0x00];
        assert_eq!(
            Command::deserialize(&misaligned).unwrap_err().error_code(),
            ErrorCode::NotAligned
        );

        let unknown = [0x09, 0x00, 0x00];
        assert_eq!(
            Command::deserialize(&unknown).unwrap_err().error_code(),
            ErrorCode::BadCmd
        );

        let empty_echo = [0x01, 0x00, 0x00];
        assert_eq!(
            Command::deserialize(&empty_echo).unwrap_err().error_code(),
            ErrorCode::BadPayloadLen
        );
    }

    #[test]
    fn read_resp_values_follow_width() {
        let cmd = Command::ReadResp {
            addr: 0x100,
            width: Width::U16,
            values: vec![0x1234, 0xABCD],
        };
        let bytes = cmd.to_bytes().unwrap();
        assert_eq!(&bytes[bytes.len() - 4..], [0x34, 0x12, 0xCD, 0xAB]);
        assert_eq!(Command::deserialize(&bytes).unwrap(), cmd);
        assert_eq!(
            cmd.to_string(),
            "READ_RESP addr=0x00000100 width=2 count=2"
        );
    }
}
