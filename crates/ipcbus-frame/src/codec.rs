use bytes::{Buf, BufMut, Bytes, BytesMut};
use crc::{Algorithm, Crc, CRC_16_IBM_3740};

use crate::error::{FrameError, Result};

/// Start and end delimiter. The same value opens and closes a frame.
pub const FLAG: u8 = 0x7E;

/// Escape byte used for stuffing.
pub const ESC: u8 = 0x7D;

/// Value XOR-ed into an escaped byte.
pub const ESC_XOR: u8 = 0x20;

/// Trailing checksum size.
pub const CRC_SIZE: usize = 2;

/// Smallest command: `cmd(1) + len(2)`.
pub const MIN_CMD_LEN: usize = 3;

/// Largest command: a WRITE or READ_RESP carrying 256 32-bit values.
pub const MAX_CMD_LEN: usize = MIN_CMD_LEN + 7 + 256 * 4;

/// Worst-case wire size: every byte escaped, plus both delimiters.
pub const MAX_FRAME_LEN: usize = 2 * (MAX_CMD_LEN + CRC_SIZE) + 2;

/// CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF, no reflection).
///
/// This has to agree with the peer firmware; override it through
/// [`FrameConfig::crc`] when talking to a peer that uses another variant.
pub const DEFAULT_CRC: &Algorithm<u16> = &CRC_16_IBM_3740;

/// Configuration for the frame codec.
#[derive(Debug, Clone, Copy)]
pub struct FrameConfig {
    /// Maximum unstuffed command size in bytes. Default: [`MAX_CMD_LEN`].
    pub max_cmd_len: usize,
    /// Checksum algorithm shared with the peer. Default: [`DEFAULT_CRC`].
    pub crc: &'static Algorithm<u16>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_cmd_len: MAX_CMD_LEN,
            crc: DEFAULT_CRC,
        }
    }
}

impl FrameConfig {
    /// Largest number of raw bytes a frame may occupy on the wire.
    pub fn max_frame_len(&self) -> usize {
        2 * (self.max_cmd_len + CRC_SIZE) + 2
    }

    /// Checksum of `data` with the configured algorithm.
    pub fn checksum(&self, data: &[u8]) -> u16 {
        Crc::<u16>::new(self.crc).checksum(data)
    }
}

/// Byte-stuff `src` into `dst`.
///
/// `FLAG` and `ESC` are replaced by `ESC, byte ^ ESC_XOR`; everything else is
/// copied unchanged.
pub fn stuff(src: &[u8], dst: &mut BytesMut) {
    dst.reserve(src.len());
    for &byte in src {
        if byte == FLAG || byte == ESC {
            dst.put_u8(ESC);
            dst.put_u8(byte ^ ESC_XOR);
        } else {
            dst.put_u8(byte);
        }
    }
}

/// Reverse [`stuff`], appending the unstuffed bytes to `dst`.
///
/// Fails only when the input ends with a lone escape byte.
pub fn destuff(src: &[u8], dst: &mut BytesMut) -> Result<()> {
    dst.reserve(src.len());
    let mut bytes = src.iter();
    while let Some(&byte) = bytes.next() {
        if byte == ESC {
            let next = bytes
                .next()
                .ok_or(FrameError::Malformed("dangling escape at end of frame"))?;
            dst.put_u8(next ^ ESC_XOR);
        } else {
            dst.put_u8(byte);
        }
    }
    Ok(())
}

/// Encode a command into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────┬──────────────────────────────────────┬──────┐
/// │ SOF  │ stuffed( command ‖ CRC-16 LE )       │ EOF  │
/// │ 0x7E │ 0x7E → 7D 5E, 0x7D → 7D 5D           │ 0x7E │
/// └──────┴──────────────────────────────────────┴──────┘
/// ```
///
/// The checksum covers the unstuffed command bytes only.
pub fn encode_frame(cmd: &[u8], config: &FrameConfig, dst: &mut BytesMut) -> Result<()> {
    if cmd.len() < MIN_CMD_LEN || cmd.len() > config.max_cmd_len {
        return Err(FrameError::CommandLength {
            size: cmd.len(),
            min: MIN_CMD_LEN,
            max: config.max_cmd_len,
        });
    }

    let crc = config.checksum(cmd);
    dst.reserve(2 * (cmd.len() + CRC_SIZE) + 2);
    dst.put_u8(FLAG);
    stuff(cmd, dst);
    stuff(&crc.to_le_bytes(), dst);
    dst.put_u8(FLAG);
    Ok(())
}

/// Decode one command from a receive buffer.
///
/// Bytes before the first delimiter are discarded. Returns `Ok(None)` while
/// the frame is still incomplete. A complete frame is consumed from the
/// buffer up to, but not including, its closing delimiter: because start and
/// end share one value, that delimiter may also open the next frame, which
/// lets the decoder recover when a closing delimiter was lost on the wire.
///
/// A frame that fails to decode is consumed before the error is returned, so
/// the caller can drop it and call again.
pub fn decode_frame(src: &mut BytesMut, config: &FrameConfig) -> Result<Option<Bytes>> {
    let max_frame_len = config.max_frame_len();
    loop {
        let Some(start) = src.iter().position(|&b| b == FLAG) else {
            src.clear();
            return Ok(None);
        };
        src.advance(start);

        let Some(end) = src[1..].iter().position(|&b| b == FLAG).map(|i| i + 1) else {
            if src.len() > max_frame_len {
                let size = src.len();
                src.clear();
                return Err(FrameError::TooLong {
                    size,
                    max: max_frame_len,
                });
            }
            return Ok(None);
        };

        if end == 1 {
            // Empty body between two delimiters is an inter-frame gap.
            src.advance(1);
            continue;
        }

        let raw = src.split_to(end);
        if raw.len() + 1 > max_frame_len {
            return Err(FrameError::TooLong {
                size: raw.len() + 1,
                max: max_frame_len,
            });
        }
        return unframe(&raw[1..], config).map(Some);
    }
}

fn unframe(body: &[u8], config: &FrameConfig) -> Result<Bytes> {
    let mut out = BytesMut::with_capacity(body.len());
    destuff(body, &mut out)?;

    if out.len() < MIN_CMD_LEN + CRC_SIZE {
        return Err(FrameError::Malformed("frame shorter than header and checksum"));
    }
    if out.len() > config.max_cmd_len + CRC_SIZE {
        return Err(FrameError::TooLong {
            size: out.len(),
            max: config.max_cmd_len + CRC_SIZE,
        });
    }

    let crc_at = out.len() - CRC_SIZE;
    let received = u16::from_le_bytes([out[crc_at], out[crc_at + 1]]);
    out.truncate(crc_at);
    let expected = config.checksum(&out);
    if expected != received {
        return Err(FrameError::CrcMismatch { expected, received });
    }

    Ok(out.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(cmd: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_frame(cmd, &FrameConfig::default(), &mut buf).unwrap();
        buf
    }

    #[test]
    fn crc_matches_published_check_value() {
        assert_eq!(FrameConfig::default().checksum(b"123456789"), 0x29B1);
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let cmd = [0x02, 0x07, 0x00, 0x00, 0x10, 0x00, 0x40, 0x04, 0x02, 0x00];
        let mut buf = encode(&cmd);

        assert_eq!(buf[0], FLAG);
        assert_eq!(buf[buf.len() - 1], FLAG);

        let decoded = decode_frame(&mut buf, &FrameConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(decoded.as_ref(), cmd);
        // Closing delimiter stays behind as a potential opener.
        assert_eq!(buf.as_ref(), [FLAG]);
    }

    #[test]
    fn roundtrip_with_reserved_bytes_everywhere() {
        let cmd: Vec<u8> = (0..=255u8).chain([FLAG, ESC, FLAG, ESC]).collect();
        let mut buf = encode(&cmd);
        let decoded = decode_frame(&mut buf, &FrameConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(decoded.as_ref(), cmd.as_slice());
    }

    #[test]
    fn stuffed_body_has_no_bare_delimiter() {
        let cmd = [FLAG, ESC, 0x20, FLAG ^ ESC_XOR, ESC, ESC, FLAG];
        let frame = encode(&cmd);
        let body = &frame[1..frame.len() - 1];

        assert!(!body.contains(&FLAG));
        let mut i = 0;
        while i < body.len() {
            if body[i] == ESC {
                let unescaped = body[i + 1] ^ ESC_XOR;
                assert!(unescaped == FLAG || unescaped == ESC);
                i += 2;
            } else {
                i += 1;
            }
        }
    }

    #[test]
    fn stuff_escapes_reserved_bytes() {
        let mut out = BytesMut::new();
        stuff(&[0x01, FLAG, ESC, 0x02], &mut out);
        assert_eq!(out.as_ref(), [0x01, ESC, 0x5E, ESC, 0x5D, 0x02]);
    }

    #[test]
    fn destuff_rejects_dangling_escape() {
        let mut out = BytesMut::new();
        let err = destuff(&[0x01, ESC], &mut out).unwrap_err();
        assert!(matches!(err, FrameError::Malformed(_)));
    }

    #[test]
    fn test_decode_incomplete_frame() {
        let full = encode(&[0x01, 0x01, 0x00, 0xAA]);
        let mut buf = BytesMut::from(&full[..full.len() - 1]);
        assert!(decode_frame(&mut buf, &FrameConfig::default())
            .unwrap()
            .is_none());
        assert_eq!(buf.len(), full.len() - 1, "partial frame must be kept");
    }

    #[test]
    fn leading_garbage_is_discarded() {
        let cmd = [0x01, 0x01, 0x00, 0x55];
        let mut buf = BytesMut::from(&[0x11, 0x22, 0x33][..]);
        buf.extend_from_slice(&encode(&cmd));

        let decoded = decode_frame(&mut buf, &FrameConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(decoded.as_ref(), cmd);
    }

    #[test]
    fn garbage_without_delimiter_is_dropped() {
        let mut buf = BytesMut::from(&[0x11, 0x22, 0x33][..]);
        assert!(decode_frame(&mut buf, &FrameConfig::default())
            .unwrap()
            .is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_multiple_frames() {
        let mut buf = encode(&[0x01, 0x01, 0x00, 0x01]);
        buf.extend_from_slice(&encode(&[0x01, 0x01, 0x00, 0x02]));
        let config = FrameConfig::default();

        let f1 = decode_frame(&mut buf, &config).unwrap().unwrap();
        let f2 = decode_frame(&mut buf, &config).unwrap().unwrap();
        assert_eq!(f1.as_ref(), [0x01, 0x01, 0x00, 0x01]);
        assert_eq!(f2.as_ref(), [0x01, 0x01, 0x00, 0x02]);
        assert!(decode_frame(&mut buf, &config).unwrap().is_none());
    }

    #[test]
    fn lost_closing_delimiter_costs_one_frame() {
        let config = FrameConfig::default();
        // Lose the closing delimiter and the last checksum byte.
        let mut first = encode(&[0x01, 0x01, 0x00, 0x01]);
        first.truncate(first.len() - 2);
        let second = [0x01, 0x01, 0x00, 0x02];

        let mut buf = first;
        buf.extend_from_slice(&encode(&second));

        let err = decode_frame(&mut buf, &config).unwrap_err();
        assert!(err.is_frame_local());
        let decoded = decode_frame(&mut buf, &config).unwrap().unwrap();
        assert_eq!(decoded.as_ref(), second);
    }

    #[test]
    fn single_bit_flips_are_detected() {
        let config = FrameConfig::default();
        let cmd = [
            0x04, 0x0D, 0x00, 0x00, 0x20, 0x00, 0x40, 0x04, 0xFF, 0x00, 0x00, 0x00, 0x12, 0x00,
            0x00, 0x00,
        ];
        let frame = encode(&cmd);

        for pos in 1..frame.len() - 1 {
            if frame[pos] == ESC || frame[pos - 1] == ESC {
                continue;
            }
            for bit in 0..8 {
                let flipped = frame[pos] ^ (1 << bit);
                if flipped == FLAG || flipped == ESC {
                    continue;
                }
                let mut buf = frame.clone();
                buf[pos] = flipped;
                let result = decode_frame(&mut buf, &config);
                assert!(
                    matches!(result, Err(FrameError::CrcMismatch { .. })),
                    "flip of bit {bit} at {pos} not detected: {result:?}"
                );
            }
        }
    }

    #[test]
    fn dangling_escape_is_malformed() {
        let mut buf = BytesMut::from(&[FLAG, 0x01, 0x01, 0x00, 0x55, 0x12, 0x34, ESC, FLAG][..]);
        let err = decode_frame(&mut buf, &FrameConfig::default()).unwrap_err();
        assert!(matches!(err, FrameError::Malformed(_)));
    }

    #[test]
    fn short_frame_is_malformed() {
        let mut buf = BytesMut::from(&[FLAG, 0x01, 0x02, FLAG][..]);
        let err = decode_frame(&mut buf, &FrameConfig::default()).unwrap_err();
        assert!(matches!(err, FrameError::Malformed(_)));
    }

    #[test]
    fn back_to_back_delimiters_are_skipped() {
        let cmd = [0x06, 0x02, 0x00, 0x01, 0x00];
        let mut buf = BytesMut::from(&[FLAG, FLAG, FLAG][..]);
        buf.extend_from_slice(&encode(&cmd));
        let decoded = decode_frame(&mut buf, &FrameConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(decoded.as_ref(), cmd);
    }

    #[test]
    fn unterminated_frame_over_capacity_is_too_long() {
        let config = FrameConfig {
            max_cmd_len: 8,
            ..FrameConfig::default()
        };
        let mut buf = BytesMut::new();
        buf.put_u8(FLAG);
        buf.put_slice(&[0x01; 64]);

        let err = decode_frame(&mut buf, &config).unwrap_err();
        assert!(matches!(err, FrameError::TooLong { .. }));
        assert!(buf.is_empty());

        // The decoder resynchronises on the next delimiter.
        let cmd = [0x01, 0x01, 0x00, 0x09];
        let mut wire = BytesMut::new();
        encode_frame(&cmd, &config, &mut wire).unwrap();
        buf.extend_from_slice(&wire);
        let decoded = decode_frame(&mut buf, &config).unwrap().unwrap();
        assert_eq!(decoded.as_ref(), cmd);
    }

    #[test]
    fn terminated_frame_over_command_limit_is_too_long() {
        let big = FrameConfig {
            max_cmd_len: 64,
            ..FrameConfig::default()
        };
        let small = FrameConfig {
            max_cmd_len: 8,
            ..FrameConfig::default()
        };
        let mut wire = BytesMut::new();
        encode_frame(&[0x01; 12], &big, &mut wire).unwrap();

        let err = decode_frame(&mut wire, &small).unwrap_err();
        assert!(matches!(err, FrameError::TooLong { .. }));
    }

    #[test]
    fn encode_rejects_out_of_range_commands() {
        let mut buf = BytesMut::new();
        let config = FrameConfig::default();

        let err = encode_frame(&[0x01, 0x00], &config, &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::CommandLength { size: 2, .. }));

        let oversized = vec![0u8; MAX_CMD_LEN + 1];
        let err = encode_frame(&oversized, &config, &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::CommandLength { .. }));
        assert!(buf.is_empty());
    }

    #[test]
    fn worst_case_frame_fits_capacity() {
        let cmd = vec![FLAG; MAX_CMD_LEN];
        let frame = encode(&cmd);
        assert!(frame.len() <= MAX_FRAME_LEN);
    }
}
