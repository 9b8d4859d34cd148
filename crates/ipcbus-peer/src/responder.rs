use ipcbus_command::{Command, CommandCode, ErrorCode, Width};
use ipcbus_frame::{FrameError, FramedLink};
use ipcbus_link::{Link, LinkError};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::error::{PeerError, Result};
use crate::target::RegisterTarget;

/// Slave side of the protocol.
///
/// Every decoded request gets exactly one reply: READ_RESP for a good READ,
/// otherwise an ACK carrying the outcome. Requests that fail to parse are
/// NACKed with the matching error code; frames that fail CRC are dropped
/// without a reply.
pub struct Responder<L, T, C = SystemClock> {
    framed: FramedLink<L>,
    target: T,
    clock: C,
    config: SessionConfig,
}

impl<L: Link, T: RegisterTarget> Responder<L, T, SystemClock> {
    pub fn new(link: L, target: T) -> Self {
        Self::with_config(link, target, SessionConfig::default())
    }

    pub fn with_config(link: L, target: T, config: SessionConfig) -> Self {
        Self::with_clock(link, target, config, SystemClock::new())
    }
}

impl<L: Link, T: RegisterTarget, C: Clock> Responder<L, T, C> {
    pub fn with_clock(link: L, target: T, config: SessionConfig, clock: C) -> Self {
        let mut framed = FramedLink::with_config(link, config.frame);
        framed.set_trace(config.trace);
        Self {
            framed,
            target,
            clock,
            config,
        }
    }

    /// Handle at most one incoming frame.
    ///
    /// Returns the reply that was sent, or `None` if nothing complete was
    /// available or the frame was dropped.
    pub fn poll(&mut self) -> Result<Option<Command>> {
        let frame = match self.framed.poll_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(None),
            Err(err) if err.is_frame_local() => {
                warn!(error = %err, "dropping corrupted request");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        let mut reply = self.handle(&frame);
        let bytes = match reply.to_bytes() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(%reply, error = %err, "reply does not encode, sending NACK");
                reply = Command::nack(frame.first().copied().unwrap_or(0), &err);
                reply.to_bytes()?
            }
        };
        self.framed.send(&bytes)?;
        Ok(Some(reply))
    }

    /// Serve requests until the peer hangs up.
    pub fn serve(&mut self) -> Result<()> {
        self.serve_until(|| false)
    }

    /// Serve requests until the peer hangs up or `stop` returns true.
    pub fn serve_until<F: FnMut() -> bool>(&mut self, mut stop: F) -> Result<()> {
        while !stop() {
            match self.poll() {
                Ok(Some(_)) => {}
                Ok(None) => self.clock.sleep(self.config.poll_interval),
                Err(PeerError::Frame(FrameError::Link(LinkError::Closed)))
                | Err(PeerError::Link(LinkError::Closed)) => {
                    info!("peer closed the link");
                    return Ok(());
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Build the reply for one unstuffed command.
    pub fn handle(&mut self, frame: &[u8]) -> Command {
        let request = match Command::deserialize(frame) {
            Ok(request) => request,
            Err(err) => {
                let raw = frame.first().copied().unwrap_or(0);
                debug!(cmd = format_args!("{raw:#04x}"), error = %err, "rejecting request");
                return Command::nack(raw, &err);
            }
        };
        debug!(%request, "request received");

        match request {
            Command::Echo { .. } => Command::ack(CommandCode::Echo, ErrorCode::Ok),
            Command::Read { addr, width, count } => {
                match self.read_block(addr, width, count as usize) {
                    Ok(values) => Command::ReadResp {
                        addr,
                        width,
                        values,
                    },
                    Err(err) => Command::ack(CommandCode::Read, err),
                }
            }
            Command::Write {
                addr,
                width,
                values,
            } => {
                let err = self
                    .write_block(addr, width, &values)
                    .err()
                    .unwrap_or(ErrorCode::Ok);
                Command::ack(CommandCode::Write, err)
            }
            Command::SetClr {
                addr,
                width,
                mask,
                val,
            } => {
                let err = self
                    .target
                    .set_clear(addr, width, mask, val)
                    .err()
                    .unwrap_or(ErrorCode::Ok);
                Command::ack(CommandCode::SetClr, err)
            }
            // A slave never receives responses.
            Command::ReadResp { .. } | Command::Ack { .. } => {
                Command::ack(request.code(), ErrorCode::BadCmd)
            }
        }
    }

    /// Values are truncated to `width`; only those bits exist on the wire.
    fn read_block(
        &mut self,
        addr: u32,
        width: Width,
        count: usize,
    ) -> std::result::Result<Vec<u32>, ErrorCode> {
        (0..count)
            .map(|i| {
                let at = element_addr(addr, width, i)?;
                let value = self.target.read(at, width)?;
                Ok(value & width.max_value())
            })
            .collect()
    }

    fn write_block(
        &mut self,
        addr: u32,
        width: Width,
        values: &[u32],
    ) -> std::result::Result<(), ErrorCode> {
        for (i, value) in values.iter().enumerate() {
            let at = element_addr(addr, width, i)?;
            self.target.write(at, width, *value)?;
        }
        Ok(())
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    pub fn into_parts(self) -> (L, T) {
        (self.framed.into_inner(), self.target)
    }
}

fn element_addr(base: u32, width: Width, index: usize) -> std::result::Result<u32, ErrorCode> {
    u32::try_from(index * width.bytes())
        .ok()
        .and_then(|offset| base.checked_add(offset))
        .ok_or(ErrorCode::BadAddr)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use bytes::{Bytes, BytesMut};
    use ipcbus_frame::{decode_frame, encode_frame, FrameConfig};

    use super::*;
    use crate::target::MemoryTarget;

    /// Link fed with whole frames; captures everything sent back.
    #[derive(Default)]
    struct Wire {
        incoming: VecDeque<u8>,
        sent: BytesMut,
    }

    impl Wire {
        fn with_request(cmd: &Command) -> Self {
            let mut buf = BytesMut::new();
            encode_frame(&cmd.to_bytes().unwrap(), &FrameConfig::default(), &mut buf).unwrap();
            Self {
                incoming: buf.into_iter().collect(),
                sent: BytesMut::new(),
            }
        }
    }

    impl Link for Wire {
        fn write_all(&mut self, bytes: &[u8]) -> ipcbus_link::Result<()> {
            self.sent.extend_from_slice(bytes);
            Ok(())
        }

        fn read_byte(&mut self) -> ipcbus_link::Result<Option<u8>> {
            match self.incoming.pop_front() {
                Some(byte) => Ok(Some(byte)),
                None => Err(LinkError::Closed),
            }
        }
    }

    /// Target whose registers report bits above the access width.
    struct Wide;

    impl RegisterTarget for Wide {
        fn read(&mut self, _addr: u32, _width: Width) -> std::result::Result<u32, ErrorCode> {
            Ok(0x1FF)
        }

        fn write(
            &mut self,
            _addr: u32,
            _width: Width,
            _value: u32,
        ) -> std::result::Result<(), ErrorCode> {
            Ok(())
        }
    }

    struct Idle;

    impl Link for Idle {
        fn write_all(&mut self, _bytes: &[u8]) -> ipcbus_link::Result<()> {
            Ok(())
        }

        fn read_byte(&mut self) -> ipcbus_link::Result<Option<u8>> {
            Ok(None)
        }
    }

    fn responder(target: MemoryTarget) -> Responder<Idle, MemoryTarget> {
        Responder::new(Idle, target)
    }

    #[test]
    fn echo_is_acknowledged() {
        let mut r = responder(MemoryTarget::new());
        let req = Command::Echo {
            data: Bytes::from_static(b"ping"),
        };
        assert_eq!(
            r.handle(&req.to_bytes().unwrap()),
            Command::ack(CommandCode::Echo, ErrorCode::Ok)
        );
    }

    #[test]
    fn write_then_read_back() {
        let mut r = responder(MemoryTarget::new());
        let write = Command::Write {
            addr: 0x20,
            width: Width::U16,
            values: vec![0xBEEF, 0x1234],
        };
        assert_eq!(
            r.handle(&write.to_bytes().unwrap()),
            Command::ack(CommandCode::Write, ErrorCode::Ok)
        );

        let read = Command::Read {
            addr: 0x20,
            width: Width::U16,
            count: 2,
        };
        assert_eq!(
            r.handle(&read.to_bytes().unwrap()),
            Command::ReadResp {
                addr: 0x20,
                width: Width::U16,
                values: vec![0xBEEF, 0x1234],
            }
        );
    }

    #[test]
    fn setclr_is_applied_by_target() {
        let mut mem = MemoryTarget::new();
        mem.load(0x40, &[0xFF, 0x00, 0x00, 0x00]);
        let mut r = responder(mem);
        let req = Command::SetClr {
            addr: 0x40,
            width: Width::U32,
            mask: 0x0000_F0F0,
            val: 0x0000_A050,
        };
        assert_eq!(
            r.handle(&req.to_bytes().unwrap()),
            Command::ack(CommandCode::SetClr, ErrorCode::Ok)
        );
        assert_eq!(r.target().dump(0x40, 2), [0x5F, 0xA0]);
    }

    #[test]
    fn out_of_region_read_is_nacked() {
        let mut r = responder(MemoryTarget::new().with_region(0..0x100));
        let req = Command::Read {
            addr: 0xFC,
            width: Width::U32,
            count: 2,
        };
        assert_eq!(
            r.handle(&req.to_bytes().unwrap()),
            Command::ack(CommandCode::Read, ErrorCode::BadAddr)
        );
    }

    #[test]
    fn undecodable_requests_are_nacked_with_mapped_code() {
        let mut r = responder(MemoryTarget::new());
        assert_eq!(
            r.handle(&[0x09, 0x00, 0x00]),
            Command::Ack {
                req: 0x09,
                err: ErrorCode::BadCmd
            }
        );
        assert_eq!(
            r.handle(&[0x02, 0x07, 0x00, 0x01, 0x00, 0x00, 0x00, 0x04, 0x01, 0x00]),
            Command::ack(CommandCode::Read, ErrorCode::NotAligned)
        );
        assert_eq!(
            r.handle(&[0x03, 0x05, 0x00, 0x00]),
            Command::ack(CommandCode::Write, ErrorCode::BadCmdLen)
        );
    }

    #[test]
    fn responses_sent_to_slave_are_rejected() {
        let mut r = responder(MemoryTarget::new());
        let ack = Command::ack(CommandCode::Write, ErrorCode::Ok);
        assert_eq!(
            r.handle(&ack.to_bytes().unwrap()),
            Command::ack(CommandCode::Ack, ErrorCode::BadCmd)
        );
    }

    #[test]
    fn poll_without_input_sends_nothing() {
        let mut r = responder(MemoryTarget::new());
        assert!(r.poll().unwrap().is_none());
    }

    #[test]
    fn over_wide_target_values_are_truncated_on_the_wire() {
        let read = Command::Read {
            addr: 0x10,
            width: Width::U8,
            count: 1,
        };
        let mut r = Responder::new(Wire::with_request(&read), Wide);

        let expected = Command::ReadResp {
            addr: 0x10,
            width: Width::U8,
            values: vec![0xFF],
        };
        assert_eq!(r.poll().unwrap(), Some(expected.clone()));
        r.serve().unwrap();

        let (mut wire, _) = r.into_parts();
        let reply = decode_frame(&mut wire.sent, &FrameConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(Command::deserialize(&reply).unwrap(), expected);
        assert!(decode_frame(&mut wire.sent, &FrameConfig::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn element_addresses_do_not_wrap() {
        assert_eq!(element_addr(0xFFFF_FFFC, Width::U32, 0), Ok(0xFFFF_FFFC));
        assert_eq!(element_addr(0xFFFF_FFFC, Width::U32, 1), Err(ErrorCode::BadAddr));
    }
}
