use bytes::Bytes;
use ipcbus_command::{Command, CommandCode, ErrorCode, Width};
use ipcbus_link::Link;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::config::FlashConfig;
use crate::error::{PeerError, Result};
use crate::session::Session;

/// Register operations on top of a [`Session`].
///
/// Every call is one exchange (flash updates are many). Parameters are
/// checked before anything is sent, and a non-OK ACK from the slave comes
/// back as [`PeerError::Rejected`].
pub struct RegisterClient<L, C = SystemClock> {
    session: Session<L, C>,
    pub(crate) flash: FlashConfig,
}

impl<L: Link, C: Clock> RegisterClient<L, C> {
    pub fn new(session: Session<L, C>) -> Self {
        Self::with_flash_config(session, FlashConfig::default())
    }

    pub fn with_flash_config(session: Session<L, C>, flash: FlashConfig) -> Self {
        Self { session, flash }
    }

    /// Send `data` in an ECHO and expect an OK acknowledgment.
    pub fn echo(&mut self, data: &[u8]) -> Result<()> {
        let response = self.session.request(&Command::Echo {
            data: Bytes::copy_from_slice(data),
        })?;
        expect_ok(CommandCode::Echo, response)
    }

    /// Read `count` consecutive registers of `width` starting at `addr`.
    pub fn read(&mut self, addr: u32, width: Width, count: u16) -> Result<Vec<u32>> {
        let response = self.session.request(&Command::Read { addr, width, count })?;
        match response {
            Command::ReadResp { values, .. } => {
                debug!(addr = format_args!("{addr:#010x}"), count, "read complete");
                Ok(values)
            }
            Command::Ack { err, .. } if !err.is_ok() => Err(PeerError::Rejected {
                req: CommandCode::Read,
                code: err,
            }),
            other => Err(PeerError::UnexpectedResponse(other.to_string())),
        }
    }

    /// Write `values` to consecutive registers of `width` starting at `addr`.
    pub fn write(&mut self, addr: u32, width: Width, values: &[u32]) -> Result<()> {
        let response = self.session.request(&Command::Write {
            addr,
            width,
            values: values.to_vec(),
        })?;
        expect_ok(CommandCode::Write, response)
    }

    /// Atomically set the bits of `mask` in the register at `addr` to `val`.
    ///
    /// The slave stores `(old & !mask) | (val & mask)`.
    pub fn setclr(&mut self, addr: u32, width: Width, mask: u32, val: u32) -> Result<()> {
        let response = self.session.request(&Command::SetClr {
            addr,
            width,
            mask,
            val,
        })?;
        expect_ok(CommandCode::SetClr, response)
    }

    pub fn flash_config(&self) -> &FlashConfig {
        &self.flash
    }

    pub fn session(&self) -> &Session<L, C> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session<L, C> {
        &mut self.session
    }

    pub fn into_session(self) -> Session<L, C> {
        self.session
    }
}

fn expect_ok(req: CommandCode, response: Command) -> Result<()> {
    match response {
        Command::Ack {
            err: ErrorCode::Ok, ..
        } => Ok(()),
        Command::Ack { err, .. } => Err(PeerError::Rejected { req, code: err }),
        other => Err(PeerError::UnexpectedResponse(other.to_string())),
    }
}
