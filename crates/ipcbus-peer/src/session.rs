use ipcbus_command::{Command, CommandCode};
use ipcbus_frame::FramedLink;
use ipcbus_link::Link;
use std::time::Duration;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::error::{PeerError, Result};

/// Where a session stands in its single-request exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingResponse {
        request: CommandCode,
        deadline: Duration,
    },
}

/// Master side of the protocol: one request in flight, bounded by a timeout.
///
/// The session owns the link. Frames that fail CRC or do not decode are
/// dropped while the timer keeps running, as are well-formed responses that
/// do not answer the outstanding request. There is no retry; a timed out
/// request leaves the session idle and ready for the next one.
pub struct Session<L, C = SystemClock> {
    framed: FramedLink<L>,
    clock: C,
    config: SessionConfig,
    state: SessionState,
}

impl<L: Link> Session<L, SystemClock> {
    /// Create a session with default configuration.
    pub fn new(link: L) -> Self {
        Self::with_config(link, SessionConfig::default())
    }

    /// Create a session with explicit configuration.
    pub fn with_config(link: L, config: SessionConfig) -> Self {
        Self::with_clock(link, config, SystemClock::new())
    }
}

impl<L: Link, C: Clock> Session<L, C> {
    /// Create a session driven by `clock`.
    pub fn with_clock(link: L, config: SessionConfig, clock: C) -> Self {
        let mut framed = FramedLink::with_config(link, config.frame);
        framed.set_trace(config.trace);
        Self {
            framed,
            clock,
            config,
            state: SessionState::Idle,
        }
    }

    /// Send `request` and wait for the response that answers it.
    ///
    /// Invalid requests are rejected before any byte reaches the link.
    pub fn request(&mut self, request: &Command) -> Result<Command> {
        let code = request.code();
        if !code.is_request() {
            return Err(PeerError::NotARequest(code));
        }
        let bytes = request.to_bytes()?;

        // Anything still buffered belongs to an earlier exchange.
        self.framed.clear_rx();
        if let Err(err) = self.framed.send(&bytes) {
            self.state = SessionState::Idle;
            return Err(err.into());
        }

        let deadline = self.clock.now() + self.config.timeout;
        self.state = SessionState::AwaitingResponse {
            request: code,
            deadline,
        };
        debug!(%request, "request sent");

        let result = self.await_response(request, deadline);
        self.state = SessionState::Idle;
        result
    }

    fn await_response(&mut self, request: &Command, deadline: Duration) -> Result<Command> {
        loop {
            match self.framed.poll_frame() {
                Ok(Some(frame)) => match Command::deserialize(&frame) {
                    Ok(response) if answers(request, &response) => {
                        debug!(%response, "response received");
                        return Ok(response);
                    }
                    Ok(response) => {
                        debug!(%response, "dropping stale response");
                    }
                    Err(err) => {
                        warn!(error = %err, "dropping undecodable response");
                    }
                },
                Ok(None) => self.clock.sleep(self.config.poll_interval),
                Err(err) if err.is_frame_local() => {
                    warn!(error = %err, "dropping corrupted frame");
                }
                Err(err) => return Err(err.into()),
            }

            if self.clock.now() >= deadline {
                debug!(request = %request.code(), timeout = ?self.config.timeout, "request timed out");
                return Err(PeerError::Timeout(self.config.timeout));
            }
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Change the response timeout for subsequent requests.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.config.timeout = timeout;
    }

    /// Log raw frames at `debug` instead of `trace`.
    pub fn set_trace(&mut self, trace: bool) {
        self.config.trace = trace;
        self.framed.set_trace(trace);
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Borrow the underlying link.
    pub fn link(&self) -> &L {
        self.framed.get_ref()
    }

    /// Mutably borrow the underlying link.
    pub fn link_mut(&mut self) -> &mut L {
        self.framed.get_mut()
    }

    /// Consume the session and return the link.
    pub fn into_link(self) -> L {
        self.framed.into_inner()
    }
}

/// Whether `response` answers the outstanding `request`.
///
/// Any request may be answered by an ACK naming it. A READ may also be
/// answered by a READ_RESP for the same address, width and count.
fn answers(request: &Command, response: &Command) -> bool {
    match (request, response) {
        (_, Command::Ack { req, .. }) => *req == request.code() as u8,
        (
            Command::Read { addr, width, count },
            Command::ReadResp {
                addr: resp_addr,
                width: resp_width,
                values,
            },
        ) => addr == resp_addr && width == resp_width && values.len() == *count as usize,
        _ => false,
    }
}
