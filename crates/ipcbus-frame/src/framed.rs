use bytes::{BufMut, Bytes, BytesMut};
use ipcbus_link::Link;
use tracing::{debug, trace};

use crate::codec::{decode_frame, encode_frame, FrameConfig, FLAG, MAX_FRAME_LEN};
use crate::error::Result;
use crate::hex::Hex;

/// Sends and receives complete frames over a [`Link`].
///
/// Owns the link for as long as it lives. Receiving is poll based: bytes are
/// pulled from the link until a whole frame is available or the link runs
/// dry, so the caller stays in charge of time.
pub struct FramedLink<L> {
    link: L,
    rx: BytesMut,
    tx: BytesMut,
    config: FrameConfig,
    trace: bool,
}

impl<L: Link> FramedLink<L> {
    /// Create a framed link with default configuration.
    pub fn new(link: L) -> Self {
        Self::with_config(link, FrameConfig::default())
    }

    /// Create a framed link with explicit configuration.
    pub fn with_config(link: L, config: FrameConfig) -> Self {
        Self {
            link,
            rx: BytesMut::with_capacity(MAX_FRAME_LEN),
            tx: BytesMut::with_capacity(MAX_FRAME_LEN),
            config,
            trace: false,
        }
    }

    /// Frame `cmd` and write it to the link.
    pub fn send(&mut self, cmd: &[u8]) -> Result<()> {
        self.tx.clear();
        encode_frame(cmd, &self.config, &mut self.tx)?;
        if self.trace {
            debug!(dir = "tx", frame = %Hex(&self.tx), "raw frame");
        } else {
            trace!(dir = "tx", frame = %Hex(&self.tx), "raw frame");
        }
        self.link.write_all(&self.tx)?;
        Ok(())
    }

    /// Pull available bytes from the link and return the next command.
    ///
    /// Returns `Ok(None)` once the link has nothing more to give and no
    /// complete frame is buffered. Frame-local errors (see
    /// [`crate::FrameError::is_frame_local`]) consume the offending frame, so
    /// polling again continues with whatever follows it.
    pub fn poll_frame(&mut self) -> Result<Option<Bytes>> {
        let max_frame_len = self.config.max_frame_len();
        while let Some(byte) = self.link.read_byte()? {
            self.rx.put_u8(byte);
            if byte != FLAG && self.rx.len() <= max_frame_len {
                continue;
            }
            if let Some(cmd) = decode_frame(&mut self.rx, &self.config)? {
                if self.trace {
                    debug!(dir = "rx", command = %Hex(&cmd), "raw frame");
                } else {
                    trace!(dir = "rx", command = %Hex(&cmd), "raw frame");
                }
                return Ok(Some(cmd));
            }
        }
        Ok(None)
    }

    /// Log every frame sent and received at `debug` instead of `trace`.
    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }

    /// Drop any partially received bytes.
    pub fn clear_rx(&mut self) {
        self.rx.clear();
    }

    /// Borrow the underlying link.
    pub fn get_ref(&self) -> &L {
        &self.link
    }

    /// Mutably borrow the underlying link.
    pub fn get_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Consume the framed link and return the inner link.
    pub fn into_inner(self) -> L {
        self.link
    }

    /// Current frame configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
