//! UART device nodes.
//!
//! Line settings (baud rate, parity, flow control) belong to board bring-up
//! and are expected to be configured before the device is opened here.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use tracing::info;

use crate::error::{LinkError, Result};
use crate::traits::StreamLink;

/// A serial port opened as a non-blocking character device.
pub type SerialLink = StreamLink<File>;

impl StreamLink<File> {
    /// Open a tty device for exclusive use by one session.
    ///
    /// The node is opened with `O_NONBLOCK` so [`crate::Link::read_byte`]
    /// never stalls, and `O_NOCTTY` so it never becomes the controlling
    /// terminal of this process.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_NOCTTY)
            .open(path)
            .map_err(|source| LinkError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        info!(?path, "opened serial link");
        Ok(Self::new(file))
    }
}
