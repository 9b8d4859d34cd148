/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The command handed to the encoder is outside the allowed length.
    #[error("command length {size} outside {min}..={max} bytes")]
    CommandLength { size: usize, min: usize, max: usize },

    /// No end delimiter within the receive buffer capacity.
    #[error("frame too long ({size} bytes, max {max})")]
    TooLong { size: usize, max: usize },

    /// The trailing checksum does not match the frame contents.
    #[error("crc mismatch (computed {expected:#06x}, received {received:#06x})")]
    CrcMismatch { expected: u16, received: u16 },

    /// The frame body cannot be unstuffed into a command.
    #[error("malformed frame: {0}")]
    Malformed(&'static str),

    /// The underlying link failed.
    #[error("link error: {0}")]
    Link(#[from] ipcbus_link::LinkError),

    /// An I/O error occurred in a stream codec.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// True for errors that only affect the frame in hand.
    ///
    /// The receiver drops such frames and keeps listening; everything else
    /// means the link itself is unusable.
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            FrameError::TooLong { .. } | FrameError::CrcMismatch { .. } | FrameError::Malformed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
