use std::time::Duration;

use ipcbus_command::{CommandCode, CommandError, ErrorCode};

/// Errors that can occur while talking to a peer.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Link-level error.
    #[error("link error: {0}")]
    Link(#[from] ipcbus_link::LinkError),

    /// Frame-level error that ended the exchange.
    #[error("frame error: {0}")]
    Frame(#[from] ipcbus_frame::FrameError),

    /// The request was rejected locally before anything was sent.
    #[error("invalid command: {0}")]
    Command(#[from] CommandError),

    /// Only ECHO, READ, WRITE and SETCLR can be sent as requests.
    #[error("{0} is not a request")]
    NotARequest(CommandCode),

    /// No matching response arrived in time.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The peer answered with a non-OK error code.
    #[error("{req} rejected by peer: {code}")]
    Rejected { req: CommandCode, code: ErrorCode },

    /// A response matched the request but not the expected shape.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Flash update would run past the flash window.
    #[error("flash range {offset:#x}+{length:#x} exceeds window of {window:#x} bytes")]
    FlashRange {
        offset: u32,
        length: u32,
        window: u32,
    },

    /// Flash update length is not a whole number of sectors.
    #[error("flash length {length:#x} is not a non-zero multiple of the {sector_size:#x}-byte sector")]
    FlashAlignment { length: u32, sector_size: u32 },

    /// Source buffer holds less than the requested length.
    #[error("flash source holds {available} bytes, {needed} needed")]
    FlashSourceTooShort { needed: usize, available: usize },

    /// A flash chunk failed; the chunks before it were written.
    #[error("flash chunk {index} at {addr:#010x} failed: {source}")]
    FlashChunk {
        index: usize,
        addr: u32,
        #[source]
        source: Box<PeerError>,
    },
}

impl PeerError {
    /// Protocol error code behind this failure, if there is one.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            PeerError::Rejected { code, .. } => Some(*code),
            PeerError::Command(err) => Some(err.error_code()),
            PeerError::FlashChunk { source, .. } => source.error_code(),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            PeerError::Timeout(_) => true,
            PeerError::FlashChunk { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;
