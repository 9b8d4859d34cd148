use std::fmt;
use std::io;

use ipcbus_frame::FrameError;
use ipcbus_link::LinkError;
use ipcbus_peer::PeerError;

// Exit codes. USAGE and TIMEOUT match sysexits(3) and timeout(1).
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
/// The slave answered with a non-OK error code.
pub const PROTOCOL_REJECTED: i32 = 40;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn link_error(context: &str, err: LinkError) -> CliError {
    match err {
        LinkError::Open { ref source, .. }
        | LinkError::Bind { ref source, .. }
        | LinkError::Connect { ref source, .. } => {
            // Keep the path in the message; io::Error alone does not carry it.
            let kind = source.kind();
            io_error(context, io::Error::new(kind, err.to_string()))
        }
        LinkError::Accept(source) | LinkError::Io(source) => io_error(context, source),
        LinkError::PathTooLong { .. } => CliError::usage(format!("{context}: {err}")),
        LinkError::Closed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Link(err) => link_error(context, err),
        FrameError::Io(source) => io_error(context, source),
        FrameError::CommandLength { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn peer_error(context: &str, err: PeerError) -> CliError {
    match err {
        PeerError::Link(err) => link_error(context, err),
        PeerError::Frame(err) => frame_error(context, err),
        PeerError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        PeerError::Rejected { .. } => {
            CliError::new(PROTOCOL_REJECTED, format!("{context}: {err}"))
        }
        PeerError::Command(_)
        | PeerError::FlashRange { .. }
        | PeerError::FlashAlignment { .. }
        | PeerError::FlashSourceTooShort { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        PeerError::UnexpectedResponse(_) => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        PeerError::FlashChunk {
            index,
            addr,
            source,
        } => peer_error(
            &format!("{context}: chunk {index} at {addr:#010x}"),
            *source,
        ),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}
