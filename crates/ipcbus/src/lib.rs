//! Framed register access between a master CPU and a companion processor.
//!
//! ipcbus carries a small, fixed command set (echo, register read, write and
//! set/clear) over a lossy serial link, one request at a time, and builds a
//! chunked flash update out of ordinary writes.
//!
//! # Crate Structure
//!
//! - [`link`]: Byte-oriented duplex link (UART, unix socket, any stream)
//! - [`frame`]: HDLC-style delimiting, byte stuffing and CRC-16
//! - [`command`]: Command vocabulary and its wire layout
//! - [`peer`]: Request/response session, register operations and the
//!   slave-side responder (behind `peer` feature)

/// Re-export link types.
pub mod link {
    pub use ipcbus_link::*;
}

/// Re-export frame types.
pub mod frame {
    pub use ipcbus_frame::*;
}

/// Re-export command types.
pub mod command {
    pub use ipcbus_command::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use ipcbus_peer::*;
}
