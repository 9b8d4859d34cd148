//! Byte-oriented duplex link abstraction.
//!
//! This is the lowest layer of ipcbus. A [`Link`] moves raw bytes between the
//! master and the slave processor:
//! - `write_all` pushes a complete buffer onto the wire
//! - `read_byte` polls for a single received byte without blocking
//!
//! Implementations are provided for any `Read + Write` stream, UART device
//! nodes, and Unix domain sockets (used for simulated targets).

pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod serial;
#[cfg(unix)]
pub mod uds;

pub use error::{LinkError, Result};
pub use traits::{Link, StreamLink};

#[cfg(unix)]
pub use serial::SerialLink;
#[cfg(unix)]
pub use uds::{connect_unix, UnixLink, UnixLinkListener};
