//! Master and slave halves of the ipcbus register protocol.
//!
//! The master drives a [`Session`], which keeps exactly one request in
//! flight and gives up after a configurable timeout. [`RegisterClient`]
//! layers the register operations and the chunked flash update on top.
//!
//! The slave side is a [`Responder`] that decodes requests and applies them
//! to a [`RegisterTarget`].

pub mod clock;
pub mod config;
pub mod error;
pub mod flash;
pub mod ops;
pub mod responder;
pub mod session;
pub mod target;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{FlashConfig, SessionConfig};
pub use error::{PeerError, Result};
pub use flash::{FlashProgress, FlashReport, FLASH_CHUNK_BYTES};
pub use ops::RegisterClient;
pub use responder::Responder;
pub use session::{Session, SessionState};
pub use target::{MemoryTarget, RegisterTarget};
