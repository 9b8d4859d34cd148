//! HDLC-style framing for the ipcbus serial protocol.
//!
//! Every command travels on the wire as:
//! - a `0x7E` start delimiter
//! - the command bytes followed by a little-endian CRC-16, byte-stuffed so
//!   that neither `0x7E` nor `0x7D` appears inside
//! - a `0x7E` end delimiter
//!
//! Corrupted frames are detected and dropped here; nothing at this layer
//! ever answers the peer.

pub mod codec;
pub mod error;
pub mod framed;
pub mod hex;
#[cfg(feature = "async")]
pub mod tokio_codec;

pub use codec::{
    decode_frame, destuff, encode_frame, stuff, FrameConfig, CRC_SIZE, DEFAULT_CRC, ESC, ESC_XOR,
    FLAG, MAX_CMD_LEN, MAX_FRAME_LEN, MIN_CMD_LEN,
};
pub use error::{FrameError, Result};
pub use framed::FramedLink;
pub use hex::Hex;
#[cfg(feature = "async")]
pub use tokio_codec::HdlcCodec;
