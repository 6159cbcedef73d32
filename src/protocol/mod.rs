//! Protocol module - wire format and control channel framing.
//!
//! This module implements the binary protocol shared by both links:
//! - 5-byte header encoding/decoding
//! - Control buffer for ack/nak/diagnostic frames on the return channel
//! - Hex dump helper for trace output

mod frame_buffer;
mod hex;
mod wire_format;

pub use frame_buffer::{ControlBuffer, ControlEvent, DEFAULT_MAX_LINE};
pub use hex::HexBytes;
pub use wire_format::{
    decode_header, encode_header, tags, Dialect, Header, Params, Tag, HEADER_SIZE,
};
