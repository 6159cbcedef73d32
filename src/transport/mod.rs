//! Transport module - the serial link to the radio bridge.
//!
//! Everything above this layer only needs `AsyncRead + AsyncWrite`, so
//! tests substitute `tokio::io::duplex` for a real port.

mod serial;

pub use serial::{SerialConfig, SerialLink, DEFAULT_BAUD_RATE, DEFAULT_PORT};
