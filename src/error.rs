//! Error types for nrflink.

use thiserror::Error;

/// Main error type for all link operations.
#[derive(Debug, Error)]
pub enum LinkError {
    /// I/O error on the serial link.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading a config file.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// No acknowledgement arrived for the handshake frame in time.
    #[error("Handshake timed out")]
    HandshakeTimeout,

    /// No acknowledgement arrived for a chunk in time.
    #[error("Ack for chunk {chunk} timed out")]
    AckTimeout {
        /// Index of the chunk that was never acknowledged.
        chunk: u32,
    },

    /// Payload bytes stopped arriving before the announced length was read.
    #[error("Read timed out after {received} of {expected} bytes")]
    ReadTimeout {
        /// Bytes received before the deadline.
        received: usize,
        /// Bytes announced by the header.
        expected: usize,
    },

    /// The remote rejected the transfer.
    #[error("Remote sent NAK (chunk {chunk:?})")]
    PeerNak {
        /// Chunk index reported by the remote, if any chunk was in flight.
        chunk: Option<u32>,
    },

    /// An ack value arrived but was not the expected one.
    #[error("Incorrect ack | Expected: {expected}, Received: {received}")]
    ProtocolMismatch {
        /// Ack value the transmitter was waiting for.
        expected: u32,
        /// Ack value that actually arrived.
        received: u32,
    },

    /// Header could not be parsed or was not valid here.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Header tag byte is outside the tag space.
    #[error("Unknown frame tag 0x{0:02X}")]
    UnknownTag(u8),

    /// Announced payload exceeds the configured maximum.
    #[error("Payload size {size} exceeds maximum {max}")]
    PayloadTooLarge {
        /// Announced payload size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Pixel data does not fit the declared dimensions.
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// The link closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Continuous mode gave up.
    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made, including the last failing one.
        attempts: u32,
        /// Error reported by the last attempt.
        last: Box<LinkError>,
    },
}

impl LinkError {
    /// Whether a fresh attempt of the same transfer may succeed.
    ///
    /// Timeouts and NAKs are transient radio conditions. Everything else
    /// means the link or the stream is broken and a retry would only
    /// desynchronize it further.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LinkError::HandshakeTimeout | LinkError::AckTimeout { .. } | LinkError::PeerNak { .. }
        )
    }

    /// Whether the bytes on the wire could not be read as a valid frame.
    ///
    /// An unrecognized tag is the most common case and gets its own variant.
    pub fn is_malformed(&self) -> bool {
        matches!(self, LinkError::MalformedFrame(_) | LinkError::UnknownTag(_))
    }
}

/// Result type alias using LinkError.
pub type Result<T> = std::result::Result<T, LinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(LinkError::HandshakeTimeout.is_retryable());
        assert!(LinkError::AckTimeout { chunk: 3 }.is_retryable());
        assert!(LinkError::PeerNak { chunk: None }.is_retryable());

        assert!(!LinkError::ProtocolMismatch {
            expected: 1,
            received: 2
        }
        .is_retryable());
        assert!(!LinkError::MalformedFrame("bad".into()).is_retryable());
        assert!(!LinkError::UnknownTag(0x42).is_retryable());
        assert!(!LinkError::ConnectionClosed.is_retryable());
        assert!(!LinkError::Io(std::io::Error::other("boom")).is_retryable());
    }

    #[test]
    fn test_malformed_family() {
        assert!(LinkError::UnknownTag(0x42).is_malformed());
        assert!(LinkError::MalformedFrame("short".into()).is_malformed());
        assert!(!LinkError::HandshakeTimeout.is_malformed());
    }

    #[test]
    fn test_mismatch_message() {
        let err = LinkError::ProtocolMismatch {
            expected: 2,
            received: 7,
        };
        assert_eq!(err.to_string(), "Incorrect ack | Expected: 2, Received: 7");
    }

    #[test]
    fn test_unknown_tag_message() {
        assert_eq!(
            LinkError::UnknownTag(0x7E).to_string(),
            "Unknown frame tag 0x7E"
        );
    }
}
