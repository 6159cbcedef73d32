//! Link configuration.
//!
//! Every knob has a default matching the bridge firmware, so a config file
//! only needs the fields it changes:
//!
//! ```
//! use nrflink::config::LinkConfig;
//!
//! let config = LinkConfig::from_json(r#"{
//!     "serial": { "path": "/dev/ttyACM0" },
//!     "transfer": { "chunk_size": 16, "dialect": "wake" },
//!     "retry": { "mode": "continuous" }
//! }"#).unwrap();
//!
//! assert_eq!(config.serial.baud_rate, 1_000_000);
//! assert_eq!(config.transfer.chunk_size, 16);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LinkError, Result};
use crate::protocol::Dialect;
use crate::retry::RetryPolicy;
use crate::transport::SerialConfig;

/// Default bytes per chunk. Matches the radio's 32-byte packet.
pub const DEFAULT_CHUNK_SIZE: usize = 32;

/// Largest chunk the firmware buffers.
pub const MAX_CHUNK_SIZE: usize = 255;

/// Default wait for the handshake ack.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Default wait for each chunk ack.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default wait for each inbound chunk.
pub const DEFAULT_CHUNK_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default cap on an inbound payload (16 MiB).
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Millisecond (de)serialization for `Duration` fields.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

fn check_chunk_size(chunk_size: usize) -> Result<()> {
    if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
        return Err(LinkError::Config(format!(
            "chunk_size must be 1..={}, got {}",
            MAX_CHUNK_SIZE, chunk_size
        )));
    }
    Ok(())
}

fn check_timeout(name: &str, value: Duration) -> Result<()> {
    if value.is_zero() {
        return Err(LinkError::Config(format!("{} must be positive", name)));
    }
    Ok(())
}

/// Sending side settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Bytes per chunk.
    pub chunk_size: usize,
    /// Wait for the handshake ack.
    #[serde(rename = "handshake_timeout_ms", with = "duration_ms")]
    pub handshake_timeout: Duration,
    /// Wait for each chunk ack.
    #[serde(rename = "ack_timeout_ms", with = "duration_ms")]
    pub ack_timeout: Duration,
    /// How tag 0x02 is read on the return channel.
    pub dialect: Dialect,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            dialect: Dialect::default(),
        }
    }
}

impl TransferConfig {
    /// Check the values make sense.
    pub fn validate(&self) -> Result<()> {
        check_chunk_size(self.chunk_size)?;
        check_timeout("handshake_timeout", self.handshake_timeout)?;
        check_timeout("ack_timeout", self.ack_timeout)
    }
}

/// Receiving side settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Bytes read per chunk.
    pub chunk_size: usize,
    /// Wait for each chunk once a header has arrived.
    #[serde(rename = "chunk_timeout_ms", with = "duration_ms")]
    pub chunk_timeout: Duration,
    /// Largest payload accepted.
    pub max_payload: usize,
    /// How tag 0x02 is read.
    pub dialect: Dialect,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_timeout: DEFAULT_CHUNK_TIMEOUT,
            max_payload: DEFAULT_MAX_PAYLOAD,
            dialect: Dialect::default(),
        }
    }
}

impl ReceiverConfig {
    /// Check the values make sense.
    pub fn validate(&self) -> Result<()> {
        check_chunk_size(self.chunk_size)?;
        check_timeout("chunk_timeout", self.chunk_timeout)?;
        if self.max_payload == 0 {
            return Err(LinkError::Config("max_payload must be positive".into()));
        }
        Ok(())
    }
}

/// Everything needed to open a link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Serial port.
    pub serial: SerialConfig,
    /// Sending side.
    pub transfer: TransferConfig,
    /// Receiving side.
    pub receiver: ReceiverConfig,
    /// Retry behavior for sends.
    pub retry: RetryPolicy,
}

impl LinkConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Check every section.
    pub fn validate(&self) -> Result<()> {
        self.serial.validate()?;
        self.transfer.validate()?;
        self.receiver.validate()?;
        self.retry.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryMode;

    #[test]
    fn test_defaults() {
        let config = LinkConfig::default();

        assert_eq!(config.transfer.chunk_size, 32);
        assert_eq!(config.transfer.handshake_timeout, Duration::from_millis(2000));
        assert_eq!(config.transfer.ack_timeout, Duration::from_millis(1000));
        assert_eq!(config.transfer.dialect, Dialect::Image);
        assert_eq!(config.receiver.max_payload, 16 * 1024 * 1024);
        assert_eq!(config.retry.mode, RetryMode::Single);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_json_is_default() {
        assert_eq!(LinkConfig::from_json("{}").unwrap(), LinkConfig::default());
    }

    #[test]
    fn test_json_overrides() {
        let config = LinkConfig::from_json(
            r#"{
                "serial": { "path": "COM4", "baud_rate": 115200, "rts": false },
                "transfer": { "handshake_timeout_ms": 500, "ack_timeout_ms": 250 },
                "receiver": { "chunk_timeout_ms": 100, "max_payload": 4096 },
                "retry": { "mode": "continuous", "backoff_ms": 10, "max_attempts": null }
            }"#,
        )
        .unwrap();

        assert_eq!(config.serial.path, "COM4");
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.serial.rts, Some(false));
        assert_eq!(config.transfer.handshake_timeout, Duration::from_millis(500));
        assert_eq!(config.transfer.ack_timeout, Duration::from_millis(250));
        assert_eq!(config.receiver.chunk_timeout, Duration::from_millis(100));
        assert_eq!(config.receiver.max_payload, 4096);
        assert_eq!(config.retry.backoff, Duration::from_millis(10));
        assert_eq!(config.retry.max_attempts, None);
    }

    #[test]
    fn test_chunk_size_bounds() {
        for bad in [0, 256] {
            let json = format!(r#"{{"transfer": {{"chunk_size": {}}}}}"#, bad);
            assert!(matches!(
                LinkConfig::from_json(&json),
                Err(LinkError::Config(_))
            ));
        }
        assert!(LinkConfig::from_json(r#"{"transfer": {"chunk_size": 255}}"#).is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = TransferConfig {
            ack_timeout: Duration::ZERO,
            ..TransferConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_json_is_json_error() {
        assert!(matches!(
            LinkConfig::from_json("{ not json"),
            Err(LinkError::Json(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            LinkConfig::load("/nonexistent/nrflink.json"),
            Err(LinkError::Io(_))
        ));
    }
}
