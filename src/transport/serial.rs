//! Serial port to the USB-attached radio bridge.
//!
//! The bridge runs at 1 Mbaud, 8 data bits, no parity, one stop bit and
//! no flow control. Some boards reset when RTS toggles, so RTS can be
//! pinned after opening.
//!
//! # Example
//!
//! ```ignore
//! use nrflink::transport::{SerialConfig, SerialLink};
//!
//! let link = SerialLink::open(&SerialConfig::new("/dev/ttyUSB0")).await?;
//! let (reader, writer) = link.into_split();
//! ```

use std::pin::Pin;
use std::task::{Context, Poll};

use serde::{Deserialize, Serialize};
use serial2_tokio::SerialPort;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf, ReadHalf, WriteHalf};

use crate::error::{LinkError, Result};

/// Default bridge baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 1_000_000;

/// Default device path.
#[cfg(unix)]
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";
/// Default device path.
#[cfg(windows)]
pub const DEFAULT_PORT: &str = "COM3";

/// Serial port settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path (`/dev/ttyUSB0`, `COM3`, ...).
    pub path: String,
    /// Line speed.
    pub baud_rate: u32,
    /// Drive RTS to this level after opening, if set.
    pub rts: Option<bool>,
}

impl SerialConfig {
    /// Settings for `path` at the default baud rate.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Check the values make sense before touching the device.
    pub fn validate(&self) -> Result<()> {
        if self.path.is_empty() {
            return Err(LinkError::Config("serial path is empty".into()));
        }
        if self.baud_rate == 0 {
            return Err(LinkError::Config("baud rate must be positive".into()));
        }
        Ok(())
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            rts: None,
        }
    }
}

/// An open serial link.
pub struct SerialLink {
    port: SerialPort,
    path: String,
}

impl SerialLink {
    /// Open and configure the port.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn open(config: &SerialConfig) -> Result<Self> {
        config.validate()?;

        let port = SerialPort::open(&config.path, config.baud_rate)?;
        if let Some(level) = config.rts {
            port.set_rts(level)?;
        }

        tracing::debug!(
            "Opened {} at {} baud",
            config.path,
            config.baud_rate
        );

        Ok(Self {
            port,
            path: config.path.clone(),
        })
    }

    /// Device path this link was opened on.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Split into read and write halves.
    pub fn into_split(self) -> (ReadHalf<Self>, WriteHalf<Self>) {
        tokio::io::split(self)
    }

    /// Get a reference to the underlying port.
    pub fn inner(&self) -> &SerialPort {
        &self.port
    }
}

impl AsyncRead for SerialLink {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.port).poll_read(cx, buf)
    }
}

impl AsyncWrite for SerialLink {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.port).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.port).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.port).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 1_000_000);
        assert_eq!(config.path, DEFAULT_PORT);
        assert_eq!(config.rts, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_path_and_zero_baud() {
        assert!(SerialConfig::new("").validate().is_err());

        let mut config = SerialConfig::new("/dev/ttyACM0");
        config.baud_rate = 0;
        assert!(matches!(config.validate(), Err(LinkError::Config(_))));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: SerialConfig = serde_json::from_str(r#"{"path": "COM7"}"#).unwrap();
        assert_eq!(config.path, "COM7");
        assert_eq!(config.baud_rate, DEFAULT_BAUD_RATE);
    }

    #[tokio::test]
    async fn test_open_missing_device_is_io_error() {
        let config = SerialConfig::new("/dev/nrflink-does-not-exist");
        assert!(matches!(
            SerialLink::open(&config).await,
            Err(LinkError::Io(_))
        ));
    }
}
