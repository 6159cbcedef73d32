//! Link builder and runtime.
//!
//! The [`LinkBuilder`] provides a fluent API for configuring the serial port,
//! transfer timing and retry behavior. The [`Link`] manages the lifecycle:
//! 1. Open the serial port
//! 2. Split it into read and write halves
//! 3. Spawn the ack listener on the read half
//! 4. Send payloads on the write half, one at a time
//!
//! # Example
//!
//! ```ignore
//! use nrflink::{Link, RetryPolicy};
//!
//! #[tokio::main]
//! async fn main() -> nrflink::Result<()> {
//!     let link = Link::builder("/dev/ttyUSB0")
//!         .chunk_size(32)
//!         .retry(RetryPolicy::continuous())
//!         .open()
//!         .await?;
//!
//!     link.send_text("hello").await?;
//!     link.send_test_bytes(1000).await?;
//!     link.close().await
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, WriteHalf};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::ack::{AckListener, AckRouter};
use crate::codec::PixelMatrix;
use crate::config::{LinkConfig, ReceiverConfig, TransferConfig};
use crate::error::Result;
use crate::payload::Payload;
use crate::protocol::Dialect;
use crate::receiver::Receiver;
use crate::retry::RetryPolicy;
use crate::transmitter::{TransferReport, Transmitter};
use crate::transport::{SerialConfig, SerialLink};

/// Builder for configuring and opening a [`Link`].
pub struct LinkBuilder {
    serial: SerialConfig,
    transfer: TransferConfig,
    retry: RetryPolicy,
}

impl LinkBuilder {
    /// Start from defaults on the given device.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            serial: SerialConfig::new(path),
            transfer: TransferConfig::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Start from a loaded config.
    pub fn from_config(config: LinkConfig) -> Self {
        Self {
            serial: config.serial,
            transfer: config.transfer,
            retry: config.retry,
        }
    }

    /// Set the baud rate.
    ///
    /// Default: 1 000 000
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.serial.baud_rate = baud_rate;
        self
    }

    /// Drive RTS to `level` after opening.
    pub fn rts(mut self, level: bool) -> Self {
        self.serial.rts = Some(level);
        self
    }

    /// Set the chunk size (1..=255).
    ///
    /// Default: 32
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.transfer.chunk_size = chunk_size;
        self
    }

    /// Set the handshake ack timeout.
    ///
    /// Default: 2 seconds
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.transfer.handshake_timeout = timeout;
        self
    }

    /// Set the per-chunk ack timeout.
    ///
    /// Default: 1 second
    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.transfer.ack_timeout = timeout;
        self
    }

    /// Set how tag 0x02 is read on the return channel.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.transfer.dialect = dialect;
        self
    }

    /// Set the retry policy used by every send.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Open the port and start the ack listener.
    pub async fn open(self) -> Result<Link> {
        self.transfer.validate()?;
        self.retry.validate()?;

        let port = SerialLink::open(&self.serial).await?;
        let (reader, writer) = port.into_split();
        Link::start(reader, writer, self.transfer, self.retry)
    }
}

/// An open transmit link.
///
/// Sends are serialized: concurrent callers queue on an internal lock, so
/// only one transfer is ever on the wire.
pub struct Link<W = WriteHalf<SerialLink>> {
    /// Transfer engine on the write half.
    transmitter: Arc<Mutex<Transmitter<W>>>,
    /// Retry policy for [`send`](Self::send).
    retry: RetryPolicy,
    /// Return-channel router, kept for diagnostics subscription.
    router: AckRouter,
    /// Whether [`diagnostics`](Self::diagnostics) has been called.
    diagnostics_taken: bool,
    /// Ack listener task handle.
    listener: JoinHandle<Result<()>>,
}

impl Link {
    /// Create a new link builder.
    pub fn builder(path: impl Into<String>) -> LinkBuilder {
        LinkBuilder::new(path)
    }
}

impl<W: AsyncWrite + Unpin + Send + 'static> Link<W> {
    /// Run a link over any read/write pair.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<R>(
        reader: R,
        writer: W,
        transfer: TransferConfig,
        retry: RetryPolicy,
    ) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        retry.validate()?;

        let router = AckRouter::new();
        let listener = AckListener::new(router.clone(), transfer.dialect).spawn(reader);
        let transmitter = Transmitter::new(writer, router.clone(), transfer)?;

        Ok(Self {
            transmitter: Arc::new(Mutex::new(transmitter)),
            retry,
            router,
            diagnostics_taken: false,
            listener,
        })
    }

    /// Send a payload under the link's retry policy.
    pub async fn send(&self, payload: Payload) -> Result<TransferReport> {
        self.send_with(payload, &self.retry).await
    }

    /// Send a payload under an explicit retry policy.
    pub async fn send_with(&self, payload: Payload, policy: &RetryPolicy) -> Result<TransferReport> {
        let payload = Arc::new(payload);
        policy
            .run(|attempt| {
                let transmitter = self.transmitter.clone();
                let payload = payload.clone();
                async move {
                    if attempt > 1 {
                        tracing::debug!("Attempt {}", attempt);
                    }
                    transmitter.lock().await.send(&payload).await
                }
            })
            .await
    }

    /// Send raw bytes.
    pub async fn send_bytes(&self, data: impl Into<Bytes>) -> Result<TransferReport> {
        self.send(Payload::bytes(data)?).await
    }

    /// Send raw bytes that wake the far receiver first.
    pub async fn send_bytes_with_wake(&self, data: impl Into<Bytes>) -> Result<TransferReport> {
        self.send(Payload::bytes_with_wake(data)?).await
    }

    /// Send `count` synthetic bytes `0, 1, 2, ...`.
    pub async fn send_test_bytes(&self, count: usize) -> Result<TransferReport> {
        self.send(Payload::test_pattern(count)?).await
    }

    /// Send a string.
    pub async fn send_text(&self, text: &str) -> Result<TransferReport> {
        self.send(Payload::text(text)?).await
    }

    /// Send a full 8-bit image.
    pub async fn send_image(&self, matrix: &PixelMatrix) -> Result<TransferReport> {
        self.send(Payload::image_8bit(matrix)?).await
    }

    /// Quantize, pack and send a 3-bit image.
    pub async fn send_image_3bit(&self, matrix: &PixelMatrix) -> Result<TransferReport> {
        self.send(Payload::image_3bit(matrix)?).await
    }

    /// Subscribe to remote diagnostic lines from now on.
    ///
    /// Returns `None` after the first call. Lines that arrive before the
    /// subscription are not queued; all lines are logged under the
    /// `nrflink::remote` target either way.
    pub fn diagnostics(&mut self) -> Option<mpsc::UnboundedReceiver<String>> {
        if self.diagnostics_taken {
            return None;
        }
        self.diagnostics_taken = true;
        Some(self.router.subscribe_diagnostics())
    }

    /// Retry policy used by [`send`](Self::send).
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Whether the return channel is still being read.
    pub fn is_listening(&self) -> bool {
        !self.listener.is_finished()
    }

    /// Stop the listener and shut down the write half.
    pub async fn close(self) -> Result<()> {
        self.listener.abort();
        self.transmitter.lock().await.shutdown().await
    }
}

impl<W> Drop for Link<W> {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// Open a receive-only link.
pub async fn open_receiver(
    serial: &SerialConfig,
    config: ReceiverConfig,
) -> Result<Receiver<SerialLink>> {
    config.validate()?;
    let port = SerialLink::open(serial).await?;
    Receiver::new(port, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryMode;

    #[test]
    fn test_builder_defaults() {
        let builder = Link::builder("/dev/ttyUSB1");

        assert_eq!(builder.serial.path, "/dev/ttyUSB1");
        assert_eq!(builder.serial.baud_rate, 1_000_000);
        assert_eq!(builder.transfer, TransferConfig::default());
        assert_eq!(builder.retry.mode, RetryMode::Single);
    }

    #[test]
    fn test_builder_configuration() {
        let builder = Link::builder("COM5")
            .baud_rate(115_200)
            .rts(false)
            .chunk_size(16)
            .handshake_timeout(Duration::from_millis(500))
            .ack_timeout(Duration::from_millis(250))
            .dialect(Dialect::Wake)
            .retry(RetryPolicy::continuous().with_max_attempts(None));

        assert_eq!(builder.serial.baud_rate, 115_200);
        assert_eq!(builder.serial.rts, Some(false));
        assert_eq!(builder.transfer.chunk_size, 16);
        assert_eq!(builder.transfer.handshake_timeout, Duration::from_millis(500));
        assert_eq!(builder.transfer.ack_timeout, Duration::from_millis(250));
        assert_eq!(builder.transfer.dialect, Dialect::Wake);
        assert_eq!(builder.retry.mode, RetryMode::Continuous);
        assert_eq!(builder.retry.max_attempts, None);
    }

    #[test]
    fn test_builder_from_config() {
        let config = LinkConfig::from_json(
            r#"{"serial": {"path": "/dev/ttyACM0"}, "retry": {"mode": "continuous"}}"#,
        )
        .unwrap();
        let builder = LinkBuilder::from_config(config);

        assert_eq!(builder.serial.path, "/dev/ttyACM0");
        assert_eq!(builder.retry.mode, RetryMode::Continuous);
    }

    #[tokio::test]
    async fn test_open_rejects_bad_chunk_size_before_touching_port() {
        let result = Link::builder("/dev/nrflink-does-not-exist")
            .chunk_size(300)
            .open()
            .await;
        assert!(matches!(result, Err(crate::LinkError::Config(_))));
    }

    #[tokio::test]
    async fn test_diagnostics_taken_once() {
        let (local, _remote) = tokio::io::duplex(64);
        let (reader, writer) = tokio::io::split(local);
        let mut link =
            Link::start(reader, writer, TransferConfig::default(), RetryPolicy::single()).unwrap();

        assert!(link.diagnostics().is_some());
        assert!(link.diagnostics().is_none());
        assert!(link.is_listening());
    }
}
