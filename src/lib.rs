//! # nrflink
//!
//! Host-side driver for a serial radio bridge that carries bytes, strings
//! and grayscale e-paper images to a remote display.
//!
//! ## Architecture
//!
//! - **Transmit link**: every payload is announced by a 5-byte header, then
//!   streamed in small chunks. The remote acks the header with the payload
//!   length and each chunk with its index; nothing moves until the previous
//!   ack is in.
//! - **Receive link**: the remote streams header + payload with no acks.
//! - **Images**: callers hand over a [`PixelMatrix`]; 3-bit images are
//!   quantized and packed two pixels per byte before transfer.
//!
//! ## Example
//!
//! ```ignore
//! use nrflink::{Link, PixelMatrix, RetryPolicy};
//!
//! #[tokio::main]
//! async fn main() -> nrflink::Result<()> {
//!     let link = Link::builder("/dev/ttyUSB0")
//!         .retry(RetryPolicy::continuous())
//!         .open()
//!         .await?;
//!
//!     let image = PixelMatrix::new(600, 800);
//!     let report = link.send_image_3bit(&image).await?;
//!     println!("{} bytes in {:?}", report.bytes, report.elapsed);
//!
//!     link.close().await
//! }
//! ```

pub mod ack;
pub mod codec;
pub mod config;
pub mod error;
pub mod payload;
pub mod protocol;
pub mod receiver;
pub mod retry;
pub mod transmitter;
pub mod transport;

mod link;

pub use codec::{PackedBitmap, PixelMatrix};
pub use config::{LinkConfig, ReceiverConfig, TransferConfig};
pub use error::{LinkError, Result};
pub use link::{open_receiver, Link, LinkBuilder};
pub use payload::Payload;
pub use protocol::Dialect;
pub use receiver::{spawn_receiver, Received, Receiver};
pub use retry::{RetryMode, RetryPolicy};
pub use transmitter::{TransferReport, Transmitter};
pub use transport::{SerialConfig, SerialLink};
