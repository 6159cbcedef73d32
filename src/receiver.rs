//! Inbound payload reader.
//!
//! The receive link is one-way: the remote writes a header followed by the
//! announced number of bytes and never waits for an answer. Waiting for a
//! header has no deadline because the link idles between transfers. Once a
//! header has arrived, every chunk of the body must show up within
//! `chunk_timeout`.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::codec::{packed_len, unpack_3bit, PixelMatrix};
use crate::config::ReceiverConfig;
use crate::error::{LinkError, Result};
use crate::protocol::{Header, Tag, HEADER_SIZE};

/// Capacity of the channel fed by [`spawn_receiver`].
pub const RECEIVED_CHANNEL_CAPACITY: usize = 16;

/// A fully received payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// Raw bytes (tags 0x01 and, in the wake dialect, 0x02).
    Bytes(Bytes),
    /// Text, decoded lossily.
    Text(String),
    /// 8-bit grayscale image.
    Image(PixelMatrix),
    /// 3-bit image, expanded back to 8 bits.
    PackedImage(PixelMatrix),
}

/// Reads payloads from the inbound half of a link.
pub struct Receiver<R> {
    reader: R,
    config: ReceiverConfig,
}

impl<R: AsyncRead + Unpin> Receiver<R> {
    /// Create a receiver.
    pub fn new(reader: R, config: ReceiverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { reader, config })
    }

    /// Receiver settings.
    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// Wait for the next payload.
    ///
    /// Returns `Ok(None)` if the link closes cleanly between payloads.
    pub async fn recv(&mut self) -> Result<Option<Received>> {
        let header = match self.read_header().await? {
            Some(header) => header,
            None => return Ok(None),
        };
        tracing::debug!("Incoming {:?} {:?}", header.tag, header.params);

        let received = match header.tag {
            Tag::RawBytes | Tag::RawBytesWithWake => {
                let len = self.announced_len(header.params.count().unwrap_or(0) as usize)?;
                Received::Bytes(self.read_body(len).await?.into())
            }
            Tag::StringData => {
                let len = self.announced_len(header.params.count().unwrap_or(0) as usize)?;
                let body = self.read_body(len).await?;
                Received::Text(String::from_utf8_lossy(&body).into_owned())
            }
            Tag::Image8Bit => {
                let (height, width) = dimensions(&header);
                self.announced_len(height * width)?;
                Received::Image(self.read_rows(height, width).await?)
            }
            Tag::Image3Bit => {
                let (height, width) = dimensions(&header);
                let len = self.announced_len(packed_len(height, width))?;
                let body = self.read_body(len).await?;
                Received::PackedImage(unpack_3bit(&body, width, height)?)
            }
            Tag::Ack | Tag::Nak => {
                return Err(LinkError::MalformedFrame(format!(
                    "{:?} on the receive link",
                    header.tag
                )))
            }
        };

        Ok(Some(received))
    }

    /// Read one header. The first byte may take forever; the rest must
    /// follow within the chunk timeout.
    async fn read_header(&mut self) -> Result<Option<Header>> {
        let mut raw = [0u8; HEADER_SIZE];
        if self.reader.read(&mut raw[..1]).await? == 0 {
            return Ok(None);
        }
        self.read_exact_timed(&mut raw[1..], 1, HEADER_SIZE).await?;
        Header::decode(&raw, self.config.dialect).map(Some)
    }

    fn announced_len(&self, len: usize) -> Result<usize> {
        if len > self.config.max_payload {
            return Err(LinkError::PayloadTooLarge {
                size: len,
                max: self.config.max_payload,
            });
        }
        Ok(len)
    }

    async fn read_body(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut body = vec![0u8; len];
        let chunk_size = self.config.chunk_size;
        let mut progress = Progress::new(len);

        for chunk in body.chunks_mut(chunk_size) {
            self.read_exact_timed(chunk, progress.received, len).await?;
            progress.advance(chunk.len());
        }
        Ok(body)
    }

    /// Image rows arrive back to back; each row is read in chunks.
    async fn read_rows(&mut self, height: usize, width: usize) -> Result<PixelMatrix> {
        let total = height * width;
        let chunk_size = self.config.chunk_size;
        let mut matrix = Vec::with_capacity(total);
        let mut row = vec![0u8; width];
        let mut progress = Progress::new(total);

        for _ in 0..height {
            for chunk in row.chunks_mut(chunk_size) {
                self.read_exact_timed(chunk, progress.received, total).await?;
                progress.advance(chunk.len());
            }
            matrix.extend_from_slice(&row);
        }
        PixelMatrix::from_raw(height, width, matrix)
    }

    async fn read_exact_timed(
        &mut self,
        buf: &mut [u8],
        received: usize,
        expected: usize,
    ) -> Result<()> {
        match tokio::time::timeout(self.config.chunk_timeout, self.reader.read_exact(buf)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(LinkError::ConnectionClosed)
            }
            Ok(Err(e)) => Err(LinkError::Io(e)),
            Err(_) => Err(LinkError::ReadTimeout { received, expected }),
        }
    }

    /// Recover the reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Byte count of the body being read, logged every 10%.
struct Progress {
    total: usize,
    received: usize,
    last_decile: usize,
}

impl Progress {
    fn new(total: usize) -> Self {
        Self {
            total,
            received: 0,
            last_decile: 0,
        }
    }

    fn advance(&mut self, n: usize) {
        self.received += n;
        tracing::trace!("Received {}/{} bytes", self.received, self.total);

        let percent = self.received * 100 / self.total.max(1);
        if percent / 10 > self.last_decile {
            self.last_decile = percent / 10;
            tracing::debug!("{}% ({}/{} bytes)", percent, self.received, self.total);
        }
    }
}

fn dimensions(header: &Header) -> (usize, usize) {
    let (height, width) = header.params.dimensions().unwrap_or((0, 0));
    (height as usize, width as usize)
}

/// Run `receiver` on its own task, forwarding payloads to a channel.
///
/// The task stops when the link closes, when the channel's receiving end
/// is dropped, or on the first error (which it returns).
pub fn spawn_receiver<R>(
    mut receiver: Receiver<R>,
) -> (mpsc::Receiver<Received>, JoinHandle<Result<()>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(RECEIVED_CHANNEL_CAPACITY);

    let handle = tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(Some(payload)) => {
                    if tx.send(payload).await.is_err() {
                        return Ok(());
                    }
                }
                Ok(None) => return Ok(()),
                Err(e) => {
                    tracing::error!("Receive loop error: {}", e);
                    return Err(e);
                }
            }
        }
    });

    (rx, handle)
}
