//! Chunked, acknowledged transfer engine.
//!
//! One call to [`Transmitter::send`] is one attempt:
//!
//! 1. Open a fresh ack session (stale acks from a previous attempt are lost).
//! 2. Write the 5-byte handshake header and wait for an ack equal to the
//!    body length.
//! 3. Write the body in chunks of at most `chunk_size` bytes. After chunk
//!    `k` wait for ack `k` before writing chunk `k + 1`.
//!
//! Only one chunk is ever in flight. Retries are layered on top by
//! [`RetryPolicy`](crate::retry::RetryPolicy).

use std::ops::Range;
use std::time::{Duration, Instant};

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::ack::{AckRouter, AckSession, AckSignal};
use crate::config::TransferConfig;
use crate::error::{LinkError, Result};
use crate::payload::Payload;
use crate::protocol::HexBytes;

/// Outcome of a successful transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReport {
    /// Body bytes delivered.
    pub bytes: usize,
    /// Chunks delivered.
    pub chunks: u32,
    /// Wall time from handshake to last ack.
    pub elapsed: Duration,
}

impl TransferReport {
    /// Average body throughput in bytes per second.
    pub fn bytes_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.bytes as f64 / secs
    }
}

/// Progress through one payload body.
struct ChunkCursor {
    total: usize,
    sent: usize,
    next_ack: u32,
    last_percent: usize,
}

impl ChunkCursor {
    fn new(total: usize) -> Self {
        Self {
            total,
            sent: 0,
            next_ack: 0,
            last_percent: 0,
        }
    }

    /// Byte range of the next chunk, or `None` when the body is done.
    fn next_chunk(&self, chunk_size: usize) -> Option<Range<usize>> {
        if self.sent >= self.total {
            return None;
        }
        let end = (self.sent + chunk_size).min(self.total);
        Some(self.sent..end)
    }

    fn advance(&mut self, len: usize) {
        self.sent += len;
        self.next_ack += 1;
    }

    /// Current percentage, if the last advance crossed a new 10% milestone.
    fn percent_step(&mut self) -> Option<usize> {
        let percent = self.sent * 100 / self.total.max(1);
        if percent / 10 > self.last_percent / 10 {
            self.last_percent = percent;
            Some(percent)
        } else {
            None
        }
    }
}

/// Sends payloads over the outbound half of a link.
pub struct Transmitter<W> {
    writer: W,
    router: AckRouter,
    config: TransferConfig,
}

impl<W: AsyncWrite + Unpin> Transmitter<W> {
    /// Create a transmitter. `router` must be fed by a listener on the
    /// return channel.
    pub fn new(writer: W, router: AckRouter, config: TransferConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            writer,
            router,
            config,
        })
    }

    /// Transfer settings.
    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Make one attempt at delivering `payload`.
    pub async fn send(&mut self, payload: &Payload) -> Result<TransferReport> {
        let started = Instant::now();
        let mut acks = self.router.open_session();

        self.handshake(payload, &mut acks).await?;

        let chunk_size = self.config.chunk_size;
        let body = payload.body();
        let mut cursor = ChunkCursor::new(body.len());

        while let Some(range) = cursor.next_chunk(chunk_size) {
            let chunk = &body[range];
            self.write_frame(chunk).await?;
            tracing::trace!(
                "Chunk {} ({} bytes): {}",
                cursor.next_ack,
                chunk.len(),
                HexBytes(chunk)
            );

            match acks.recv_timeout(self.config.ack_timeout).await? {
                None => {
                    return Err(LinkError::AckTimeout {
                        chunk: cursor.next_ack,
                    })
                }
                Some(AckSignal::Nak(chunk)) => {
                    return Err(LinkError::PeerNak { chunk: Some(chunk) })
                }
                Some(AckSignal::Ack(value)) if value != cursor.next_ack => {
                    return Err(LinkError::ProtocolMismatch {
                        expected: cursor.next_ack,
                        received: value,
                    })
                }
                Some(AckSignal::Ack(_)) => cursor.advance(chunk.len()),
            }

            if let Some(percent) = cursor.percent_step() {
                tracing::debug!("{}% ({}/{} bytes)", percent, cursor.sent, cursor.total);
            }
        }

        let report = TransferReport {
            bytes: body.len(),
            chunks: cursor.next_ack,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            "Sent {} bytes in {} chunks ({:?})",
            report.bytes,
            report.chunks,
            report.elapsed
        );
        Ok(report)
    }

    async fn handshake(&mut self, payload: &Payload, acks: &mut AckSession) -> Result<()> {
        let header = payload.header().encode();
        self.write_frame(&header).await?;

        let expected = payload.expected_handshake_ack();
        tracing::debug!(
            "Handshake {:?}, waiting for ack {}",
            payload.tag(),
            expected
        );

        match acks.recv_timeout(self.config.handshake_timeout).await? {
            None => Err(LinkError::HandshakeTimeout),
            Some(AckSignal::Nak(_)) => Err(LinkError::PeerNak { chunk: None }),
            Some(AckSignal::Ack(value)) if value != expected => Err(LinkError::ProtocolMismatch {
                expected,
                received: value,
            }),
            Some(AckSignal::Ack(_)) => Ok(()),
        }
    }

    async fn write_frame(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Flush and shut down the outbound half.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}
