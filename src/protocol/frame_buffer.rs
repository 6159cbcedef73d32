//! Buffer for the return (control) channel.
//!
//! Uses `bytes::BytesMut` to accumulate partial reads from the link.
//! Implements a state machine for the two shapes the remote sends back:
//! - `WaitingForHeader`: need 5 bytes for the next header
//! - `WaitingForLine`: a string header was seen, need bytes up to `\n`
//! - `DiscardingLine`: an overlong line was flushed, drop bytes up to `\n`
//!
//! # Example
//!
//! ```
//! use nrflink::protocol::{ControlBuffer, ControlEvent, Dialect, Header};
//!
//! let mut buffer = ControlBuffer::new(Dialect::Wake);
//!
//! let mut bytes = Header::ack(0).encode().to_vec();
//! bytes.extend_from_slice(&Header::string_data(0).encode());
//! bytes.extend_from_slice(b"no ack\r\n");
//!
//! let events = buffer.push(&bytes);
//! assert_eq!(events[0], ControlEvent::Ack(0));
//! assert_eq!(events[1], ControlEvent::Diagnostic("no ack".to_string()));
//! ```

use bytes::BytesMut;

use super::wire_format::{Dialect, Header, Tag, HEADER_SIZE};
use crate::error::LinkError;

/// Default cap on a diagnostic line before it is flushed without a newline.
pub const DEFAULT_MAX_LINE: usize = 1024;

/// State machine for control channel parsing.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for a complete 5-byte header.
    WaitingForHeader,
    /// String header parsed, waiting for the terminating newline.
    WaitingForLine,
    /// Overlong line already reported, skipping the rest of it.
    DiscardingLine,
}

/// Something the remote said on the return channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    /// Positive acknowledgement with its value.
    Ack(u32),
    /// Negative acknowledgement with the chunk index it refers to.
    Nak(u32),
    /// Human-readable line from the remote.
    Diagnostic(String),
    /// A header that means nothing on this channel; its tag byte.
    Ignored(u8),
}

/// Accumulates return-channel bytes and extracts complete events.
pub struct ControlBuffer {
    /// Accumulated bytes from link reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// How tag 0x02 is read.
    dialect: Dialect,
    /// Longest diagnostic line kept before a forced flush.
    max_line: usize,
}

impl ControlBuffer {
    /// Create a new control buffer.
    pub fn new(dialect: Dialect) -> Self {
        Self::with_max_line(dialect, DEFAULT_MAX_LINE)
    }

    /// Create a control buffer with a custom diagnostic line cap.
    pub fn with_max_line(dialect: Dialect, max_line: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(256),
            state: State::WaitingForHeader,
            dialect,
            max_line: max_line.max(1),
        }
    }

    /// Push data into the buffer and extract all complete events.
    ///
    /// Never fails: headers with unknown tags are reported as
    /// [`ControlEvent::Ignored`] and skipped, because the remote may
    /// interleave informational frames with acks.
    pub fn push(&mut self, data: &[u8]) -> Vec<ControlEvent> {
        self.buffer.extend_from_slice(data);

        let mut events = Vec::new();
        while let Some(event) = self.try_extract_one() {
            events.push(event);
        }
        events
    }

    fn try_extract_one(&mut self) -> Option<ControlEvent> {
        match self.state {
            State::WaitingForHeader => {
                if self.buffer.len() < HEADER_SIZE {
                    return None;
                }

                let raw = self.buffer.split_to(HEADER_SIZE);
                let header = match Header::decode(&raw, self.dialect) {
                    Ok(header) => header,
                    Err(LinkError::UnknownTag(tag)) => return Some(ControlEvent::Ignored(tag)),
                    Err(_) => return Some(ControlEvent::Ignored(raw[0])),
                };

                match header.tag {
                    Tag::Ack => Some(ControlEvent::Ack(header.params.count().unwrap_or(0))),
                    Tag::Nak => Some(ControlEvent::Nak(header.params.count().unwrap_or(0))),
                    Tag::StringData => {
                        self.state = State::WaitingForLine;
                        self.try_extract_one()
                    }
                    other => Some(ControlEvent::Ignored(other.to_byte())),
                }
            }

            State::WaitingForLine => {
                let line = match self.buffer.iter().position(|&b| b == b'\n') {
                    Some(pos) => {
                        let line = self.buffer.split_to(pos + 1);
                        self.state = State::WaitingForHeader;
                        line[..pos].to_vec()
                    }
                    None if self.buffer.len() >= self.max_line => {
                        self.state = State::DiscardingLine;
                        self.buffer.split_to(self.max_line).to_vec()
                    }
                    None => return None,
                };

                let text = String::from_utf8_lossy(&line);
                Some(ControlEvent::Diagnostic(
                    text.trim_end_matches('\r').to_string(),
                ))
            }

            State::DiscardingLine => match self.buffer.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    let _ = self.buffer.split_to(pos + 1);
                    self.state = State::WaitingForHeader;
                    self.try_extract_one()
                }
                None => {
                    self.buffer.clear();
                    None
                }
            },
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForLine => "WaitingForLine",
            State::DiscardingLine => "DiscardingLine",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagnostic_bytes(text: &str) -> Vec<u8> {
        let mut bytes = Header::string_data(0).encode().to_vec();
        bytes.extend_from_slice(text.as_bytes());
        bytes.push(b'\n');
        bytes
    }

    #[test]
    fn test_single_ack() {
        let mut buffer = ControlBuffer::new(Dialect::Image);
        let events = buffer.push(&Header::ack(65).encode());

        assert_eq!(events, vec![ControlEvent::Ack(65)]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_nak_carries_chunk_index() {
        let mut buffer = ControlBuffer::new(Dialect::Image);
        let events = buffer.push(&Header::nak(4).encode());
        assert_eq!(events, vec![ControlEvent::Nak(4)]);
    }

    #[test]
    fn test_multiple_events_in_one_push() {
        let mut buffer = ControlBuffer::new(Dialect::Wake);

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&Header::ack(0).encode());
        bytes.extend_from_slice(&diagnostic_bytes("failed to send payload"));
        bytes.extend_from_slice(&Header::ack(1).encode());
        bytes.extend_from_slice(&Header::nak(2).encode());

        let events = buffer.push(&bytes);
        assert_eq!(
            events,
            vec![
                ControlEvent::Ack(0),
                ControlEvent::Diagnostic("failed to send payload".to_string()),
                ControlEvent::Ack(1),
                ControlEvent::Nak(2),
            ]
        );
    }

    #[test]
    fn test_fragmented_header() {
        let mut buffer = ControlBuffer::new(Dialect::Image);
        let bytes = Header::ack(3).encode();

        assert!(buffer.push(&bytes[..2]).is_empty());
        assert_eq!(buffer.state_name(), "WaitingForHeader");
        assert_eq!(buffer.push(&bytes[2..]), vec![ControlEvent::Ack(3)]);
    }

    #[test]
    fn test_fragmented_line() {
        let mut buffer = ControlBuffer::new(Dialect::Image);
        let bytes = diagnostic_bytes("Transmission canceled");

        assert!(buffer.push(&bytes[..HEADER_SIZE + 4]).is_empty());
        assert_eq!(buffer.state_name(), "WaitingForLine");

        let events = buffer.push(&bytes[HEADER_SIZE + 4..]);
        assert_eq!(
            events,
            vec![ControlEvent::Diagnostic("Transmission canceled".to_string())]
        );
        assert_eq!(buffer.state_name(), "WaitingForHeader");
    }

    #[test]
    fn test_crlf_is_stripped() {
        let mut buffer = ControlBuffer::new(Dialect::Image);
        let events = buffer.push(&diagnostic_bytes("no flag ack\r"));
        assert_eq!(
            events,
            vec![ControlEvent::Diagnostic("no flag ack".to_string())]
        );
    }

    #[test]
    fn test_unknown_tag_is_ignored_and_skipped() {
        let mut buffer = ControlBuffer::new(Dialect::Image);

        let mut bytes = vec![0x42, 1, 2, 3, 4];
        bytes.extend_from_slice(&Header::ack(9).encode());

        let events = buffer.push(&bytes);
        assert_eq!(
            events,
            vec![ControlEvent::Ignored(0x42), ControlEvent::Ack(9)]
        );
    }

    #[test]
    fn test_data_tags_are_ignored() {
        let mut buffer = ControlBuffer::new(Dialect::Image);
        let events = buffer.push(&Header::image_3bit(2, 2).encode());
        assert_eq!(events, vec![ControlEvent::Ignored(0x04)]);
    }

    #[test]
    fn test_overlong_line_tail_is_skipped() {
        let mut buffer = ControlBuffer::with_max_line(Dialect::Image, 8);

        let mut bytes = Header::string_data(0).encode().to_vec();
        bytes.extend_from_slice(b"01234567");
        let events = buffer.push(&bytes);
        assert_eq!(events, vec![ControlEvent::Diagnostic("01234567".to_string())]);
        assert_eq!(buffer.state_name(), "DiscardingLine");

        let mut rest = b"89\r\n".to_vec();
        rest.extend_from_slice(&Header::ack(3).encode());
        assert_eq!(buffer.push(&rest), vec![ControlEvent::Ack(3)]);
        assert!(buffer.is_empty());
        assert_eq!(buffer.state_name(), "WaitingForHeader");
    }

    #[test]
    fn test_overlong_line_spanning_many_pushes() {
        let mut buffer = ControlBuffer::with_max_line(Dialect::Image, 4);
        buffer.push(&Header::string_data(0).encode());

        assert_eq!(
            buffer.push(b"abcdefgh"),
            vec![ControlEvent::Diagnostic("abcd".to_string())]
        );
        assert!(buffer.push(b"ijklmnop").is_empty());
        assert!(buffer.is_empty());

        let mut tail = b"q\n".to_vec();
        tail.extend_from_slice(&Header::nak(2).encode());
        tail.extend_from_slice(&Header::ack(0).encode());
        assert_eq!(
            buffer.push(&tail),
            vec![ControlEvent::Nak(2), ControlEvent::Ack(0)]
        );
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = ControlBuffer::new(Dialect::Image);
        let mut bytes = Header::ack(1).encode().to_vec();
        bytes.extend_from_slice(&diagnostic_bytes("hi"));

        let mut all_events = Vec::new();
        for byte in &bytes {
            all_events.extend(buffer.push(&[*byte]));
        }

        assert_eq!(
            all_events,
            vec![
                ControlEvent::Ack(1),
                ControlEvent::Diagnostic("hi".to_string())
            ]
        );
    }

    #[test]
    fn test_clear_resets_state() {
        let mut buffer = ControlBuffer::new(Dialect::Image);
        buffer.push(&Header::string_data(0).encode());
        buffer.push(b"partial");
        assert_eq!(buffer.state_name(), "WaitingForLine");

        buffer.clear();
        assert_eq!(buffer.state_name(), "WaitingForHeader");
        assert!(buffer.is_empty());
    }
}
