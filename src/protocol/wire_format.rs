//! Wire format encoding and decoding.
//!
//! Every frame starts with a fixed 5-byte header:
//! ```text
//! ┌───────┬─────────────────────────────────────────┐
//! │ Tag   │ Params                                  │
//! │ 1 byte│ 4 bytes                                 │
//! │       │ uint32 BE count                         │
//! │       │   or uint16 BE height + uint16 BE width │
//! └───────┴─────────────────────────────────────────┘
//! ```
//!
//! The tag selects how the params are read. Data payloads (if any) follow the
//! header as raw bytes; control frames (ack/nak) are header-only.

use serde::{Deserialize, Serialize};

use crate::error::{LinkError, Result};

/// Header size in bytes (fixed, exactly 5).
pub const HEADER_SIZE: usize = 5;

/// Raw tag byte values.
pub mod tags {
    /// Raw byte payload.
    pub const RAW_BYTES: u8 = 0x01;
    /// Image-8-bit payload, or raw-with-wake on the radio bridge.
    pub const IMAGE_OR_WAKE: u8 = 0x02;
    /// UTF-8 string payload.
    pub const STRING_DATA: u8 = 0x03;
    /// Packed 3-bit image payload.
    pub const IMAGE_3BIT: u8 = 0x04;
    /// Acknowledgement.
    pub const ACK: u8 = 0xFF;
    /// Negative acknowledgement.
    pub const NAK: u8 = 0x00;
}

/// Which meaning tag `0x02` carries on a given link.
///
/// The host receive link uses it for 8-bit images; the radio transmitter
/// bridge uses it for raw bytes that must wake the far end first. Encoding
/// is the same either way, only decoding needs to know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// `0x02` is [`Tag::Image8Bit`].
    #[default]
    Image,
    /// `0x02` is [`Tag::RawBytesWithWake`].
    Wake,
}

/// Frame kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Raw bytes, 32-bit count.
    RawBytes,
    /// Raw bytes preceded by a wake pulse on the remote, 32-bit count.
    RawBytesWithWake,
    /// 8-bit grayscale image, height + width.
    Image8Bit,
    /// UTF-8 string, 32-bit count.
    StringData,
    /// Packed 3-bit grayscale image, height + width.
    Image3Bit,
    /// Acknowledgement, 32-bit ack value.
    Ack,
    /// Negative acknowledgement, 32-bit chunk index.
    Nak,
}

impl Tag {
    /// Wire byte for this tag.
    pub fn to_byte(self) -> u8 {
        match self {
            Tag::RawBytes => tags::RAW_BYTES,
            Tag::RawBytesWithWake | Tag::Image8Bit => tags::IMAGE_OR_WAKE,
            Tag::StringData => tags::STRING_DATA,
            Tag::Image3Bit => tags::IMAGE_3BIT,
            Tag::Ack => tags::ACK,
            Tag::Nak => tags::NAK,
        }
    }

    /// Parse a wire byte. Unknown bytes are a protocol error.
    pub fn from_byte(byte: u8, dialect: Dialect) -> Result<Self> {
        match byte {
            tags::RAW_BYTES => Ok(Tag::RawBytes),
            tags::IMAGE_OR_WAKE => Ok(match dialect {
                Dialect::Image => Tag::Image8Bit,
                Dialect::Wake => Tag::RawBytesWithWake,
            }),
            tags::STRING_DATA => Ok(Tag::StringData),
            tags::IMAGE_3BIT => Ok(Tag::Image3Bit),
            tags::ACK => Ok(Tag::Ack),
            tags::NAK => Ok(Tag::Nak),
            other => Err(LinkError::UnknownTag(other)),
        }
    }

    /// Whether params are read as height + width.
    #[inline]
    pub fn has_dimensions(self) -> bool {
        matches!(self, Tag::Image8Bit | Tag::Image3Bit)
    }

    /// Whether this is an ack/nak (no payload follows).
    #[inline]
    pub fn is_control(self) -> bool {
        matches!(self, Tag::Ack | Tag::Nak)
    }
}

/// Tag-dependent header parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Params {
    /// Byte count, ack value or chunk index.
    Count(u32),
    /// Image dimensions.
    Dimensions {
        /// Rows.
        height: u16,
        /// Columns.
        width: u16,
    },
}

impl Params {
    /// Big-endian wire bytes.
    pub fn to_bytes(self) -> [u8; 4] {
        match self {
            Params::Count(n) => n.to_be_bytes(),
            Params::Dimensions { height, width } => {
                let h = height.to_be_bytes();
                let w = width.to_be_bytes();
                [h[0], h[1], w[0], w[1]]
            }
        }
    }

    /// The count, if these are count params.
    pub fn count(self) -> Option<u32> {
        match self {
            Params::Count(n) => Some(n),
            Params::Dimensions { .. } => None,
        }
    }

    /// `(height, width)`, if these are dimension params.
    pub fn dimensions(self) -> Option<(u16, u16)> {
        match self {
            Params::Count(_) => None,
            Params::Dimensions { height, width } => Some((height, width)),
        }
    }
}

/// Decoded 5-byte header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Frame kind.
    pub tag: Tag,
    /// Tag-dependent parameters.
    pub params: Params,
}

impl Header {
    /// Create a header, checking that the params shape matches the tag.
    pub fn new(tag: Tag, params: Params) -> Result<Self> {
        if tag.has_dimensions() != matches!(params, Params::Dimensions { .. }) {
            return Err(LinkError::MalformedFrame(format!(
                "{:?} cannot carry {:?}",
                tag, params
            )));
        }
        Ok(Self { tag, params })
    }

    /// Raw byte payload header.
    pub fn raw_bytes(count: u32) -> Self {
        Self {
            tag: Tag::RawBytes,
            params: Params::Count(count),
        }
    }

    /// Raw-with-wake payload header.
    pub fn raw_bytes_with_wake(count: u32) -> Self {
        Self {
            tag: Tag::RawBytesWithWake,
            params: Params::Count(count),
        }
    }

    /// String payload header.
    pub fn string_data(len: u32) -> Self {
        Self {
            tag: Tag::StringData,
            params: Params::Count(len),
        }
    }

    /// 8-bit image header.
    pub fn image_8bit(height: u16, width: u16) -> Self {
        Self {
            tag: Tag::Image8Bit,
            params: Params::Dimensions { height, width },
        }
    }

    /// Packed 3-bit image header.
    pub fn image_3bit(height: u16, width: u16) -> Self {
        Self {
            tag: Tag::Image3Bit,
            params: Params::Dimensions { height, width },
        }
    }

    /// Ack header.
    pub fn ack(value: u32) -> Self {
        Self {
            tag: Tag::Ack,
            params: Params::Count(value),
        }
    }

    /// Nak header.
    pub fn nak(chunk: u32) -> Self {
        Self {
            tag: Tag::Nak,
            params: Params::Count(chunk),
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use nrflink::protocol::Header;
    ///
    /// let bytes = Header::raw_bytes(65).encode();
    /// assert_eq!(bytes, [0x01, 0, 0, 0, 65]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (5 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        buf[0] = self.tag.to_byte();
        buf[1..HEADER_SIZE].copy_from_slice(&self.params.to_bytes());
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use nrflink::protocol::{Dialect, Header, Params, Tag};
    ///
    /// let header = Header::decode(&[0x04, 0x02, 0x58, 0x03, 0x20], Dialect::Image).unwrap();
    /// assert_eq!(header.tag, Tag::Image3Bit);
    /// assert_eq!(header.params, Params::Dimensions { height: 600, width: 800 });
    /// ```
    pub fn decode(buf: &[u8], dialect: Dialect) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(LinkError::MalformedFrame(format!(
                "header needs {} bytes, got {}",
                HEADER_SIZE,
                buf.len()
            )));
        }

        let tag = Tag::from_byte(buf[0], dialect)?;
        let params = if tag.has_dimensions() {
            Params::Dimensions {
                height: u16::from_be_bytes([buf[1], buf[2]]),
                width: u16::from_be_bytes([buf[3], buf[4]]),
            }
        } else {
            Params::Count(u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]))
        };

        Ok(Self { tag, params })
    }
}

/// Encode a header to bytes (standalone function).
#[inline]
pub fn encode_header(header: &Header) -> [u8; HEADER_SIZE] {
    header.encode()
}

/// Decode a header from bytes (standalone function).
#[inline]
pub fn decode_header(buf: &[u8], dialect: Dialect) -> Result<Header> {
    Header::decode(buf, dialect)
}
