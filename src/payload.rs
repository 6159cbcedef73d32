//! Outbound payloads and the handshake header that announces them.
//!
//! A [`Payload`] pairs the body bytes with the header the transmitter sends
//! first. The remote acknowledges that header with the body length, so
//! [`Payload::expected_handshake_ack`] is always `body.len()`.

use bytes::Bytes;

use crate::codec::{pack_3bit, PackedBitmap, PixelMatrix};
use crate::error::{LinkError, Result};
use crate::protocol::{Header, Tag};

/// A body plus the header that announces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    header: Header,
    body: Bytes,
}

impl Payload {
    /// Raw bytes (tag 0x01).
    pub fn bytes(data: impl Into<Bytes>) -> Result<Self> {
        let body = data.into();
        Ok(Self {
            header: Header::raw_bytes(count_param(body.len())?),
            body,
        })
    }

    /// Raw bytes that wake the far receiver before delivery (tag 0x02).
    pub fn bytes_with_wake(data: impl Into<Bytes>) -> Result<Self> {
        let body = data.into();
        Ok(Self {
            header: Header::raw_bytes_with_wake(count_param(body.len())?),
            body,
        })
    }

    /// UTF-8 text (tag 0x03).
    pub fn text(text: &str) -> Result<Self> {
        let body = Bytes::copy_from_slice(text.as_bytes());
        Ok(Self {
            header: Header::string_data(count_param(body.len())?),
            body,
        })
    }

    /// `count` synthetic bytes `0, 1, 2, ...` wrapping at 256.
    ///
    /// ```
    /// use nrflink::Payload;
    ///
    /// let p = Payload::test_pattern(300).unwrap();
    /// assert_eq!(p.body()[255], 255);
    /// assert_eq!(p.body()[256], 0);
    /// ```
    pub fn test_pattern(count: usize) -> Result<Self> {
        let header = Header::raw_bytes(count_param(count)?);
        let body: Bytes = (0..count).map(|i| i as u8).collect::<Vec<u8>>().into();
        Ok(Self { header, body })
    }

    /// Full 8-bit grayscale image (tag 0x02), sent row by row.
    pub fn image_8bit(matrix: &PixelMatrix) -> Result<Self> {
        let (height, width) = wire_dimensions(matrix.height(), matrix.width())?;
        Ok(Self {
            header: Header::image_8bit(height, width),
            body: Bytes::copy_from_slice(matrix.as_bytes()),
        })
    }

    /// Quantize and pack an image to 3 bits per pixel (tag 0x04).
    pub fn image_3bit(matrix: &PixelMatrix) -> Result<Self> {
        Self::packed(pack_3bit(matrix))
    }

    /// Already-packed 3-bit image (tag 0x04).
    pub fn packed(bitmap: PackedBitmap) -> Result<Self> {
        let (height, width) = wire_dimensions(bitmap.height(), bitmap.width())?;
        Ok(Self {
            header: Header::image_3bit(height, width),
            body: bitmap.bytes(),
        })
    }

    /// Handshake header.
    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Frame kind.
    #[inline]
    pub fn tag(&self) -> Tag {
        self.header.tag
    }

    /// Body bytes.
    #[inline]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body length.
    #[inline]
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Whether the body is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Value the remote must ack the handshake with.
    #[inline]
    pub fn expected_handshake_ack(&self) -> u32 {
        self.body.len() as u32
    }

    /// Number of wire chunks at the given chunk size.
    pub fn chunk_count(&self, chunk_size: usize) -> usize {
        self.body.len().div_ceil(chunk_size.max(1))
    }
}

/// Body length as the 32-bit count the header carries.
fn count_param(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| LinkError::PayloadTooLarge {
        size: len,
        max: u32::MAX as usize,
    })
}

fn wire_dimensions(height: usize, width: usize) -> Result<(u16, u16)> {
    match (u16::try_from(height), u16::try_from(width)) {
        (Ok(h), Ok(w)) => Ok((h, w)),
        _ => Err(LinkError::InvalidImage(format!(
            "{}x{} exceeds the 16-bit dimension fields",
            height, width
        ))),
    }
}
