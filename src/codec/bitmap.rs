//! Packed 3-bit grayscale bitmap.
//!
//! Each byte carries two pixels, one per nibble. The earlier pixel (even
//! row-major index) sits in the high nibble. A 3-bit level is stored in the
//! top three bits of its nibble; the nibble's low bit is always zero.
//!
//! ```text
//!  bit  7 6 5 4   3 2 1 0
//!      [ a a a 0 | b b b 0 ]   a = pixel 2k, b = pixel 2k+1
//! ```

use bytes::Bytes;

use super::matrix::PixelMatrix;
use crate::error::{LinkError, Result};

/// Highest 3-bit level.
pub const MAX_LEVEL: u8 = 7;

/// Distance between two adjacent expanded levels (255 / 7, rounded).
pub const QUANTIZATION_STEP: u8 = 36;

/// Map 0..=255 to the nearest of 8 levels.
#[inline]
pub fn quantize(gray: u8) -> u8 {
    let level = (gray as u32 * MAX_LEVEL as u32 + 127) / 255;
    level.min(MAX_LEVEL as u32) as u8
}

/// Map a 3-bit level back to 0..=255.
#[inline]
pub fn expand(level: u8) -> u8 {
    ((level & MAX_LEVEL) as u32 * 255 / MAX_LEVEL as u32) as u8
}

/// Bytes needed to pack `height * width` pixels.
#[inline]
pub fn packed_len(height: usize, width: usize) -> usize {
    (height * width).div_ceil(2)
}

/// A packed bitmap together with the dimensions it was packed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedBitmap {
    height: usize,
    width: usize,
    bytes: Bytes,
}

impl PackedBitmap {
    /// Wrap already-packed bytes, checking the length against the dimensions.
    pub fn from_bytes(height: usize, width: usize, bytes: Bytes) -> Result<Self> {
        let expected = packed_len(height, width);
        if bytes.len() != expected {
            return Err(LinkError::InvalidImage(format!(
                "{}x{} packs to {} bytes, got {}",
                height,
                width,
                expected,
                bytes.len()
            )));
        }
        Ok(Self {
            height,
            width,
            bytes,
        })
    }

    /// Number of rows.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of columns.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Packed bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Packed bytes (cheap clone).
    #[inline]
    pub fn bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    /// Expand back to an 8-bit matrix.
    pub fn unpack(&self) -> PixelMatrix {
        // Length was checked on construction.
        unpack_3bit(&self.bytes, self.width, self.height).unwrap_or_default()
    }
}

/// Quantize and pack a matrix.
///
/// ```
/// use nrflink::codec::{pack_3bit, PixelMatrix};
///
/// let m = PixelMatrix::from_rows(&[vec![0, 128], vec![255, 64]]).unwrap();
/// let packed = pack_3bit(&m);
/// assert_eq!(packed.as_bytes(), &[0x08, 0xE4]);
/// ```
pub fn pack_3bit(matrix: &PixelMatrix) -> PackedBitmap {
    let mut out = vec![0u8; packed_len(matrix.height(), matrix.width())];

    for (i, &gray) in matrix.as_bytes().iter().enumerate() {
        let nibble = quantize(gray) << 1;
        if i % 2 == 0 {
            out[i / 2] |= nibble << 4;
        } else {
            out[i / 2] |= nibble;
        }
    }

    PackedBitmap {
        height: matrix.height(),
        width: matrix.width(),
        bytes: Bytes::from(out),
    }
}

/// Expand packed bytes into a `height x width` matrix.
///
/// Extra trailing bytes are ignored; too few bytes is an error.
pub fn unpack_3bit(bitmap: &[u8], width: usize, height: usize) -> Result<PixelMatrix> {
    let pixels = height * width;
    let needed = packed_len(height, width);
    if bitmap.len() < needed {
        return Err(LinkError::InvalidImage(format!(
            "{}x{} needs {} packed bytes, got {}",
            height,
            width,
            needed,
            bitmap.len()
        )));
    }

    let data = (0..pixels)
        .map(|i| {
            let byte = bitmap[i / 2];
            let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0F };
            expand((nibble >> 1) & MAX_LEVEL)
        })
        .collect();

    PixelMatrix::from_raw(height, width, data)
}
