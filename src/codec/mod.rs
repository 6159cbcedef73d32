//! Codec module - image payload shapes.
//!
//! - [`PixelMatrix`] - plain 8-bit grayscale grid exchanged with imaging code
//! - [`PackedBitmap`] - two 3-bit pixels per byte, the e-paper wire format
//!
//! # Design
//!
//! Packing is a pair of free functions rather than a trait: there is exactly
//! one packed format and it never needs to be chosen at runtime.
//!
//! # Example
//!
//! ```
//! use nrflink::codec::{pack_3bit, unpack_3bit, PixelMatrix, QUANTIZATION_STEP};
//!
//! let matrix = PixelMatrix::from_rows(&[vec![10, 200, 90, 255]]).unwrap();
//! let packed = pack_3bit(&matrix);
//! assert_eq!(packed.as_bytes().len(), 2);
//!
//! let back = unpack_3bit(packed.as_bytes(), 4, 1).unwrap();
//! for (a, b) in matrix.as_bytes().iter().zip(back.as_bytes()) {
//!     assert!(a.abs_diff(*b) <= QUANTIZATION_STEP);
//! }
//! ```

mod bitmap;
mod matrix;

pub use bitmap::{
    expand, pack_3bit, packed_len, quantize, unpack_3bit, PackedBitmap, MAX_LEVEL,
    QUANTIZATION_STEP,
};
pub use matrix::PixelMatrix;
