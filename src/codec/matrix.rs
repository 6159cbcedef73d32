//! Plain grayscale pixel grid.
//!
//! This is the only image shape the link exchanges with an imaging library:
//! decoding, resizing, grayscale conversion and dithering happen outside,
//! and their result is handed over as rows of 8-bit samples.

use crate::error::{LinkError, Result};

/// Rectangular grid of 8-bit grayscale samples, row-major.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PixelMatrix {
    height: usize,
    width: usize,
    data: Vec<u8>,
}

impl PixelMatrix {
    /// Black matrix of the given size.
    pub fn new(height: usize, width: usize) -> Self {
        Self {
            height,
            width,
            data: vec![0; height * width],
        }
    }

    /// Wrap row-major samples.
    pub fn from_raw(height: usize, width: usize, data: Vec<u8>) -> Result<Self> {
        if data.len() != height * width {
            return Err(LinkError::InvalidImage(format!(
                "{} samples do not fill {}x{}",
                data.len(),
                height,
                width
            )));
        }
        Ok(Self {
            height,
            width,
            data,
        })
    }

    /// Build from a jagged row list. All rows must have the same length.
    ///
    /// ```
    /// use nrflink::codec::PixelMatrix;
    ///
    /// let m = PixelMatrix::from_rows(&[vec![0, 128], vec![255, 64]]).unwrap();
    /// assert_eq!((m.height(), m.width()), (2, 2));
    /// assert_eq!(m.get(1, 0), Some(255));
    /// ```
    pub fn from_rows<R: AsRef<[u8]>>(rows: &[R]) -> Result<Self> {
        let width = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * width);

        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != width {
                return Err(LinkError::InvalidImage(format!(
                    "row {} has {} samples, expected {}",
                    i,
                    row.len(),
                    width
                )));
            }
            data.extend_from_slice(row);
        }

        Ok(Self {
            height: rows.len(),
            width,
            data,
        })
    }

    /// Copy out as a jagged row list.
    pub fn to_rows(&self) -> Vec<Vec<u8>> {
        self.rows().map(<[u8]>::to_vec).collect()
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

    /// Total pixel count.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the matrix has no pixels.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Sample at `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> Option<u8> {
        if row >= self.height || col >= self.width {
            return None;
        }
        Some(self.data[row * self.width + col])
    }

    /// Overwrite the sample at `(row, col)`. Out-of-range writes are ignored.
    pub fn set(&mut self, row: usize, col: usize, value: u8) {
        if row < self.height && col < self.width {
            self.data[row * self.width + col] = value;
        }
    }

    /// Iterate rows. Always yields `height` rows, empty ones for width 0.
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        (0..self.height).map(move |r| &self.data[r * self.width..(r + 1) * self.width])
    }

    /// Row-major samples.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Take the row-major samples.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_roundtrip() {
        let rows = vec![vec![1, 2, 3], vec![4, 5, 6]];
        let m = PixelMatrix::from_rows(&rows).unwrap();

        assert_eq!(m.height(), 2);
        assert_eq!(m.width(), 3);
        assert_eq!(m.as_bytes(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(m.to_rows(), rows);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let result = PixelMatrix::from_rows(&[vec![1, 2], vec![3]]);
        assert!(matches!(result, Err(LinkError::InvalidImage(_))));
    }

    #[test]
    fn test_from_raw_length_checked() {
        assert!(PixelMatrix::from_raw(2, 2, vec![0; 3]).is_err());
        assert!(PixelMatrix::from_raw(2, 2, vec![0; 4]).is_ok());
    }

    #[test]
    fn test_empty_matrix() {
        let m = PixelMatrix::from_rows::<Vec<u8>>(&[]).unwrap();
        assert!(m.is_empty());
        assert_eq!(m.rows().count(), 0);
    }

    #[test]
    fn test_zero_width_keeps_its_rows() {
        let m = PixelMatrix::from_rows(&[Vec::<u8>::new(), Vec::new()]).unwrap();
        assert_eq!((m.height(), m.width()), (2, 0));
        assert!(m.is_empty());
        assert_eq!(m.rows().count(), 2);
        assert_eq!(m.to_rows(), vec![Vec::<u8>::new(), Vec::new()]);
    }

    #[test]
    fn test_get_set_bounds() {
        let mut m = PixelMatrix::new(2, 3);
        m.set(1, 2, 200);
        m.set(5, 5, 1);

        assert_eq!(m.get(1, 2), Some(200));
        assert_eq!(m.get(2, 0), None);
        assert_eq!(m.get(0, 3), None);
        assert_eq!(m.as_bytes().iter().filter(|&&b| b != 0).count(), 1);
    }
}
