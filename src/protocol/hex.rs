//! Hex dump adapter for trace logging.

use std::fmt;

/// Displays a byte slice as `0x00 0x01 ...`.
///
/// ```
/// use nrflink::protocol::HexBytes;
///
/// assert_eq!(HexBytes(&[0x00, 0xAB]).to_string(), "0x00 0xAB");
/// ```
pub struct HexBytes<'a>(pub &'a [u8]);

impl fmt::Display for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "0x{:02X}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        assert_eq!(HexBytes(&[]).to_string(), "");
    }

    #[test]
    fn test_uppercase_padded() {
        assert_eq!(HexBytes(&[0x0F, 0xFF, 0x10]).to_string(), "0x0F 0xFF 0x10");
    }
}
