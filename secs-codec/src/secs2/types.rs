//! SECS-II item header

use crate::error::{SecsError, SecsResult};
use secs_core::{ItemFormat, MAX_ITEM_LENGTH};

/// Deepest list nesting accepted by the decoders
pub const MAX_NESTING_DEPTH: usize = 256;

/// Format byte plus length field that precedes every item payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemHeader {
    pub format: ItemFormat,
    /// Element count for lists, byte count otherwise
    pub length: usize,
}

impl ItemHeader {
    pub fn new(format: ItemFormat, length: usize) -> Self {
        Self { format, length }
    }

    /// Number of length bytes needed for `length` (1, 2 or 3)
    pub fn length_width(length: usize) -> SecsResult<u8> {
        match length {
            0..=0xFF => Ok(1),
            0x100..=0xFFFF => Ok(2),
            0x1_0000..=MAX_ITEM_LENGTH => Ok(3),
            _ => Err(SecsError::LengthTooLarge(length)),
        }
    }

    /// Encode header to bytes
    pub fn encode(&self) -> SecsResult<Vec<u8>> {
        let width = Self::length_width(self.length)?;
        let mut result = Vec::with_capacity(1 + width as usize);
        result.push(self.format.code() | width);
        let bytes = (self.length as u32).to_be_bytes();
        result.extend_from_slice(&bytes[4 - width as usize..]);
        Ok(result)
    }

    /// Decode header from bytes
    ///
    /// Returns the header and the number of bytes it occupied.
    pub fn decode(bytes: &[u8]) -> SecsResult<(Self, usize)> {
        let first = *bytes
            .first()
            .ok_or_else(|| SecsError::decode("Not enough bytes for format byte"))?;
        let format = ItemFormat::from_code(first)?;
        let width = (first & 0x03) as usize;
        if width == 0 {
            return Err(SecsError::decode(format!(
                "Format byte 0x{:02X} declares zero length bytes",
                first
            )));
        }
        if bytes.len() < 1 + width {
            return Err(SecsError::decode("Not enough bytes for length field"));
        }
        let length = bytes[1..1 + width]
            .iter()
            .fold(0usize, |acc, &b| (acc << 8) | b as usize);
        Ok((Self { format, length }, 1 + width))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_width_boundaries() {
        assert_eq!(ItemHeader::length_width(0).unwrap(), 1);
        assert_eq!(ItemHeader::length_width(255).unwrap(), 1);
        assert_eq!(ItemHeader::length_width(256).unwrap(), 2);
        assert_eq!(ItemHeader::length_width(0xFFFF).unwrap(), 2);
        assert_eq!(ItemHeader::length_width(0x10000).unwrap(), 3);
        assert_eq!(ItemHeader::length_width(0xFFFFFF).unwrap(), 3);
        assert!(ItemHeader::length_width(0x1000000).is_err());
    }

    #[test]
    fn test_header_encode_decode() {
        let header = ItemHeader::new(ItemFormat::Binary, 300);
        let bytes = header.encode().unwrap();
        assert_eq!(bytes, vec![0x22, 0x01, 0x2C]);
        assert_eq!(ItemHeader::decode(&bytes).unwrap(), (header, 3));
    }

    #[test]
    fn test_decode_rejects_zero_width() {
        assert!(ItemHeader::decode(&[0x40, 0x01]).is_err());
        assert!(ItemHeader::decode(&[0x43, 0x00]).is_err());
        assert!(ItemHeader::decode(&[]).is_err());
    }
}
