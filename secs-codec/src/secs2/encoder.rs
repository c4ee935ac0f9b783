//! SECS-II encoder

use crate::error::{SecsError, SecsResult};
use crate::secs2::types::ItemHeader;
use bytes::{BufMut, Bytes, BytesMut};
use secs_core::Item;

/// SECS-II encoder for item trees
pub struct Secs2Encoder {
    buffer: BytesMut,
}

impl Secs2Encoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }

    /// Create a new encoder with initial capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Encode an item, recursing into lists
    pub fn encode_item(&mut self, item: &Item) -> SecsResult<()> {
        if let Item::Ascii(s) = item {
            if !s.is_ascii() {
                return Err(SecsError::InvalidItem(
                    "ASCII item contains non-ASCII characters".to_string(),
                ));
            }
        }
        let header = ItemHeader::new(item.format(), item.length_field());
        self.buffer.put_slice(&header.encode()?);

        match item {
            Item::List(items) => {
                for child in items {
                    self.encode_item(child)?;
                }
            }
            Item::Binary(v) => self.buffer.put_slice(v),
            Item::Boolean(v) => {
                for &b in v {
                    self.buffer.put_u8(b as u8);
                }
            }
            Item::Ascii(s) => self.buffer.put_slice(s.as_bytes()),
            Item::I1(v) => v.iter().for_each(|&x| self.buffer.put_i8(x)),
            Item::I2(v) => v.iter().for_each(|&x| self.buffer.put_i16(x)),
            Item::I4(v) => v.iter().for_each(|&x| self.buffer.put_i32(x)),
            Item::I8(v) => v.iter().for_each(|&x| self.buffer.put_i64(x)),
            Item::U1(v) => self.buffer.put_slice(v),
            Item::U2(v) => v.iter().for_each(|&x| self.buffer.put_u16(x)),
            Item::U4(v) => v.iter().for_each(|&x| self.buffer.put_u32(x)),
            Item::U8(v) => v.iter().for_each(|&x| self.buffer.put_u64(x)),
            Item::F4(v) => v.iter().for_each(|&x| self.buffer.put_f32(x)),
            Item::F8(v) => v.iter().for_each(|&x| self.buffer.put_f64(x)),
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Consume the encoder and return the encoded bytes
    pub fn into_bytes(self) -> Bytes {
        self.buffer.freeze()
    }
}

impl Default for Secs2Encoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(item: &Item) -> Vec<u8> {
        let mut encoder = Secs2Encoder::new();
        encoder.encode_item(item).unwrap();
        encoder.into_bytes().to_vec()
    }

    #[test]
    fn test_encode_ascii() {
        assert_eq!(
            encode(&Item::Ascii("AB".into())),
            vec![0x41, 0x02, b'A', b'B']
        );
    }

    #[test]
    fn test_encode_list_counts_children() {
        let item = Item::List(vec![Item::U2(vec![1, 2]), Item::Boolean(vec![true])]);
        assert_eq!(
            encode(&item),
            vec![0x01, 0x02, 0xA9, 0x04, 0x00, 0x01, 0x00, 0x02, 0x25, 0x01, 0x01]
        );
    }

    #[test]
    fn test_encode_numbers_big_endian() {
        assert_eq!(encode(&Item::I4(vec![-2])), vec![0x71, 0x04, 0xFF, 0xFF, 0xFF, 0xFE]);
        assert_eq!(
            encode(&Item::F4(vec![1.0])),
            vec![0x91, 0x04, 0x3F, 0x80, 0x00, 0x00]
        );
    }

    #[test]
    fn test_binary_length_width() {
        let short = encode(&Item::Binary(vec![0; 255]));
        assert_eq!(&short[..2], &[0x21, 0xFF]);
        assert_eq!(short.len(), 257);
        let long = encode(&Item::Binary(vec![0; 256]));
        assert_eq!(&long[..3], &[0x22, 0x01, 0x00]);
        assert_eq!(long.len(), 259);
    }

    #[test]
    fn test_encode_rejects_oversized_literal() {
        let mut encoder = Secs2Encoder::new();
        let item = Item::U2(vec![0; 0x80_0000]);
        assert!(matches!(
            encoder.encode_item(&item),
            Err(SecsError::LengthTooLarge(0x100_0000))
        ));
    }

    #[test]
    fn test_encode_empty_items() {
        assert_eq!(encode(&Item::List(vec![])), vec![0x01, 0x00]);
        assert_eq!(encode(&Item::Ascii(String::new())), vec![0x41, 0x00]);
    }
}
