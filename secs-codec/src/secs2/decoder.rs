//! SECS-II decoder

use crate::error::{SecsError, SecsResult};
use crate::secs2::types::{ItemHeader, MAX_NESTING_DEPTH};
use secs_core::{Item, ItemFormat};

/// SECS-II decoder over a borrowed buffer
pub struct Secs2Decoder<'a> {
    buffer: &'a [u8],
    position: usize,
    depth: usize,
}

impl<'a> Secs2Decoder<'a> {
    /// Create a new decoder
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
            depth: 0,
        }
    }

    /// Bytes consumed so far
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }

    /// Fail if any bytes are left over
    pub fn finish(&self) -> SecsResult<()> {
        if self.remaining() != 0 {
            return Err(SecsError::Decode(format!(
                "{} trailing bytes after item",
                self.remaining()
            )));
        }
        Ok(())
    }

    /// Decode one item
    pub fn decode_item(&mut self) -> SecsResult<Item> {
        let (header, consumed) = ItemHeader::decode(&self.buffer[self.position..])?;
        self.position += consumed;

        if header.format == ItemFormat::List {
            return self.decode_list(header.length);
        }

        let payload = self.take(header.length)?;
        let size = header.format.element_size();
        if payload.len() % size != 0 {
            return Err(SecsError::Decode(format!(
                "{} payload of {} bytes is not a multiple of {}",
                header.format,
                payload.len(),
                size
            )));
        }

        let item = match header.format {
            ItemFormat::List => unreachable!("lists are decoded above"),
            ItemFormat::Binary => Item::Binary(payload.to_vec()),
            ItemFormat::Boolean => Item::Boolean(payload.iter().map(|&b| b != 0).collect()),
            ItemFormat::Ascii => {
                if !payload.is_ascii() {
                    return Err(SecsError::decode("ASCII item contains non-ASCII bytes"));
                }
                Item::Ascii(payload.iter().map(|&b| b as char).collect())
            }
            ItemFormat::I1 => Item::I1(payload.iter().map(|&b| b as i8).collect()),
            ItemFormat::I2 => Item::I2(chunks(payload, i16::from_be_bytes)),
            ItemFormat::I4 => Item::I4(chunks(payload, i32::from_be_bytes)),
            ItemFormat::I8 => Item::I8(chunks(payload, i64::from_be_bytes)),
            ItemFormat::U1 => Item::U1(payload.to_vec()),
            ItemFormat::U2 => Item::U2(chunks(payload, u16::from_be_bytes)),
            ItemFormat::U4 => Item::U4(chunks(payload, u32::from_be_bytes)),
            ItemFormat::U8 => Item::U8(chunks(payload, u64::from_be_bytes)),
            ItemFormat::F4 => Item::F4(chunks(payload, f32::from_be_bytes)),
            ItemFormat::F8 => Item::F8(chunks(payload, f64::from_be_bytes)),
        };
        Ok(item)
    }

    fn decode_list(&mut self, count: usize) -> SecsResult<Item> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(SecsError::Decode(format!(
                "List nesting deeper than {}",
                MAX_NESTING_DEPTH
            )));
        }
        // every child needs at least two header bytes
        if count > self.remaining() / 2 {
            return Err(SecsError::Decode(format!(
                "List declares {} items but only {} bytes remain",
                count,
                self.remaining()
            )));
        }
        self.depth += 1;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(self.decode_item()?);
        }
        self.depth -= 1;
        Ok(Item::List(items))
    }

    fn take(&mut self, length: usize) -> SecsResult<&'a [u8]> {
        if length > self.remaining() {
            return Err(SecsError::Decode(format!(
                "Item declares {} bytes but only {} remain",
                length,
                self.remaining()
            )));
        }
        let slice = &self.buffer[self.position..self.position + length];
        self.position += length;
        Ok(slice)
    }
}

fn chunks<T, const N: usize>(payload: &[u8], convert: fn([u8; N]) -> T) -> Vec<T> {
    payload
        .chunks_exact(N)
        .map(|c| {
            let mut bytes = [0u8; N];
            bytes.copy_from_slice(c);
            convert(bytes)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_nested_list() {
        let bytes = [0x01, 0x02, 0x41, 0x01, b'X', 0x01, 0x01, 0xA5, 0x01, 0x07];
        let mut decoder = Secs2Decoder::new(&bytes);
        let item = decoder.decode_item().unwrap();
        assert_eq!(
            item,
            Item::List(vec![
                Item::Ascii("X".into()),
                Item::List(vec![Item::U1(vec![7])]),
            ])
        );
        assert_eq!(decoder.position(), bytes.len());
    }

    #[test]
    fn test_decode_rejects_overrun() {
        let mut decoder = Secs2Decoder::new(&[0x21, 0x05, 0x01, 0x02]);
        assert!(matches!(decoder.decode_item(), Err(SecsError::Decode(_))));
    }

    #[test]
    fn test_decode_rejects_partial_element() {
        let mut decoder = Secs2Decoder::new(&[0xA9, 0x03, 0x00, 0x01, 0x02]);
        assert!(decoder.decode_item().is_err());
    }

    #[test]
    fn test_decode_rejects_unknown_format() {
        let mut decoder = Secs2Decoder::new(&[0x45, 0x00]);
        assert!(decoder.decode_item().is_err());
    }

    #[test]
    fn test_decode_rejects_non_ascii() {
        let mut decoder = Secs2Decoder::new(&[0x41, 0x01, 0xC3]);
        assert!(decoder.decode_item().is_err());
    }

    #[test]
    fn test_decode_rejects_list_count_overrun() {
        let mut decoder = Secs2Decoder::new(&[0x01, 0xFF, 0x01, 0x00]);
        assert!(decoder.decode_item().is_err());
    }

    #[test]
    fn test_decode_depth_guard() {
        let mut bytes = Vec::new();
        for _ in 0..(MAX_NESTING_DEPTH + 1) {
            bytes.extend_from_slice(&[0x01, 0x01]);
        }
        bytes.extend_from_slice(&[0x01, 0x00]);
        let mut decoder = Secs2Decoder::new(&bytes);
        assert!(decoder.decode_item().is_err());
    }

    #[test]
    fn test_finish_reports_trailing_bytes() {
        let bytes = [0xA5, 0x01, 0x01, 0x00];
        let mut decoder = Secs2Decoder::new(&bytes);
        decoder.decode_item().unwrap();
        assert!(decoder.finish().is_err());
    }
}
