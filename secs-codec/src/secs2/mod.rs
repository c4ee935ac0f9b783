//! SECS-II binary encoding/decoding module

pub mod decoder;
pub mod encoder;
pub mod types;

pub use decoder::Secs2Decoder;
pub use encoder::Secs2Encoder;
pub use types::{ItemHeader, MAX_NESTING_DEPTH};

use crate::error::SecsResult;
use secs_core::Item;

/// Encode one item to its SECS-II byte form
pub fn encode(item: &Item) -> SecsResult<Vec<u8>> {
    let mut encoder = Secs2Encoder::new();
    encoder.encode_item(item)?;
    Ok(encoder.into_bytes().to_vec())
}

/// Decode one item from the front of `buffer`
///
/// Returns the item and the number of bytes consumed.
pub fn decode(buffer: &[u8]) -> SecsResult<(Item, usize)> {
    let mut decoder = Secs2Decoder::new(buffer);
    let item = decoder.decode_item()?;
    Ok((item, decoder.position()))
}

/// Decode a message body: empty means no body, otherwise exactly one item
pub fn decode_body(buffer: &[u8]) -> SecsResult<Option<Item>> {
    if buffer.is_empty() {
        return Ok(None);
    }
    let mut decoder = Secs2Decoder::new(buffer);
    let item = decoder.decode_item()?;
    decoder.finish()?;
    Ok(Some(item))
}
