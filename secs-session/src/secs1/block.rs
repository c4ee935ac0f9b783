//! SECS-I block format (SEMI E4 section 7)
//!
//! ```text
//! +--------+-------------------+------------------+----------+
//! | length |  header (10)      |  data (0..=244)  | checksum |
//! +--------+-------------------+------------------+----------+
//! ```

use crate::error::{SecsError, SecsResult};
use crate::secs1::checksum::checksum;
use secs_codec::{SecsMessage, secs2};

/// Enquire: request to send
pub const ENQ: u8 = 0x05;
/// End of transmission: ready to receive
pub const EOT: u8 = 0x04;
/// Correct reception
pub const ACK: u8 = 0x06;
/// Incorrect reception
pub const NAK: u8 = 0x15;

pub const SECS1_HEADER_LENGTH: usize = 10;
/// Data bytes per block
pub const MAX_BLOCK_DATA: usize = 244;
/// Smallest valid length byte (header only)
pub const MIN_BLOCK_LENGTH: u8 = SECS1_HEADER_LENGTH as u8;
/// Largest valid length byte (header + 244 data bytes)
pub const MAX_BLOCK_LENGTH: u8 = (SECS1_HEADER_LENGTH + MAX_BLOCK_DATA) as u8;
/// Block numbers are 15 bits
pub const MAX_BLOCK_NUMBER: u16 = 0x7FFF;

/// The 10-byte SECS-I block header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Secs1Header {
    /// Set on blocks sent by the equipment
    pub r_bit: bool,
    pub device_id: u16,
    pub w_bit: bool,
    pub stream: u8,
    pub function: u8,
    /// Set on the last block of a message
    pub e_bit: bool,
    pub block_number: u16,
    pub system_bytes: u32,
}

impl Secs1Header {
    pub fn encode(&self) -> [u8; SECS1_HEADER_LENGTH] {
        let device = (self.device_id & 0x7FFF).to_be_bytes();
        let block = (self.block_number & MAX_BLOCK_NUMBER).to_be_bytes();
        let system = self.system_bytes.to_be_bytes();
        [
            device[0] | if self.r_bit { 0x80 } else { 0 },
            device[1],
            (self.stream & 0x7F) | if self.w_bit { 0x80 } else { 0 },
            self.function,
            block[0] | if self.e_bit { 0x80 } else { 0 },
            block[1],
            system[0],
            system[1],
            system[2],
            system[3],
        ]
    }

    pub fn decode(bytes: &[u8]) -> SecsResult<Self> {
        if bytes.len() < SECS1_HEADER_LENGTH {
            return Err(SecsError::FrameInvalid(format!(
                "SECS-I header needs {} bytes, got {}",
                SECS1_HEADER_LENGTH,
                bytes.len()
            )));
        }
        Ok(Self {
            r_bit: bytes[0] & 0x80 != 0,
            device_id: u16::from_be_bytes([bytes[0] & 0x7F, bytes[1]]),
            w_bit: bytes[2] & 0x80 != 0,
            stream: bytes[2] & 0x7F,
            function: bytes[3],
            e_bit: bytes[4] & 0x80 != 0,
            block_number: u16::from_be_bytes([bytes[4] & 0x7F, bytes[5]]),
            system_bytes: u32::from_be_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]),
        })
    }

    /// True when `other` belongs to the same message
    fn same_message(&self, other: &Secs1Header) -> bool {
        self.device_id == other.device_id
            && self.stream == other.stream
            && self.function == other.function
            && self.w_bit == other.w_bit
            && self.system_bytes == other.system_bytes
    }
}

/// One SECS-I block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Secs1Block {
    pub header: Secs1Header,
    pub data: Vec<u8>,
}

impl Secs1Block {
    /// Encode with length byte and checksum
    pub fn encode(&self) -> SecsResult<Vec<u8>> {
        if self.data.len() > MAX_BLOCK_DATA {
            return Err(SecsError::LengthTooLarge(self.data.len()));
        }
        let length = SECS1_HEADER_LENGTH + self.data.len();
        let mut buf = Vec::with_capacity(length + 3);
        buf.push(length as u8);
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.data);
        let sum = checksum(&buf[1..]);
        buf.extend_from_slice(&sum.to_be_bytes());
        Ok(buf)
    }

    /// Decode the bytes following the length byte: header, data and checksum
    ///
    /// # Errors
    /// `FrameInvalid` on a bad size or checksum mismatch.
    pub fn decode(bytes: &[u8]) -> SecsResult<Self> {
        if bytes.len() < SECS1_HEADER_LENGTH + 2 || bytes.len() > MAX_BLOCK_LENGTH as usize + 2 {
            return Err(SecsError::FrameInvalid(format!(
                "SECS-I block of {} bytes",
                bytes.len()
            )));
        }
        let (content, sum) = bytes.split_at(bytes.len() - 2);
        let expected = u16::from_be_bytes([sum[0], sum[1]]);
        let actual = checksum(content);
        if expected != actual {
            return Err(SecsError::FrameInvalid(format!(
                "checksum mismatch: expected 0x{:04X}, computed 0x{:04X}",
                expected, actual
            )));
        }
        Ok(Self {
            header: Secs1Header::decode(content)?,
            data: content[SECS1_HEADER_LENGTH..].to_vec(),
        })
    }
}

/// Validate a received length byte
pub fn is_valid_length(length: u8) -> bool {
    (MIN_BLOCK_LENGTH..=MAX_BLOCK_LENGTH).contains(&length)
}

/// Split `message` into blocks numbered from 1, E-bit on the last
pub fn split_message(message: &SecsMessage, r_bit: bool) -> SecsResult<Vec<Secs1Block>> {
    let body = message.encode_body()?;
    let chunks: Vec<&[u8]> = if body.is_empty() {
        vec![&body[..]]
    } else {
        body.chunks(MAX_BLOCK_DATA).collect()
    };
    if chunks.len() > MAX_BLOCK_NUMBER as usize {
        return Err(SecsError::LengthTooLarge(body.len()));
    }

    let last = chunks.len() - 1;
    Ok(chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| Secs1Block {
            header: Secs1Header {
                r_bit,
                device_id: message.device_id(),
                w_bit: message.w_bit(),
                stream: message.stream(),
                function: message.function(),
                e_bit: i == last,
                block_number: (i + 1) as u16,
                system_bytes: message.system_bytes(),
            },
            data: chunk.to_vec(),
        })
        .collect())
}

/// Reassembles blocks into messages
#[derive(Debug)]
pub struct MessageAssembler {
    first: Option<Secs1Header>,
    expected_block: u16,
    data: Vec<u8>,
    max_size: usize,
}

impl MessageAssembler {
    pub fn new(max_size: usize) -> Self {
        Self {
            first: None,
            expected_block: 0,
            data: Vec::new(),
            max_size,
        }
    }

    /// True while a multi-block message awaits further blocks
    pub fn in_progress(&self) -> bool {
        self.first.is_some()
    }

    /// Discard any partial message
    pub fn reset(&mut self) {
        self.first = None;
        self.expected_block = 0;
        self.data.clear();
    }

    /// Add one block, returning the message once its last block arrived
    ///
    /// A block that does not continue the partial message starts a new one;
    /// the partial message is dropped.
    pub fn push(&mut self, block: Secs1Block) -> SecsResult<Option<SecsMessage>> {
        let continues = self.first.as_ref().is_some_and(|first| {
            first.same_message(&block.header) && block.header.block_number == self.expected_block
        });
        if !continues {
            if self.in_progress() {
                log::warn!(
                    "SECS-I block {} of system 0x{:08X} interrupts a partial message",
                    block.header.block_number,
                    block.header.system_bytes
                );
                self.reset();
            }
            if block.header.block_number > 1 {
                return Err(SecsError::Protocol(format!(
                    "message starts with block number {}",
                    block.header.block_number
                )));
            }
            self.first = Some(block.header);
            self.expected_block = block.header.block_number;
        }

        if self.data.len() + block.data.len() > self.max_size {
            let size = self.data.len() + block.data.len();
            self.reset();
            return Err(SecsError::LengthTooLarge(size));
        }
        self.data.extend_from_slice(&block.data);
        self.expected_block = self.expected_block.wrapping_add(1);

        if !block.header.e_bit {
            return Ok(None);
        }
        let header = block.header;
        let data = std::mem::take(&mut self.data);
        self.reset();
        let body = secs2::decode_body(&data)?;
        SecsMessage::new(
            header.stream as u32,
            header.function as u32,
            header.w_bit,
            body,
            header.system_bytes,
            header.device_id,
        )
        .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secs_core::Item;

    fn message(body: Option<Item>) -> SecsMessage {
        SecsMessage::new(6, 11, true, body, 0x0102_0304, 1).unwrap()
    }

    #[test]
    fn test_header_layout() {
        let header = Secs1Header {
            r_bit: true,
            device_id: 0x0102,
            w_bit: true,
            stream: 1,
            function: 13,
            e_bit: true,
            block_number: 1,
            system_bytes: 7,
        };
        let bytes = header.encode();
        assert_eq!(bytes, [0x81, 0x02, 0x81, 13, 0x80, 0x01, 0, 0, 0, 7]);
        assert_eq!(Secs1Header::decode(&bytes).unwrap(), header);
    }

    #[test]
    fn test_block_encode_checksum() {
        let block = split_message(&message(None), false).unwrap().remove(0);
        let bytes = block.encode().unwrap();
        assert_eq!(bytes[0], 10);
        assert_eq!(bytes.len(), 13);
        let sum = checksum(&bytes[1..11]);
        assert_eq!(&bytes[11..], &sum.to_be_bytes());
        assert_eq!(Secs1Block::decode(&bytes[1..]).unwrap(), block);
    }

    #[test]
    fn test_checksum_mismatch() {
        let block = split_message(&message(Some(Item::ascii("ABC").unwrap())), false)
            .unwrap()
            .remove(0);
        let mut bytes = block.encode().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(matches!(
            Secs1Block::decode(&bytes[1..]),
            Err(SecsError::FrameInvalid(_))
        ));
    }

    #[test]
    fn test_split_and_reassemble() {
        let body = Item::Binary(vec![0x5A; 600]);
        let msg = message(Some(body));
        let blocks = split_message(&msg, true).unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].header.block_number, 1);
        assert_eq!(blocks[2].header.block_number, 3);
        assert!(blocks.iter().take(2).all(|b| !b.header.e_bit));
        assert!(blocks[2].header.e_bit);
        assert!(blocks.iter().all(|b| b.data.len() <= MAX_BLOCK_DATA));

        let mut assembler = MessageAssembler::new(1 << 20);
        assert!(assembler.push(blocks[0].clone()).unwrap().is_none());
        assert!(assembler.in_progress());
        assert!(assembler.push(blocks[1].clone()).unwrap().is_none());
        let assembled = assembler.push(blocks[2].clone()).unwrap().unwrap();
        assert_eq!(assembled, msg);
        assert!(!assembler.in_progress());
    }

    #[test]
    fn test_out_of_order_block_rejected() {
        let msg = message(Some(Item::Binary(vec![1; 300])));
        let blocks = split_message(&msg, false).unwrap();
        let mut assembler = MessageAssembler::new(1 << 20);
        assert!(assembler.push(blocks[1].clone()).is_err());
        assert!(!assembler.in_progress());
    }

    #[test]
    fn test_size_limit() {
        let msg = message(Some(Item::Binary(vec![1; 300])));
        let blocks = split_message(&msg, false).unwrap();
        let mut assembler = MessageAssembler::new(100);
        assert!(matches!(
            assembler.push(blocks[0].clone()),
            Err(SecsError::LengthTooLarge(_))
        ));
    }

    #[test]
    fn test_length_byte_range() {
        assert!(!is_valid_length(9));
        assert!(is_valid_length(10));
        assert!(is_valid_length(254));
        assert!(!is_valid_length(255));
    }
}
