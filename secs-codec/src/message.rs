//! SECS message envelope

use crate::error::{SecsError, SecsResult};
use crate::secs2;
use crate::sml;
use bytes::{BufMut, BytesMut};
use secs_core::Item;
use std::fmt;

/// Leading marker byte of the in-memory message buffer
pub const MESSAGE_MARKER: u8 = 0x02;

/// Largest stream number (7 bits)
pub const MAX_STREAM: u32 = 0x7F;

/// Largest function number
pub const MAX_FUNCTION: u32 = 0xFF;

/// Largest device id (15 bits)
pub const MAX_DEVICE_ID: u16 = 0x7FFF;

/// A SECS message `S<stream>F<function>` with optional body
///
/// Immutable once built. `system_bytes` correlate a primary message with its
/// reply; the session layer assigns them when sending.
#[derive(Debug, Clone, PartialEq)]
pub struct SecsMessage {
    stream: u8,
    function: u8,
    w_bit: bool,
    body: Option<Item>,
    system_bytes: u32,
    device_id: u16,
}

impl SecsMessage {
    /// Create a new message
    ///
    /// # Errors
    ///
    /// `InvalidMessage` when stream > 127, function > 255 or device id > 0x7FFF.
    pub fn new(
        stream: u32,
        function: u32,
        w_bit: bool,
        body: Option<Item>,
        system_bytes: u32,
        device_id: u16,
    ) -> SecsResult<Self> {
        if stream > MAX_STREAM {
            return Err(SecsError::InvalidMessage(format!(
                "stream {} out of range 0..=127",
                stream
            )));
        }
        if function > MAX_FUNCTION {
            return Err(SecsError::InvalidMessage(format!(
                "function {} out of range 0..=255",
                function
            )));
        }
        if device_id > MAX_DEVICE_ID {
            return Err(SecsError::InvalidMessage(format!(
                "device id {} out of range 0..=32767",
                device_id
            )));
        }
        Ok(Self {
            stream: stream as u8,
            function: function as u8,
            w_bit,
            body,
            system_bytes,
            device_id,
        })
    }

    /// Build the reply to `primary`: same system bytes and device id, no W-bit
    pub fn reply_to(
        primary: &SecsMessage,
        stream: u32,
        function: u32,
        body: Option<Item>,
    ) -> SecsResult<Self> {
        Self::new(stream, function, false, body, primary.system_bytes, primary.device_id)
    }

    pub fn stream(&self) -> u8 {
        self.stream
    }

    pub fn function(&self) -> u8 {
        self.function
    }

    pub fn w_bit(&self) -> bool {
        self.w_bit
    }

    pub fn body(&self) -> Option<&Item> {
        self.body.as_ref()
    }

    pub fn into_body(self) -> Option<Item> {
        self.body
    }

    pub fn system_bytes(&self) -> u32 {
        self.system_bytes
    }

    pub fn device_id(&self) -> u16 {
        self.device_id
    }

    /// Odd function numbers are primary messages
    pub fn is_primary(&self) -> bool {
        self.function % 2 == 1
    }

    /// Copy with new system bytes and device id
    pub fn with_routing(&self, system_bytes: u32, device_id: u16) -> SecsResult<Self> {
        Self::new(
            self.stream as u32,
            self.function as u32,
            self.w_bit,
            self.body.clone(),
            system_bytes,
            device_id,
        )
    }

    /// Encoded body, empty when there is none
    pub fn encode_body(&self) -> SecsResult<Vec<u8>> {
        match &self.body {
            Some(item) => secs2::encode(item),
            None => Ok(Vec::new()),
        }
    }

    /// Serialize to `[0x02, stream, function, W, system(4), device(4), body]`
    pub fn to_buffer(&self) -> SecsResult<Vec<u8>> {
        let body = self.encode_body()?;
        let mut buf = BytesMut::with_capacity(12 + body.len());
        buf.put_u8(MESSAGE_MARKER);
        buf.put_u8(self.stream);
        buf.put_u8(self.function);
        buf.put_u8(if self.w_bit { 0x80 } else { 0x00 });
        buf.put_u32(self.system_bytes);
        buf.put_u32(self.device_id as u32);
        buf.put_slice(&body);
        Ok(buf.to_vec())
    }

    /// Parse the form produced by [`SecsMessage::to_buffer`]
    pub fn from_buffer(bytes: &[u8]) -> SecsResult<Self> {
        if bytes.len() < 12 || bytes[0] != MESSAGE_MARKER {
            return Err(SecsError::FrameInvalid(
                "message buffer shorter than 12 bytes or missing marker".to_string(),
            ));
        }
        let system_bytes = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let device_id = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let device_id = u16::try_from(device_id)
            .map_err(|_| SecsError::InvalidMessage(format!("device id {} out of range", device_id)))?;
        let body = secs2::decode_body(&bytes[12..])?;
        Self::new(
            bytes[1] as u32,
            bytes[2] as u32,
            bytes[3] & 0x80 != 0,
            body,
            system_bytes,
            device_id,
        )
    }

    /// The 10-byte SECS header, used as the error reference in S9 messages
    pub fn header_10_bytes(&self) -> [u8; 10] {
        let device = (self.device_id & MAX_DEVICE_ID).to_be_bytes();
        let system = self.system_bytes.to_be_bytes();
        [
            device[0],
            device[1],
            self.stream | if self.w_bit { 0x80 } else { 0x00 },
            self.function,
            0x00,
            0x00,
            system[0],
            system[1],
            system[2],
            system[3],
        ]
    }

    /// `S<s>F<f>[ W]` followed by the body SML and a terminating `.`
    pub fn to_sml(&self) -> String {
        match &self.body {
            Some(item) => format!("{}\n{}.", self, sml::to_sml(item)),
            None => format!("{}.", self),
        }
    }
}

impl fmt::Display for SecsMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}F{}", self.stream, self.function)?;
        if self.w_bit {
            f.write_str(" W")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_validation() {
        assert!(SecsMessage::new(128, 1, false, None, 0, 0).is_err());
        assert!(SecsMessage::new(1, 256, false, None, 0, 0).is_err());
        assert!(SecsMessage::new(1, 1, false, None, 0, 0x8000).is_err());
        assert!(SecsMessage::new(127, 255, true, None, u32::MAX, 0x7FFF).is_ok());
    }

    #[test]
    fn test_to_buffer_layout() {
        let msg = SecsMessage::new(1, 13, true, Some(Item::List(vec![])), 0x01020304, 10).unwrap();
        assert_eq!(
            msg.to_buffer().unwrap(),
            vec![0x02, 1, 13, 0x80, 1, 2, 3, 4, 0, 0, 0, 10, 0x01, 0x00]
        );
        assert_eq!(SecsMessage::from_buffer(&msg.to_buffer().unwrap()).unwrap(), msg);
    }

    #[test]
    fn test_header_10_bytes() {
        let msg = SecsMessage::new(6, 11, true, None, 0xAABBCCDD, 0x1234).unwrap();
        assert_eq!(
            msg.header_10_bytes(),
            [0x12, 0x34, 0x86, 11, 0, 0, 0xAA, 0xBB, 0xCC, 0xDD]
        );
    }

    #[test]
    fn test_to_sml() {
        let msg = SecsMessage::new(1, 13, true, None, 0, 0).unwrap();
        assert_eq!(msg.to_sml(), "S1F13 W.");
        let msg = SecsMessage::new(1, 14, false, Some(Item::Binary(vec![0])), 0, 0).unwrap();
        assert_eq!(msg.to_sml(), "S1F14\n<B [1] 0x00>.");
        assert_eq!(sml::parse_message(&msg.to_sml()).unwrap().body(), msg.body());
    }

    #[test]
    fn test_reply_to_reuses_routing() {
        let primary = SecsMessage::new(2, 17, true, None, 77, 3).unwrap();
        let reply = SecsMessage::reply_to(&primary, 2, 18, None).unwrap();
        assert_eq!(reply.system_bytes(), 77);
        assert_eq!(reply.device_id(), 3);
        assert!(!reply.w_bit());
        assert!(!reply.is_primary());
        assert!(primary.is_primary());
    }
}
