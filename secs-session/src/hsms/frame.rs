//! HSMS frame encoding and incremental decoding

use crate::error::{SecsError, SecsResult, Timer};
use crate::hsms::header::{HSMS_HEADER_LENGTH, HsmsHeader, SType};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use secs_codec::{SecsMessage, secs2};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

/// One HSMS message: header plus (possibly empty) body
#[derive(Debug, Clone, PartialEq)]
pub struct HsmsFrame {
    pub header: HsmsHeader,
    pub body: Bytes,
}

impl HsmsFrame {
    pub fn control(header: HsmsHeader) -> Self {
        Self {
            header,
            body: Bytes::new(),
        }
    }

    /// Data frame carrying `message`
    pub fn data(message: &SecsMessage) -> SecsResult<Self> {
        Ok(Self {
            header: HsmsHeader::data(
                message.device_id(),
                message.stream(),
                message.function(),
                message.w_bit(),
                message.system_bytes(),
            ),
            body: Bytes::from(message.encode_body()?),
        })
    }

    /// Encode with the 4-byte length prefix
    pub fn encode(&self) -> Vec<u8> {
        let length = HSMS_HEADER_LENGTH + self.body.len();
        let mut buf = BytesMut::with_capacity(4 + length);
        buf.put_u32(length as u32);
        buf.put_slice(&self.header.encode());
        buf.put_slice(&self.body);
        buf.to_vec()
    }

    /// Interpret a data frame as a SECS message
    pub fn to_message(&self) -> SecsResult<SecsMessage> {
        if self.header.stype() != Some(SType::Data) {
            return Err(SecsError::Protocol(format!(
                "S-Type {} is not a data message",
                self.header.s_type
            )));
        }
        let body = secs2::decode_body(&self.body)?;
        SecsMessage::new(
            self.header.stream() as u32,
            self.header.function() as u32,
            self.header.w_bit(),
            body,
            self.header.system_bytes,
            self.header.session_id,
        )
    }
}

/// Accumulates socket bytes into frames
///
/// Reads are cancel-safe: partially received frames stay buffered across
/// dropped `read_frame` futures.
#[derive(Debug)]
pub struct HsmsFrameDecoder {
    buffer: BytesMut,
    max_frame_size: usize,
}

impl HsmsFrameDecoder {
    /// `max_body_size` bounds the body; the header is added on top
    pub fn new(max_body_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            max_frame_size: max_body_size.saturating_add(HSMS_HEADER_LENGTH),
        }
    }

    /// True while a frame has been started but not completed
    pub fn has_partial(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Append raw bytes
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Take one complete frame out of the buffer, if there is one
    pub fn decode(&mut self) -> SecsResult<Option<HsmsFrame>> {
        if self.buffer.len() < 4 {
            return Ok(None);
        }
        let length = u32::from_be_bytes([
            self.buffer[0],
            self.buffer[1],
            self.buffer[2],
            self.buffer[3],
        ]) as usize;
        if length < HSMS_HEADER_LENGTH {
            return Err(SecsError::FrameInvalid(format!(
                "message length {} shorter than header",
                length
            )));
        }
        if length > self.max_frame_size {
            return Err(SecsError::FrameInvalid(format!(
                "message length {} exceeds limit {}",
                length, self.max_frame_size
            )));
        }
        if self.buffer.len() < 4 + length {
            return Ok(None);
        }
        self.buffer.advance(4);
        let mut frame = self.buffer.split_to(length);
        let header = HsmsHeader::decode(&frame[..HSMS_HEADER_LENGTH])?;
        frame.advance(HSMS_HEADER_LENGTH);
        Ok(Some(HsmsFrame {
            header,
            body: frame.freeze(),
        }))
    }

    /// Read until one frame is complete
    ///
    /// Returns `Ok(None)` on a clean EOF between frames. Once a frame has
    /// started, each further chunk must arrive within `t8`.
    pub async fn read_frame<R: AsyncRead + Unpin>(
        &mut self,
        reader: &mut R,
        t8: Duration,
    ) -> SecsResult<Option<HsmsFrame>> {
        loop {
            if let Some(frame) = self.decode()? {
                return Ok(Some(frame));
            }
            let n = if self.buffer.is_empty() {
                reader.read_buf(&mut self.buffer).await?
            } else {
                tokio::time::timeout(t8, reader.read_buf(&mut self.buffer))
                    .await
                    .map_err(|_| SecsError::Timeout(Timer::T8))??
            };
            if n == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(SecsError::ConnectionLost);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hsms::header::SType;
    use secs_core::Item;

    fn sample() -> HsmsFrame {
        let msg = SecsMessage::new(1, 13, true, Some(Item::List(vec![])), 5, 10).unwrap();
        HsmsFrame::data(&msg).unwrap()
    }

    #[test]
    fn test_encode_layout() {
        let bytes = sample().encode();
        assert_eq!(
            bytes,
            vec![0, 0, 0, 12, 0, 10, 0x81, 13, 0, 0, 0, 0, 0, 5, 0x01, 0x00]
        );
    }

    #[test]
    fn test_decode_split_input() {
        let bytes = sample().encode();
        let mut decoder = HsmsFrameDecoder::new(1024);
        decoder.extend(&bytes[..7]);
        assert!(decoder.decode().unwrap().is_none());
        assert!(decoder.has_partial());
        decoder.extend(&bytes[7..]);
        let frame = decoder.decode().unwrap().unwrap();
        assert_eq!(frame, sample());
        assert!(!decoder.has_partial());
        let msg = frame.to_message().unwrap();
        assert_eq!(msg.device_id(), 10);
        assert_eq!(msg.body(), Some(&Item::List(vec![])));
    }

    #[test]
    fn test_decode_rejects_bad_lengths() {
        let mut decoder = HsmsFrameDecoder::new(1024);
        decoder.extend(&[0, 0, 0, 9]);
        assert!(decoder.decode().is_err());
        let mut decoder = HsmsFrameDecoder::new(16);
        decoder.extend(&[0, 0, 1, 0]);
        assert!(matches!(decoder.decode(), Err(SecsError::FrameInvalid(_))));
    }

    #[tokio::test]
    async fn test_read_frame_from_chunks() {
        let control = HsmsFrame::control(HsmsHeader::control(SType::LinktestReq, 3)).encode();
        let data = sample().encode();
        let mut reader = tokio_test::io::Builder::new()
            .read(&control[..3])
            .read(&control[3..])
            .read(&data)
            .build();
        let mut decoder = HsmsFrameDecoder::new(1024);
        let first = decoder
            .read_frame(&mut reader, Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.header.stype(), Some(SType::LinktestReq));
        let second = decoder
            .read_frame(&mut reader, Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second, sample());
        assert!(decoder
            .read_frame(&mut reader, Duration::from_secs(5))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_eof_inside_frame() {
        let data = sample().encode();
        let mut reader = tokio_test::io::Builder::new().read(&data[..8]).build();
        let mut decoder = HsmsFrameDecoder::new(1024);
        assert!(matches!(
            decoder.read_frame(&mut reader, Duration::from_secs(5)).await,
            Err(SecsError::ConnectionLost)
        ));
    }
}
