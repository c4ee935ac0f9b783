//! HSMS message header (SEMI E37 section 8.2)

use crate::error::{SecsError, SecsResult};

/// Header length in bytes
pub const HSMS_HEADER_LENGTH: usize = 10;

/// Session id carried by control messages
pub const CONTROL_SESSION_ID: u16 = 0xFFFF;

/// Session type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SType {
    Data = 0,
    SelectReq = 1,
    SelectRsp = 2,
    DeselectReq = 3,
    DeselectRsp = 4,
    LinktestReq = 5,
    LinktestRsp = 6,
    RejectReq = 7,
    SeparateReq = 9,
}

impl SType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(SType::Data),
            1 => Some(SType::SelectReq),
            2 => Some(SType::SelectRsp),
            3 => Some(SType::DeselectReq),
            4 => Some(SType::DeselectRsp),
            5 => Some(SType::LinktestReq),
            6 => Some(SType::LinktestRsp),
            7 => Some(SType::RejectReq),
            9 => Some(SType::SeparateReq),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SType::Data => "Data",
            SType::SelectReq => "Select.req",
            SType::SelectRsp => "Select.rsp",
            SType::DeselectReq => "Deselect.req",
            SType::DeselectRsp => "Deselect.rsp",
            SType::LinktestReq => "Linktest.req",
            SType::LinktestRsp => "Linktest.rsp",
            SType::RejectReq => "Reject.req",
            SType::SeparateReq => "Separate.req",
        }
    }

    /// Response type answering this request, if it is one
    pub fn response(&self) -> Option<SType> {
        match self {
            SType::SelectReq => Some(SType::SelectRsp),
            SType::DeselectReq => Some(SType::DeselectRsp),
            SType::LinktestReq => Some(SType::LinktestRsp),
            _ => None,
        }
    }
}

/// Select.rsp status byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectStatus {
    Ok,
    AlreadyActive,
    NotReady,
    Exhausted,
    Other(u8),
}

impl SelectStatus {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => SelectStatus::Ok,
            1 => SelectStatus::AlreadyActive,
            2 => SelectStatus::NotReady,
            3 => SelectStatus::Exhausted,
            other => SelectStatus::Other(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            SelectStatus::Ok => 0,
            SelectStatus::AlreadyActive => 1,
            SelectStatus::NotReady => 2,
            SelectStatus::Exhausted => 3,
            SelectStatus::Other(v) => v,
        }
    }
}

/// Reject.req reason code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RejectReason {
    STypeNotSupported = 1,
    PTypeNotSupported = 2,
    TransactionNotOpen = 3,
    EntityNotSelected = 4,
}

impl RejectReason {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(RejectReason::STypeNotSupported),
            2 => Some(RejectReason::PTypeNotSupported),
            3 => Some(RejectReason::TransactionNotOpen),
            4 => Some(RejectReason::EntityNotSelected),
            _ => None,
        }
    }
}

/// The 10-byte HSMS header
///
/// `byte2`/`byte3` carry W-bit|stream and function for data messages, and
/// status or reason codes for control messages. `s_type` is kept raw so
/// unsupported values can be answered with Reject.req.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HsmsHeader {
    pub session_id: u16,
    pub byte2: u8,
    pub byte3: u8,
    pub p_type: u8,
    pub s_type: u8,
    pub system_bytes: u32,
}

impl HsmsHeader {
    /// Control request header (Select, Deselect, Linktest, Separate)
    pub fn control(s_type: SType, system_bytes: u32) -> Self {
        Self {
            session_id: CONTROL_SESSION_ID,
            byte2: 0,
            byte3: 0,
            p_type: 0,
            s_type: s_type as u8,
            system_bytes,
        }
    }

    /// Response to `request` with the given status byte
    pub fn response(request: &HsmsHeader, s_type: SType, status: u8) -> Self {
        Self {
            session_id: request.session_id,
            byte2: 0,
            byte3: status,
            p_type: 0,
            s_type: s_type as u8,
            system_bytes: request.system_bytes,
        }
    }

    /// Reject.req answering `rejected`
    pub fn reject(rejected: &HsmsHeader, reason: RejectReason) -> Self {
        let byte2 = match reason {
            RejectReason::PTypeNotSupported => rejected.p_type,
            _ => rejected.s_type,
        };
        Self {
            session_id: rejected.session_id,
            byte2,
            byte3: reason as u8,
            p_type: 0,
            s_type: SType::RejectReq as u8,
            system_bytes: rejected.system_bytes,
        }
    }

    /// Data message header
    pub fn data(device_id: u16, stream: u8, function: u8, w_bit: bool, system_bytes: u32) -> Self {
        Self {
            session_id: device_id,
            byte2: (stream & 0x7F) | if w_bit { 0x80 } else { 0 },
            byte3: function,
            p_type: 0,
            s_type: SType::Data as u8,
            system_bytes,
        }
    }

    pub fn stype(&self) -> Option<SType> {
        SType::from_u8(self.s_type)
    }

    pub fn stream(&self) -> u8 {
        self.byte2 & 0x7F
    }

    pub fn function(&self) -> u8 {
        self.byte3
    }

    pub fn w_bit(&self) -> bool {
        self.byte2 & 0x80 != 0
    }

    /// Encode header to bytes
    pub fn encode(&self) -> [u8; HSMS_HEADER_LENGTH] {
        let session = self.session_id.to_be_bytes();
        let system = self.system_bytes.to_be_bytes();
        [
            session[0],
            session[1],
            self.byte2,
            self.byte3,
            self.p_type,
            self.s_type,
            system[0],
            system[1],
            system[2],
            system[3],
        ]
    }

    /// Decode header from bytes
    pub fn decode(bytes: &[u8]) -> SecsResult<Self> {
        if bytes.len() < HSMS_HEADER_LENGTH {
            return Err(SecsError::FrameInvalid(format!(
                "HSMS header needs {} bytes, got {}",
                HSMS_HEADER_LENGTH,
                bytes.len()
            )));
        }
        Ok(Self {
            session_id: u16::from_be_bytes([bytes[0], bytes[1]]),
            byte2: bytes[2],
            byte3: bytes[3],
            p_type: bytes[4],
            s_type: bytes[5],
            system_bytes: u32::from_be_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_header_encode() {
        let header = HsmsHeader::control(SType::SelectReq, 0x0000_0102);
        assert_eq!(header.encode(), [0xFF, 0xFF, 0, 0, 0, 1, 0, 0, 1, 2]);
        assert_eq!(HsmsHeader::decode(&header.encode()).unwrap(), header);
    }

    #[test]
    fn test_data_header_fields() {
        let header = HsmsHeader::data(10, 1, 13, true, 7);
        assert_eq!(header.encode(), [0, 10, 0x81, 13, 0, 0, 0, 0, 0, 7]);
        assert_eq!(header.stream(), 1);
        assert!(header.w_bit());
        assert_eq!(header.stype(), Some(SType::Data));
    }

    #[test]
    fn test_reject_header() {
        let bad = HsmsHeader {
            session_id: 1,
            byte2: 0,
            byte3: 0,
            p_type: 3,
            s_type: 0,
            system_bytes: 9,
        };
        let reject = HsmsHeader::reject(&bad, RejectReason::PTypeNotSupported);
        assert_eq!(reject.byte2, 3);
        assert_eq!(reject.byte3, 2);
        assert_eq!(reject.stype(), Some(SType::RejectReq));
        assert_eq!(reject.system_bytes, 9);

        let unknown = HsmsHeader { s_type: 8, p_type: 0, ..bad };
        assert_eq!(unknown.stype(), None);
        assert_eq!(HsmsHeader::reject(&unknown, RejectReason::STypeNotSupported).byte2, 8);
    }

    #[test]
    fn test_select_status() {
        assert_eq!(SelectStatus::from_u8(1), SelectStatus::AlreadyActive);
        assert_eq!(SelectStatus::from_u8(9).to_u8(), 9);
        assert_eq!(SType::LinktestReq.response(), Some(SType::LinktestRsp));
        assert!(HsmsHeader::decode(&[0; 9]).is_err());
    }
}
