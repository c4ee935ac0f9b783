//! SECS-II format codes

use crate::error::{SecsError, SecsResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SECS-II item format code (SEMI E5 Table 1)
///
/// The discriminant is the format byte with the two length-width bits
/// cleared, so `code() | width` yields the on-wire format byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ItemFormat {
    List = 0x00,
    Binary = 0x20,
    Boolean = 0x24,
    Ascii = 0x40,
    I8 = 0x60,
    I1 = 0x64,
    I2 = 0x68,
    I4 = 0x70,
    F8 = 0x80,
    F4 = 0x90,
    U8 = 0xA0,
    U1 = 0xA4,
    U2 = 0xA8,
    U4 = 0xB0,
}

impl ItemFormat {
    pub const ALL: [ItemFormat; 14] = [
        ItemFormat::List,
        ItemFormat::Binary,
        ItemFormat::Boolean,
        ItemFormat::Ascii,
        ItemFormat::I8,
        ItemFormat::I1,
        ItemFormat::I2,
        ItemFormat::I4,
        ItemFormat::F8,
        ItemFormat::F4,
        ItemFormat::U8,
        ItemFormat::U1,
        ItemFormat::U2,
        ItemFormat::U4,
    ];

    /// Format code with the length-width bits cleared
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Parse a format byte, ignoring its two length-width bits
    pub fn from_code(byte: u8) -> SecsResult<Self> {
        match byte & 0xFC {
            0x00 => Ok(ItemFormat::List),
            0x20 => Ok(ItemFormat::Binary),
            0x24 => Ok(ItemFormat::Boolean),
            0x40 => Ok(ItemFormat::Ascii),
            0x60 => Ok(ItemFormat::I8),
            0x64 => Ok(ItemFormat::I1),
            0x68 => Ok(ItemFormat::I2),
            0x70 => Ok(ItemFormat::I4),
            0x80 => Ok(ItemFormat::F8),
            0x90 => Ok(ItemFormat::F4),
            0xA0 => Ok(ItemFormat::U8),
            0xA4 => Ok(ItemFormat::U1),
            0xA8 => Ok(ItemFormat::U2),
            0xB0 => Ok(ItemFormat::U4),
            code => Err(SecsError::Decode(format!(
                "Unknown format code: 0x{:02X}",
                code
            ))),
        }
    }

    /// Size in bytes of one element; lists count items, not bytes
    pub fn element_size(&self) -> usize {
        match self {
            ItemFormat::List => 1,
            ItemFormat::Binary | ItemFormat::Boolean | ItemFormat::Ascii => 1,
            ItemFormat::I1 | ItemFormat::U1 => 1,
            ItemFormat::I2 | ItemFormat::U2 => 2,
            ItemFormat::I4 | ItemFormat::U4 | ItemFormat::F4 => 4,
            ItemFormat::I8 | ItemFormat::U8 | ItemFormat::F8 => 8,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            ItemFormat::I1 | ItemFormat::I2 | ItemFormat::I4 | ItemFormat::I8
        )
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(
            self,
            ItemFormat::U1 | ItemFormat::U2 | ItemFormat::U4 | ItemFormat::U8
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, ItemFormat::F4 | ItemFormat::F8)
    }

    /// Keyword used in SML text
    pub fn sml_name(&self) -> &'static str {
        match self {
            ItemFormat::List => "L",
            ItemFormat::Binary => "B",
            ItemFormat::Boolean => "BOOLEAN",
            ItemFormat::Ascii => "A",
            ItemFormat::I8 => "I8",
            ItemFormat::I1 => "I1",
            ItemFormat::I2 => "I2",
            ItemFormat::I4 => "I4",
            ItemFormat::F8 => "F8",
            ItemFormat::F4 => "F4",
            ItemFormat::U8 => "U8",
            ItemFormat::U1 => "U1",
            ItemFormat::U2 => "U2",
            ItemFormat::U4 => "U4",
        }
    }

    /// Resolve an SML keyword (case-insensitive)
    pub fn from_sml_name(name: &str) -> Option<Self> {
        let upper = name.to_ascii_uppercase();
        match upper.as_str() {
            "BOOL" => Some(ItemFormat::Boolean),
            _ => ItemFormat::ALL
                .iter()
                .copied()
                .find(|f| f.sml_name() == upper),
        }
    }
}

impl fmt::Display for ItemFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sml_name())
    }
}
