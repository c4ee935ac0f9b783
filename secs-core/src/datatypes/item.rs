//! SECS-II data item tree

use crate::datatypes::format::ItemFormat;
use crate::error::{SecsError, SecsResult};
use serde::{Deserialize, Serialize};

/// Largest value the 3-byte length field can carry
pub const MAX_ITEM_LENGTH: usize = 0xFF_FFFF;

/// SECS-II data item
///
/// One variant per SEMI E5 format. Values are held in their native width,
/// so a `U1` item can never carry 256 or -1. Lists nest to any depth.
///
/// Prefer the checked constructors (`Item::list`, `Item::ascii`, ...) which
/// enforce the 3-byte length limit and the ASCII character range. Items
/// built from the variants directly are re-checked by the encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Item {
    List(Vec<Item>),
    Binary(#[serde(with = "serde_bytes")] Vec<u8>),
    Boolean(Vec<bool>),
    Ascii(String),
    I1(Vec<i8>),
    I2(Vec<i16>),
    I4(Vec<i32>),
    I8(Vec<i64>),
    U1(Vec<u8>),
    U2(Vec<u16>),
    U4(Vec<u32>),
    U8(Vec<u64>),
    F4(Vec<f32>),
    F8(Vec<f64>),
}

/// Read-only view of one element of an item
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Element<'a> {
    Item(&'a Item),
    Char(char),
    Byte(u8),
    Bool(bool),
    Signed(i64),
    Unsigned(u64),
    Float(f64),
}

impl<'a> Element<'a> {
    pub fn as_item(&self) -> Option<&'a Item> {
        match self {
            Element::Item(item) => Some(item),
            _ => None,
        }
    }

    /// Integer value of a signed, unsigned or byte element
    pub fn as_i128(&self) -> Option<i128> {
        match *self {
            Element::Signed(v) => Some(v as i128),
            Element::Unsigned(v) => Some(v as i128),
            Element::Byte(v) => Some(v as i128),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Element::Float(v) => Some(v),
            _ => None,
        }
    }
}

fn check_length(length: usize) -> SecsResult<()> {
    if length > MAX_ITEM_LENGTH {
        return Err(SecsError::LengthTooLarge(length));
    }
    Ok(())
}

fn narrow<T: TryFrom<i128>>(format: ItemFormat, values: &[i128]) -> SecsResult<Vec<T>> {
    values
        .iter()
        .map(|&v| {
            T::try_from(v).map_err(|_| {
                SecsError::ValueOutOfRange(format!("{} does not fit in {}", v, format))
            })
        })
        .collect()
}

impl Item {
    /// Create a list item
    pub fn list(items: Vec<Item>) -> SecsResult<Self> {
        check_length(items.len())?;
        Ok(Item::List(items))
    }

    /// Create an ASCII item; every character must be 7-bit ASCII
    pub fn ascii(value: impl Into<String>) -> SecsResult<Self> {
        let value = value.into();
        if !value.is_ascii() {
            return Err(SecsError::InvalidItem(format!(
                "ASCII item contains non-ASCII characters: {:?}",
                value
            )));
        }
        check_length(value.len())?;
        Ok(Item::Ascii(value))
    }

    pub fn binary(value: Vec<u8>) -> SecsResult<Self> {
        check_length(value.len())?;
        Ok(Item::Binary(value))
    }

    pub fn boolean(value: Vec<bool>) -> SecsResult<Self> {
        check_length(value.len())?;
        Ok(Item::Boolean(value))
    }

    pub fn u1(value: Vec<u8>) -> SecsResult<Self> {
        check_length(value.len())?;
        Ok(Item::U1(value))
    }

    pub fn u2(value: Vec<u16>) -> SecsResult<Self> {
        check_length(value.len() * 2)?;
        Ok(Item::U2(value))
    }

    pub fn u4(value: Vec<u32>) -> SecsResult<Self> {
        check_length(value.len() * 4)?;
        Ok(Item::U4(value))
    }

    pub fn u8(value: Vec<u64>) -> SecsResult<Self> {
        check_length(value.len() * 8)?;
        Ok(Item::U8(value))
    }

    pub fn i1(value: Vec<i8>) -> SecsResult<Self> {
        check_length(value.len())?;
        Ok(Item::I1(value))
    }

    pub fn i2(value: Vec<i16>) -> SecsResult<Self> {
        check_length(value.len() * 2)?;
        Ok(Item::I2(value))
    }

    pub fn i4(value: Vec<i32>) -> SecsResult<Self> {
        check_length(value.len() * 4)?;
        Ok(Item::I4(value))
    }

    pub fn i8(value: Vec<i64>) -> SecsResult<Self> {
        check_length(value.len() * 8)?;
        Ok(Item::I8(value))
    }

    pub fn f4(value: Vec<f32>) -> SecsResult<Self> {
        check_length(value.len() * 4)?;
        Ok(Item::F4(value))
    }

    pub fn f8(value: Vec<f64>) -> SecsResult<Self> {
        check_length(value.len() * 8)?;
        Ok(Item::F8(value))
    }

    /// Build an integer item of `format`, rejecting values outside its range
    ///
    /// # Errors
    ///
    /// `ValueOutOfRange` if any value does not fit, `InvalidItem` if
    /// `format` is not an integer format.
    pub fn from_integers(format: ItemFormat, values: &[i128]) -> SecsResult<Self> {
        match format {
            ItemFormat::I1 => Item::i1(narrow(format, values)?),
            ItemFormat::I2 => Item::i2(narrow(format, values)?),
            ItemFormat::I4 => Item::i4(narrow(format, values)?),
            ItemFormat::I8 => Item::i8(narrow(format, values)?),
            ItemFormat::U1 => Item::u1(narrow(format, values)?),
            ItemFormat::U2 => Item::u2(narrow(format, values)?),
            ItemFormat::U4 => Item::u4(narrow(format, values)?),
            ItemFormat::U8 => Item::u8(narrow(format, values)?),
            other => Err(SecsError::InvalidItem(format!(
                "{} is not an integer format",
                other
            ))),
        }
    }

    /// Build a float item of `format`
    ///
    /// F4 accepts fractional values; a finite value too large for `f32`
    /// is rejected instead of silently becoming infinite.
    pub fn from_floats(format: ItemFormat, values: &[f64]) -> SecsResult<Self> {
        match format {
            ItemFormat::F8 => Item::f8(values.to_vec()),
            ItemFormat::F4 => {
                let narrowed = values
                    .iter()
                    .map(|&v| {
                        let f = v as f32;
                        if v.is_finite() && !f.is_finite() {
                            Err(SecsError::ValueOutOfRange(format!(
                                "{} does not fit in F4",
                                v
                            )))
                        } else {
                            Ok(f)
                        }
                    })
                    .collect::<SecsResult<Vec<f32>>>()?;
                Item::f4(narrowed)
            }
            other => Err(SecsError::InvalidItem(format!(
                "{} is not a float format",
                other
            ))),
        }
    }

    pub fn format(&self) -> ItemFormat {
        match self {
            Item::List(_) => ItemFormat::List,
            Item::Binary(_) => ItemFormat::Binary,
            Item::Boolean(_) => ItemFormat::Boolean,
            Item::Ascii(_) => ItemFormat::Ascii,
            Item::I1(_) => ItemFormat::I1,
            Item::I2(_) => ItemFormat::I2,
            Item::I4(_) => ItemFormat::I4,
            Item::I8(_) => ItemFormat::I8,
            Item::U1(_) => ItemFormat::U1,
            Item::U2(_) => ItemFormat::U2,
            Item::U4(_) => ItemFormat::U4,
            Item::U8(_) => ItemFormat::U8,
            Item::F4(_) => ItemFormat::F4,
            Item::F8(_) => ItemFormat::F8,
        }
    }

    /// Number of elements (children for a list, characters for ASCII)
    pub fn len(&self) -> usize {
        match self {
            Item::List(v) => v.len(),
            Item::Binary(v) => v.len(),
            Item::Boolean(v) => v.len(),
            Item::Ascii(v) => v.len(),
            Item::I1(v) => v.len(),
            Item::I2(v) => v.len(),
            Item::I4(v) => v.len(),
            Item::I8(v) => v.len(),
            Item::U1(v) => v.len(),
            Item::U2(v) => v.len(),
            Item::U4(v) => v.len(),
            Item::U8(v) => v.len(),
            Item::F4(v) => v.len(),
            Item::F8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value written into the item header: element count for lists, byte count otherwise
    pub fn length_field(&self) -> usize {
        match self {
            Item::List(v) => v.len(),
            _ => self.len() * self.format().element_size(),
        }
    }

    /// Indexed element access; `None` when `index` is out of range
    pub fn element_at(&self, index: usize) -> Option<Element<'_>> {
        match self {
            Item::List(v) => v.get(index).map(Element::Item),
            Item::Binary(v) => v.get(index).copied().map(Element::Byte),
            Item::Boolean(v) => v.get(index).copied().map(Element::Bool),
            Item::Ascii(v) => v.as_bytes().get(index).map(|&b| Element::Char(b as char)),
            Item::I1(v) => v.get(index).map(|&x| Element::Signed(x as i64)),
            Item::I2(v) => v.get(index).map(|&x| Element::Signed(x as i64)),
            Item::I4(v) => v.get(index).map(|&x| Element::Signed(x as i64)),
            Item::I8(v) => v.get(index).map(|&x| Element::Signed(x)),
            Item::U1(v) => v.get(index).map(|&x| Element::Unsigned(x as u64)),
            Item::U2(v) => v.get(index).map(|&x| Element::Unsigned(x as u64)),
            Item::U4(v) => v.get(index).map(|&x| Element::Unsigned(x as u64)),
            Item::U8(v) => v.get(index).map(|&x| Element::Unsigned(x)),
            Item::F4(v) => v.get(index).map(|&x| Element::Float(x as f64)),
            Item::F8(v) => v.get(index).map(|&x| Element::Float(x)),
        }
    }

    pub fn as_list(&self) -> Option<&[Item]> {
        match self {
            Item::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_ascii(&self) -> Option<&str> {
        match self {
            Item::Ascii(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Item::Binary(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_booleans(&self) -> Option<&[bool]> {
        match self {
            Item::Boolean(v) => Some(v),
            _ => None,
        }
    }

    /// Check the length limit over the whole tree
    pub fn validate(&self) -> SecsResult<()> {
        check_length(self.length_field())?;
        match self {
            Item::List(items) => items.iter().try_for_each(Item::validate),
            Item::Ascii(s) if !s.is_ascii() => Err(SecsError::InvalidItem(
                "ASCII item contains non-ASCII characters".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_range_checks() {
        assert!(matches!(
            Item::from_integers(ItemFormat::U1, &[-1]),
            Err(SecsError::ValueOutOfRange(_))
        ));
        assert!(Item::from_integers(ItemFormat::U1, &[256]).is_err());
        assert!(Item::from_integers(ItemFormat::I1, &[-129]).is_err());
        assert_eq!(
            Item::from_integers(ItemFormat::I2, &[-32768, 32767]).unwrap(),
            Item::I2(vec![-32768, 32767])
        );
        assert_eq!(
            Item::from_integers(ItemFormat::U8, &[u64::MAX as i128]).unwrap(),
            Item::U8(vec![u64::MAX])
        );
        assert!(Item::from_integers(ItemFormat::F4, &[1]).is_err());
    }

    #[test]
    fn test_f4_accepts_fractions() {
        let item = Item::from_floats(ItemFormat::F4, &[3.14, -6.18]).unwrap();
        assert_eq!(item, Item::F4(vec![3.14, -6.18]));
        assert!(Item::from_floats(ItemFormat::F4, &[1e300]).is_err());
        assert!(Item::from_floats(ItemFormat::F4, &[f64::INFINITY]).is_ok());
    }

    #[test]
    fn test_ascii_rejects_non_ascii() {
        assert!(Item::ascii("hello").is_ok());
        assert!(matches!(Item::ascii("héllo"), Err(SecsError::InvalidItem(_))));
    }

    #[test]
    fn test_length_limit() {
        assert!(Item::binary(vec![0; MAX_ITEM_LENGTH]).is_ok());
        assert!(matches!(
            Item::binary(vec![0; MAX_ITEM_LENGTH + 1]),
            Err(SecsError::LengthTooLarge(_))
        ));
        assert!(Item::u4(vec![0; MAX_ITEM_LENGTH / 4 + 1]).is_err());
    }

    #[test]
    fn test_element_access() {
        let item = Item::List(vec![
            Item::Ascii("AB".into()),
            Item::U2(vec![7, 9]),
            Item::Boolean(vec![true]),
        ]);
        assert_eq!(item.len(), 3);
        assert_eq!(item.length_field(), 3);
        let ascii = item.element_at(0).and_then(|e| e.as_item()).unwrap();
        assert_eq!(ascii.element_at(1), Some(Element::Char('B')));
        let u2 = item.element_at(1).and_then(|e| e.as_item()).unwrap();
        assert_eq!(u2.length_field(), 4);
        assert_eq!(u2.element_at(1).and_then(|e| e.as_i128()), Some(9));
        assert_eq!(item.element_at(3), None);
        assert_eq!(Item::F8(vec![]).element_at(0), None);
    }

    #[test]
    fn test_serde_round_trip() {
        let item = Item::List(vec![Item::Binary(vec![1, 2]), Item::F8(vec![0.5])]);
        let json = serde_json::to_string(&item).unwrap();
        let back: Item = serde_json::from_str(&json).unwrap();
        assert_eq!(back, item);
    }
}
