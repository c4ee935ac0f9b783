//! Clock helper for S2F17/S2F18 and S2F31
//!
//! GEM transfers time as an ASCII item in one of two layouts:
//!
//! | Type | Layout             | Example            |
//! |------|--------------------|--------------------|
//! | A12  | `YYMMDDhhmmss`     | `261017093005`     |
//! | A16  | `YYYYMMDDhhmmsscc` | `2026101709300542` |
//!
//! `cc` is hundredths of a second. Two-digit years are placed in a
//! 100-year window around the current year.

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, Timelike};
use secs_core::{Item, SecsError, SecsResult};
use std::fmt;

/// TIME item layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockType {
    A12,
    #[default]
    A16,
}

impl ClockType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClockType::A12 => "A12",
            ClockType::A16 => "A16",
        }
    }
}

impl fmt::Display for ClockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A local wall-clock time as exchanged by S2F18 and S2F31
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Clock(NaiveDateTime);

impl Clock {
    pub fn new(datetime: NaiveDateTime) -> Self {
        Self(datetime)
    }

    /// Current local time
    pub fn now() -> Self {
        Self(Local::now().naive_local())
    }

    pub fn datetime(&self) -> NaiveDateTime {
        self.0
    }

    /// `YYYYMMDDhhmmsscc`
    pub fn to_a16(&self) -> Item {
        let hundredths = (self.0.nanosecond() / 10_000_000).min(99);
        Item::Ascii(format!(
            "{}{:02}",
            self.0.format("%Y%m%d%H%M%S"),
            hundredths
        ))
    }

    /// `YYMMDDhhmmss`
    pub fn to_a12(&self) -> Item {
        Item::Ascii(self.0.format("%y%m%d%H%M%S").to_string())
    }

    pub fn to_item(&self, clock_type: ClockType) -> Item {
        match clock_type {
            ClockType::A12 => self.to_a12(),
            ClockType::A16 => self.to_a16(),
        }
    }

    /// Parse an A12 or A16 TIME item
    ///
    /// # Errors
    ///
    /// `Protocol` when the item is not ASCII, has another length, contains
    /// non-digits or names an impossible date.
    pub fn from_ascii(item: &Item) -> SecsResult<Self> {
        let text = item.as_ascii().ok_or_else(|| {
            SecsError::Protocol(format!("TIME must be an ASCII item, got {}", item.format()))
        })?;
        if !text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SecsError::Protocol(format!(
                "TIME \"{}\" contains non-digit characters",
                text
            )));
        }

        let field = |range: std::ops::Range<usize>| -> u32 {
            text[range]
                .bytes()
                .fold(0, |acc, b| acc * 10 + u32::from(b - b'0'))
        };

        let (year, offset) = match text.len() {
            12 => (window_year(field(0..2), Local::now().year()), 2),
            16 => (field(0..4) as i32, 4),
            other => {
                return Err(SecsError::Protocol(format!(
                    "TIME must be 12 or 16 characters, got {}",
                    other
                )));
            }
        };
        let month = field(offset..offset + 2);
        let day = field(offset + 2..offset + 4);
        let hour = field(offset + 4..offset + 6);
        let minute = field(offset + 6..offset + 8);
        let second = field(offset + 8..offset + 10);
        let millis = if text.len() == 16 { field(14..16) * 10 } else { 0 };

        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|date| date.and_hms_milli_opt(hour, minute, second, millis))
            .map(Self)
            .ok_or_else(|| SecsError::Protocol(format!("TIME \"{}\" is not a valid date", text)))
    }
}

impl From<NaiveDateTime> for Clock {
    fn from(datetime: NaiveDateTime) -> Self {
        Self(datetime)
    }
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Expand a two-digit year relative to `current_year`
///
/// Early in a century, 75..=99 still belong to the previous one; late in a
/// century, 00..=24 already belong to the next.
fn window_year(yy: u32, current_year: i32) -> i32 {
    let yy = yy as i32;
    let century = current_year.div_euclid(100) * 100;
    let within = current_year.rem_euclid(100);
    if within < 25 && yy >= 75 {
        century - 100 + yy
    } else if within >= 75 && yy < 25 {
        century + 100 + yy
    } else {
        century + yy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32, ms: u32) -> Clock {
        Clock::new(
            NaiveDate::from_ymd_opt(y, mo, d)
                .unwrap()
                .and_hms_milli_opt(h, mi, s, ms)
                .unwrap(),
        )
    }

    #[test]
    fn test_a16_format() {
        let clock = at(2026, 10, 17, 9, 30, 5, 427);
        assert_eq!(clock.to_a16(), Item::Ascii("2026101709300542".to_string()));
        assert_eq!(clock.to_item(ClockType::A16), clock.to_a16());
    }

    #[test]
    fn test_a12_format() {
        let clock = at(2026, 1, 2, 3, 4, 5, 999);
        assert_eq!(clock.to_a12(), Item::Ascii("260102030405".to_string()));
    }

    #[test]
    fn test_parse_a16() {
        let item = Item::Ascii("1999123123595999".to_string());
        assert_eq!(
            Clock::from_ascii(&item).unwrap(),
            at(1999, 12, 31, 23, 59, 59, 990)
        );
    }

    #[test]
    fn test_parse_a12_uses_window() {
        let item = Item::Ascii("260102030405".to_string());
        let clock = Clock::from_ascii(&item).unwrap();
        assert_eq!(clock.datetime().year() % 100, 26);
        assert_eq!(clock.datetime().month(), 1);
        assert_eq!(clock.datetime().second(), 5);
    }

    #[test]
    fn test_window_year() {
        assert_eq!(window_year(26, 2026), 2026);
        assert_eq!(window_year(99, 2026), 2099);
        assert_eq!(window_year(80, 2010), 1980);
        assert_eq!(window_year(10, 2010), 2010);
        assert_eq!(window_year(5, 2090), 2105);
        assert_eq!(window_year(80, 2090), 2080);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for text in ["20261017", "2026101709300A42", "2026133109300500", "261302030405"] {
            let err = Clock::from_ascii(&Item::Ascii(text.to_string())).unwrap_err();
            assert!(matches!(err, SecsError::Protocol(_)), "{}", text);
        }
        assert!(Clock::from_ascii(&Item::Binary(vec![0x01])).is_err());
    }

    #[test]
    fn test_a16_survives_transfer() {
        let clock = at(2031, 6, 30, 18, 0, 1, 250);
        assert_eq!(Clock::from_ascii(&clock.to_a16()).unwrap(), clock);
    }
}
