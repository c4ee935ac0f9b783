//! SECS-II data item types

pub mod format;
pub mod item;

pub use format::ItemFormat;
pub use item::{Element, Item, MAX_ITEM_LENGTH};
