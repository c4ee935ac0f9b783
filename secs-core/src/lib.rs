//! Core types and utilities for SECS/GEM protocols
//!
//! This crate provides the error taxonomy and the SECS-II item model
//! shared by the codec, transport, session and GEM crates.

pub mod error;
pub mod datatypes;

pub use error::{ErrorCategory, SecsError, SecsResult, Timer};
pub use datatypes::{Element, Item, ItemFormat, MAX_ITEM_LENGTH};
