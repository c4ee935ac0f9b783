//! Error types re-exported from secs-core

pub use secs_core::error::{ErrorCategory, SecsError, SecsResult, Timer};
