//! secs - Rust implementation of the SECS/GEM protocol family
//!
//! This library implements the SEMI communication standards used between a
//! factory host and semiconductor equipment.
//!
//! # Architecture
//!
//! This library is organized as a workspace with multiple crates:
//!
//! - `secs-core`: Error taxonomy and the SECS-II item model
//! - `secs-codec`: SECS-II binary codec, SML text format, `SecsMessage`
//! - `secs-transport`: Transport layer (TCP, Serial)
//! - `secs-session`: Session layer (HSMS, SECS-I, reply correlation)
//! - `secs-gem`: GEM helpers (S1F13, S2F17, S9Fx, clock)
//!
//! # Implementation Status
//!
//! ## ✅ 已完成
//! - SECS-II 数据项（全部 SEMI E5 格式，JIS-8/C2 除外）
//! - SECS-II 二进制编码/解码、SML 解析与输出
//! - HSMS-SS（Active/Passive，控制消息，T3/T5/T6/T7/T8）
//! - SECS-I（串口、TCP Active/Passive，块协议与重试）
//! - GEM 常用消息（S1F13-S1F18，S2F17/S2F18，S2F31/S2F32，S9Fx）
//!
//! ## 📋 待实现
//! - HSMS-GS 多会话
//!
//! # Usage
//!
//! ```no_run
//! use secs::session::{Communicator, CommunicatorBuilder};
//!
//! # async fn demo() -> secs::SecsResult<()> {
//! let host = CommunicatorBuilder::new()
//!     .tcp("127.0.0.1:5000")
//!     .device_id(10)
//!     .build_hsms_active()?;
//! host.open().await?;
//! let reply = host.send(1, 1, true, None).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Demos
//!
//! See the `examples/` directory of this crate: `hsms_equipment`,
//! `hsms_host` and `secs1_tcp_passive`.

// Re-export core types
pub use secs_core::{Element, ErrorCategory, Item, ItemFormat, SecsError, SecsResult, Timer};
pub use secs_codec::{SecsMessage, parse_item, parse_message, to_sml};

// Re-export the binary codec
pub mod codec {
    pub use secs_codec::*;
}

// Re-export transports
pub mod transport {
    pub use secs_transport::*;
}

// Re-export communicators
pub mod session {
    pub use secs_session::*;
}

// Re-export GEM helpers
pub mod gem {
    pub use secs_gem::*;
}
