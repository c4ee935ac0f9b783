//! SECS-II encoding module
//!
//! This crate provides the binary SECS-II item codec, the SML textual
//! notation (parser and writer) and the `SecsMessage` envelope.
//!
//! # TODO
//!
//! ## SECS-II 编码/解码
//! - [x] 全部 SEMI E5 数据格式
//! - [x] 最小长度字段宽度选择
//! - [x] 嵌套深度保护
//! - [ ] JIS-8 / C2 格式
//!
//! ## SML
//! - [x] 解析器（行列号错误定位）
//! - [x] 输出（缩进格式）
//! - [x] 消息头 `S1F13 W`

pub mod error;
pub mod message;
pub mod secs2;
pub mod sml;

pub use error::{SecsError, SecsResult};
pub use message::SecsMessage;
pub use secs2::{Secs2Decoder, Secs2Encoder, decode, decode_body, encode};
pub use sml::{parse_item, parse_message, to_sml};
