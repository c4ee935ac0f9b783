//! Session layer module for SECS/GEM protocols
//!
//! This crate provides the HSMS (SEMI E37) and SECS-I (SEMI E4)
//! communicators behind one [`Communicator`] trait, together with the
//! request/reply correlation by system bytes both of them share.
//!
//! # TODO
//!
//! ## HSMS
//! - [x] 帧编码/解码（长度前缀 + 10 字节头）
//! - [x] Select / Deselect / Linktest / Separate / Reject 控制消息
//! - [x] T3/T5/T6/T7/T8 定时器
//! - [x] Passive 单会话 + 重新绑定循环
//! - [x] Active 断线重连
//! - [ ] HSMS-GS 多会话
//!
//! ## SECS-I
//! - [x] 块编码/解码（校验和）
//! - [x] ENQ/EOT/ACK/NAK 握手与重试
//! - [x] 多块消息组装（T4）
//! - [x] 串口 / TCP Active / TCP Passive

pub mod builder;
pub mod communicator;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod hsms;
mod passive;
pub mod pending;
pub mod secs1;
pub mod statistics;

pub use builder::CommunicatorBuilder;
pub use communicator::Communicator;
pub use config::{
    CommunicatorConfig, CommunicatorSettings, ConnectionMode, HsmsConfig, Secs1Config, Secs1Port,
    Timeouts,
};
pub use error::{SecsError, SecsResult, Timer};
pub use event::CommunicatorEvent;
pub use hsms::{HsmsCommunicator, HsmsConnectionState};
pub use secs1::{Secs1Communicator, Secs1LinkState};
pub use statistics::{SessionStatistics, StatisticsSnapshot};
