//! GEM message helpers
//!
//! [`Gem`] wraps a shared communicator and builds the bodies of the
//! common SEMI E30 transactions. Methods named after a primary (odd
//! function) send it and decode the acknowledge code from the reply;
//! methods named after a secondary answer a received primary.
//!
//! # Message Shapes
//!
//! | Message | Equipment body                           | Host body                |
//! |---------|------------------------------------------|--------------------------|
//! | S1F13   | `<L <A MDLN> <A SOFTREV>>`               | `<L>`                    |
//! | S1F14   | `<L <B COMMACK> <L <A MDLN> <A SOFTREV>>>` | `<L <B COMMACK> <L>>`  |
//! | S1F16   | `<B OFLACK>`                             |                          |
//! | S1F18   | `<B ONLACK>`                             |                          |
//! | S2F18   | `<A TIME>`                               | `<A TIME>`               |
//! | S2F31   |                                          | `<A TIME>`               |
//! | S2F32   | `<B TIACK>`                              |                          |
//! | S9Fx    | `<B MHEAD>` (10-byte header of the offending message) |             |

use crate::clock::{Clock, ClockType};
use log::{debug, warn};
use secs_codec::SecsMessage;
use secs_core::{Item, SecsError, SecsResult};
use secs_session::Communicator;
use std::sync::Arc;

const DEFAULT_MDLN: &str = "      ";
const DEFAULT_SOFTREV: &str = "      ";

/// COMMACK, answer to S1F13
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommAck {
    Ok = 0,
    Denied = 1,
}

/// OFLACK, answer to S1F15
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OflAck {
    Ok = 0,
}

/// ONLACK, answer to S1F17
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OnlAck {
    Ok = 0,
    Refused = 1,
    AlreadyOnline = 2,
}

/// TIACK, answer to S2F31
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TiAck {
    Ok = 0,
    NotDone = 1,
}

impl CommAck {
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Ok),
            1 => Some(Self::Denied),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl OflAck {
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Ok),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl OnlAck {
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Ok),
            1 => Some(Self::Refused),
            2 => Some(Self::AlreadyOnline),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TiAck {
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Ok),
            1 => Some(Self::NotDone),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// GEM helpers bound to one communicator
///
/// Whether the equipment or host body variants are sent follows
/// [`Communicator::is_equip`].
pub struct Gem<C: Communicator> {
    comm: Arc<C>,
    mdln: String,
    softrev: String,
    clock_type: ClockType,
}

impl<C: Communicator> Gem<C> {
    /// Blank (six spaces) MDLN and SOFTREV, A16 clock
    pub fn new(comm: Arc<C>) -> Self {
        Self {
            comm,
            mdln: DEFAULT_MDLN.to_string(),
            softrev: DEFAULT_SOFTREV.to_string(),
            clock_type: ClockType::default(),
        }
    }

    /// Equipment model type reported in S1F13/S1F14
    pub fn with_mdln(mut self, mdln: &str) -> Self {
        self.mdln = mdln.to_string();
        self
    }

    /// Software revision reported in S1F13/S1F14
    pub fn with_softrev(mut self, softrev: &str) -> Self {
        self.softrev = softrev.to_string();
        self
    }

    /// TIME layout used by S2F18 and S2F31
    pub fn with_clock_type(mut self, clock_type: ClockType) -> Self {
        self.clock_type = clock_type;
        self
    }

    pub fn communicator(&self) -> &Arc<C> {
        &self.comm
    }

    pub fn mdln(&self) -> &str {
        &self.mdln
    }

    pub fn softrev(&self) -> &str {
        &self.softrev
    }

    pub fn clock_type(&self) -> ClockType {
        self.clock_type
    }

    /// `<L <A MDLN> <A SOFTREV>>` for equipment, `<L>` for host
    fn identity(&self) -> SecsResult<Item> {
        if self.comm.is_equip() {
            Item::list(vec![
                Item::ascii(self.mdln.as_str())?,
                Item::ascii(self.softrev.as_str())?,
            ])
        } else {
            Item::list(Vec::new())
        }
    }

    /// Send a primary and return its reply
    async fn request(&self, stream: u8, function: u8, body: Option<Item>) -> SecsResult<SecsMessage> {
        debug!("[{}] GEM S{}F{} W", self.comm.name(), stream, function);
        self.comm
            .send(stream, function, true, body)
            .await?
            .ok_or_else(|| {
                SecsError::Protocol(format!("S{}F{} returned no reply", stream, function))
            })
    }

    /// S1F13 Establish Communications Request, returns COMMACK
    pub async fn s1f13(&self) -> SecsResult<u8> {
        let reply = self.request(1, 13, Some(self.identity()?)).await?;
        let commack = reply
            .body()
            .and_then(Item::as_list)
            .and_then(|list| list.first())
            .and_then(Item::as_binary)
            .and_then(|bytes| bytes.first().copied());
        commack.ok_or_else(|| invalid_reply(&reply, "COMMACK"))
    }

    /// S1F14 Establish Communications Acknowledge
    pub async fn s1f14(&self, primary: &SecsMessage, commack: CommAck) -> SecsResult<()> {
        let body = Item::list(vec![Item::Binary(vec![commack.as_u8()]), self.identity()?])?;
        self.comm.reply(primary, 1, 14, Some(body)).await
    }

    /// S1F15 Request OFF-LINE, returns OFLACK
    pub async fn s1f15(&self) -> SecsResult<u8> {
        let reply = self.request(1, 15, None).await?;
        first_binary(&reply).ok_or_else(|| invalid_reply(&reply, "OFLACK"))
    }

    /// S1F16 OFF-LINE Acknowledge
    pub async fn s1f16(&self, primary: &SecsMessage) -> SecsResult<()> {
        let body = Item::Binary(vec![OflAck::Ok.as_u8()]);
        self.comm.reply(primary, 1, 16, Some(body)).await
    }

    /// S1F17 Request ON-LINE, returns ONLACK
    pub async fn s1f17(&self) -> SecsResult<u8> {
        let reply = self.request(1, 17, None).await?;
        first_binary(&reply).ok_or_else(|| invalid_reply(&reply, "ONLACK"))
    }

    /// S1F18 ON-LINE Acknowledge
    pub async fn s1f18(&self, primary: &SecsMessage, onlack: OnlAck) -> SecsResult<()> {
        let body = Item::Binary(vec![onlack.as_u8()]);
        self.comm.reply(primary, 1, 18, Some(body)).await
    }

    /// S2F17 Date and Time Request
    pub async fn s2f17(&self) -> SecsResult<Clock> {
        let reply = self.request(2, 17, None).await?;
        match reply.body() {
            Some(item @ Item::Ascii(_)) => Clock::from_ascii(item),
            _ => Err(invalid_reply(&reply, "TIME")),
        }
    }

    /// S2F18 Date and Time Data
    pub async fn s2f18(&self, primary: &SecsMessage, clock: Clock) -> SecsResult<()> {
        let body = clock.to_item(self.clock_type);
        self.comm.reply(primary, 2, 18, Some(body)).await
    }

    /// S2F18 with the current local time
    pub async fn s2f18_now(&self, primary: &SecsMessage) -> SecsResult<()> {
        self.s2f18(primary, Clock::now()).await
    }

    /// S2F31 Date and Time Set Request, returns TIACK
    pub async fn s2f31(&self, clock: Clock) -> SecsResult<u8> {
        let body = clock.to_item(self.clock_type);
        let reply = self.request(2, 31, Some(body)).await?;
        first_binary(&reply).ok_or_else(|| invalid_reply(&reply, "TIACK"))
    }

    /// S2F31 with the current local time
    pub async fn s2f31_now(&self) -> SecsResult<u8> {
        self.s2f31(Clock::now()).await
    }

    /// S2F32 Date and Time Set Acknowledge
    pub async fn s2f32(&self, primary: &SecsMessage, tiack: TiAck) -> SecsResult<()> {
        let body = Item::Binary(vec![tiack.as_u8()]);
        self.comm.reply(primary, 2, 32, Some(body)).await
    }

    /// S9F1 Unrecognized Device ID
    pub async fn s9f1(&self, reference: &SecsMessage) -> SecsResult<()> {
        self.s9(1, reference).await
    }

    /// S9F3 Unrecognized Stream Type
    pub async fn s9f3(&self, reference: &SecsMessage) -> SecsResult<()> {
        self.s9(3, reference).await
    }

    /// S9F5 Unrecognized Function Type
    pub async fn s9f5(&self, reference: &SecsMessage) -> SecsResult<()> {
        self.s9(5, reference).await
    }

    /// S9F7 Illegal Data
    pub async fn s9f7(&self, reference: &SecsMessage) -> SecsResult<()> {
        self.s9(7, reference).await
    }

    /// S9F9 Transaction Timer Timeout
    pub async fn s9f9(&self, reference: &SecsMessage) -> SecsResult<()> {
        self.s9(9, reference).await
    }

    /// S9F11 Data Too Long
    pub async fn s9f11(&self, reference: &SecsMessage) -> SecsResult<()> {
        self.s9(11, reference).await
    }

    async fn s9(&self, function: u8, reference: &SecsMessage) -> SecsResult<()> {
        warn!(
            "[{}] S9F{} for {} (system bytes {:#010x})",
            self.comm.name(),
            function,
            reference,
            reference.system_bytes()
        );
        let mhead = Item::Binary(reference.header_10_bytes().to_vec());
        self.comm.send(9, function, false, Some(mhead)).await?;
        Ok(())
    }
}

fn first_binary(reply: &SecsMessage) -> Option<u8> {
    reply
        .body()
        .and_then(Item::as_binary)
        .and_then(|bytes| bytes.first().copied())
}

fn invalid_reply(reply: &SecsMessage, expected: &str) -> SecsError {
    SecsError::Protocol(format!("{} does not carry {}", reply, expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use secs_session::{CommunicatorEvent, StatisticsSnapshot};
    use std::sync::Mutex;
    use tokio::sync::broadcast;

    /// Records outgoing messages and answers primaries with a canned body
    struct Recorder {
        is_equip: bool,
        answer: Option<Item>,
        sent: Mutex<Vec<SecsMessage>>,
        events: broadcast::Sender<CommunicatorEvent>,
    }

    impl Recorder {
        fn new(is_equip: bool, answer: Option<Item>) -> Arc<Self> {
            Arc::new(Self {
                is_equip,
                answer,
                sent: Mutex::new(Vec::new()),
                events: broadcast::channel(8).0,
            })
        }

        fn last(&self) -> SecsMessage {
            self.sent.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl Communicator for Recorder {
        async fn open(&self) -> SecsResult<()> {
            Ok(())
        }

        async fn close(&self) -> SecsResult<()> {
            Ok(())
        }

        async fn send(
            &self,
            stream: u8,
            function: u8,
            w_bit: bool,
            body: Option<Item>,
        ) -> SecsResult<Option<SecsMessage>> {
            let msg = SecsMessage::new(stream.into(), function.into(), w_bit, body, 7, 10)?;
            self.sent.lock().unwrap().push(msg.clone());
            if !w_bit {
                return Ok(None);
            }
            SecsMessage::reply_to(&msg, stream.into(), u32::from(function) + 1, self.answer.clone())
                .map(Some)
        }

        async fn reply(
            &self,
            primary: &SecsMessage,
            stream: u8,
            function: u8,
            body: Option<Item>,
        ) -> SecsResult<()> {
            let msg = SecsMessage::reply_to(primary, stream.into(), function.into(), body)?;
            self.sent.lock().unwrap().push(msg);
            Ok(())
        }

        fn subscribe(&self) -> broadcast::Receiver<CommunicatorEvent> {
            self.events.subscribe()
        }

        fn name(&self) -> &str {
            "recorder"
        }

        fn device_id(&self) -> u16 {
            10
        }

        fn is_equip(&self) -> bool {
            self.is_equip
        }

        fn is_ready(&self) -> bool {
            true
        }

        async fn until_ready(&self) -> SecsResult<()> {
            Ok(())
        }

        fn statistics(&self) -> StatisticsSnapshot {
            StatisticsSnapshot::default()
        }
    }

    fn primary(stream: u32, function: u32) -> SecsMessage {
        SecsMessage::new(stream, function, true, None, 0x1234, 10).unwrap()
    }

    #[tokio::test]
    async fn test_s1f13_host_sends_empty_list() {
        let answer = Item::List(vec![Item::Binary(vec![0]), Item::List(vec![])]);
        let comm = Recorder::new(false, Some(answer));
        let gem = Gem::new(comm.clone());

        assert_eq!(gem.s1f13().await.unwrap(), 0);
        let sent = comm.last();
        assert_eq!((sent.stream(), sent.function(), sent.w_bit()), (1, 13, true));
        assert_eq!(sent.body(), Some(&Item::List(vec![])));
    }

    #[tokio::test]
    async fn test_s1f13_equipment_sends_identity() {
        let answer = Item::List(vec![Item::Binary(vec![1]), Item::List(vec![])]);
        let comm = Recorder::new(true, Some(answer));
        let gem = Gem::new(comm.clone()).with_mdln("EQ-01").with_softrev("1.0.0");

        assert_eq!(gem.s1f13().await.unwrap(), CommAck::Denied.as_u8());
        assert_eq!(
            comm.last().body(),
            Some(&Item::List(vec![
                Item::Ascii("EQ-01".to_string()),
                Item::Ascii("1.0.0".to_string()),
            ]))
        );
    }

    #[tokio::test]
    async fn test_malformed_replies() {
        let gem = Gem::new(Recorder::new(false, Some(Item::Binary(vec![0]))));
        assert!(matches!(gem.s1f13().await, Err(SecsError::Protocol(_))));

        let gem = Gem::new(Recorder::new(false, Some(Item::List(vec![]))));
        assert!(matches!(gem.s1f15().await, Err(SecsError::Protocol(_))));
        assert!(matches!(gem.s2f17().await, Err(SecsError::Protocol(_))));

        let gem = Gem::new(Recorder::new(false, None));
        assert!(matches!(gem.s2f31_now().await, Err(SecsError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_online_offline() {
        let gem = Gem::new(Recorder::new(false, Some(Item::Binary(vec![2]))));
        assert_eq!(OnlAck::from_u8(gem.s1f17().await.unwrap()), Some(OnlAck::AlreadyOnline));

        let gem = Gem::new(Recorder::new(false, Some(Item::Binary(vec![0]))));
        assert_eq!(OflAck::from_u8(gem.s1f15().await.unwrap()), Some(OflAck::Ok));
    }

    #[tokio::test]
    async fn test_s1f14_equipment_body() {
        let comm = Recorder::new(true, None);
        let gem = Gem::new(comm.clone());
        let request = primary(1, 13);

        gem.s1f14(&request, CommAck::Ok).await.unwrap();
        let sent = comm.last();
        assert_eq!(sent.function(), 14);
        assert_eq!(sent.system_bytes(), 0x1234);
        assert_eq!(
            sent.body(),
            Some(&Item::List(vec![
                Item::Binary(vec![0]),
                Item::List(vec![
                    Item::Ascii(DEFAULT_MDLN.to_string()),
                    Item::Ascii(DEFAULT_SOFTREV.to_string()),
                ]),
            ]))
        );
    }

    #[tokio::test]
    async fn test_acknowledge_bodies() {
        let comm = Recorder::new(true, None);
        let gem = Gem::new(comm.clone());

        gem.s1f16(&primary(1, 15)).await.unwrap();
        assert_eq!(comm.last().body(), Some(&Item::Binary(vec![0])));
        gem.s1f18(&primary(1, 17), OnlAck::Refused).await.unwrap();
        assert_eq!(comm.last().body(), Some(&Item::Binary(vec![1])));
        gem.s2f32(&primary(2, 31), TiAck::NotDone).await.unwrap();
        assert_eq!(comm.last().function(), 32);
        assert_eq!(comm.last().body(), Some(&Item::Binary(vec![1])));
    }

    #[tokio::test]
    async fn test_clock_type_selects_layout() {
        let comm = Recorder::new(true, None);
        let gem = Gem::new(comm.clone()).with_clock_type(ClockType::A12);
        let clock = Clock::new(
            NaiveDate::from_ymd_opt(2026, 10, 17)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
        );

        gem.s2f18(&primary(2, 17), clock).await.unwrap();
        assert_eq!(
            comm.last().body(),
            Some(&Item::Ascii("261017080000".to_string()))
        );
    }

    #[tokio::test]
    async fn test_s2f17_parses_time() {
        let answer = Item::Ascii("2026101708000050".to_string());
        let gem = Gem::new(Recorder::new(false, Some(answer)));
        let clock = gem.s2f17().await.unwrap();
        assert_eq!(clock.to_a16(), Item::Ascii("2026101708000050".to_string()));
    }

    #[tokio::test]
    async fn test_s9_carries_reference_header() {
        let comm = Recorder::new(true, None);
        let gem = Gem::new(comm.clone());
        let reference = primary(3, 5);

        gem.s9f5(&reference).await.unwrap();
        let sent = comm.last();
        assert_eq!((sent.stream(), sent.function(), sent.w_bit()), (9, 5, false));
        assert_eq!(
            sent.body(),
            Some(&Item::Binary(vec![0x00, 0x0A, 0x83, 0x05, 0, 0, 0x00, 0x00, 0x12, 0x34]))
        );
    }
}
