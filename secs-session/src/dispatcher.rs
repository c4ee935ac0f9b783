//! Inbound message dispatch and system-bytes allocation

use crate::error::{SecsError, SecsResult};
use crate::event::CommunicatorEvent;
use crate::pending::{PendingRequest, PendingRequests};
use crate::statistics::SessionStatistics;
use secs_codec::SecsMessage;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::broadcast;

/// Routes inbound messages to pending requests or subscribers
///
/// A message resolves a pending request only if it has no W-bit, carries
/// the configured device id and its system bytes match an outstanding
/// request. Anything else is published as [`CommunicatorEvent::Message`].
pub struct MessageDispatcher {
    name: String,
    device_id: u16,
    next_system_bytes: AtomicU32,
    pending: PendingRequests<SecsMessage>,
    events: broadcast::Sender<CommunicatorEvent>,
    statistics: Arc<SessionStatistics>,
}

impl MessageDispatcher {
    pub fn new(name: impl Into<String>, device_id: u16, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            name: name.into(),
            device_id,
            next_system_bytes: AtomicU32::new(rand::random::<u32>() >> 1),
            pending: PendingRequests::new(),
            events,
            statistics: Arc::new(SessionStatistics::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device_id(&self) -> u16 {
        self.device_id
    }

    /// Next system bytes value not currently awaiting a reply
    pub fn allocate_system_bytes(&self) -> u32 {
        loop {
            let candidate = self.next_system_bytes.fetch_add(1, Ordering::Relaxed);
            if candidate != 0 && !self.pending.contains(candidate) {
                return candidate;
            }
        }
    }

    pub fn register(&self, system_bytes: u32) -> SecsResult<PendingRequest<SecsMessage>> {
        self.pending.register(system_bytes)
    }

    pub fn pending(&self) -> &PendingRequests<SecsMessage> {
        &self.pending
    }

    pub fn statistics(&self) -> &Arc<SessionStatistics> {
        &self.statistics
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CommunicatorEvent> {
        self.events.subscribe()
    }

    /// Publish an event; having no subscribers is not an error
    pub fn emit(&self, event: CommunicatorEvent) {
        let _ = self.events.send(event);
    }

    pub fn emit_error(&self, error: SecsError) {
        self.emit(CommunicatorEvent::Error(Arc::new(error)));
    }

    /// Fail every pending request
    pub fn fail_all(&self, error: impl Fn() -> SecsError) {
        let failed = self.pending.fail_all(error);
        if failed > 0 {
            log::debug!("[{}] failed {} pending requests", self.name, failed);
        }
    }

    /// Route one inbound message
    pub fn dispatch(&self, message: SecsMessage) {
        self.statistics.increment_messages_received();
        log::debug!(
            "[{}] received system=0x{:08X} {}",
            self.name,
            message.system_bytes(),
            message.to_sml()
        );

        let message = if !message.w_bit() && message.device_id() == self.device_id {
            match self.pending.resolve(message.system_bytes(), message) {
                Ok(()) => {
                    self.statistics.increment_replies_matched();
                    return;
                }
                Err(message) => message,
            }
        } else {
            message
        };

        if !message.is_primary() {
            self.statistics.increment_unsolicited();
            log::warn!(
                "[{}] unexpected reply {} system=0x{:08X}",
                self.name,
                message,
                message.system_bytes()
            );
        }
        self.emit(CommunicatorEvent::Message(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Timer;
    use std::time::Duration;

    fn message(function: u32, w_bit: bool, system_bytes: u32, device_id: u16) -> SecsMessage {
        SecsMessage::new(1, function, w_bit, None, system_bytes, device_id).unwrap()
    }

    #[tokio::test]
    async fn test_reply_resolves_pending() {
        let dispatcher = MessageDispatcher::new("test", 10, 8);
        let mut events = dispatcher.subscribe();
        let sb = dispatcher.allocate_system_bytes();
        let waiter = dispatcher.register(sb).unwrap();
        dispatcher.dispatch(message(2, false, sb, 10));
        let reply = waiter.wait(Duration::from_secs(1), Timer::T3).await.unwrap();
        assert_eq!(reply.function(), 2);
        assert!(events.try_recv().is_err());
        assert_eq!(dispatcher.statistics().snapshot().replies_matched, 1);
    }

    #[tokio::test]
    async fn test_wrong_device_id_is_unsolicited() {
        let dispatcher = MessageDispatcher::new("test", 10, 8);
        let mut events = dispatcher.subscribe();
        let sb = dispatcher.allocate_system_bytes();
        let _waiter = dispatcher.register(sb).unwrap();
        dispatcher.dispatch(message(2, false, sb, 11));
        assert!(matches!(events.try_recv(), Ok(CommunicatorEvent::Message(_))));
        assert!(dispatcher.pending().contains(sb));
    }

    #[tokio::test]
    async fn test_w_bit_message_is_not_a_reply() {
        let dispatcher = MessageDispatcher::new("test", 0, 8);
        let mut events = dispatcher.subscribe();
        let sb = dispatcher.allocate_system_bytes();
        let _waiter = dispatcher.register(sb).unwrap();
        dispatcher.dispatch(message(1, true, sb, 0));
        match events.try_recv() {
            Ok(CommunicatorEvent::Message(m)) => assert!(m.w_bit()),
            other => panic!("unexpected {:?}", other),
        }
        assert!(dispatcher.pending().contains(sb));
    }

    #[test]
    fn test_allocation_skips_outstanding() {
        let dispatcher = MessageDispatcher::new("test", 0, 8);
        let first = dispatcher.allocate_system_bytes();
        let _waiter = dispatcher.register(first + 1).unwrap();
        let second = dispatcher.allocate_system_bytes();
        assert_ne!(second, first + 1);
        assert_ne!(second, first);
    }
}
