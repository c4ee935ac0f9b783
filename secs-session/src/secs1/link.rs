//! SECS-I link driver
//!
//! One task owns the half-duplex line. It answers ENQ from the peer,
//! reassembles received blocks and sends queued messages block by block.

use crate::config::{CommunicatorConfig, Timeouts};
use crate::dispatcher::MessageDispatcher;
use crate::error::{ErrorCategory, SecsError, SecsResult, Timer};
use crate::secs1::block::{
    ACK, ENQ, EOT, MessageAssembler, NAK, Secs1Block, Secs1Header, is_valid_length, split_message,
};
use secs_codec::SecsMessage;
use secs_transport::StreamAccessor;
use std::sync::Arc;
use tokio::sync::{Notify, mpsc, oneshot};
use tokio::time::Instant;

/// A message queued for sending
pub(crate) struct Outgoing {
    pub message: SecsMessage,
    pub done: oneshot::Sender<SecsResult<()>>,
}

/// Result of one block delivery attempt
enum Attempt {
    Delivered,
    Failed,
}

pub(crate) struct LinkDriver {
    name: String,
    stream: Box<dyn StreamAccessor>,
    timeouts: Timeouts,
    retry: u32,
    is_equip: bool,
    dispatcher: Arc<MessageDispatcher>,
    assembler: MessageAssembler,
    last_header: Option<Secs1Header>,
    t4_deadline: Option<Instant>,
}

impl LinkDriver {
    pub(crate) fn new(
        stream: Box<dyn StreamAccessor>,
        config: &CommunicatorConfig,
        dispatcher: Arc<MessageDispatcher>,
    ) -> Self {
        Self {
            name: config.name.clone(),
            stream,
            timeouts: config.timeouts,
            retry: config.retry,
            is_equip: config.is_equip,
            dispatcher,
            assembler: MessageAssembler::new(config.max_message_size),
            last_header: None,
            t4_deadline: None,
        }
    }

    /// Serve the line until stopped, the outbox closes or the stream fails
    pub(crate) async fn run(
        mut self,
        mut outbox: mpsc::Receiver<Outgoing>,
        stop: Arc<Notify>,
    ) -> Option<SecsError> {
        let reason = loop {
            let t4 = self
                .t4_deadline
                .map(|deadline| deadline.saturating_duration_since(Instant::now()));

            tokio::select! {
                _ = stop.notified() => break None,
                byte = self.stream.read_byte(t4) => match byte {
                    Ok(Some(ENQ)) => {
                        if let Err(e) = self.receive_block().await {
                            break Some(e);
                        }
                    }
                    Ok(Some(other)) => {
                        log::debug!("[{}] ignoring stray byte 0x{:02X}", self.name, other);
                    }
                    Ok(None) => self.expire_t4(),
                    Err(e) => break Some(e),
                },
                outgoing = outbox.recv() => match outgoing {
                    Some(Outgoing { message, done }) => {
                        match self.send_message(&message).await {
                            Err(e) if is_fatal(&e) => {
                                let _ = done.send(Err(SecsError::ConnectionLost));
                                break Some(e);
                            }
                            result => {
                                let _ = done.send(result);
                            }
                        }
                    }
                    None => break None,
                },
            }
        };

        let _ = self.stream.close().await;
        reason
    }

    fn expire_t4(&mut self) {
        self.t4_deadline = None;
        if self.assembler.in_progress() {
            log::warn!("[{}] T4 expired, discarding partial message", self.name);
            self.assembler.reset();
            self.dispatcher.statistics().increment_timeouts();
            self.dispatcher.emit_error(SecsError::Timeout(Timer::T4));
        }
    }

    async fn write_control(&mut self, byte: u8) -> SecsResult<()> {
        log::trace!("[{}] -> 0x{:02X}", self.name, byte);
        self.stream.write_all(&[byte]).await?;
        self.stream.flush().await
    }

    /// Read until the line stays silent for T8
    async fn drain(&mut self) -> SecsResult<()> {
        while self.stream.read_byte(Some(self.timeouts.t8)).await?.is_some() {}
        Ok(())
    }

    /// Answer an ENQ from the peer and take one block
    async fn receive_block(&mut self) -> SecsResult<()> {
        self.write_control(EOT).await?;

        let Some(length) = self.stream.read_byte(Some(self.timeouts.t7)).await? else {
            log::warn!("[{}] no block within T7 after EOT", self.name);
            self.dispatcher.statistics().increment_timeouts();
            return Ok(());
        };
        if !is_valid_length(length) {
            log::warn!("[{}] invalid block length {}", self.name, length);
            self.drain().await?;
            return self.write_control(NAK).await;
        }

        let mut raw = vec![0u8; length as usize + 2];
        for slot in raw.iter_mut() {
            match self.stream.read_byte(Some(self.timeouts.t8)).await? {
                Some(byte) => *slot = byte,
                None => {
                    log::warn!("[{}] T8 expired inside block", self.name);
                    self.dispatcher.statistics().increment_timeouts();
                    return self.write_control(NAK).await;
                }
            }
        }

        let block = match Secs1Block::decode(&raw) {
            Ok(block) => block,
            Err(e) => {
                log::warn!("[{}] bad block: {}", self.name, e);
                self.dispatcher.statistics().increment_checksum_errors();
                self.drain().await?;
                return self.write_control(NAK).await;
            }
        };
        self.write_control(ACK).await?;

        // SEMI E4: a block whose header equals the previous one is a duplicate
        if self.last_header == Some(block.header) {
            log::debug!(
                "[{}] duplicate block {} system=0x{:08X} dropped",
                self.name,
                block.header.block_number,
                block.header.system_bytes
            );
            return Ok(());
        }
        self.last_header = Some(block.header);
        log::trace!(
            "[{}] block {} system=0x{:08X} ({} bytes)",
            self.name,
            block.header.block_number,
            block.header.system_bytes,
            block.data.len()
        );

        match self.assembler.push(block) {
            Ok(Some(message)) => {
                self.t4_deadline = None;
                self.dispatcher.dispatch(message);
            }
            Ok(None) => self.t4_deadline = Some(Instant::now() + self.timeouts.t4),
            Err(e) => {
                if !self.assembler.in_progress() {
                    self.t4_deadline = None;
                }
                log::warn!("[{}] message dropped: {}", self.name, e);
                self.dispatcher.emit_error(e);
            }
        }
        Ok(())
    }

    async fn send_message(&mut self, message: &SecsMessage) -> SecsResult<()> {
        let blocks = split_message(message, self.is_equip)?;
        for block in &blocks {
            self.send_block(block).await?;
        }
        Ok(())
    }

    /// Deliver one block: the first attempt plus at most `retry` retries
    async fn send_block(&mut self, block: &Secs1Block) -> SecsResult<()> {
        let bytes = block.encode()?;
        let mut attempt = 0;
        loop {
            if let Attempt::Delivered = self.try_send_block(&bytes).await? {
                return Ok(());
            }
            if attempt >= self.retry {
                log::warn!(
                    "[{}] block {} system=0x{:08X} failed after {} retries",
                    self.name,
                    block.header.block_number,
                    block.header.system_bytes,
                    self.retry
                );
                return Err(SecsError::RetryExhausted(self.retry));
            }
            attempt += 1;
            self.dispatcher.statistics().increment_retries();
            log::debug!(
                "[{}] retrying block {} ({}/{})",
                self.name,
                block.header.block_number,
                attempt,
                self.retry
            );
        }
    }

    async fn try_send_block(&mut self, bytes: &[u8]) -> SecsResult<Attempt> {
        let t2 = self.timeouts.t2;
        loop {
            self.write_control(ENQ).await?;
            match self.stream.read_byte(Some(t2)).await? {
                Some(EOT) => break,
                Some(ENQ) if !self.is_equip => {
                    // contention: the host receives first, then bids again
                    log::debug!("[{}] line contention, yielding", self.name);
                    self.receive_block().await?;
                }
                Some(ENQ) => match self.stream.read_byte(Some(t2)).await? {
                    Some(EOT) => break,
                    other => {
                        log::debug!("[{}] no EOT after contention: {:?}", self.name, other);
                        return Ok(Attempt::Failed);
                    }
                },
                Some(other) => {
                    log::debug!("[{}] expected EOT, got 0x{:02X}", self.name, other);
                    return Ok(Attempt::Failed);
                }
                None => {
                    log::warn!("[{}] T2 expired waiting for EOT", self.name);
                    self.dispatcher.statistics().increment_timeouts();
                    return Ok(Attempt::Failed);
                }
            }
        }

        log::trace!("[{}] -> block {:02X?}", self.name, bytes);
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;

        match self.stream.read_byte(Some(t2)).await? {
            Some(ACK) => Ok(Attempt::Delivered),
            Some(NAK) => {
                log::warn!("[{}] block NAKed", self.name);
                Ok(Attempt::Failed)
            }
            Some(other) => {
                log::debug!("[{}] expected ACK, got 0x{:02X}", self.name, other);
                Ok(Attempt::Failed)
            }
            None => {
                log::warn!("[{}] T2 expired waiting for ACK", self.name);
                self.dispatcher.statistics().increment_timeouts();
                Ok(Attempt::Failed)
            }
        }
    }
}

/// Errors after which the line is unusable
fn is_fatal(error: &SecsError) -> bool {
    error.category() == ErrorCategory::Transport && !matches!(error, SecsError::RetryExhausted(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::CommunicatorEvent;
    use async_trait::async_trait;
    use secs_core::Item;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    struct DuplexAccessor(DuplexStream);

    #[async_trait]
    impl StreamAccessor for DuplexAccessor {
        async fn set_timeout(&mut self, _timeout: Option<Duration>) -> SecsResult<()> {
            Ok(())
        }

        async fn read(&mut self, buf: &mut [u8]) -> SecsResult<usize> {
            Ok(self.0.read(buf).await?)
        }

        async fn write(&mut self, buf: &[u8]) -> SecsResult<usize> {
            Ok(self.0.write(buf).await?)
        }

        async fn flush(&mut self) -> SecsResult<()> {
            Ok(self.0.flush().await?)
        }

        fn is_closed(&self) -> bool {
            false
        }

        async fn close(&mut self) -> SecsResult<()> {
            Ok(self.0.shutdown().await?)
        }
    }

    fn config(retry: u32) -> CommunicatorConfig {
        CommunicatorConfig {
            name: "link".to_string(),
            retry,
            timeouts: Timeouts {
                t2: Duration::from_millis(200),
                t4: Duration::from_millis(300),
                t7: Duration::from_millis(500),
                t8: Duration::from_millis(100),
                ..Timeouts::default()
            },
            ..CommunicatorConfig::default()
        }
    }

    type Started = (
        DuplexStream,
        mpsc::Sender<Outgoing>,
        Arc<MessageDispatcher>,
        tokio::task::JoinHandle<Option<SecsError>>,
    );

    fn start(retry: u32) -> Started {
        start_with(config(retry))
    }

    fn start_with(config: CommunicatorConfig) -> Started {
        let (local, remote) = tokio::io::duplex(4096);
        let dispatcher = Arc::new(MessageDispatcher::new("link", 0, 16));
        let driver = LinkDriver::new(Box::new(DuplexAccessor(local)), &config, dispatcher.clone());
        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(driver.run(rx, Arc::new(Notify::new())));
        (remote, tx, dispatcher, handle)
    }

    async fn read_block(peer: &mut DuplexStream) -> Secs1Block {
        let length = peer.read_u8().await.unwrap();
        let mut raw = vec![0u8; length as usize + 2];
        peer.read_exact(&mut raw).await.unwrap();
        Secs1Block::decode(&raw).unwrap()
    }

    #[tokio::test]
    async fn test_send_retries_after_nak() {
        let (mut peer, outbox, dispatcher, _driver) = start(3);
        let message = SecsMessage::new(1, 1, true, None, 42, 0).unwrap();
        let (done_tx, done_rx) = oneshot::channel();
        outbox
            .send(Outgoing { message, done: done_tx })
            .await
            .unwrap();

        assert_eq!(peer.read_u8().await.unwrap(), ENQ);
        peer.write_all(&[EOT]).await.unwrap();
        read_block(&mut peer).await;
        peer.write_all(&[NAK]).await.unwrap();

        assert_eq!(peer.read_u8().await.unwrap(), ENQ);
        peer.write_all(&[EOT]).await.unwrap();
        let block = read_block(&mut peer).await;
        peer.write_all(&[ACK]).await.unwrap();

        assert_eq!(block.header.system_bytes, 42);
        assert!(block.header.e_bit);
        assert!(done_rx.await.unwrap().is_ok());
        assert_eq!(dispatcher.statistics().snapshot().retries, 1);
    }

    #[tokio::test]
    async fn test_receive_acks_and_dispatches() {
        let (mut peer, _outbox, dispatcher, _driver) = start(3);
        let mut events = dispatcher.subscribe();
        let message = SecsMessage::new(1, 1, true, Some(Item::Binary(vec![7; 300])), 9, 0).unwrap();
        let blocks = split_message(&message, true).unwrap();

        for block in &blocks {
            peer.write_all(&[ENQ]).await.unwrap();
            assert_eq!(peer.read_u8().await.unwrap(), EOT);
            peer.write_all(&block.encode().unwrap()).await.unwrap();
            assert_eq!(peer.read_u8().await.unwrap(), ACK);
        }
        // duplicate of the last block is acknowledged but not delivered twice
        peer.write_all(&[ENQ]).await.unwrap();
        assert_eq!(peer.read_u8().await.unwrap(), EOT);
        peer.write_all(&blocks[1].encode().unwrap()).await.unwrap();
        assert_eq!(peer.read_u8().await.unwrap(), ACK);

        match events.recv().await.unwrap() {
            CommunicatorEvent::Message(received) => assert_eq!(received, message),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_bad_checksum_is_naked() {
        let (mut peer, _outbox, dispatcher, _driver) = start(3);
        let message = SecsMessage::new(1, 1, true, None, 5, 0).unwrap();
        let mut bytes = split_message(&message, true).unwrap()[0].encode().unwrap();
        let last = bytes.len() - 1;
        bytes[last] = bytes[last].wrapping_add(1);

        peer.write_all(&[ENQ]).await.unwrap();
        assert_eq!(peer.read_u8().await.unwrap(), EOT);
        peer.write_all(&bytes).await.unwrap();
        assert_eq!(peer.read_u8().await.unwrap(), NAK);
        assert_eq!(dispatcher.statistics().snapshot().checksum_errors, 1);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let (mut peer, outbox, _dispatcher, _driver) = start(1);
        let message = SecsMessage::new(1, 1, false, None, 1, 0).unwrap();
        let (done_tx, done_rx) = oneshot::channel();
        outbox
            .send(Outgoing { message, done: done_tx })
            .await
            .unwrap();

        // never answer EOT
        for _ in 0..2 {
            assert_eq!(peer.read_u8().await.unwrap(), ENQ);
        }
        assert!(matches!(
            done_rx.await.unwrap(),
            Err(SecsError::RetryExhausted(1))
        ));
    }

    #[tokio::test]
    async fn test_peer_eof_stops_driver() {
        let (peer, _outbox, _dispatcher, driver) = start(3);
        drop(peer);
        assert!(matches!(driver.await.unwrap(), Some(SecsError::ConnectionLost)));
    }

    async fn write_block(peer: &mut DuplexStream, block: &Secs1Block) {
        peer.write_all(&[ENQ]).await.unwrap();
        assert_eq!(peer.read_u8().await.unwrap(), EOT);
        peer.write_all(&block.encode().unwrap()).await.unwrap();
        assert_eq!(peer.read_u8().await.unwrap(), ACK);
    }

    async fn next_message(
        events: &mut tokio::sync::broadcast::Receiver<CommunicatorEvent>,
    ) -> SecsMessage {
        match events.recv().await.unwrap() {
            CommunicatorEvent::Message(message) => message,
            other => panic!("unexpected event {:?}", other),
        }
    }

    fn queue(
        outbox: &mpsc::Sender<Outgoing>,
        message: SecsMessage,
    ) -> oneshot::Receiver<SecsResult<()>> {
        let (done_tx, done_rx) = oneshot::channel();
        outbox
            .try_send(Outgoing { message, done: done_tx })
            .unwrap();
        done_rx
    }

    #[tokio::test]
    async fn test_missing_ack_expires_t2() {
        let (mut peer, outbox, dispatcher, _driver) = start(3);
        let done = queue(&outbox, SecsMessage::new(1, 1, false, None, 11, 0).unwrap());

        assert_eq!(peer.read_u8().await.unwrap(), ENQ);
        peer.write_all(&[EOT]).await.unwrap();
        read_block(&mut peer).await;
        // no ACK: the sender bids again once T2 runs out
        assert_eq!(peer.read_u8().await.unwrap(), ENQ);
        peer.write_all(&[EOT]).await.unwrap();
        let block = read_block(&mut peer).await;
        peer.write_all(&[ACK]).await.unwrap();

        assert_eq!(block.header.system_bytes, 11);
        assert!(done.await.unwrap().is_ok());
        let stats = dispatcher.statistics().snapshot();
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.retries, 1);
    }

    #[tokio::test]
    async fn test_t4_discards_partial_message() {
        let (mut peer, _outbox, dispatcher, _driver) = start(3);
        let mut events = dispatcher.subscribe();
        let partial = SecsMessage::new(1, 1, true, Some(Item::Binary(vec![1; 300])), 20, 0).unwrap();
        let blocks = split_message(&partial, true).unwrap();
        assert_eq!(blocks.len(), 2);

        write_block(&mut peer, &blocks[0]).await;
        tokio::time::sleep(Duration::from_millis(600)).await;

        match events.recv().await.unwrap() {
            CommunicatorEvent::Error(e) => assert!(matches!(*e, SecsError::Timeout(Timer::T4))),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(dispatcher.statistics().snapshot().timeouts, 1);

        // the line is still usable
        let next = SecsMessage::new(1, 3, false, None, 21, 0).unwrap();
        write_block(&mut peer, &split_message(&next, true).unwrap()[0]).await;
        assert_eq!(next_message(&mut events).await, next);
    }

    #[tokio::test]
    async fn test_host_yields_on_contention() {
        let (mut peer, outbox, dispatcher, _driver) = start(3);
        let mut events = dispatcher.subscribe();
        let done = queue(&outbox, SecsMessage::new(1, 1, false, None, 30, 0).unwrap());

        assert_eq!(peer.read_u8().await.unwrap(), ENQ);
        // the equipment bids at the same moment and wins
        peer.write_all(&[ENQ]).await.unwrap();
        assert_eq!(peer.read_u8().await.unwrap(), EOT);
        let incoming = SecsMessage::new(6, 11, true, None, 31, 0).unwrap();
        peer.write_all(&split_message(&incoming, true).unwrap()[0].encode().unwrap())
            .await
            .unwrap();
        assert_eq!(peer.read_u8().await.unwrap(), ACK);

        // then the host bids again
        assert_eq!(peer.read_u8().await.unwrap(), ENQ);
        peer.write_all(&[EOT]).await.unwrap();
        let block = read_block(&mut peer).await;
        peer.write_all(&[ACK]).await.unwrap();

        assert_eq!(block.header.system_bytes, 30);
        assert!(!block.header.r_bit);
        assert!(done.await.unwrap().is_ok());
        assert_eq!(next_message(&mut events).await, incoming);
    }

    #[tokio::test]
    async fn test_equipment_keeps_bid_on_contention() {
        let (mut peer, outbox, _dispatcher, _driver) = start_with(CommunicatorConfig {
            is_equip: true,
            ..config(3)
        });
        let done = queue(&outbox, SecsMessage::new(1, 2, false, None, 40, 0).unwrap());

        assert_eq!(peer.read_u8().await.unwrap(), ENQ);
        peer.write_all(&[ENQ]).await.unwrap();
        // the host gives way
        peer.write_all(&[EOT]).await.unwrap();
        let block = read_block(&mut peer).await;
        peer.write_all(&[ACK]).await.unwrap();

        assert!(block.header.r_bit);
        assert_eq!(block.header.system_bytes, 40);
        assert!(done.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_block_delivered_once() {
        let (mut peer, _outbox, dispatcher, _driver) = start(3);
        let mut events = dispatcher.subscribe();
        let first = SecsMessage::new(5, 1, true, Some(Item::Binary(vec![9])), 50, 0).unwrap();
        let block = split_message(&first, true).unwrap().remove(0);

        // the peer missed our ACK and sends the same block again
        write_block(&mut peer, &block).await;
        write_block(&mut peer, &block).await;
        let second = SecsMessage::new(5, 1, true, Some(Item::Binary(vec![9])), 51, 0).unwrap();
        write_block(&mut peer, &split_message(&second, true).unwrap()[0]).await;

        assert_eq!(next_message(&mut events).await, first);
        assert_eq!(next_message(&mut events).await, second);
        assert_eq!(dispatcher.statistics().snapshot().messages_received, 2);
    }
}
