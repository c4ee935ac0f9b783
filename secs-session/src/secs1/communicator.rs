//! SECS-I communicator over serial or TCP/IP

use crate::communicator::Communicator;
use crate::config::{Secs1Config, Secs1Port};
use crate::dispatcher::MessageDispatcher;
use crate::error::{SecsError, SecsResult, Timer};
use crate::event::CommunicatorEvent;
use crate::passive::{PassiveHost, run_passive};
use crate::pending::lock;
use crate::secs1::link::{LinkDriver, Outgoing};
use crate::statistics::StatisticsSnapshot;
use async_trait::async_trait;
use secs_codec::SecsMessage;
use secs_core::Item;
use secs_transport::{
    SerialSettings, SerialTransport, StreamAccessor, TcpSettings, TcpTransport, TransportLayer,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Notify, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// SECS-I link state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Secs1LinkState {
    #[default]
    NotConnected,
    /// Line attached, blocks may flow
    Connected,
    Closed,
}

impl Secs1LinkState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Secs1LinkState::Connected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Secs1LinkState::NotConnected => "NotConnected",
            Secs1LinkState::Connected => "Connected",
            Secs1LinkState::Closed => "Closed",
        }
    }
}

const OUTBOX_CAPACITY: usize = 32;

struct Secs1Link {
    id: u64,
    peer: String,
    outbox: mpsc::Sender<Outgoing>,
    stop: Arc<Notify>,
    driver: Mutex<Option<JoinHandle<()>>>,
    ended: Mutex<Option<oneshot::Sender<()>>>,
}

struct Secs1Inner {
    config: Secs1Config,
    dispatcher: Arc<MessageDispatcher>,
    state_tx: watch::Sender<Secs1LinkState>,
    link: Mutex<Option<Arc<Secs1Link>>>,
    next_link_id: AtomicU64,
    closing: AtomicBool,
    opened: AtomicBool,
    local_addr: Mutex<Option<SocketAddr>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    lifecycle: tokio::sync::Mutex<()>,
}

impl Secs1Inner {
    fn name(&self) -> &str {
        &self.config.common.name
    }

    fn state(&self) -> Secs1LinkState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, new_state: Secs1LinkState) {
        self.state_tx.send_if_modified(|state| {
            if *state == new_state {
                return false;
            }
            log::debug!(
                "[{}] state {} -> {}",
                self.config.common.name,
                state.as_str(),
                new_state.as_str()
            );
            *state = new_state;
            true
        });
    }

    fn current_link(&self) -> SecsResult<Arc<Secs1Link>> {
        lock(&self.link).clone().ok_or(SecsError::NotConnected)
    }

    /// Hand `stream` to a new link driver
    fn attach_transport(
        self: Arc<Self>,
        stream: Box<dyn StreamAccessor>,
        peer: String,
    ) -> SecsResult<oneshot::Receiver<()>> {
        let (outbox, outbox_rx) = mpsc::channel(OUTBOX_CAPACITY);
        let (ended_tx, ended_rx) = oneshot::channel();
        let stop = Arc::new(Notify::new());
        let link = Arc::new(Secs1Link {
            id: self.next_link_id.fetch_add(1, Ordering::SeqCst) + 1,
            peer,
            outbox,
            stop: stop.clone(),
            driver: Mutex::new(None),
            ended: Mutex::new(Some(ended_tx)),
        });
        {
            let mut slot = lock(&self.link);
            if slot.is_some() {
                return Err(SecsError::SessionRejected(format!(
                    "line already attached, dropping {}",
                    link.peer
                )));
            }
            *slot = Some(link.clone());
        }

        self.set_state(Secs1LinkState::Connected);
        self.dispatcher.statistics().increment_connects();
        log::info!("[{}] connected to {}", self.name(), link.peer);
        self.dispatcher.emit(CommunicatorEvent::Connected);

        let driver = LinkDriver::new(stream, &self.config.common, self.dispatcher.clone());
        let inner = self.clone();
        let link_id = link.id;
        let handle = tokio::spawn(async move {
            let reason = driver.run(outbox_rx, stop).await;
            inner.detach(link_id, reason);
        });
        *lock(&link.driver) = Some(handle);
        Ok(ended_rx)
    }

    /// Forget link `link_id`; a no-op once it is already gone
    fn detach(&self, link_id: u64, reason: Option<SecsError>) {
        let link = {
            let mut slot = lock(&self.link);
            let current = slot.as_ref().is_some_and(|link| link.id == link_id);
            if current { slot.take() } else { None }
        };
        let Some(link) = link else {
            return;
        };

        if self.state() != Secs1LinkState::Closed {
            self.set_state(Secs1LinkState::NotConnected);
        }
        self.dispatcher.fail_all(|| SecsError::ConnectionLost);
        self.dispatcher.statistics().increment_disconnects();
        match reason {
            Some(e) => {
                log::warn!("[{}] disconnected from {}: {}", self.name(), link.peer, e);
                self.dispatcher.emit(CommunicatorEvent::Disconnected);
                self.dispatcher.emit_error(e);
            }
            None => {
                log::info!("[{}] disconnected from {}", self.name(), link.peer);
                self.dispatcher.emit(CommunicatorEvent::Disconnected);
            }
        }

        let ended = lock(&link.ended).take();
        if let Some(tx) = ended {
            let _ = tx.send(());
        }
    }

    /// Open the configured line (serial or TCP Active)
    async fn connect(self: Arc<Self>) -> SecsResult<oneshot::Receiver<()>> {
        let t5 = self.config.common.timeouts.t5;
        let port = self.config.port.clone();
        match &port {
            Secs1Port::Serial { path, baud_rate } => {
                let mut transport = SerialTransport::new(SerialSettings::new(path.clone(), *baud_rate));
                transport.open().await?;
                let peer = path.clone();
                self.attach_transport(Box::new(transport), peer)
            }
            Secs1Port::TcpActive { address } => {
                log::info!("[{}] connecting to {}", self.name(), address);
                let mut transport =
                    TcpTransport::new(TcpSettings::with_connect_timeout(address.clone(), t5));
                transport.open().await?;
                let peer = transport
                    .peer_addr()
                    .map(|addr| addr.to_string())
                    .unwrap_or_else(|| address.clone());
                self.attach_transport(Box::new(transport), peer)
            }
            Secs1Port::TcpPassive { address } => Err(SecsError::Config(format!(
                "passive port {} cannot be dialed",
                address
            ))),
        }
    }

    /// Re-open the line after every disconnect, T5 apart, until closed
    async fn supervise(self: Arc<Self>, mut ended: oneshot::Receiver<()>) {
        loop {
            let _ = (&mut ended).await;
            loop {
                if self.closing.load(Ordering::SeqCst) {
                    return;
                }
                tokio::time::sleep(self.config.common.timeouts.t5).await;
                if self.closing.load(Ordering::SeqCst) {
                    return;
                }
                match self.clone().connect().await {
                    Ok(next) => {
                        ended = next;
                        break;
                    }
                    Err(e) => {
                        log::warn!("[{}] reconnect failed: {}", self.name(), e);
                        self.dispatcher.emit_error(e);
                    }
                }
            }
        }
    }

    fn link_gone(&self) -> SecsError {
        if self.closing.load(Ordering::SeqCst) {
            SecsError::ConnectionClosed
        } else {
            SecsError::ConnectionLost
        }
    }

    /// Queue `message` and wait until all its blocks are acknowledged
    async fn transmit(&self, message: SecsMessage) -> SecsResult<()> {
        let link = self.current_link()?;
        log::debug!(
            "[{}] sending system=0x{:08X} {}",
            self.name(),
            message.system_bytes(),
            message.to_sml()
        );
        let (done, done_rx) = oneshot::channel();
        link.outbox
            .send(Outgoing { message, done })
            .await
            .map_err(|_| self.link_gone())?;
        done_rx.await.map_err(|_| self.link_gone())??;
        self.dispatcher.statistics().increment_messages_sent();
        Ok(())
    }
}

impl PassiveHost for Secs1Inner {
    fn name(&self) -> &str {
        &self.config.common.name
    }

    fn rebind_delay(&self) -> Duration {
        self.config.common.timeouts.rebind
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    fn has_session(&self) -> bool {
        lock(&self.link).is_some()
    }

    fn attach(
        self: Arc<Self>,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> SecsResult<oneshot::Receiver<()>> {
        let transport = TcpTransport::from_connected_stream(stream, None);
        self.attach_transport(Box::new(transport), peer.to_string())
    }

    fn report_error(&self, error: SecsError) {
        self.dispatcher.emit_error(error);
    }
}

/// SECS-I communicator
///
/// Drives one half-duplex line. Serial and TCP Active lines are re-opened
/// T5 after they fail; TCP Passive listens with the same single-session
/// rule and rebind delay as HSMS Passive.
pub struct Secs1Communicator {
    inner: Arc<Secs1Inner>,
}

impl Secs1Communicator {
    pub fn new(config: Secs1Config) -> SecsResult<Self> {
        config.common.validate()?;
        let dispatcher = Arc::new(MessageDispatcher::new(
            config.common.name.clone(),
            config.common.device_id,
            config.common.event_capacity,
        ));
        let (state_tx, _) = watch::channel(Secs1LinkState::NotConnected);
        Ok(Self {
            inner: Arc::new(Secs1Inner {
                config,
                dispatcher,
                state_tx,
                link: Mutex::new(None),
                next_link_id: AtomicU64::new(0),
                closing: AtomicBool::new(false),
                opened: AtomicBool::new(false),
                local_addr: Mutex::new(None),
                tasks: Mutex::new(Vec::new()),
                lifecycle: tokio::sync::Mutex::new(()),
            }),
        })
    }

    pub fn port(&self) -> &Secs1Port {
        &self.inner.config.port
    }

    pub fn state(&self) -> Secs1LinkState {
        self.inner.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<Secs1LinkState> {
        self.inner.state_tx.subscribe()
    }

    /// Address the passive listener is bound to
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *lock(&self.inner.local_addr)
    }
}

#[async_trait]
impl Communicator for Secs1Communicator {
    async fn open(&self) -> SecsResult<()> {
        let inner = &self.inner;
        let _guard = inner.lifecycle.lock().await;
        if inner.opened.load(Ordering::SeqCst) {
            return Ok(());
        }
        inner.closing.store(false, Ordering::SeqCst);
        if inner.state() == Secs1LinkState::Closed {
            inner.set_state(Secs1LinkState::NotConnected);
        }

        match &inner.config.port {
            Secs1Port::TcpPassive { address } => {
                let (bound_tx, bound_rx) = oneshot::channel();
                let listener = tokio::spawn(run_passive(inner.clone(), address.clone(), bound_tx));
                match bound_rx.await {
                    Ok(Ok(addr)) => *lock(&inner.local_addr) = Some(addr),
                    Ok(Err(e)) => {
                        let _ = listener.await;
                        return Err(e);
                    }
                    Err(_) => return Err(SecsError::ConnectionClosed),
                }
                lock(&inner.tasks).push(listener);
            }
            Secs1Port::Serial { .. } | Secs1Port::TcpActive { .. } => {
                let ended = inner.clone().connect().await?;
                let supervisor = tokio::spawn(inner.clone().supervise(ended));
                lock(&inner.tasks).push(supervisor);
            }
        }
        inner.opened.store(true, Ordering::SeqCst);
        log::info!("[{}] opened ({:?})", inner.name(), inner.config.port);
        Ok(())
    }

    async fn close(&self) -> SecsResult<()> {
        let inner = &self.inner;
        let _guard = inner.lifecycle.lock().await;
        inner.closing.store(true, Ordering::SeqCst);

        let tasks: Vec<_> = lock(&inner.tasks).drain(..).collect();
        for task in tasks {
            task.abort();
            let _ = task.await;
        }

        inner.dispatcher.fail_all(|| SecsError::ConnectionClosed);
        if let Ok(link) = inner.current_link() {
            link.stop.notify_one();
            let driver = lock(&link.driver).take();
            if let Some(driver) = driver {
                driver.abort();
                let _ = driver.await;
            }
            inner.detach(link.id, None);
        }

        inner.set_state(Secs1LinkState::Closed);
        *lock(&inner.local_addr) = None;
        inner.opened.store(false, Ordering::SeqCst);
        log::info!("[{}] closed", inner.name());
        Ok(())
    }

    async fn send(
        &self,
        stream: u8,
        function: u8,
        w_bit: bool,
        body: Option<Item>,
    ) -> SecsResult<Option<SecsMessage>> {
        let inner = &self.inner;
        inner.current_link()?;
        let system_bytes = inner.dispatcher.allocate_system_bytes();
        let message = SecsMessage::new(
            stream as u32,
            function as u32,
            w_bit,
            body,
            system_bytes,
            inner.config.common.device_id,
        )?;
        let label = message.to_string();

        let waiter = if w_bit {
            Some(inner.dispatcher.register(system_bytes)?)
        } else {
            None
        };
        inner.transmit(message).await?;

        let Some(waiter) = waiter else {
            return Ok(None);
        };
        match waiter.wait(inner.config.common.timeouts.t3, Timer::T3).await {
            Ok(reply) => Ok(Some(reply)),
            Err(e) => {
                if e.is_timeout() {
                    inner.dispatcher.statistics().increment_timeouts();
                    log::warn!(
                        "[{}] T3 expired waiting for reply to {} system=0x{:08X}",
                        inner.name(),
                        label,
                        system_bytes
                    );
                }
                Err(e)
            }
        }
    }

    async fn reply(
        &self,
        primary: &SecsMessage,
        stream: u8,
        function: u8,
        body: Option<Item>,
    ) -> SecsResult<()> {
        let message = SecsMessage::reply_to(primary, stream as u32, function as u32, body)?;
        self.inner.transmit(message).await
    }

    fn subscribe(&self) -> broadcast::Receiver<CommunicatorEvent> {
        self.inner.dispatcher.subscribe()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn device_id(&self) -> u16 {
        self.inner.config.common.device_id
    }

    fn is_equip(&self) -> bool {
        self.inner.config.common.is_equip
    }

    fn is_ready(&self) -> bool {
        self.inner.state().is_ready()
    }

    async fn until_ready(&self) -> SecsResult<()> {
        let mut rx = self.inner.state_tx.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            match state {
                Secs1LinkState::Connected => return Ok(()),
                Secs1LinkState::Closed => return Err(SecsError::ConnectionClosed),
                Secs1LinkState::NotConnected => {}
            }
            rx.changed()
                .await
                .map_err(|_| SecsError::ConnectionClosed)?;
        }
    }

    fn statistics(&self) -> StatisticsSnapshot {
        self.inner.dispatcher.statistics().snapshot()
    }
}

impl Drop for Secs1Communicator {
    fn drop(&mut self) {
        self.inner.closing.store(true, Ordering::SeqCst);
        for task in lock(&self.inner.tasks).drain(..) {
            task.abort();
        }
        if let Some(link) = lock(&self.inner.link).take() {
            link.stop.notify_one();
            if let Some(driver) = lock(&link.driver).take() {
                driver.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CommunicatorConfig, Timeouts};

    fn passive() -> Secs1Communicator {
        Secs1Communicator::new(Secs1Config {
            port: Secs1Port::TcpPassive {
                address: "127.0.0.1:0".to_string(),
            },
            common: CommunicatorConfig {
                name: "equip".to_string(),
                is_equip: true,
                timeouts: Timeouts {
                    rebind: Duration::from_millis(50),
                    ..Timeouts::default()
                },
                ..CommunicatorConfig::default()
            },
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_passive_attaches_and_closes() {
        let comm = passive();
        comm.open().await.unwrap();
        assert_eq!(comm.state(), Secs1LinkState::NotConnected);
        let _peer = TcpStream::connect(comm.local_addr().unwrap()).await.unwrap();
        comm.until_ready().await.unwrap();
        assert!(comm.is_ready());

        comm.close().await.unwrap();
        assert_eq!(comm.state(), Secs1LinkState::Closed);
        assert!(matches!(
            comm.send(1, 1, true, None).await,
            Err(SecsError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_passive_port_cannot_dial() {
        let comm = passive();
        let err = comm.inner.clone().connect().await.unwrap_err();
        assert!(matches!(err, SecsError::Config(_)));
    }
}
