//! HSMS communicator (SEMI E37 single session)

use crate::communicator::Communicator;
use crate::config::{ConnectionMode, HsmsConfig, Timeouts};
use crate::dispatcher::MessageDispatcher;
use crate::error::{SecsError, SecsResult, Timer};
use crate::event::CommunicatorEvent;
use crate::hsms::frame::{HsmsFrame, HsmsFrameDecoder};
use crate::hsms::header::{HsmsHeader, RejectReason, SType, SelectStatus};
use crate::hsms::state::HsmsConnectionState;
use crate::passive::{PassiveHost, run_passive};
use crate::pending::{PendingRequests, lock};
use crate::statistics::StatisticsSnapshot;
use async_trait::async_trait;
use secs_codec::SecsMessage;
use secs_core::Item;
use secs_transport::{TcpSettings, TcpTransport, TransportLayer};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Notify, broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// One attached TCP connection
struct HsmsLink {
    id: u64,
    peer: SocketAddr,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    stop: Notify,
    ended: Mutex<Option<oneshot::Sender<()>>>,
}

enum FrameOutcome {
    Continue,
    Separated,
}

struct HsmsInner {
    config: HsmsConfig,
    dispatcher: MessageDispatcher,
    control: PendingRequests<HsmsHeader>,
    state_tx: watch::Sender<HsmsConnectionState>,
    link: Mutex<Option<Arc<HsmsLink>>>,
    next_link_id: AtomicU64,
    closing: AtomicBool,
    opened: AtomicBool,
    local_addr: Mutex<Option<SocketAddr>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    lifecycle: tokio::sync::Mutex<()>,
}

impl HsmsInner {
    fn name(&self) -> &str {
        &self.config.common.name
    }

    fn timeouts(&self) -> Timeouts {
        self.config.common.timeouts
    }

    fn state(&self) -> HsmsConnectionState {
        *self.state_tx.borrow()
    }

    fn transition_to(&self, new_state: HsmsConnectionState) -> SecsResult<()> {
        let mut result = Ok(());
        self.state_tx.send_if_modified(|state| {
            if let Err(e) = state.validate_transition(new_state) {
                result = Err(e);
                return false;
            }
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
        result
    }

    fn current_link(&self) -> SecsResult<Arc<HsmsLink>> {
        lock(&self.link).clone().ok_or(SecsError::NotConnected)
    }

    async fn write_frame(&self, link: &HsmsLink, frame: &HsmsFrame) -> SecsResult<()> {
        let bytes = frame.encode();
        let mut writer = link.writer.lock().await;
        writer.write_all(&bytes).await?;
        log::trace!("[{}] sent {} bytes", self.name(), bytes.len());
        Ok(())
    }

    async fn send_control(&self, link: &HsmsLink, header: HsmsHeader) -> SecsResult<()> {
        log::debug!(
            "[{}] sending {} system=0x{:08X}",
            self.name(),
            header.stype().map(|s| s.as_str()).unwrap_or("?"),
            header.system_bytes
        );
        self.write_frame(link, &HsmsFrame::control(header)).await
    }

    async fn reject(
        &self,
        link: &HsmsLink,
        header: &HsmsHeader,
        reason: RejectReason,
    ) -> SecsResult<()> {
        log::warn!(
            "[{}] rejecting s_type={} p_type={} system=0x{:08X}: {:?}",
            self.name(),
            header.s_type,
            header.p_type,
            header.system_bytes,
            reason
        );
        self.dispatcher.statistics().increment_rejects_sent();
        self.send_control(link, HsmsHeader::reject(header, reason))
            .await
    }

    /// Encode, size-check and write a data message
    async fn write_message(&self, link: &HsmsLink, message: &SecsMessage) -> SecsResult<()> {
        let frame = HsmsFrame::data(message)?;
        if frame.body.len() > self.config.common.max_message_size {
            return Err(SecsError::InvalidMessage(format!(
                "body of {} bytes exceeds limit {}",
                frame.body.len(),
                self.config.common.max_message_size
            )));
        }
        if let Err(e) = self.write_frame(link, &frame).await {
            self.disconnect(link.id, None).await;
            return Err(e);
        }
        self.dispatcher.statistics().increment_messages_sent();
        log::debug!(
            "[{}] sent system=0x{:08X} {}",
            self.name(),
            message.system_bytes(),
            message.to_sml()
        );
        Ok(())
    }

    fn attach_stream(
        self: Arc<Self>,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> SecsResult<oneshot::Receiver<()>> {
        let _ = stream.set_nodelay(true);
        let (reader, writer) = stream.into_split();
        let (ended_tx, ended_rx) = oneshot::channel();
        let link = Arc::new(HsmsLink {
            id: self.next_link_id.fetch_add(1, Ordering::SeqCst) + 1,
            peer,
            writer: tokio::sync::Mutex::new(writer),
            stop: Notify::new(),
            ended: Mutex::new(Some(ended_tx)),
        });
        {
            let mut slot = lock(&self.link);
            if slot.is_some() {
                return Err(SecsError::SessionRejected(format!(
                    "session already attached, dropping {}",
                    peer
                )));
            }
            *slot = Some(link.clone());
        }

        if self.state() != HsmsConnectionState::Connecting {
            self.transition_to(HsmsConnectionState::Connecting)?;
        }
        self.transition_to(HsmsConnectionState::NotSelected)?;
        self.dispatcher.statistics().increment_connects();
        log::info!("[{}] connected to {}", self.name(), peer);
        self.dispatcher.emit(CommunicatorEvent::Connected);

        tokio::spawn(self.read_loop(link, reader));
        Ok(ended_rx)
    }

    async fn read_loop(self: Arc<Self>, link: Arc<HsmsLink>, mut reader: OwnedReadHalf) {
        let timeouts = self.timeouts();
        let mut decoder = HsmsFrameDecoder::new(self.config.common.max_message_size);
        let mut t7_deadline: Option<Instant> = None;

        let reason = loop {
            // T7 runs whenever the session is connected but not selected
            if self.state().is_ready() {
                t7_deadline = None;
            } else if t7_deadline.is_none() {
                t7_deadline = Some(Instant::now() + timeouts.t7);
            }
            let t7 = async move {
                match t7_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = link.stop.notified() => break None,
                _ = t7 => {
                    if self.state().is_ready() {
                        continue;
                    }
                    log::warn!("[{}] T7 expired without Select", self.name());
                    self.dispatcher.statistics().increment_timeouts();
                    break Some(SecsError::Timeout(Timer::T7));
                }
                frame = decoder.read_frame(&mut reader, timeouts.t8) => match frame {
                    Ok(Some(frame)) => match self.handle_frame(&link, frame).await {
                        Ok(FrameOutcome::Continue) => {}
                        Ok(FrameOutcome::Separated) => break None,
                        Err(e) => break Some(e),
                    },
                    Ok(None) => {
                        log::info!("[{}] peer {} closed the connection", self.name(), link.peer);
                        break None;
                    }
                    Err(e) => {
                        if e.timer() == Some(Timer::T8) {
                            self.dispatcher.statistics().increment_timeouts();
                        }
                        break Some(e);
                    }
                },
            }
        };
        self.disconnect(link.id, reason).await;
    }

    async fn handle_frame(&self, link: &HsmsLink, frame: HsmsFrame) -> SecsResult<FrameOutcome> {
        let header = frame.header;
        if header.p_type != 0 {
            self.reject(link, &header, RejectReason::PTypeNotSupported)
                .await?;
            return Ok(FrameOutcome::Continue);
        }
        let Some(stype) = header.stype() else {
            self.reject(link, &header, RejectReason::STypeNotSupported)
                .await?;
            return Ok(FrameOutcome::Continue);
        };
        if stype != SType::Data {
            log::debug!(
                "[{}] received {} system=0x{:08X}",
                self.name(),
                stype.as_str(),
                header.system_bytes
            );
        }

        match stype {
            SType::Data => {
                if !self.state().is_ready() {
                    self.reject(link, &header, RejectReason::EntityNotSelected)
                        .await?;
                    return Ok(FrameOutcome::Continue);
                }
                match frame.to_message() {
                    Ok(message) => self.dispatcher.dispatch(message),
                    Err(e) => {
                        log::warn!("[{}] undecodable data message: {}", self.name(), e);
                        self.dispatcher.emit_error(e);
                    }
                }
            }
            SType::SelectReq => {
                let status = if self.state().is_ready() {
                    SelectStatus::AlreadyActive
                } else {
                    SelectStatus::Ok
                };
                self.send_control(
                    link,
                    HsmsHeader::response(&header, SType::SelectRsp, status.to_u8()),
                )
                .await?;
                if status == SelectStatus::Ok {
                    self.mark_selected();
                }
            }
            SType::SelectRsp => {
                if SelectStatus::from_u8(header.byte3) == SelectStatus::Ok
                    && self.control.contains(header.system_bytes)
                {
                    self.mark_selected();
                }
                self.resolve_control(link, header).await?;
            }
            SType::DeselectReq => {
                self.send_control(link, HsmsHeader::response(&header, SType::DeselectRsp, 0))
                    .await?;
                self.mark_deselected();
            }
            SType::DeselectRsp => {
                if header.byte3 == 0 && self.control.contains(header.system_bytes) {
                    self.mark_deselected();
                }
                self.resolve_control(link, header).await?;
            }
            SType::LinktestReq => {
                self.send_control(link, HsmsHeader::response(&header, SType::LinktestRsp, 0))
                    .await?;
            }
            SType::LinktestRsp => self.resolve_control(link, header).await?,
            SType::RejectReq => {
                self.dispatcher.statistics().increment_rejects_received();
                log::warn!(
                    "[{}] peer rejected system=0x{:08X} reason {}",
                    self.name(),
                    header.system_bytes,
                    header.byte3
                );
                let error =
                    || SecsError::Protocol(format!("rejected by peer, reason {}", header.byte3));
                if !self.control.fail(header.system_bytes, error()) {
                    self.dispatcher.pending().fail(header.system_bytes, error());
                }
            }
            SType::SeparateReq => {
                log::info!("[{}] separated by peer", self.name());
                return Ok(FrameOutcome::Separated);
            }
        }
        Ok(FrameOutcome::Continue)
    }

    /// Hand a control response to its waiter, or reject it as unexpected
    async fn resolve_control(&self, link: &HsmsLink, header: HsmsHeader) -> SecsResult<()> {
        if self.control.resolve(header.system_bytes, header).is_err() {
            self.reject(link, &header, RejectReason::TransactionNotOpen)
                .await?;
        }
        Ok(())
    }

    fn mark_selected(&self) {
        if self.state().is_ready() {
            return;
        }
        if self.transition_to(HsmsConnectionState::Selected).is_ok() {
            log::info!("[{}] selected", self.name());
            self.dispatcher.emit(CommunicatorEvent::Selected);
        }
    }

    fn mark_deselected(&self) {
        if self.state().is_ready()
            && self
                .transition_to(HsmsConnectionState::NotSelected)
                .is_ok()
        {
            log::info!("[{}] deselected", self.name());
        }
    }

    /// Send a control request and wait T6 for its response
    ///
    /// T6 expiry drops the connection.
    async fn control_transaction(
        &self,
        link: &HsmsLink,
        s_type: SType,
    ) -> SecsResult<HsmsHeader> {
        let system_bytes = self.dispatcher.allocate_system_bytes();
        let waiter = self.control.register(system_bytes)?;
        if let Err(e) = self
            .send_control(link, HsmsHeader::control(s_type, system_bytes))
            .await
        {
            self.disconnect(link.id, None).await;
            return Err(e);
        }
        match waiter.wait(self.timeouts().t6, Timer::T6).await {
            Err(SecsError::Timeout(timer)) => {
                log::warn!(
                    "[{}] {} unanswered within T6",
                    self.name(),
                    s_type.as_str()
                );
                self.dispatcher.statistics().increment_timeouts();
                self.disconnect(link.id, Some(SecsError::Timeout(timer)))
                    .await;
                Err(SecsError::Timeout(timer))
            }
            other => other,
        }
    }

    /// Tear down link `link_id`; a no-op once it is already gone
    async fn disconnect(&self, link_id: u64, reason: Option<SecsError>) {
        let link = {
            let mut slot = lock(&self.link);
            let current = slot.as_ref().is_some_and(|link| link.id == link_id);
            if current { slot.take() } else { None }
        };
        let Some(link) = link else {
            return;
        };

        link.stop.notify_one();
        if let Ok(mut writer) = link.writer.try_lock() {
            let _ = writer.shutdown().await;
        }
        if self.state() != HsmsConnectionState::Closed {
            let _ = self.transition_to(HsmsConnectionState::NotConnected);
        }
        self.control.fail_all(|| SecsError::ConnectionLost);
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

    /// Dial, attach and Select; the receiver completes when the link ends
    async fn connect_active(self: Arc<Self>) -> SecsResult<oneshot::Receiver<()>> {
        let t5 = self.timeouts().t5;
        self.transition_to(HsmsConnectionState::Connecting)?;
        log::info!("[{}] connecting to {}", self.name(), self.config.address);

        let mut transport =
            TcpTransport::new(TcpSettings::with_connect_timeout(self.config.address.clone(), t5));
        let connected = match transport.open().await {
            Ok(()) => transport
                .into_stream()
                .ok_or(SecsError::NotConnected)
                .and_then(|stream| {
                    let peer = stream.peer_addr()?;
                    Ok((stream, peer))
                }),
            Err(e) => Err(e),
        };
        let (stream, peer) = match connected {
            Ok(pair) => pair,
            Err(e) => {
                let _ = self.transition_to(HsmsConnectionState::NotConnected);
                return Err(e);
            }
        };

        let ended = self.clone().attach_stream(stream, peer)?;
        let link = self.current_link()?;
        let response = match self.control_transaction(&link, SType::SelectReq).await {
            Ok(response) => response,
            Err(e) => {
                // no-op when T6 already dropped the link
                self.disconnect(link.id, None).await;
                return Err(e);
            }
        };
        match SelectStatus::from_u8(response.byte3) {
            SelectStatus::Ok | SelectStatus::AlreadyActive => {
                self.mark_selected();
                Ok(ended)
            }
            status => {
                self.disconnect(link.id, None).await;
                Err(SecsError::SessionRejected(format!(
                    "Select refused with status {:?}",
                    status
                )))
            }
        }
    }

    /// Re-dial after every disconnect, T5 apart, until closed
    async fn supervise_active(self: Arc<Self>, mut ended: oneshot::Receiver<()>) {
        loop {
            let _ = (&mut ended).await;
            loop {
                if self.closing.load(Ordering::SeqCst) {
                    return;
                }
                tokio::time::sleep(self.timeouts().t5).await;
                if self.closing.load(Ordering::SeqCst) {
                    return;
                }
                match self.clone().connect_active().await {
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
}

impl PassiveHost for HsmsInner {
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
        self.attach_stream(stream, peer)
    }

    fn report_error(&self, error: SecsError) {
        self.dispatcher.emit_error(error);
    }
}

/// HSMS communicator
///
/// Active mode dials the peer, sends Select.req and re-dials T5 after every
/// disconnect. Passive mode listens, serves one session at a time and binds
/// again `rebind` after the session ends.
pub struct HsmsCommunicator {
    inner: Arc<HsmsInner>,
}

impl HsmsCommunicator {
    pub fn new(config: HsmsConfig) -> SecsResult<Self> {
        config.common.validate()?;
        let dispatcher = MessageDispatcher::new(
            config.common.name.clone(),
            config.common.device_id,
            config.common.event_capacity,
        );
        let (state_tx, _) = watch::channel(HsmsConnectionState::NotConnected);
        Ok(Self {
            inner: Arc::new(HsmsInner {
                config,
                dispatcher,
                control: PendingRequests::new(),
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

    pub fn mode(&self) -> ConnectionMode {
        self.inner.config.mode
    }

    pub fn state(&self) -> HsmsConnectionState {
        self.inner.state()
    }

    /// Watch connection state changes
    pub fn watch_state(&self) -> watch::Receiver<HsmsConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Address the passive listener is bound to
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *lock(&self.inner.local_addr)
    }

    /// Linktest round trip, bounded by T6
    pub async fn linktest(&self) -> SecsResult<()> {
        let link = self.inner.current_link()?;
        self.inner
            .control_transaction(&link, SType::LinktestReq)
            .await
            .map(|_| ())
    }

    /// Leave the Selected state without dropping the connection
    pub async fn deselect(&self) -> SecsResult<()> {
        let link = self.inner.current_link()?;
        let response = self
            .inner
            .control_transaction(&link, SType::DeselectReq)
            .await?;
        if response.byte3 != 0 {
            return Err(SecsError::Protocol(format!(
                "Deselect refused with status {}",
                response.byte3
            )));
        }
        Ok(())
    }

    fn require_selected(&self) -> SecsResult<Arc<HsmsLink>> {
        let link = self.inner.current_link()?;
        if !self.inner.state().is_ready() {
            return Err(SecsError::Protocol("session is not selected".to_string()));
        }
        Ok(link)
    }
}

#[async_trait]
impl Communicator for HsmsCommunicator {
    async fn open(&self) -> SecsResult<()> {
        let inner = &self.inner;
        let _guard = inner.lifecycle.lock().await;
        if inner.opened.load(Ordering::SeqCst) {
            return Ok(());
        }
        inner.closing.store(false, Ordering::SeqCst);
        if inner.state() == HsmsConnectionState::Closed {
            inner.transition_to(HsmsConnectionState::NotConnected)?;
        }

        match inner.config.mode {
            ConnectionMode::Active => {
                let ended = inner.clone().connect_active().await?;
                let supervisor = tokio::spawn(inner.clone().supervise_active(ended));
                lock(&inner.tasks).push(supervisor);
            }
            ConnectionMode::Passive => {
                let (bound_tx, bound_rx) = oneshot::channel();
                let listener = tokio::spawn(run_passive(
                    inner.clone(),
                    inner.config.address.clone(),
                    bound_tx,
                ));
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
        }
        inner.opened.store(true, Ordering::SeqCst);
        log::info!("[{}] opened ({:?})", inner.name(), inner.config.mode);
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

        inner.control.fail_all(|| SecsError::ConnectionClosed);
        inner.dispatcher.fail_all(|| SecsError::ConnectionClosed);

        if let Ok(link) = inner.current_link() {
            if inner.state().is_ready() {
                let separate = HsmsHeader::control(
                    SType::SeparateReq,
                    inner.dispatcher.allocate_system_bytes(),
                );
                if let Err(e) = inner.send_control(&link, separate).await {
                    log::debug!("[{}] Separate.req not sent: {}", inner.name(), e);
                }
            }
            inner.disconnect(link.id, None).await;
        }

        let _ = inner.transition_to(HsmsConnectionState::Closed);
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
        let link = self.require_selected()?;
        let system_bytes = inner.dispatcher.allocate_system_bytes();
        let message = SecsMessage::new(
            stream as u32,
            function as u32,
            w_bit,
            body,
            system_bytes,
            inner.config.common.device_id,
        )?;

        let waiter = if w_bit {
            Some(inner.dispatcher.register(system_bytes)?)
        } else {
            None
        };
        inner.write_message(&link, &message).await?;

        let Some(waiter) = waiter else {
            return Ok(None);
        };
        match waiter.wait(inner.timeouts().t3, Timer::T3).await {
            Ok(reply) => Ok(Some(reply)),
            Err(e) => {
                if e.is_timeout() {
                    inner.dispatcher.statistics().increment_timeouts();
                    log::warn!(
                        "[{}] T3 expired waiting for reply to {} system=0x{:08X}",
                        inner.name(),
                        message,
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
        let link = self.require_selected()?;
        let message = SecsMessage::reply_to(primary, stream as u32, function as u32, body)?;
        self.inner.write_message(&link, &message).await
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
                HsmsConnectionState::Selected => return Ok(()),
                HsmsConnectionState::Closed => return Err(SecsError::ConnectionClosed),
                _ => {}
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

impl Drop for HsmsCommunicator {
    fn drop(&mut self) {
        self.inner.closing.store(true, Ordering::SeqCst);
        for task in lock(&self.inner.tasks).drain(..) {
            task.abort();
        }
        if let Some(link) = lock(&self.inner.link).take() {
            link.stop.notify_one();
        }
    }
}
