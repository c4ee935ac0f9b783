//! Passive listener loop shared by HSMS and SECS-I on TCP/IP

use crate::error::{SecsError, SecsResult};
use secs_transport::TcpAcceptor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::oneshot;

/// Communicator side of the passive loop
pub(crate) trait PassiveHost: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn rebind_delay(&self) -> Duration;

    fn is_closing(&self) -> bool;

    fn has_session(&self) -> bool;

    /// Take over an accepted socket; the receiver completes when the session ends
    fn attach(self: Arc<Self>, stream: TcpStream, peer: SocketAddr) -> SecsResult<oneshot::Receiver<()>>;

    fn report_error(&self, error: SecsError);
}

async fn session_end(end: &mut Option<oneshot::Receiver<()>>) {
    match end {
        Some(rx) => {
            let _ = rx.await;
        }
        None => std::future::pending().await,
    }
}

/// Listen, serve one session, close the listener, wait `rebind`, repeat
///
/// While a session is attached the listener stays bound and every further
/// connection is closed immediately. The first bind result is reported
/// through `bound`; later bind failures are reported to the host and retried.
pub(crate) async fn run_passive<H: PassiveHost>(
    host: Arc<H>,
    address: String,
    bound: oneshot::Sender<SecsResult<SocketAddr>>,
) {
    let mut bound = Some(bound);
    while !host.is_closing() {
        let acceptor = match TcpAcceptor::bind(&address).await {
            Ok(acceptor) => {
                if let Some(tx) = bound.take() {
                    let _ = tx.send(Ok(acceptor.local_addr()));
                }
                acceptor
            }
            Err(e) => {
                if let Some(tx) = bound.take() {
                    let _ = tx.send(Err(e));
                    return;
                }
                log::warn!("[{}] bind {} failed: {}", host.name(), address, e);
                host.report_error(e);
                tokio::time::sleep(host.rebind_delay()).await;
                continue;
            }
        };
        log::info!("[{}] listening on {}", host.name(), acceptor.local_addr());

        let mut end: Option<oneshot::Receiver<()>> = None;
        loop {
            tokio::select! {
                accepted = acceptor.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if end.is_some() || host.has_session() {
                            log::warn!("[{}] rejecting connection from {} (single session)", host.name(), peer);
                            drop(stream);
                            continue;
                        }
                        log::info!("[{}] accepted connection from {}", host.name(), peer);
                        match host.clone().attach(stream, peer) {
                            Ok(rx) => end = Some(rx),
                            Err(e) => host.report_error(e),
                        }
                    }
                    Err(e) => {
                        log::warn!("[{}] accept failed: {}", host.name(), e);
                        host.report_error(e);
                        break;
                    }
                },
                _ = session_end(&mut end) => {
                    log::info!("[{}] session ended, closing listener", host.name());
                    break;
                }
            }
        }
        drop(acceptor);

        if host.is_closing() {
            break;
        }
        tokio::time::sleep(host.rebind_delay()).await;
    }
}
