//! SECS-I equipment accepting a terminal server connection on TCP
//!
//! Run with `cargo run -p secs --example secs1_tcp_passive -- 127.0.0.1:8201`.

use log::{info, warn};
use secs::session::{Communicator, CommunicatorBuilder, CommunicatorEvent};
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8201".to_string());

    let equip = CommunicatorBuilder::new()
        .tcp(&address)
        .device_id(10)
        .equipment(true)
        .build_secs1_tcp_passive()?;
    let mut events = equip.subscribe();
    equip.open().await?;
    info!("waiting for a SECS-I peer on {}", address);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(CommunicatorEvent::Message(msg)) => {
                    info!("received\n{}", msg.to_sml());
                    if msg.w_bit() {
                        let function = msg.function().saturating_add(1);
                        if let Err(e) = equip.reply(&msg, msg.stream(), function, None).await {
                            warn!("cannot answer {}: {}", msg, e);
                        }
                    }
                }
                Ok(event) => info!("event: {}", event.as_str()),
                Err(RecvError::Lagged(n)) => warn!("dropped {} events", n),
                Err(RecvError::Closed) => break,
            },
        }
    }

    equip.close().await?;
    Ok(())
}
