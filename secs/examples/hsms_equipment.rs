//! HSMS equipment listening for a host
//!
//! Run with `cargo run -p secs --example hsms_equipment -- 127.0.0.1:5000`,
//! then start `hsms_host` against the same address.

use log::{info, warn};
use secs::gem::{CommAck, Gem, OnlAck, TiAck};
use secs::session::{Communicator, CommunicatorBuilder, CommunicatorEvent};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:5000".to_string());

    let equip = Arc::new(
        CommunicatorBuilder::new()
            .tcp(&address)
            .device_id(10)
            .equipment(true)
            .name("equip")
            .build_hsms_passive()?,
    );
    let gem = Gem::new(equip.clone())
        .with_mdln("DEMO-EQ")
        .with_softrev("1.0.0");
    let mut events = equip.subscribe();

    equip.open().await?;
    info!("listening on {}", address);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(CommunicatorEvent::Message(msg)) => {
                    info!("received\n{}", msg.to_sml());
                    let result = match (msg.stream(), msg.function()) {
                        (1, 1) => equip.reply(&msg, 1, 2, None).await,
                        (1, 13) => gem.s1f14(&msg, CommAck::Ok).await,
                        (1, 15) => gem.s1f16(&msg).await,
                        (1, 17) => gem.s1f18(&msg, OnlAck::Ok).await,
                        (2, 17) => gem.s2f18_now(&msg).await,
                        (2, 31) => gem.s2f32(&msg, TiAck::Ok).await,
                        (_, f) if f % 2 == 1 => gem.s9f5(&msg).await,
                        _ => Ok(()),
                    };
                    if let Err(e) = result {
                        warn!("cannot answer {}: {}", msg, e);
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
