//! HSMS host: establishes communication and reads the equipment clock
//!
//! Run with `cargo run -p secs --example hsms_host -- 127.0.0.1:5000`.

use log::info;
use secs::gem::Gem;
use secs::parse_item;
use secs::session::{Communicator, CommunicatorBuilder};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:5000".to_string());

    let host = Arc::new(
        CommunicatorBuilder::new()
            .tcp(&address)
            .device_id(10)
            .name("host")
            .t3(Duration::from_secs(10))
            .build_hsms_active()?,
    );
    host.open().await?;
    let gem = Gem::new(host.clone());

    info!("COMMACK {}", gem.s1f13().await?);
    info!("ONLACK {}", gem.s1f17().await?);
    info!("equipment clock {}", gem.s2f17().await?);

    let body = parse_item(r#"<L <A "LOT-0001"> <U4 25>>"#)?;
    if let Some(reply) = host.send(1, 1, true, Some(body)).await? {
        info!("reply\n{}", reply.to_sml());
    }

    info!("{:?}", host.statistics());
    host.close().await?;
    Ok(())
}
