use chrono::NaiveDate;
use secs_gem::{Clock, CommAck, Gem, TiAck};
use secs_session::{Communicator, CommunicatorBuilder, CommunicatorEvent, HsmsCommunicator};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn equipment_clock() -> Clock {
    Clock::new(
        NaiveDate::from_ymd_opt(2026, 10, 17)
            .unwrap()
            .and_hms_milli_opt(9, 30, 5, 420)
            .unwrap(),
    )
}

/// Equipment side: answers S1F13, S2F17 and S2F31, everything else gets S9F5
fn spawn_equipment(gem: Arc<Gem<HsmsCommunicator>>) -> tokio::task::JoinHandle<()> {
    let mut events = gem.communicator().subscribe();
    tokio::spawn(async move {
        loop {
            let msg = match events.recv().await {
                Ok(CommunicatorEvent::Message(msg)) => msg,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return,
            };
            let result = match (msg.stream(), msg.function()) {
                (1, 13) => gem.s1f14(&msg, CommAck::Ok).await,
                (2, 17) => gem.s2f18(&msg, equipment_clock()).await,
                (2, 31) => gem.s2f32(&msg, TiAck::Ok).await,
                _ => gem.s9f5(&msg).await,
            };
            if result.is_err() {
                return;
            }
        }
    })
}

#[tokio::test]
async fn test_gem_over_hsms() {
    let _ = env_logger::builder().is_test(true).try_init();
    let port = free_port();
    let address = format!("127.0.0.1:{}", port);

    let equip = Arc::new(
        CommunicatorBuilder::new()
            .tcp(&address)
            .device_id(10)
            .equipment(true)
            .build_hsms_passive()
            .unwrap(),
    );
    equip.open().await.unwrap();
    let equip_gem = Arc::new(
        Gem::new(equip.clone())
            .with_mdln("MDLN-A")
            .with_softrev("000001"),
    );
    let _responder = spawn_equipment(equip_gem);

    let host = Arc::new(
        CommunicatorBuilder::new()
            .tcp(&address)
            .device_id(10)
            .t3(Duration::from_secs(5))
            .build_hsms_active()
            .unwrap(),
    );
    let mut host_events = host.subscribe();
    host.open().await.unwrap();
    let gem = Gem::new(host.clone());

    assert_eq!(gem.s1f13().await.unwrap(), CommAck::Ok.as_u8());
    assert_eq!(gem.s2f17().await.unwrap(), equipment_clock());
    assert_eq!(gem.s2f31_now().await.unwrap(), TiAck::Ok.as_u8());

    // an unknown primary comes back as S9F5 carrying our header
    host.send(64, 1, false, None).await.unwrap();
    let s9 = tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            if let Ok(CommunicatorEvent::Message(msg)) = host_events.recv().await {
                return msg;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!((s9.stream(), s9.function()), (9, 5));
    let mhead = s9.body().and_then(|item| item.as_binary()).unwrap();
    assert_eq!(mhead.len(), 10);
    assert_eq!(mhead[2], 64);
    assert_eq!(mhead[3], 1);

    host.close().await.unwrap();
    equip.close().await.unwrap();
}
