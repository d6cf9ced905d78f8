use crate::*;

use sight_core::MessageKind;
use sight_services::{PumpLink, SessionError, StatusTaskRunner};

/// A running pump answers all six status queries in order.
#[tokio::test]
async fn test_status_fetch_running_pump() {
    let (transport, pump) = connect_pump(PumpStatus::Started);
    let mut link = PumpLink::new(transport);

    let status = link.run(StatusTaskRunner::new()).await.unwrap();

    assert_eq!(status.pump_status.pump_status, PumpStatus::Started);
    let boluses = status.active_boluses.expect("running pump reports boluses");
    let active: Vec<_> = boluses.active().collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].bolus_id, 7);
    assert_eq!(active[0].remaining_amount, 1.25);
    assert!(status.current_tbr.unwrap().is_active());
    assert_eq!(status.current_basal.unwrap().name, "Weekday");
    assert_eq!(status.battery.percentage, 64);
    assert_eq!(status.cartridge.amount, 187.5);

    drop(link);
    let sent: Vec<MessageKind> = pump
        .await
        .unwrap()
        .unwrap()
        .iter()
        .map(Command::kind)
        .collect();
    assert_eq!(
        sent,
        vec![
            MessageKind::PumpStatus,
            MessageKind::ActiveBoluses,
            MessageKind::CurrentTbr,
            MessageKind::CurrentBasal,
            MessageKind::BatteryAmount,
            MessageKind::CartridgeAmount,
        ]
    );
}

/// A stopped pump is only asked for battery and cartridge after its status.
#[tokio::test]
async fn test_status_fetch_stopped_pump() {
    let (transport, pump) = connect_pump(PumpStatus::Stopped);
    let mut link = PumpLink::new(transport);

    let status = link.run(StatusTaskRunner::new()).await.unwrap();
    assert!(status.active_boluses.is_none());
    assert!(status.current_tbr.is_none());
    assert!(status.current_basal.is_none());

    drop(link);
    assert_eq!(pump.await.unwrap().unwrap().len(), 3);
}

/// The pump vanishing mid-sequence fails the session with a transport error.
#[tokio::test]
async fn test_status_fetch_disconnect() {
    let (client, mut pump) = tokio::io::duplex(1024);
    let server = tokio::spawn(async move {
        let _ = read_frame(&mut pump).await;
        // hang up without answering
    });

    let mut link = PumpLink::new(StreamTransport::new(client));
    let err = link.run(StatusTaskRunner::new()).await.unwrap_err();
    assert!(
        matches!(err, SessionError::Transport(_)),
        "expected a transport error, got {err}"
    );
    server.await.unwrap();
}
