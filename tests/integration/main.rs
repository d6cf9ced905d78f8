//! Sight integration test harness.
//!
//! Each test wires the real crates together against a simulated pump on the
//! far end of an in-memory duplex stream. No hardware or network is needed:
//!
//!   cargo test --test integration

use std::path::PathBuf;
use std::sync::{mpsc, Arc, Mutex};

use anyhow::{Context, Result};
use tokio::io::DuplexStream;
use tokio::task::JoinHandle;

use sight_core::remote_control::BolusStarted;
use sight_core::status::{
    ActiveBolus, ActiveBolusesMessage, BatteryAmountMessage, BolusType, CartridgeAmountMessage,
    CurrentBasalMessage, CurrentTbrMessage, PumpStatus, PumpStatusMessage,
};
use sight_core::{AppMessage, Command};
use sight_services::transport::{read_frame, write_frame};
use sight_services::{AuthorizationRequester, StreamTransport, Transport, TransportError};

mod authorization;
mod quota;
mod status;

// ── Simulated pump ───────────────────────────────────────────────────────────

/// The reply a pump in `state` gives to `command`.
pub fn pump_reply(command: &Command, state: PumpStatus) -> AppMessage {
    match command {
        Command::PumpStatus => AppMessage::PumpStatus(PumpStatusMessage { pump_status: state }),
        Command::ActiveBoluses => {
            let mut message = ActiveBolusesMessage::default();
            message.slots[0] = ActiveBolus {
                bolus_id: 7,
                bolus_type: Some(BolusType::Extended),
                remaining_amount: 1.25,
                remaining_duration: 45,
            };
            AppMessage::ActiveBoluses(message)
        }
        Command::CurrentTbr => AppMessage::CurrentTbr(CurrentTbrMessage {
            percentage: 80,
            left_minutes: 30,
            initial_minutes: 60,
        }),
        Command::CurrentBasal => AppMessage::CurrentBasal(CurrentBasalMessage {
            name: "Weekday".into(),
            amount: 0.75,
        }),
        Command::BatteryAmount => AppMessage::BatteryAmount(BatteryAmountMessage { percentage: 64 }),
        Command::CartridgeAmount => {
            AppMessage::CartridgeAmount(CartridgeAmountMessage { amount: 187.5 })
        }
        Command::StandardBolus(_) => AppMessage::StandardBolus(BolusStarted { bolus_id: 100 }),
        Command::ExtendedBolus(_) => AppMessage::ExtendedBolus(BolusStarted { bolus_id: 101 }),
        Command::MultiwaveBolus(_) => AppMessage::MultiwaveBolus(BolusStarted { bolus_id: 102 }),
        Command::SetTbr(t) => AppMessage::SetTbr(t.clone()),
        Command::ChangeTbr(t) => AppMessage::ChangeTbr(t.clone()),
        Command::CancelTbr => AppMessage::CancelTbr,
    }
}

/// Serve the pump side of a link until the client hangs up. Returns every
/// command the pump received, in order.
pub fn spawn_pump(mut stream: DuplexStream, state: PumpStatus) -> JoinHandle<Result<Vec<Command>>> {
    tokio::spawn(async move {
        let mut received = Vec::new();
        loop {
            let frame = match read_frame(&mut stream).await {
                Ok(f) => f,
                Err(TransportError::Disconnected) => return Ok(received),
                Err(e) => return Err(e).context("pump read failed"),
            };
            let command = Command::decode(&frame).context("pump could not decode request")?;
            let reply = pump_reply(&command, state).encode()?;
            received.push(command);
            write_frame(&mut stream, &reply).await?;
        }
    })
}

/// Client transport connected to a freshly spawned simulated pump.
pub fn connect_pump(
    state: PumpStatus,
) -> (StreamTransport<DuplexStream>, JoinHandle<Result<Vec<Command>>>) {
    let (client, pump) = tokio::io::duplex(1024);
    (StreamTransport::new(client), spawn_pump(pump, state))
}

// ── Authorization UI ─────────────────────────────────────────────────────────

/// Stands in for the UI process: every request arrives on a channel as the
/// `REQUEST_AUTH` string the daemon would send.
pub struct UiChannel(Mutex<mpsc::Sender<String>>);

impl UiChannel {
    pub fn new() -> (Arc<Self>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel();
        (Arc::new(Self(Mutex::new(tx))), rx)
    }
}

impl AuthorizationRequester for UiChannel {
    fn request_authorization(&self, token: &str, reason: &str) {
        let message = sight_core::ControlMessage::AuthorizationRequest {
            token: token.to_owned(),
            reason: reason.to_owned(),
        };
        let _ = self.0.lock().unwrap().send(message.to_string());
    }
}

// ── Scratch files ────────────────────────────────────────────────────────────

/// Fresh per-test directory under the system temp dir.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("sight-it-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_pump_simulator_speaks_the_wire_format() {
    let (mut transport, pump) = connect_pump(PumpStatus::Started);

    let reply = transport
        .exchange(Command::BatteryAmount.encode().unwrap())
        .await
        .unwrap();
    assert_eq!(
        AppMessage::decode(&reply).unwrap(),
        AppMessage::BatteryAmount(BatteryAmountMessage { percentage: 64 })
    );

    drop(transport);
    assert_eq!(pump.await.unwrap().unwrap(), vec![Command::BatteryAmount]);
}
