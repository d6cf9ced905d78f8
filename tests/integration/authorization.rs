use crate::*;

use std::time::Duration;

use sight_core::remote_control::{StandardBolus, TbrSettings};
use sight_core::{ControlMessage, MessageKind};
use sight_services::{
    Firewall, FirewallSettings, PreferenceStore, PumpLink, SessionError, SingleMessageTaskRunner,
    StatusTaskRunner,
};

fn firewall(store: &PreferenceStore, ui: Arc<UiChannel>, timeout_ms: u64) -> Arc<Firewall> {
    let settings = FirewallSettings {
        auth_timeout: Duration::from_millis(timeout_ms),
        poll_interval: Duration::from_millis(20),
        ..FirewallSettings::default()
    };
    let firewall = Firewall::new(store, ui, settings).unwrap();
    firewall
        .apply_control_message("CHANGE_PREFS^firewall_password_boluses^true")
        .unwrap();
    Arc::new(firewall)
}

fn bolus(amount: f32) -> Command {
    Command::StandardBolus(StandardBolus { amount })
}

/// Plays the UI: answers the first request, after a decision for a token
/// that is not pending.
fn answer_once(
    firewall: Arc<Firewall>,
    requests: mpsc::Receiver<String>,
    approve: bool,
) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let request = requests.recv().unwrap();
        let ControlMessage::AuthorizationRequest { token, reason } =
            ControlMessage::parse(&request).unwrap()
        else {
            panic!("expected REQUEST_AUTH, got {request}");
        };
        firewall
            .apply_control_message("USER_AUTHORIZATION^xyz^true")
            .unwrap();
        let decision = ControlMessage::Authorization {
            token,
            approved: approve,
        };
        firewall
            .apply_control_message(&decision.to_string())
            .unwrap();
        reason
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bolus_delivered_after_user_approval() {
    let store = PreferenceStore::new();
    let (ui, requests) = UiChannel::new();
    let firewall = firewall(&store, ui, 5_000);
    let ui_thread = answer_once(firewall.clone(), requests, true);

    let (transport, pump) = connect_pump(PumpStatus::Started);
    let mut link = PumpLink::new(transport).with_firewall(firewall.clone());
    let reply = link
        .run(SingleMessageTaskRunner::new(bolus(2.5)))
        .await
        .unwrap();

    assert_eq!(reply.kind(), MessageKind::StandardBolus);
    assert_eq!(ui_thread.join().unwrap(), "Standard Bolus 2.5U");
    assert!(firewall.pending_authorization().is_none());

    drop(link);
    assert_eq!(pump.await.unwrap().unwrap(), vec![bolus(2.5)]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bolus_blocked_when_user_denies() {
    let store = PreferenceStore::new();
    let (ui, requests) = UiChannel::new();
    let firewall = firewall(&store, ui, 5_000);
    let ui_thread = answer_once(firewall.clone(), requests, false);

    let (transport, pump) = connect_pump(PumpStatus::Started);
    let mut link = PumpLink::new(transport).with_firewall(firewall);
    let err = link
        .run(SingleMessageTaskRunner::new(bolus(1.0)))
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::Blocked(MessageKind::StandardBolus)));
    ui_thread.join().unwrap();
    drop(link);
    assert!(pump.await.unwrap().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unanswered_prompt_times_out() {
    let store = PreferenceStore::new();
    let (ui, requests) = UiChannel::new();
    let firewall = firewall(&store, ui, 100);

    let (transport, _pump) = connect_pump(PumpStatus::Started);
    let mut link = PumpLink::new(transport).with_firewall(firewall.clone());
    let started = std::time::Instant::now();
    let err = link
        .run(SingleMessageTaskRunner::new(bolus(1.0)))
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::Blocked(_)));
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert!(requests.try_recv().unwrap().starts_with("REQUEST_AUTH^"));
    assert!(firewall.pending_authorization().is_none());
}

/// Policy changes from the UI take effect on the next command; status
/// queries are never gated.
#[tokio::test(flavor = "multi_thread")]
async fn test_disabled_temporary_basal_leaves_status_alone() {
    let store = PreferenceStore::new();
    let (ui, _requests) = UiChannel::new();
    let firewall = firewall(&store, ui, 100);
    firewall
        .apply_control_message("CHANGE_PREFS^firewall_allow_temporary_basal^false")
        .unwrap();

    let (transport, pump) = connect_pump(PumpStatus::Started);
    let mut link = PumpLink::new(transport).with_firewall(firewall.clone());

    let tbr = Command::SetTbr(TbrSettings {
        percentage: 150,
        duration: 60,
    });
    let err = link
        .run(SingleMessageTaskRunner::new(tbr.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Blocked(MessageKind::SetTbr)));

    let status = link.run(StatusTaskRunner::new()).await.unwrap();
    assert_eq!(status.battery.percentage, 64);

    firewall
        .apply_control_message("CHANGE_PREFS^firewall_allow_temporary_basal^true")
        .unwrap();
    let reply = link.run(SingleMessageTaskRunner::new(tbr)).await.unwrap();
    assert_eq!(reply.kind(), MessageKind::SetTbr);

    drop(link);
    let sent = pump.await.unwrap().unwrap();
    assert_eq!(sent.len(), 7);
    assert_eq!(sent.last().map(Command::kind), Some(MessageKind::SetTbr));
}
