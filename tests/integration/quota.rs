use crate::*;

use std::time::Duration;

use sight_core::remote_control::{MultiwaveBolus, StandardBolus};
use sight_services::firewall::{
    AUTHORIZE_BOLUSES, FIREWALL_NAMESPACE, PREF_WINDOW_LIMIT, PREF_WINDOW_MS,
};
use sight_services::{Firewall, FirewallSettings, PreferenceStore};

fn quick() -> FirewallSettings {
    FirewallSettings {
        auth_timeout: Duration::from_millis(30),
        poll_interval: Duration::from_millis(10),
        ..FirewallSettings::default()
    }
}

fn configure(store: &PreferenceStore, limit: &str) {
    let prefs = store.namespace(FIREWALL_NAMESPACE);
    prefs.set_bool(AUTHORIZE_BOLUSES, true);
    prefs.set_string(PREF_WINDOW_LIMIT, limit);
    prefs.set_string(PREF_WINDOW_MS, "3600000");
}

fn bolus(amount: f32) -> Command {
    Command::StandardBolus(StandardBolus { amount })
}

/// Boluses charged against the quota before a restart still count after it.
#[test]
fn test_quota_survives_restart() {
    let dir = scratch_dir("quota-restart");
    let path = dir.join("preferences.json");

    {
        let store = PreferenceStore::with_persistence(path.clone());
        configure(&store, "5");
        let (ui, requests) = UiChannel::new();
        let firewall = Firewall::new(&store, ui, quick()).unwrap();

        assert!(firewall.is_allowed(&bolus(3.0)));
        assert!(requests.try_recv().is_err(), "within quota must not prompt");
    }

    let text = std::fs::read_to_string(&path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    let records = json["SLIDING_WINDOW/SLIDING_PERSIST_generic-bolus-restriction"]
        .as_str()
        .expect("quota records persisted as a JSON string");
    let records: serde_json::Value = serde_json::from_str(records).unwrap();
    assert_eq!(records[0]["value"], 3.0);

    let store = PreferenceStore::with_persistence(path);
    let (ui, requests) = UiChannel::new();
    let firewall = Firewall::new(&store, ui, quick()).unwrap();

    // 3 + 2.5 exceeds 5: escalated, unanswered, denied.
    assert!(!firewall.is_allowed(&bolus(2.5)));
    assert!(requests.try_recv().is_ok());
    assert!(firewall.is_allowed(&bolus(2.0)));
    assert_eq!(firewall.quota().total(), 5.0);

    let _ = std::fs::remove_dir_all(&dir);
}

/// Many callers racing for the same budget never spend more than it.
#[test]
fn test_concurrent_boluses_never_overspend() {
    let store = PreferenceStore::new();
    configure(&store, "10");
    let (ui, _requests) = UiChannel::new();
    let firewall = Arc::new(Firewall::new(&store, ui, quick()).unwrap());

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let firewall = firewall.clone();
            std::thread::spawn(move || {
                (0..5)
                    .filter(|_| firewall.is_allowed(&bolus(0.5)))
                    .count()
            })
        })
        .collect();
    let allowed: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();

    assert_eq!(allowed, 20);
    assert_eq!(firewall.quota().total(), 10.0);
}

/// Multiwave boluses are charged for both parts.
#[test]
fn test_multiwave_charges_both_parts() {
    let store = PreferenceStore::new();
    configure(&store, "4");
    let (ui, _requests) = UiChannel::new();
    let firewall = Firewall::new(&store, ui, quick()).unwrap();

    let multiwave = Command::MultiwaveBolus(MultiwaveBolus {
        amount: 1.5,
        delayed_amount: 2.0,
        duration: 60,
    });
    assert!(firewall.is_allowed(&multiwave));
    assert_eq!(firewall.quota().total(), 3.5);
    assert!(!firewall.is_allowed(&multiwave));
}

/// Raising the limit from the UI applies to the window already holding
/// records.
#[test]
fn test_limit_change_keeps_records() {
    let store = PreferenceStore::new();
    configure(&store, "2");
    let (ui, _requests) = UiChannel::new();
    let firewall = Firewall::new(&store, ui, quick()).unwrap();

    assert!(firewall.is_allowed(&bolus(2.0)));
    assert!(!firewall.is_allowed(&bolus(1.0)));

    firewall
        .apply_control_message("CHANGE_PREFS^sliding-window-limit^3")
        .unwrap();
    assert_eq!(firewall.quota().total(), 2.0);
    assert!(firewall.is_allowed(&bolus(1.0)));
}
