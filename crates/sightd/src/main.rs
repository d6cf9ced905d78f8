//! sightd: insulin pump command mediation daemon.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;

use sight_core::config::SightConfig;
use sight_services::{Firewall, FirewallSettings, PreferenceStore};

mod control;
mod status;

use control::{ControlListener, UiRequester};
use status::StatusPoller;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = SightConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = SightConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        SightConfig::default()
    });
    tracing::info!("sightd starting");

    // Preferences
    let preferences_path = config.firewall.preferences_path.clone();
    let store = PreferenceStore::with_persistence(preferences_path.clone());
    tracing::info!(path = %preferences_path.display(), "preference store ready");

    // Firewall
    let requester = Arc::new(UiRequester::new(&config.control.ui_addr)?);
    let firewall = Arc::new(
        Firewall::new(&store, requester, FirewallSettings::from(&config.firewall))
            .context("invalid firewall configuration")?,
    );

    let control_socket = UdpSocket::bind(&config.control.listen_addr)
        .await
        .with_context(|| format!("failed to bind control socket {}", config.control.listen_addr))?;
    tracing::info!(
        listen = %config.control.listen_addr,
        ui = %config.control.ui_addr,
        "control channel ready"
    );

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let control_task = tokio::spawn(
        ControlListener::new(control_socket, firewall.clone(), shutdown_tx.subscribe()).run(),
    );

    let status_task = if config.bridge.address.is_empty() || config.status.interval_secs == 0 {
        tracing::info!("no pump bridge configured, status polling disabled");
        None
    } else {
        Some(tokio::spawn(
            StatusPoller::new(
                config.bridge.address.clone(),
                Duration::from_secs(config.status.interval_secs),
                Duration::from_millis(config.bridge.exchange_timeout_ms),
                firewall.clone(),
                shutdown_tx.subscribe(),
            )
            .run(),
        ))
    };

    let mut shutdown_rx = shutdown_tx.subscribe();
    shutdown_rx.recv().await.ok();

    if let Err(e) = control_task.await? {
        tracing::error!(error = %e, "control listener failed");
    }
    if let Some(task) = status_task {
        if let Err(e) = task.await? {
            tracing::error!(error = %e, "status poller failed");
        }
    }

    tracing::info!("sightd stopped");
    Ok(())
}
