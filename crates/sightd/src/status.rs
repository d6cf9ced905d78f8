//! Periodic status fetch over the pump bridge.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpStream;
use tokio::sync::broadcast;

use sight_services::{Firewall, PumpLink, StatusResult, StatusTaskRunner, StreamTransport};

pub struct StatusPoller {
    address: String,
    interval: Duration,
    exchange_timeout: Duration,
    firewall: Arc<Firewall>,
    shutdown: broadcast::Receiver<()>,
}

impl StatusPoller {
    pub fn new(
        address: String,
        interval: Duration,
        exchange_timeout: Duration,
        firewall: Arc<Firewall>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            address,
            interval,
            exchange_timeout,
            firewall,
            shutdown,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        let mut interval = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("status poller shutting down");
                    return Ok(());
                }

                _ = interval.tick() => {
                    if let Some(pending) = self.firewall.pending_authorization() {
                        tracing::info!(
                            token = %pending.token,
                            reason = %pending.reason,
                            waiting_secs = pending.requested_at.elapsed().as_secs(),
                            "authorization pending"
                        );
                    }
                    match self.poll_once().await {
                        Ok(status) => log_status(&status),
                        Err(e) => tracing::warn!(error = %e, bridge = %self.address, "status fetch failed"),
                    }
                }
            }
        }
    }

    async fn poll_once(&self) -> Result<StatusResult> {
        let stream = TcpStream::connect(&self.address)
            .await
            .with_context(|| format!("failed to connect to bridge {}", self.address))?;
        let mut link = PumpLink::new(StreamTransport::new(stream))
            .with_firewall(self.firewall.clone())
            .with_exchange_timeout(self.exchange_timeout);
        Ok(link.run(StatusTaskRunner::new()).await?)
    }
}

fn log_status(status: &StatusResult) {
    tracing::info!(
        pump = ?status.pump_status.pump_status,
        battery = status.battery.percentage,
        cartridge = status.cartridge.amount,
        "pump status"
    );
    if let Some(boluses) = &status.active_boluses {
        for bolus in boluses.active() {
            tracing::info!(
                id = bolus.bolus_id,
                kind = ?bolus.bolus_type,
                remaining = bolus.remaining_amount,
                minutes = bolus.remaining_duration,
                "  active bolus"
            );
        }
    }
    if let Some(tbr) = status.current_tbr.as_ref().filter(|t| t.is_active()) {
        tracing::info!(
            percentage = tbr.percentage,
            left = tbr.left_minutes,
            "  temporary basal"
        );
    }
    if let Some(basal) = &status.current_basal {
        tracing::info!(profile = %basal.name, rate = basal.amount, "  basal");
    }
}
