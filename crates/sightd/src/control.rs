//! Control channel to the UI process.
//!
//! Inbound: `CHANGE_PREFS` and `USER_AUTHORIZATION` datagrams, applied to the
//! firewall. Outbound: `REQUEST_AUTH` datagrams asking the user to decide.

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;

use sight_core::control::DELIMITER;
use sight_core::ControlMessage;
use sight_services::{AuthorizationRequester, Firewall};

/// Sends authorization requests to the UI over UDP.
pub struct UiRequester {
    socket: std::net::UdpSocket,
    ui_addr: SocketAddr,
}

impl UiRequester {
    pub fn new(ui_addr: &str) -> Result<Self> {
        let ui_addr = ui_addr
            .to_socket_addrs()
            .with_context(|| format!("invalid UI address {ui_addr}"))?
            .next()
            .with_context(|| format!("UI address {ui_addr} did not resolve"))?;
        let bind = if ui_addr.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
        let socket = std::net::UdpSocket::bind(bind).context("failed to bind requester socket")?;
        Ok(Self { socket, ui_addr })
    }
}

impl AuthorizationRequester for UiRequester {
    fn request_authorization(&self, token: &str, reason: &str) {
        let message = ControlMessage::AuthorizationRequest {
            token: token.to_owned(),
            reason: sanitize(reason),
        };
        if let Err(e) = self.socket.send_to(message.to_string().as_bytes(), self.ui_addr) {
            tracing::warn!(error = %e, ui = %self.ui_addr, "failed to send authorization request");
        }
    }
}

/// The delimiter cannot appear inside a field.
fn sanitize(reason: &str) -> String {
    reason.replace(DELIMITER, " ")
}

pub struct ControlListener {
    socket: UdpSocket,
    firewall: Arc<Firewall>,
    shutdown: broadcast::Receiver<()>,
}

impl ControlListener {
    pub fn new(socket: UdpSocket, firewall: Arc<Firewall>, shutdown: broadcast::Receiver<()>) -> Self {
        Self {
            socket,
            firewall,
            shutdown,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        let mut buf = vec![0u8; 1024];
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("control listener shutting down");
                    return Ok(());
                }

                result = self.socket.recv_from(&mut buf) => {
                    let (len, peer) = match result {
                        Ok(r) => r,
                        Err(e) => {
                            tracing::warn!(error = %e, "recv_from failed");
                            continue;
                        }
                    };
                    let text = match std::str::from_utf8(&buf[..len]) {
                        Ok(t) => t.trim_end(),
                        Err(_) => {
                            tracing::warn!(peer = %peer, "ignoring non-UTF-8 control datagram");
                            continue;
                        }
                    };
                    if let Err(e) = self.firewall.apply_control_message(text) {
                        tracing::warn!(peer = %peer, error = %e, "ignoring control message");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_cannot_break_the_framing() {
        let message = ControlMessage::AuthorizationRequest {
            token: "abc".into(),
            reason: sanitize("Bolus^5U"),
        };
        assert_eq!(
            ControlMessage::parse(&message.to_string()).unwrap(),
            ControlMessage::AuthorizationRequest {
                token: "abc".into(),
                reason: "Bolus 5U".into()
            }
        );
    }

    #[test]
    fn requester_datagram_reaches_the_ui() {
        let ui = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        ui.set_read_timeout(Some(std::time::Duration::from_secs(2)))
            .unwrap();
        let requester = UiRequester::new(&ui.local_addr().unwrap().to_string()).unwrap();

        requester.request_authorization("abc", "Standard Bolus 1U");

        let mut buf = [0u8; 128];
        let len = ui.recv(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"REQUEST_AUTH^abc^Standard Bolus 1U");
    }
}
