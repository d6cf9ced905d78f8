//! Pump link: drives task-runner sessions over a transport.
//!
//! Every request passes the firewall first. The firewall may block for the
//! length of an authorization prompt, so it runs on the blocking pool.

use std::sync::Arc;
use std::time::Duration;

use sight_core::{AppMessage, Command};

use crate::error::SessionError;
use crate::firewall::Firewall;
use crate::task_runner::{Session, Step, TaskRunner};
use crate::transport::{Transport, TransportError};

pub struct PumpLink<T> {
    transport: T,
    firewall: Option<Arc<Firewall>>,
    exchange_timeout: Option<Duration>,
}

impl<T: Transport> PumpLink<T> {
    /// Link without a firewall. Every command is sent.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            firewall: None,
            exchange_timeout: None,
        }
    }

    pub fn with_firewall(mut self, firewall: Arc<Firewall>) -> Self {
        self.firewall = Some(firewall);
        self
    }

    pub fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
        self.exchange_timeout = Some(timeout);
        self
    }

    /// Run `runner` to completion. Any error fails the session and discards
    /// whatever it had collected.
    pub async fn run<R: TaskRunner>(&mut self, runner: R) -> Result<R::Output, SessionError> {
        let mut session = Session::new(runner);
        let mut response = None;
        loop {
            match session.step(response.take())? {
                Step::Finished(output) => return Ok(output),
                Step::Request(command) => match self.send(command).await {
                    Ok(reply) => response = Some(reply),
                    Err(e) => {
                        session.abort();
                        return Err(e);
                    }
                },
            }
        }
    }

    /// Send one command and decode the reply.
    pub async fn send(&mut self, command: Command) -> Result<AppMessage, SessionError> {
        let kind = command.kind();
        let frame = command
            .encode()
            .map_err(|source| SessionError::Encoding { kind, source })?;

        if let Some(firewall) = &self.firewall {
            let firewall = firewall.clone();
            let allowed = tokio::task::spawn_blocking(move || firewall.is_allowed(&command))
                .await
                .unwrap_or_else(|e| {
                    tracing::error!(error = %e, kind = %kind, "firewall check panicked");
                    false
                });
            if !allowed {
                return Err(SessionError::Blocked(kind));
            }
        }

        tracing::debug!(kind = %kind, frame = %hex::encode(&frame), "sending");
        let exchange = self.transport.exchange(frame);
        let raw = match self.exchange_timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| TransportError::Timeout(limit))??,
            None => exchange.await?,
        };
        tracing::debug!(kind = %kind, frame = %hex::encode(&raw), "received");

        Ok(AppMessage::decode(&raw)?)
    }

    pub fn into_transport(self) -> T {
        self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorization::AuthorizationRequester;
    use crate::firewall::{FirewallSettings, ALLOW_STANDARD_BOLUS, FIREWALL_NAMESPACE};
    use crate::preferences::PreferenceStore;
    use crate::task_runner::SingleMessageTaskRunner;
    use bytes::Bytes;
    use sight_core::remote_control::{BolusStarted, StandardBolus};
    use sight_core::status::{BatteryAmountMessage, PumpStatus, PumpStatusMessage};
    use sight_core::MessageKind;
    use std::collections::VecDeque;

    /// Replays canned reply frames and records what was sent.
    #[derive(Default)]
    struct Scripted {
        replies: VecDeque<Bytes>,
        sent: Vec<Bytes>,
    }

    impl Transport for Scripted {
        async fn exchange(&mut self, frame: Bytes) -> Result<Bytes, TransportError> {
            self.sent.push(frame);
            self.replies.pop_front().ok_or(TransportError::Disconnected)
        }
    }

    struct Silent;

    impl Transport for Silent {
        async fn exchange(&mut self, _frame: Bytes) -> Result<Bytes, TransportError> {
            std::future::pending().await
        }
    }

    struct NoPrompt;

    impl AuthorizationRequester for NoPrompt {
        fn request_authorization(&self, _token: &str, _reason: &str) {}
    }

    fn bolus() -> Command {
        Command::StandardBolus(StandardBolus { amount: 2.5 })
    }

    #[tokio::test]
    async fn single_command_round_trip() {
        let reply = AppMessage::StandardBolus(BolusStarted { bolus_id: 42 });
        let mut link = PumpLink::new(Scripted {
            replies: VecDeque::from([reply.encode().unwrap()]),
            ..Scripted::default()
        });

        let got = link.run(SingleMessageTaskRunner::new(bolus())).await.unwrap();
        assert_eq!(got, reply);

        let transport = link.into_transport();
        assert_eq!(transport.sent.len(), 1);
        assert_eq!(Command::decode(&transport.sent[0]).unwrap(), bolus());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn blocked_command_never_reaches_the_transport() {
        let store = PreferenceStore::new();
        store
            .namespace(FIREWALL_NAMESPACE)
            .set_bool(ALLOW_STANDARD_BOLUS, false);
        let firewall =
            Firewall::new(&store, Arc::new(NoPrompt), FirewallSettings::default()).unwrap();
        let mut link = PumpLink::new(Scripted::default()).with_firewall(Arc::new(firewall));

        let err = link
            .run(SingleMessageTaskRunner::new(bolus()))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Blocked(MessageKind::StandardBolus)));
        assert!(link.into_transport().sent.is_empty());
    }

    #[tokio::test]
    async fn corrupted_reply_is_a_checksum_error() {
        let reply = AppMessage::PumpStatus(PumpStatusMessage {
            pump_status: PumpStatus::Started,
        });
        let mut frame = reply.encode().unwrap().to_vec();
        let last = frame.len() - 1;
        frame[last] ^= 0xff;

        let mut link = PumpLink::new(Scripted {
            replies: VecDeque::from([Bytes::from(frame)]),
            ..Scripted::default()
        });
        let err = link.send(Command::PumpStatus).await.unwrap_err();
        assert!(matches!(err, SessionError::Checksum(_)));
    }

    #[tokio::test]
    async fn wrong_reply_kind_fails_the_session() {
        let reply = AppMessage::BatteryAmount(BatteryAmountMessage { percentage: 50 });
        let mut link = PumpLink::new(Scripted {
            replies: VecDeque::from([reply.encode().unwrap()]),
            ..Scripted::default()
        });
        let err = link
            .run(SingleMessageTaskRunner::new(Command::PumpStatus))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::UnexpectedResponse {
                expected: Some(MessageKind::PumpStatus),
                received: MessageKind::BatteryAmount
            }
        ));
    }

    #[tokio::test]
    async fn exchange_timeout_is_a_transport_error() {
        let mut link = PumpLink::new(Silent).with_exchange_timeout(Duration::from_millis(20));
        let err = link.send(Command::BatteryAmount).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Transport(TransportError::Timeout(_))
        ));
    }
}
