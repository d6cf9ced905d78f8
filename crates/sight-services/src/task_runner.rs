//! Task runners: multi-step request/response sequences against the pump.
//!
//! A runner is a pure decision table. Given the previous response (or `None`
//! at the start) it names the next request or finishes with a result.
//! [`Session`] wraps a runner with the lifecycle every sequence shares:
//!
//!   AwaitingFirst ──step(None)──▶ InProgress ──step(Some)──▶ … ──▶ Finished
//!                                      │
//!                                      └── any error ──▶ Failed
//!
//! Exactly one request is outstanding at a time and a response must match
//! its kind. Once Finished or Failed, every further step is refused.

use sight_core::status::{
    ActiveBolusesMessage, BatteryAmountMessage, CartridgeAmountMessage, CurrentBasalMessage,
    CurrentTbrMessage, PumpStatus, PumpStatusMessage,
};
use sight_core::{AppMessage, Command, MessageKind};

use crate::error::SessionError;

#[derive(Debug, Clone, PartialEq)]
pub enum Step<T> {
    Request(Command),
    Finished(T),
}

pub trait TaskRunner {
    type Output;

    /// `None` asks for the opening request.
    fn step(&mut self, response: Option<AppMessage>) -> Result<Step<Self::Output>, SessionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingFirst,
    InProgress,
    Finished,
    Failed,
}

pub struct Session<R> {
    runner: R,
    state: SessionState,
    outstanding: Option<MessageKind>,
}

impl<R: TaskRunner> Session<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            state: SessionState::AwaitingFirst,
            outstanding: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Kind of the request awaiting a response, if any.
    pub fn outstanding(&self) -> Option<MessageKind> {
        self.outstanding
    }

    pub fn step(&mut self, response: Option<AppMessage>) -> Result<Step<R::Output>, SessionError> {
        match self.state {
            SessionState::Finished | SessionState::Failed => {
                return Err(SessionError::AlreadyTerminated(self.state));
            }
            SessionState::AwaitingFirst => {
                if let Some(message) = &response {
                    return Err(self.fail(SessionError::UnexpectedResponse {
                        expected: None,
                        received: message.kind(),
                    }));
                }
            }
            SessionState::InProgress => match &response {
                None => return Err(self.fail(SessionError::MissingResponse)),
                Some(message) if Some(message.kind()) != self.outstanding => {
                    return Err(self.fail(SessionError::UnexpectedResponse {
                        expected: self.outstanding,
                        received: message.kind(),
                    }));
                }
                Some(_) => {}
            },
        }

        match self.runner.step(response) {
            Ok(Step::Request(command)) => {
                self.state = SessionState::InProgress;
                self.outstanding = Some(command.kind());
                Ok(Step::Request(command))
            }
            Ok(Step::Finished(output)) => {
                self.state = SessionState::Finished;
                self.outstanding = None;
                Ok(Step::Finished(output))
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Terminate after an error outside the runner, e.g. a transport failure.
    /// Partial results are discarded with the runner.
    pub fn abort(&mut self) {
        if self.state != SessionState::Finished {
            self.state = SessionState::Failed;
            self.outstanding = None;
        }
    }

    fn fail(&mut self, error: SessionError) -> SessionError {
        self.abort();
        error
    }
}

// ── Status fetch ─────────────────────────────────────────────────────────────

/// Snapshot of the pump. A stopped pump skips the bolus, TBR and basal
/// queries, so those are absent.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusResult {
    pub pump_status: PumpStatusMessage,
    pub active_boluses: Option<ActiveBolusesMessage>,
    pub current_tbr: Option<CurrentTbrMessage>,
    pub current_basal: Option<CurrentBasalMessage>,
    pub battery: BatteryAmountMessage,
    pub cartridge: CartridgeAmountMessage,
}

/// PumpStatus → ActiveBoluses → CurrentTBR → CurrentBasal → BatteryAmount →
/// CartridgeAmount. A stopped pump jumps from PumpStatus to BatteryAmount.
#[derive(Debug, Default)]
pub struct StatusTaskRunner {
    pump_status: Option<PumpStatusMessage>,
    active_boluses: Option<ActiveBolusesMessage>,
    current_tbr: Option<CurrentTbrMessage>,
    current_basal: Option<CurrentBasalMessage>,
    battery: Option<BatteryAmountMessage>,
}

impl StatusTaskRunner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskRunner for StatusTaskRunner {
    type Output = StatusResult;

    fn step(&mut self, response: Option<AppMessage>) -> Result<Step<StatusResult>, SessionError> {
        let Some(message) = response else {
            return Ok(Step::Request(Command::PumpStatus));
        };
        let received = message.kind();
        let next = match message {
            AppMessage::PumpStatus(m) => {
                let stopped = m.pump_status == PumpStatus::Stopped;
                self.pump_status = Some(m);
                if stopped {
                    Command::BatteryAmount
                } else {
                    Command::ActiveBoluses
                }
            }
            AppMessage::ActiveBoluses(m) => {
                self.active_boluses = Some(m);
                Command::CurrentTbr
            }
            AppMessage::CurrentTbr(m) => {
                self.current_tbr = Some(m);
                Command::CurrentBasal
            }
            AppMessage::CurrentBasal(m) => {
                self.current_basal = Some(m);
                Command::BatteryAmount
            }
            AppMessage::BatteryAmount(m) => {
                self.battery = Some(m);
                Command::CartridgeAmount
            }
            AppMessage::CartridgeAmount(cartridge) => {
                let (Some(pump_status), Some(battery)) = (self.pump_status.take(), self.battery.take())
                else {
                    return Err(SessionError::UnexpectedResponse {
                        expected: None,
                        received,
                    });
                };
                return Ok(Step::Finished(StatusResult {
                    pump_status,
                    active_boluses: self.active_boluses.take(),
                    current_tbr: self.current_tbr.take(),
                    current_basal: self.current_basal.take(),
                    battery,
                    cartridge,
                }));
            }
            AppMessage::StandardBolus(_)
            | AppMessage::ExtendedBolus(_)
            | AppMessage::MultiwaveBolus(_)
            | AppMessage::SetTbr(_)
            | AppMessage::ChangeTbr(_)
            | AppMessage::CancelTbr => {
                return Err(SessionError::UnexpectedResponse {
                    expected: None,
                    received,
                });
            }
        };
        Ok(Step::Request(next))
    }
}

// ── Single command ───────────────────────────────────────────────────────────

/// Sends one command and finishes with the pump's reply.
#[derive(Debug)]
pub struct SingleMessageTaskRunner {
    command: Option<Command>,
}

impl SingleMessageTaskRunner {
    pub fn new(command: Command) -> Self {
        Self {
            command: Some(command),
        }
    }
}

impl TaskRunner for SingleMessageTaskRunner {
    type Output = AppMessage;

    fn step(&mut self, response: Option<AppMessage>) -> Result<Step<AppMessage>, SessionError> {
        match (response, self.command.take()) {
            (None, Some(command)) => Ok(Step::Request(command)),
            (Some(reply), None) => Ok(Step::Finished(reply)),
            (None, None) => Err(SessionError::MissingResponse),
            (Some(reply), Some(_)) => Err(SessionError::UnexpectedResponse {
                expected: None,
                received: reply.kind(),
            }),
        }
    }
}
