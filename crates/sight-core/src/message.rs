//! Command messages: the closed set of message kinds this workspace speaks.
//!
//! A message kind fixes a (service, command code) pair and whether its frames
//! carry a CRC. Outbound requests are [`Command`]s; decoded pump replies are
//! [`AppMessage`]s. Both are closed enums, so every table keyed on a kind
//! (firewall policy, quota values, task-runner transitions) is an exhaustive
//! match and a new kind cannot be added without updating it.

use bytes::{Bytes, BytesMut};

use crate::cursor::ByteCursor;
use crate::remote_control::{BolusStarted, ExtendedBolus, MultiwaveBolus, StandardBolus, TbrSettings};
use crate::status::{
    ActiveBolusesMessage, BatteryAmountMessage, CartridgeAmountMessage, CurrentBasalMessage,
    CurrentTbrMessage, PumpStatusMessage,
};
use crate::wire::{self, Service, WireError};

/// Typed payload of one message kind: a fixed field layout with its own
/// fixed-point scaling.
pub trait WirePayload: Sized {
    /// Decode the fields from a payload that has already passed CRC
    /// validation.
    fn parse(cursor: &mut ByteCursor<'_>) -> Result<Self, WireError>;

    /// Encode the fields in the same layout `parse` reads.
    fn write(&self, buf: &mut BytesMut) -> Result<(), WireError>;
}

// ── Kinds ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    PumpStatus,
    ActiveBoluses,
    CurrentTbr,
    CurrentBasal,
    BatteryAmount,
    CartridgeAmount,
    StandardBolus,
    ExtendedBolus,
    MultiwaveBolus,
    SetTbr,
    ChangeTbr,
    CancelTbr,
}

impl MessageKind {
    pub const ALL: [MessageKind; 12] = [
        MessageKind::PumpStatus,
        MessageKind::ActiveBoluses,
        MessageKind::CurrentTbr,
        MessageKind::CurrentBasal,
        MessageKind::BatteryAmount,
        MessageKind::CartridgeAmount,
        MessageKind::StandardBolus,
        MessageKind::ExtendedBolus,
        MessageKind::MultiwaveBolus,
        MessageKind::SetTbr,
        MessageKind::ChangeTbr,
        MessageKind::CancelTbr,
    ];

    pub fn service(self) -> Service {
        match self {
            MessageKind::PumpStatus
            | MessageKind::ActiveBoluses
            | MessageKind::CurrentTbr
            | MessageKind::CurrentBasal
            | MessageKind::BatteryAmount
            | MessageKind::CartridgeAmount => Service::Status,
            MessageKind::StandardBolus
            | MessageKind::ExtendedBolus
            | MessageKind::MultiwaveBolus
            | MessageKind::SetTbr
            | MessageKind::ChangeTbr
            | MessageKind::CancelTbr => Service::RemoteControl,
        }
    }

    pub fn command(self) -> u16 {
        match self {
            MessageKind::PumpStatus => 0xfc00,
            MessageKind::ActiveBoluses => 0xa805,
            MessageKind::CurrentTbr => 0xa705,
            MessageKind::CurrentBasal => 0xa905,
            MessageKind::BatteryAmount => 0xa605,
            MessageKind::CartridgeAmount => 0xaa05,
            MessageKind::StandardBolus => 0x1f03,
            MessageKind::ExtendedBolus => 0x1f04,
            MessageKind::MultiwaveBolus => 0x1f05,
            MessageKind::SetTbr => 0x1803,
            MessageKind::ChangeTbr => 0x1903,
            MessageKind::CancelTbr => 0x1a03,
        }
    }

    /// Whether frames of this kind end with a CRC-16 of the payload.
    pub fn in_crc(self) -> bool {
        match self {
            MessageKind::PumpStatus
            | MessageKind::ActiveBoluses
            | MessageKind::CurrentBasal
            | MessageKind::CartridgeAmount
            | MessageKind::StandardBolus
            | MessageKind::ExtendedBolus
            | MessageKind::MultiwaveBolus => true,
            MessageKind::CurrentTbr
            | MessageKind::BatteryAmount
            | MessageKind::SetTbr
            | MessageKind::ChangeTbr
            | MessageKind::CancelTbr => false,
        }
    }

    pub fn from_wire(service: Service, command: u16) -> Option<MessageKind> {
        MessageKind::ALL
            .into_iter()
            .find(|k| k.service() == service && k.command() == command)
    }

    pub fn name(self) -> &'static str {
        match self {
            MessageKind::PumpStatus => "PumpStatus",
            MessageKind::ActiveBoluses => "ActiveBoluses",
            MessageKind::CurrentTbr => "CurrentTBR",
            MessageKind::CurrentBasal => "CurrentBasal",
            MessageKind::BatteryAmount => "BatteryAmount",
            MessageKind::CartridgeAmount => "CartridgeAmount",
            MessageKind::StandardBolus => "StandardBolus",
            MessageKind::ExtendedBolus => "ExtendedBolus",
            MessageKind::MultiwaveBolus => "MultiwaveBolus",
            MessageKind::SetTbr => "SetTBR",
            MessageKind::ChangeTbr => "ChangeTBR",
            MessageKind::CancelTbr => "CancelTBR",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn parse_all<T: WirePayload>(payload: &[u8]) -> Result<T, WireError> {
    T::parse(&mut ByteCursor::new(payload))
}

// ── Outbound requests ────────────────────────────────────────────────────────

/// A request sent to the pump. Status queries carry no payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    PumpStatus,
    ActiveBoluses,
    CurrentTbr,
    CurrentBasal,
    BatteryAmount,
    CartridgeAmount,
    StandardBolus(StandardBolus),
    ExtendedBolus(ExtendedBolus),
    MultiwaveBolus(MultiwaveBolus),
    SetTbr(TbrSettings),
    ChangeTbr(TbrSettings),
    CancelTbr,
}

impl Command {
    pub fn kind(&self) -> MessageKind {
        match self {
            Command::PumpStatus => MessageKind::PumpStatus,
            Command::ActiveBoluses => MessageKind::ActiveBoluses,
            Command::CurrentTbr => MessageKind::CurrentTbr,
            Command::CurrentBasal => MessageKind::CurrentBasal,
            Command::BatteryAmount => MessageKind::BatteryAmount,
            Command::CartridgeAmount => MessageKind::CartridgeAmount,
            Command::StandardBolus(_) => MessageKind::StandardBolus,
            Command::ExtendedBolus(_) => MessageKind::ExtendedBolus,
            Command::MultiwaveBolus(_) => MessageKind::MultiwaveBolus,
            Command::SetTbr(_) => MessageKind::SetTbr,
            Command::ChangeTbr(_) => MessageKind::ChangeTbr,
            Command::CancelTbr => MessageKind::CancelTbr,
        }
    }

    /// Build the request frame.
    pub fn encode(&self) -> Result<Bytes, WireError> {
        wire::seal(self.kind(), 0, |buf| match self {
            Command::StandardBolus(b) => b.write(buf),
            Command::ExtendedBolus(b) => b.write(buf),
            Command::MultiwaveBolus(b) => b.write(buf),
            Command::SetTbr(t) | Command::ChangeTbr(t) => t.write(buf),
            Command::PumpStatus
            | Command::ActiveBoluses
            | Command::CurrentTbr
            | Command::CurrentBasal
            | Command::BatteryAmount
            | Command::CartridgeAmount
            | Command::CancelTbr => Ok(()),
        })
    }

    /// Decode a request frame, as the pump side of the link does.
    pub fn decode(frame: &[u8]) -> Result<Command, WireError> {
        let (kind, payload) = wire::open(frame)?;
        Ok(match kind {
            MessageKind::PumpStatus => Command::PumpStatus,
            MessageKind::ActiveBoluses => Command::ActiveBoluses,
            MessageKind::CurrentTbr => Command::CurrentTbr,
            MessageKind::CurrentBasal => Command::CurrentBasal,
            MessageKind::BatteryAmount => Command::BatteryAmount,
            MessageKind::CartridgeAmount => Command::CartridgeAmount,
            MessageKind::StandardBolus => Command::StandardBolus(parse_all(payload)?),
            MessageKind::ExtendedBolus => Command::ExtendedBolus(parse_all(payload)?),
            MessageKind::MultiwaveBolus => Command::MultiwaveBolus(parse_all(payload)?),
            MessageKind::SetTbr => Command::SetTbr(parse_all(payload)?),
            MessageKind::ChangeTbr => Command::ChangeTbr(parse_all(payload)?),
            MessageKind::CancelTbr => Command::CancelTbr,
        })
    }
}

// ── Inbound replies ──────────────────────────────────────────────────────────

/// A decoded reply from the pump.
#[derive(Debug, Clone, PartialEq)]
pub enum AppMessage {
    PumpStatus(PumpStatusMessage),
    ActiveBoluses(ActiveBolusesMessage),
    CurrentTbr(CurrentTbrMessage),
    CurrentBasal(CurrentBasalMessage),
    BatteryAmount(BatteryAmountMessage),
    CartridgeAmount(CartridgeAmountMessage),
    StandardBolus(BolusStarted),
    ExtendedBolus(BolusStarted),
    MultiwaveBolus(BolusStarted),
    SetTbr(TbrSettings),
    ChangeTbr(TbrSettings),
    CancelTbr,
}

impl AppMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            AppMessage::PumpStatus(_) => MessageKind::PumpStatus,
            AppMessage::ActiveBoluses(_) => MessageKind::ActiveBoluses,
            AppMessage::CurrentTbr(_) => MessageKind::CurrentTbr,
            AppMessage::CurrentBasal(_) => MessageKind::CurrentBasal,
            AppMessage::BatteryAmount(_) => MessageKind::BatteryAmount,
            AppMessage::CartridgeAmount(_) => MessageKind::CartridgeAmount,
            AppMessage::StandardBolus(_) => MessageKind::StandardBolus,
            AppMessage::ExtendedBolus(_) => MessageKind::ExtendedBolus,
            AppMessage::MultiwaveBolus(_) => MessageKind::MultiwaveBolus,
            AppMessage::SetTbr(_) => MessageKind::SetTbr,
            AppMessage::ChangeTbr(_) => MessageKind::ChangeTbr,
            AppMessage::CancelTbr => MessageKind::CancelTbr,
        }
    }

    /// Decode a reply frame. The CRC, when the kind carries one, is checked
    /// before any field is decoded.
    pub fn decode(frame: &[u8]) -> Result<AppMessage, WireError> {
        let (kind, payload) = wire::open(frame)?;
        Ok(match kind {
            MessageKind::PumpStatus => AppMessage::PumpStatus(parse_all(payload)?),
            MessageKind::ActiveBoluses => AppMessage::ActiveBoluses(parse_all(payload)?),
            MessageKind::CurrentTbr => AppMessage::CurrentTbr(parse_all(payload)?),
            MessageKind::CurrentBasal => AppMessage::CurrentBasal(parse_all(payload)?),
            MessageKind::BatteryAmount => AppMessage::BatteryAmount(parse_all(payload)?),
            MessageKind::CartridgeAmount => AppMessage::CartridgeAmount(parse_all(payload)?),
            MessageKind::StandardBolus => AppMessage::StandardBolus(parse_all(payload)?),
            MessageKind::ExtendedBolus => AppMessage::ExtendedBolus(parse_all(payload)?),
            MessageKind::MultiwaveBolus => AppMessage::MultiwaveBolus(parse_all(payload)?),
            MessageKind::SetTbr => AppMessage::SetTbr(parse_all(payload)?),
            MessageKind::ChangeTbr => AppMessage::ChangeTbr(parse_all(payload)?),
            MessageKind::CancelTbr => AppMessage::CancelTbr,
        })
    }

    /// Build the reply frame, as the pump side of the link does.
    pub fn encode(&self) -> Result<Bytes, WireError> {
        wire::seal(self.kind(), 0, |buf| match self {
            AppMessage::PumpStatus(m) => m.write(buf),
            AppMessage::ActiveBoluses(m) => m.write(buf),
            AppMessage::CurrentTbr(m) => m.write(buf),
            AppMessage::CurrentBasal(m) => m.write(buf),
            AppMessage::BatteryAmount(m) => m.write(buf),
            AppMessage::CartridgeAmount(m) => m.write(buf),
            AppMessage::StandardBolus(m)
            | AppMessage::ExtendedBolus(m)
            | AppMessage::MultiwaveBolus(m) => m.write(buf),
            AppMessage::SetTbr(m) | AppMessage::ChangeTbr(m) => m.write(buf),
            AppMessage::CancelTbr => Ok(()),
        })
    }
}
