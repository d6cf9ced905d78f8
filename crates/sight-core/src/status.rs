//! Status service replies.
//!
//! Layouts (all amounts are u16 LE scaled by 1/100):
//!
//!   PumpStatus       status u16 BE
//!   ActiveBoluses    3 × { id u16 LE, type u16 BE, pad 2, remaining u16 LE, minutes u16 LE }
//!   CurrentTBR       percent u16 LE, left minutes u16 LE, initial minutes u16 LE
//!   CurrentBasal     pad 2, profile name text(62), amount u16 LE
//!   BatteryAmount    pad 2, percent u16 LE
//!   CartridgeAmount  pad 2, amount u16 LE

use bytes::{BufMut, BytesMut};

use crate::cursor::{units_to_raw, ByteCursor};
use crate::message::WirePayload;
use crate::wire::WireError;

/// Width of the basal profile name field.
pub const BASAL_NAME_LEN: usize = 62;

/// Number of bolus slots reported by ActiveBoluses.
pub const ACTIVE_BOLUS_SLOTS: usize = 3;

// ── PumpStatus ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum PumpStatus {
    Started = 0x00e3,
    Stopped = 0x001f,
    Paused = 0x0033,
}

impl TryFrom<u16> for PumpStatus {
    type Error = WireError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x00e3 => Ok(PumpStatus::Started),
            0x001f => Ok(PumpStatus::Stopped),
            0x0033 => Ok(PumpStatus::Paused),
            other => Err(WireError::UnknownCode {
                field: "pump status",
                value: other,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PumpStatusMessage {
    pub pump_status: PumpStatus,
}

impl WirePayload for PumpStatusMessage {
    fn parse(cursor: &mut ByteCursor<'_>) -> Result<Self, WireError> {
        let pump_status = PumpStatus::try_from(cursor.read_u16()?)?;
        Ok(Self { pump_status })
    }

    fn write(&self, buf: &mut BytesMut) -> Result<(), WireError> {
        buf.put_u16(self.pump_status as u16);
        Ok(())
    }
}

// ── ActiveBoluses ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum BolusType {
    Standard = 0x0300,
    Extended = 0x0500,
    Multiwave = 0x0600,
}

impl BolusType {
    /// Decode a slot type code; `0x0000` marks an empty slot.
    pub fn from_code(code: u16) -> Result<Option<Self>, WireError> {
        match code {
            0x0000 => Ok(None),
            0x0300 => Ok(Some(BolusType::Standard)),
            0x0500 => Ok(Some(BolusType::Extended)),
            0x0600 => Ok(Some(BolusType::Multiwave)),
            other => Err(WireError::UnknownCode {
                field: "bolus type",
                value: other,
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActiveBolus {
    pub bolus_id: u16,
    /// `None` for an empty slot.
    pub bolus_type: Option<BolusType>,
    pub remaining_amount: f32,
    /// Minutes left for extended and multiwave deliveries.
    pub remaining_duration: u16,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActiveBolusesMessage {
    pub slots: [ActiveBolus; ACTIVE_BOLUS_SLOTS],
}

impl ActiveBolusesMessage {
    /// Occupied slots only.
    pub fn active(&self) -> impl Iterator<Item = &ActiveBolus> {
        self.slots.iter().filter(|s| s.bolus_type.is_some())
    }
}

impl WirePayload for ActiveBolusesMessage {
    fn parse(cursor: &mut ByteCursor<'_>) -> Result<Self, WireError> {
        let mut message = Self::default();
        for slot in message.slots.iter_mut() {
            slot.bolus_id = cursor.read_u16_le()?;
            slot.bolus_type = BolusType::from_code(cursor.read_u16()?)?;
            cursor.shift(2)?;
            slot.remaining_amount = cursor.read_units_le()?;
            slot.remaining_duration = cursor.read_u16_le()?;
        }
        Ok(message)
    }

    fn write(&self, buf: &mut BytesMut) -> Result<(), WireError> {
        for slot in &self.slots {
            buf.put_u16_le(slot.bolus_id);
            buf.put_u16(slot.bolus_type.map(|t| t as u16).unwrap_or(0));
            buf.put_bytes(0, 2);
            buf.put_u16_le(units_to_raw("remaining amount", slot.remaining_amount)?);
            buf.put_u16_le(slot.remaining_duration);
        }
        Ok(())
    }
}

// ── CurrentTBR ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurrentTbrMessage {
    /// 100 means no temporary basal rate is running.
    pub percentage: u16,
    pub left_minutes: u16,
    pub initial_minutes: u16,
}

impl CurrentTbrMessage {
    pub fn is_active(&self) -> bool {
        self.percentage != 100
    }
}

impl WirePayload for CurrentTbrMessage {
    fn parse(cursor: &mut ByteCursor<'_>) -> Result<Self, WireError> {
        Ok(Self {
            percentage: cursor.read_u16_le()?,
            left_minutes: cursor.read_u16_le()?,
            initial_minutes: cursor.read_u16_le()?,
        })
    }

    fn write(&self, buf: &mut BytesMut) -> Result<(), WireError> {
        buf.put_u16_le(self.percentage);
        buf.put_u16_le(self.left_minutes);
        buf.put_u16_le(self.initial_minutes);
        Ok(())
    }
}

// ── CurrentBasal ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurrentBasalMessage {
    pub name: String,
    /// Units per hour.
    pub amount: f32,
}

impl WirePayload for CurrentBasalMessage {
    fn parse(cursor: &mut ByteCursor<'_>) -> Result<Self, WireError> {
        cursor.shift(2)?;
        let name = cursor.read_text(BASAL_NAME_LEN)?;
        let amount = cursor.read_units_le()?;
        Ok(Self { name, amount })
    }

    fn write(&self, buf: &mut BytesMut) -> Result<(), WireError> {
        let name = self.name.as_bytes();
        if name.len() > BASAL_NAME_LEN {
            return Err(WireError::ValueOutOfRange {
                field: "basal name length",
                value: name.len() as f32,
            });
        }
        buf.put_bytes(0, 2);
        buf.put_slice(name);
        buf.put_bytes(0, BASAL_NAME_LEN - name.len());
        buf.put_u16_le(units_to_raw("basal amount", self.amount)?);
        Ok(())
    }
}

// ── BatteryAmount ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatteryAmountMessage {
    pub percentage: u16,
}

impl WirePayload for BatteryAmountMessage {
    fn parse(cursor: &mut ByteCursor<'_>) -> Result<Self, WireError> {
        cursor.shift(2)?;
        Ok(Self {
            percentage: cursor.read_u16_le()?,
        })
    }

    fn write(&self, buf: &mut BytesMut) -> Result<(), WireError> {
        buf.put_bytes(0, 2);
        buf.put_u16_le(self.percentage);
        Ok(())
    }
}

// ── CartridgeAmount ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CartridgeAmountMessage {
    pub amount: f32,
}

impl WirePayload for CartridgeAmountMessage {
    fn parse(cursor: &mut ByteCursor<'_>) -> Result<Self, WireError> {
        cursor.shift(2)?;
        Ok(Self {
            amount: cursor.read_units_le()?,
        })
    }

    fn write(&self, buf: &mut BytesMut) -> Result<(), WireError> {
        buf.put_bytes(0, 2);
        buf.put_u16_le(units_to_raw("cartridge amount", self.amount)?);
        Ok(())
    }
}
