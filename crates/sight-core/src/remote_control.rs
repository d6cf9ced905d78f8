//! Remote-control payloads: boluses and temporary basal rates.
//!
//! Request layouts (amounts u16 LE scaled ×100, type code u16 BE):
//!
//!   StandardBolus   amount, pad 4, type 0x0300
//!   ExtendedBolus   amount, minutes u16 LE, pad 2, type 0x0500
//!   MultiwaveBolus  immediate, delayed, minutes u16 LE, type 0x0600
//!   SetTBR/ChangeTBR percent u16 LE, minutes u16 LE
//!
//! Bolus replies carry the id the pump assigned; TBR replies echo the
//! accepted settings.

use bytes::{BufMut, BytesMut};

use crate::cursor::{units_to_raw, ByteCursor};
use crate::message::WirePayload;
use crate::status::BolusType;
use crate::wire::WireError;

fn expect_type(cursor: &mut ByteCursor<'_>, expected: BolusType) -> Result<(), WireError> {
    let code = cursor.read_u16()?;
    if code != expected as u16 {
        return Err(WireError::UnknownCode {
            field: "bolus type",
            value: code,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct StandardBolus {
    pub amount: f32,
}

impl WirePayload for StandardBolus {
    fn parse(cursor: &mut ByteCursor<'_>) -> Result<Self, WireError> {
        let amount = cursor.read_units_le()?;
        cursor.shift(4)?;
        expect_type(cursor, BolusType::Standard)?;
        Ok(Self { amount })
    }

    fn write(&self, buf: &mut BytesMut) -> Result<(), WireError> {
        buf.put_u16_le(units_to_raw("bolus amount", self.amount)?);
        buf.put_bytes(0, 4);
        buf.put_u16(BolusType::Standard as u16);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtendedBolus {
    pub amount: f32,
    /// Minutes.
    pub duration: u16,
}

impl WirePayload for ExtendedBolus {
    fn parse(cursor: &mut ByteCursor<'_>) -> Result<Self, WireError> {
        let amount = cursor.read_units_le()?;
        let duration = cursor.read_u16_le()?;
        cursor.shift(2)?;
        expect_type(cursor, BolusType::Extended)?;
        Ok(Self { amount, duration })
    }

    fn write(&self, buf: &mut BytesMut) -> Result<(), WireError> {
        buf.put_u16_le(units_to_raw("bolus amount", self.amount)?);
        buf.put_u16_le(self.duration);
        buf.put_bytes(0, 2);
        buf.put_u16(BolusType::Extended as u16);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultiwaveBolus {
    /// Delivered immediately.
    pub amount: f32,
    /// Delivered over `duration`.
    pub delayed_amount: f32,
    pub duration: u16,
}

impl WirePayload for MultiwaveBolus {
    fn parse(cursor: &mut ByteCursor<'_>) -> Result<Self, WireError> {
        let amount = cursor.read_units_le()?;
        let delayed_amount = cursor.read_units_le()?;
        let duration = cursor.read_u16_le()?;
        expect_type(cursor, BolusType::Multiwave)?;
        Ok(Self {
            amount,
            delayed_amount,
            duration,
        })
    }

    fn write(&self, buf: &mut BytesMut) -> Result<(), WireError> {
        buf.put_u16_le(units_to_raw("bolus amount", self.amount)?);
        buf.put_u16_le(units_to_raw("delayed amount", self.delayed_amount)?);
        buf.put_u16_le(self.duration);
        buf.put_u16(BolusType::Multiwave as u16);
        Ok(())
    }
}

/// Reply to any bolus command.
#[derive(Debug, Clone, PartialEq)]
pub struct BolusStarted {
    pub bolus_id: u16,
}

impl WirePayload for BolusStarted {
    fn parse(cursor: &mut ByteCursor<'_>) -> Result<Self, WireError> {
        Ok(Self {
            bolus_id: cursor.read_u16_le()?,
        })
    }

    fn write(&self, buf: &mut BytesMut) -> Result<(), WireError> {
        buf.put_u16_le(self.bolus_id);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TbrSettings {
    pub percentage: u16,
    /// Minutes.
    pub duration: u16,
}

impl WirePayload for TbrSettings {
    fn parse(cursor: &mut ByteCursor<'_>) -> Result<Self, WireError> {
        Ok(Self {
            percentage: cursor.read_u16_le()?,
            duration: cursor.read_u16_le()?,
        })
    }

    fn write(&self, buf: &mut BytesMut) -> Result<(), WireError> {
        buf.put_u16_le(self.percentage);
        buf.put_u16_le(self.duration);
        Ok(())
    }
}
