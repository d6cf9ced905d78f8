//! Bounds-checked reader over a received payload.
//!
//! Every read either consumes exactly the bytes it asked for or fails with
//! `WireError::Truncated` and leaves the offset where it was. The cursor
//! never hands out bytes past the end of the backing slice.

use crate::wire::WireError;

/// Fixed-point divisor for insulin amounts: a stored 250 reads as 2.50 U.
pub const UNIT_SCALE: f32 = 100.0;

#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], WireError> {
        if needed > self.remaining() {
            return Err(WireError::Truncated {
                offset: self.offset,
                needed,
                len: self.data.len(),
            });
        }
        let start = self.offset;
        self.offset += needed;
        Ok(&self.data[start..self.offset])
    }

    /// Skip `n` padding bytes.
    pub fn shift(&mut self, n: usize) -> Result<(), WireError> {
        self.take(n).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    /// Big-endian u16. Used for enumerated codes.
    pub fn read_u16(&mut self) -> Result<u16, WireError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Little-endian u16. Used for counters and scaled amounts.
    pub fn read_u16_le(&mut self) -> Result<u16, WireError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Little-endian u16 divided by [`UNIT_SCALE`].
    pub fn read_units_le(&mut self) -> Result<f32, WireError> {
        Ok(f32::from(self.read_u16_le()?) / UNIT_SCALE)
    }

    /// Fixed-width UTF-8 text field. Trailing NUL padding is stripped.
    pub fn read_text(&mut self, len: usize) -> Result<String, WireError> {
        let raw = self.take(len)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        std::str::from_utf8(&raw[..end])
            .map(str::to_owned)
            .map_err(|_| WireError::InvalidText)
    }
}

/// Scale an amount in units to its stored u16 form, rejecting values the
/// field cannot carry.
pub fn units_to_raw(field: &'static str, units: f32) -> Result<u16, WireError> {
    let raw = (units * UNIT_SCALE).round();
    if !raw.is_finite() || raw < 0.0 || raw > f32::from(u16::MAX) {
        return Err(WireError::ValueOutOfRange { field, value: units });
    }
    Ok(raw as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_advance_by_width() {
        let data = [0x01, 0x12, 0x34, 0x34, 0x12, 0xff];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.read_u8().unwrap(), 0x01);
        assert_eq!(cursor.offset(), 1);
        assert_eq!(cursor.read_u16().unwrap(), 0x1234);
        assert_eq!(cursor.read_u16_le().unwrap(), 0x1234);
        assert_eq!(cursor.offset(), 5);
        assert_eq!(cursor.remaining(), 1);
    }

    #[test]
    fn short_read_fails_without_moving() {
        let data = [0xaa];
        let mut cursor = ByteCursor::new(&data);
        let err = cursor.read_u16_le().unwrap_err();
        assert_eq!(
            err,
            WireError::Truncated {
                offset: 0,
                needed: 2,
                len: 1
            }
        );
        assert_eq!(cursor.offset(), 0);
        assert_eq!(cursor.read_u8().unwrap(), 0xaa);
        assert!(cursor.is_exhausted());
        assert!(cursor.shift(1).is_err());
    }

    #[test]
    fn text_strips_nul_padding() {
        let mut data = b"Profile 1".to_vec();
        data.resize(16, 0);
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.read_text(16).unwrap(), "Profile 1");
        assert!(cursor.is_exhausted());
    }

    #[test]
    fn text_rejects_invalid_utf8() {
        let data = [0xc3, 0x28, 0x00, 0x00];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.read_text(4).unwrap_err(), WireError::InvalidText);
    }

    #[test]
    fn units_scale_by_hundred() {
        let data = 420u16.to_le_bytes();
        let mut cursor = ByteCursor::new(&data);
        assert!((cursor.read_units_le().unwrap() - 4.2).abs() < f32::EPSILON);
        assert_eq!(units_to_raw("amount", 4.2).unwrap(), 420);
        assert!(units_to_raw("amount", -0.5).is_err());
        assert!(units_to_raw("amount", 1000.0).is_err());
    }
}
