//! Sight application-layer framing.
//!
//! Every frame exchanged with the pump starts with the 6-byte [`AppHeader`],
//! followed by the type-specific payload and, for kinds that carry one, a
//! CRC-16 of the payload in little-endian order:
//!
//! ```text
//! | version | service | command (LE) | error (LE) | payload ... | crc (LE)? |
//! |    1    |    1    |      2       |     2      |     n       |    2      |
//! ```
//!
//! The header is `#[repr(C, packed)]` with zerocopy derives, so it is read
//! and written without any unsafe code. Multi-byte header fields are stored
//! as byte arrays and decoded explicitly to keep the byte order fixed.

use bytes::{BufMut, Bytes, BytesMut};
use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::crc::crc16;
use crate::message::MessageKind;

// ── Header ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct AppHeader {
    /// Application-layer version. Always [`APP_VERSION`].
    pub version: u8,

    /// Service id, see [`Service`].
    pub service: u8,

    /// Command code within the service, little-endian.
    pub command: [u8; 2],

    /// Application error code reported by the pump, little-endian.
    /// Requests always carry zero.
    pub error: [u8; 2],
}

// Compile-time size guard. If this fails, the wire format has silently changed.
assert_eq_size!(AppHeader, [u8; 6]);

impl AppHeader {
    pub fn new(kind: MessageKind, error: u16) -> Self {
        Self {
            version: APP_VERSION,
            service: kind.service().into(),
            command: kind.command().to_le_bytes(),
            error: error.to_le_bytes(),
        }
    }

    pub fn command(&self) -> u16 {
        u16::from_le_bytes(self.command)
    }

    pub fn error_code(&self) -> u16 {
        u16::from_le_bytes(self.error)
    }
}

// ── Services ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Service {
    /// Read-only pump state queries.
    Status = 0x0f,

    /// Commands that change therapy: boluses and temporary basal rates.
    RemoteControl = 0x55,
}

impl TryFrom<u8> for Service {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x0f => Ok(Service::Status),
            0x55 => Ok(Service::RemoteControl),
            other => Err(WireError::UnknownService(other)),
        }
    }
}

impl From<Service> for u8 {
    fn from(s: Service) -> u8 {
        s as u8
    }
}

// ── Constants ────────────────────────────────────────────────────────────────

/// Application-layer version byte.
pub const APP_VERSION: u8 = 0x20;

/// Header length in bytes.
pub const HEADER_LEN: usize = 6;

/// Trailing CRC length for kinds with the CRC-inclusion flag.
pub const CRC_LEN: usize = 2;

// ── Errors ───────────────────────────────────────────────────────────────────

/// Errors that can arise when building or interpreting a frame.
///
/// `Checksum` is kept apart from the field-decoding variants: it is raised
/// before any field of the payload has been looked at.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WireError {
    #[error("read of {needed} bytes at offset {offset} overruns {len}-byte payload")]
    Truncated {
        offset: usize,
        needed: usize,
        len: usize,
    },

    #[error("frame of {0} bytes is shorter than the header")]
    ShortFrame(usize),

    #[error("unknown version byte: 0x{0:02x}")]
    UnknownVersion(u8),

    #[error("unknown service byte: 0x{0:02x}")]
    UnknownService(u8),

    #[error("unknown command 0x{command:04x} for service {service:?}")]
    UnknownCommand { service: Service, command: u16 },

    #[error("pump reported application error 0x{0:04x}")]
    PumpError(u16),

    #[error("unknown {field} code: 0x{value:04x}")]
    UnknownCode { field: &'static str, value: u16 },

    #[error("text field is not valid UTF-8")]
    InvalidText,

    #[error("{field} value {value} does not fit its wire field")]
    ValueOutOfRange { field: &'static str, value: f32 },

    #[error("checksum mismatch: frame carries 0x{expected:04x}, payload hashes to 0x{computed:04x}")]
    Checksum { expected: u16, computed: u16 },
}

impl WireError {
    pub fn is_checksum(&self) -> bool {
        matches!(self, WireError::Checksum { .. })
    }
}

// ── Framing ──────────────────────────────────────────────────────────────────

/// Assemble a frame: header, payload written by `write`, then the CRC when
/// the kind carries one.
pub fn seal<F>(kind: MessageKind, error: u16, write: F) -> Result<Bytes, WireError>
where
    F: FnOnce(&mut BytesMut) -> Result<(), WireError>,
{
    let mut payload = BytesMut::new();
    write(&mut payload)?;

    let header = AppHeader::new(kind, error);
    let mut frame = BytesMut::with_capacity(HEADER_LEN + payload.len() + CRC_LEN);
    frame.put_slice(header.as_bytes());
    frame.put_slice(&payload);
    if kind.in_crc() {
        frame.put_u16_le(crc16(&payload));
    }
    Ok(frame.freeze())
}

/// Validate a frame's header and checksum, returning the kind and the bare
/// payload. Field decoding is left to the caller.
pub fn open(frame: &[u8]) -> Result<(MessageKind, &[u8]), WireError> {
    let header = AppHeader::read_from_prefix(frame).ok_or(WireError::ShortFrame(frame.len()))?;
    if header.version != APP_VERSION {
        return Err(WireError::UnknownVersion(header.version));
    }
    let service = Service::try_from(header.service)?;
    let command = header.command();
    let kind = MessageKind::from_wire(service, command)
        .ok_or(WireError::UnknownCommand { service, command })?;

    let code = header.error_code();
    if code != 0 {
        return Err(WireError::PumpError(code));
    }

    let body = &frame[HEADER_LEN..];
    if !kind.in_crc() {
        return Ok((kind, body));
    }

    if body.len() < CRC_LEN {
        return Err(WireError::Truncated {
            offset: 0,
            needed: CRC_LEN,
            len: body.len(),
        });
    }
    let (payload, trailer) = body.split_at(body.len() - CRC_LEN);
    let expected = u16::from_le_bytes([trailer[0], trailer[1]]);
    let computed = crc16(payload);
    if expected != computed {
        return Err(WireError::Checksum { expected, computed });
    }
    Ok((kind, payload))
}

/// A header-only frame carrying an application error code, as the pump sends
/// when it refuses a request.
pub fn error_frame(kind: MessageKind, code: u16) -> Bytes {
    Bytes::copy_from_slice(AppHeader::new(kind, code).as_bytes())
}

// ── Tests ────────────────────────────────────────────────────────────────────
