//! sight-core: wire format, message types and configuration.
//! All other sight crates depend on this one.

pub mod config;
pub mod control;
pub mod crc;
pub mod cursor;
pub mod message;
pub mod remote_control;
pub mod status;
pub mod wire;

pub use control::ControlMessage;
pub use cursor::ByteCursor;
pub use message::{AppMessage, Command, MessageKind, WirePayload};
pub use wire::WireError;
