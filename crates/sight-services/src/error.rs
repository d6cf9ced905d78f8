use sight_core::{MessageKind, WireError};

use crate::task_runner::SessionState;
use crate::transport::TransportError;

/// Refused at construction time; nothing is built from an invalid setting.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("window period {0} ms is below the 1000 ms minimum")]
    PeriodTooShort(i64),

    #[error("window maximum {0} must be a non-negative number")]
    InvalidMaximum(f64),

    #[error("window identifier is empty")]
    EmptyIdentifier,

    #[error("{0} requires authorization but has no quota profile")]
    UnmappedQuotaKind(MessageKind),
}

/// Why a task-runner session ended without a result. Nothing here is retried.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to decode response: {0}")]
    Decoding(WireError),

    #[error("response failed its checksum: {0}")]
    Checksum(WireError),

    #[error("failed to encode {kind}: {source}")]
    Encoding { kind: MessageKind, source: WireError },

    #[error("unexpected {received} response (expected {expected:?})")]
    UnexpectedResponse {
        expected: Option<MessageKind>,
        received: MessageKind,
    },

    #[error("step called without the response to the outstanding request")]
    MissingResponse,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("firewall blocked {0}")]
    Blocked(MessageKind),

    #[error("session already {0:?}")]
    AlreadyTerminated(SessionState),
}

impl From<WireError> for SessionError {
    fn from(e: WireError) -> Self {
        if e.is_checksum() {
            SessionError::Checksum(e)
        } else {
            SessionError::Decoding(e)
        }
    }
}
