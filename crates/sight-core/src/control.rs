//! Cross-process control strings.
//!
//! The UI process and the service process exchange three `^`-delimited
//! messages. The format is an external contract and must not change:
//!
//!   CHANGE_PREFS^<name>^<value>          mirror a preference change
//!   USER_AUTHORIZATION^<token>^true|false  report a user decision
//!   REQUEST_AUTH^<token>^<reason>        ask the UI for a decision
//!
//! Parsing follows tokenizer semantics: empty fields are skipped, and a
//! message must split into exactly three fields to be accepted.

pub const CHANGE_PREFS_PREFIX: &str = "CHANGE_PREFS";
pub const USER_AUTHORIZATION_PREFIX: &str = "USER_AUTHORIZATION";
pub const REQUEST_AUTH_PREFIX: &str = "REQUEST_AUTH";
pub const DELIMITER: char = '^';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    PreferenceChange { name: String, value: String },
    Authorization { token: String, approved: bool },
    AuthorizationRequest { token: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    #[error("unrecognised control prefix in {0:?}")]
    UnknownPrefix(String),

    #[error("expected 3 fields, found {0}")]
    FieldCount(usize),

    #[error("authorization value must be \"true\" or \"false\", got {0:?}")]
    InvalidDecision(String),
}

impl ControlMessage {
    pub fn parse(text: &str) -> Result<Self, ControlError> {
        let fields: Vec<&str> = text.split(DELIMITER).filter(|f| !f.is_empty()).collect();
        let prefix = fields.first().copied().unwrap_or_default();
        if ![CHANGE_PREFS_PREFIX, USER_AUTHORIZATION_PREFIX, REQUEST_AUTH_PREFIX].contains(&prefix) {
            return Err(ControlError::UnknownPrefix(text.to_owned()));
        }
        if fields.len() != 3 {
            return Err(ControlError::FieldCount(fields.len()));
        }
        let (first, second) = (fields[1].to_owned(), fields[2]);

        match prefix {
            CHANGE_PREFS_PREFIX => Ok(ControlMessage::PreferenceChange {
                name: first,
                value: second.to_owned(),
            }),
            USER_AUTHORIZATION_PREFIX => {
                let approved = match second {
                    "true" => true,
                    "false" => false,
                    other => return Err(ControlError::InvalidDecision(other.to_owned())),
                };
                Ok(ControlMessage::Authorization {
                    token: first,
                    approved,
                })
            }
            _ => Ok(ControlMessage::AuthorizationRequest {
                token: first,
                reason: second.to_owned(),
            }),
        }
    }
}

impl std::fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let d = DELIMITER;
        match self {
            ControlMessage::PreferenceChange { name, value } => {
                write!(f, "{CHANGE_PREFS_PREFIX}{d}{name}{d}{value}")
            }
            ControlMessage::Authorization { token, approved } => {
                write!(f, "{USER_AUTHORIZATION_PREFIX}{d}{token}{d}{approved}")
            }
            ControlMessage::AuthorizationRequest { token, reason } => {
                write!(f, "{REQUEST_AUTH_PREFIX}{d}{token}{d}{reason}")
            }
        }
    }
}
