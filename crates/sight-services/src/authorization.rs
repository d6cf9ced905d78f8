//! User authorization gate.
//!
//! At most one authorization is outstanding at any time. A caller that needs
//! a decision registers a fresh correlation token, asks the UI through an
//! [`AuthorizationRequester`], then blocks until [`AuthorizationGate::resolve`]
//! delivers a decision for that token or the timeout elapses. Waiters wake on
//! every resolve and re-check at least once per poll interval.
//!
//! A second caller arriving while a request is outstanding is refused
//! immediately rather than queued. A pending entry older than twice the
//! timeout is treated as abandoned and replaced.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Delivers an authorization request to whoever can answer it.
pub trait AuthorizationRequester: Send + Sync {
    /// Fire-and-forget. The answer arrives later through
    /// [`AuthorizationGate::resolve`].
    fn request_authorization(&self, token: &str, reason: &str);
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorizationError {
    #[error("no decision for authorization {token} within {timeout:?}")]
    Timeout { token: String, timeout: Duration },

    #[error("authorization {pending} is already outstanding")]
    Busy { pending: String },
}

#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    pub token: String,
    pub reason: String,
    pub requested_at: Instant,
}

#[derive(Default)]
struct GateState {
    pending: Option<PendingAuthorization>,
    decisions: HashMap<String, bool>,
}

pub struct AuthorizationGate {
    state: Mutex<GateState>,
    decided: Condvar,
    requester: Arc<dyn AuthorizationRequester>,
    timeout: Duration,
    poll_interval: Duration,
}

impl AuthorizationGate {
    pub fn new(requester: Arc<dyn AuthorizationRequester>) -> Self {
        Self::with_timing(requester, DEFAULT_TIMEOUT, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_timing(
        requester: Arc<dyn AuthorizationRequester>,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            state: Mutex::new(GateState::default()),
            decided: Condvar::new(),
            requester,
            timeout,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ask the user about `reason` and wait for the answer.
    ///
    /// Returns `Ok(true)` when approved and `Ok(false)` when denied.
    pub fn authorize(&self, reason: &str) -> Result<bool, AuthorizationError> {
        let token = self.register(reason)?;
        tracing::info!(token = %token, reason, "requesting user authorization");
        self.requester.request_authorization(&token, reason);

        let deadline = Instant::now() + self.timeout;
        let mut state = self.lock();
        let outcome = loop {
            if let Some(approved) = state.decisions.remove(&token) {
                break Ok(approved);
            }
            let now = Instant::now();
            if now >= deadline {
                break Err(AuthorizationError::Timeout {
                    token: token.clone(),
                    timeout: self.timeout,
                });
            }
            let wait = (deadline - now).min(self.poll_interval);
            state = match self.decided.wait_timeout(state, wait) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        };

        if state.pending.as_ref().is_some_and(|p| p.token == token) {
            state.pending = None;
        }
        state.decisions.remove(&token);
        drop(state);

        match &outcome {
            Ok(approved) => tracing::info!(token = %token, approved, "authorization decided"),
            Err(e) => tracing::warn!(token = %token, error = %e, "authorization failed"),
        }
        outcome
    }

    /// Record the user's decision. Tokens that are not outstanding are
    /// ignored.
    pub fn resolve(&self, token: &str, approved: bool) {
        let mut state = self.lock();
        let known = state.pending.as_ref().is_some_and(|p| p.token == token);
        if !known {
            tracing::debug!(token, "ignoring decision for unknown authorization");
            return;
        }
        state.decisions.insert(token.to_owned(), approved);
        drop(state);
        self.decided.notify_all();
    }

    pub fn pending(&self) -> Option<PendingAuthorization> {
        self.lock().pending.clone()
    }

    /// Claim the single pending slot under a fresh token.
    fn register(&self, reason: &str) -> Result<String, AuthorizationError> {
        let mut state = self.lock();
        if let Some(pending) = &state.pending {
            if pending.requested_at.elapsed() < self.timeout * 2 {
                return Err(AuthorizationError::Busy {
                    pending: pending.token.clone(),
                });
            }
            tracing::warn!(token = %pending.token, "replacing abandoned authorization");
            let stale = pending.token.clone();
            state.decisions.remove(&stale);
        }
        let token = new_token();
        state.pending = Some(PendingAuthorization {
            token: token.clone(),
            reason: reason.to_owned(),
            requested_at: Instant::now(),
        });
        Ok(token)
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 128 random bits, hex encoded.
fn new_token() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}
