//! Sliding-window quota.
//!
//! Tracks timestamped values and accepts a new value only while the sum of
//! values inside the trailing `period_ms` stays at or below `max`. A record
//! at exactly `now - period_ms` has left the window.
//!
//! Check-and-add is one critical section, so concurrent callers can never
//! overspend the quota between the check and the add. With persistence
//! enabled the record list is rewritten after every mutation and reloaded on
//! construction.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::clock::{Clock, SystemClock};
use crate::error::ConfigurationError;
use crate::preferences::{PreferenceStore, Preferences};

pub const MIN_PERIOD_MS: i64 = 1_000;
pub const SLIDING_WINDOW_NAMESPACE: &str = "SLIDING_WINDOW";
const PERSIST_PREFIX: &str = "SLIDING_PERSIST_";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unix milliseconds.
    pub timestamp: i64,
    pub value: f64,
}

pub struct SlidingWindow {
    identifier: String,
    max: f64,
    period_ms: i64,
    records: Mutex<Vec<Record>>,
    persistence: Option<Preferences>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SlidingWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindow")
            .field("identifier", &self.identifier)
            .field("max", &self.max)
            .field("period_ms", &self.period_ms)
            .field("records", &self.lock().len())
            .finish()
    }
}

impl SlidingWindow {
    /// In-memory window on the system clock.
    pub fn new(max: f64, period_ms: i64, identifier: &str) -> Result<Self, ConfigurationError> {
        if period_ms < MIN_PERIOD_MS {
            return Err(ConfigurationError::PeriodTooShort(period_ms));
        }
        if max.is_nan() || max < 0.0 {
            return Err(ConfigurationError::InvalidMaximum(max));
        }
        if identifier.is_empty() {
            return Err(ConfigurationError::EmptyIdentifier);
        }
        Ok(Self {
            identifier: identifier.to_owned(),
            max,
            period_ms,
            records: Mutex::new(Vec::new()),
            persistence: None,
            clock: Arc::new(SystemClock),
        })
    }

    /// Window whose records live in `store` under `SLIDING_PERSIST_<identifier>`.
    /// Records already stored there are loaded.
    pub fn persistent(
        max: f64,
        period_ms: i64,
        identifier: &str,
        store: &PreferenceStore,
    ) -> Result<Self, ConfigurationError> {
        let mut window = Self::new(max, period_ms, identifier)?;
        window.persistence = Some(store.namespace(SLIDING_WINDOW_NAMESPACE));
        window.load();
        Ok(window)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// New window with a different limit or period that takes over this
    /// window's records, persistence and clock. Records come from memory,
    /// not from the store.
    pub fn reconfigured(&self, max: f64, period_ms: i64) -> Result<Self, ConfigurationError> {
        let window = Self::new(max, period_ms, &self.identifier)?;
        let records = self.lock().clone();
        Ok(Self {
            records: Mutex::new(records),
            persistence: self.persistence.clone(),
            clock: self.clock.clone(),
            ..window
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn period_ms(&self) -> i64 {
        self.period_ms
    }

    /// Would `value` fit right now? Does not record anything.
    pub fn acceptable(&self, value: f64) -> bool {
        let records = self.lock();
        let total = self.total_of(&records, self.clock.now_ms());
        let fits = total + value <= self.max;
        tracing::debug!(
            window = %self.identifier,
            total,
            value,
            max = self.max,
            fits,
            "quota check"
        );
        fits
    }

    /// Record `value` only if it fits. The check and the add happen under one
    /// lock.
    pub fn check_and_add_if_acceptable(&self, value: f64) -> bool {
        let mut records = self.lock();
        let now = self.clock.now_ms();
        let total = self.total_of(&records, now);
        if total + value > self.max {
            tracing::debug!(
                window = %self.identifier,
                total,
                value,
                max = self.max,
                "quota exceeded"
            );
            return false;
        }
        records.push(Record {
            timestamp: now,
            value,
        });
        self.prune_locked(&mut records, now);
        self.save(&records);
        true
    }

    /// Record `value` now, whether or not it fits.
    pub fn add(&self, value: f64) {
        self.add_at(value, self.clock.now_ms());
    }

    /// Record `value` at `timestamp`, whether or not it fits.
    pub fn add_at(&self, value: f64, timestamp: i64) {
        let mut records = self.lock();
        records.push(Record { timestamp, value });
        self.prune_locked(&mut records, self.clock.now_ms());
        self.save(&records);
    }

    /// Sum of values strictly inside the window.
    pub fn total(&self) -> f64 {
        let records = self.lock();
        self.total_of(&records, self.clock.now_ms())
    }

    /// Number of retained records, including any not yet pruned.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn records(&self) -> Vec<Record> {
        self.lock().clone()
    }

    /// Drop records older than the window.
    pub fn prune(&self) {
        let mut records = self.lock();
        let before = records.len();
        self.prune_locked(&mut records, self.clock.now_ms());
        if records.len() != before {
            self.save(&records);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Record>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn total_of(&self, records: &[Record], now: i64) -> f64 {
        let horizon = now - self.period_ms;
        records
            .iter()
            .filter(|r| r.timestamp > horizon)
            .map(|r| r.value)
            .sum()
    }

    fn prune_locked(&self, records: &mut Vec<Record>, now: i64) {
        let horizon = now - self.period_ms;
        records.retain(|r| r.timestamp >= horizon);
    }
}

// ── Persistence ──────────────────────────────────────────────────────────────

impl SlidingWindow {
    fn persist_key(&self) -> String {
        format!("{PERSIST_PREFIX}{}", self.identifier)
    }

    /// Best-effort, logs on failure.
    fn save(&self, records: &[Record]) {
        let Some(prefs) = &self.persistence else {
            return;
        };
        match serde_json::to_string(records) {
            Ok(json) => prefs.set_string(&self.persist_key(), &json),
            Err(e) => {
                tracing::warn!(error = %e, window = %self.identifier, "failed to serialize quota records");
            }
        }
    }

    fn load(&self) {
        let Some(prefs) = &self.persistence else {
            return;
        };
        let key = self.persist_key();
        if !prefs.is_set(&key) {
            return;
        }
        let json = prefs.get_string(&key, "[]");
        match serde_json::from_str::<Vec<Record>>(&json) {
            Ok(loaded) => {
                let mut records = self.lock();
                *records = loaded;
                tracing::info!(
                    window = %self.identifier,
                    count = records.len(),
                    "loaded persisted quota records"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, window = %self.identifier, "failed to parse quota records");
            }
        }
    }
}
