//! Preference store shared with the UI process.
//!
//! Values are typed (bool, long, double, string) and grouped by namespace.
//! The firewall reads its policy flags and quota settings from the
//! `SERVICE_FIREWALL` namespace; sliding windows keep their records under
//! `SLIDING_WINDOW`.
//!
//! When constructed with a `persist_path`, the whole store is written to disk
//! on every mutation and reloaded on startup. Persistence is best-effort: a
//! failed write is logged and the in-memory value stands.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Separates namespace and name in the flat key space.
const NAMESPACE_SEPARATOR: char = '/';

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrefValue {
    Bool(bool),
    Long(i64),
    Double(f64),
    Text(String),
}

impl PrefValue {
    /// Interpret a raw string mirrored from the UI. Only the literals
    /// `true` and `false` become booleans; everything else stays text.
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "true" => PrefValue::Bool(true),
            "false" => PrefValue::Bool(false),
            other => PrefValue::Text(other.to_owned()),
        }
    }
}

pub struct PreferenceStore {
    values: Arc<DashMap<String, PrefValue>>,
    persist_path: Arc<Option<PathBuf>>,
}

impl Default for PreferenceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PreferenceStore {
    /// In-memory store.
    pub fn new() -> Self {
        Self {
            values: Arc::new(DashMap::new()),
            persist_path: Arc::new(None),
        }
    }

    /// Store persisted to a JSON file. Loads existing values if the file
    /// exists.
    pub fn with_persistence(path: PathBuf) -> Self {
        let store = Self {
            values: Arc::new(DashMap::new()),
            persist_path: Arc::new(Some(path)),
        };
        store.load_from_disk();
        store
    }

    pub fn namespace(&self, namespace: &str) -> Preferences {
        Preferences {
            store: self.clone(),
            namespace: namespace.to_owned(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn get(&self, key: &str) -> Option<PrefValue> {
        self.values.get(key).map(|v| v.value().clone())
    }

    fn set(&self, key: String, value: PrefValue) {
        self.values.insert(key, value);
        self.save_to_disk();
    }

    fn remove(&self, key: &str) {
        if self.values.remove(key).is_some() {
            self.save_to_disk();
        }
    }
}

impl PreferenceStore {
    /// Serialize every value to disk as JSON. Best-effort, logs on failure.
    fn save_to_disk(&self) {
        let path = match self.persist_path.as_ref() {
            Some(p) => p,
            None => return,
        };
        let snapshot: BTreeMap<String, PrefValue> = self
            .values
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => {
                if let Some(parent) = path.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                if let Err(e) = std::fs::write(path, json) {
                    tracing::warn!(error = %e, path = %path.display(), "failed to persist preferences");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize preferences");
            }
        }
    }

    /// Load values from disk. Called once during construction.
    fn load_from_disk(&self) {
        let path = match self.persist_path.as_ref() {
            Some(p) => p,
            None => return,
        };
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "failed to read preferences");
                return;
            }
        };
        let map: BTreeMap<String, PrefValue> = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "failed to parse preferences");
                return;
            }
        };
        let loaded = map.len();
        for (key, value) in map {
            self.values.insert(key, value);
        }
        if loaded > 0 {
            tracing::info!(count = loaded, path = %path.display(), "loaded persisted preferences");
        }
    }
}

impl Clone for PreferenceStore {
    fn clone(&self) -> Self {
        Self {
            values: self.values.clone(),
            persist_path: self.persist_path.clone(),
        }
    }
}

// ── Namespaced view ──────────────────────────────────────────────────────────

/// Typed accessors over one namespace of a [`PreferenceStore`].
///
/// A value stored under a different type than the one requested reads as
/// absent, so the caller's default applies.
#[derive(Clone)]
pub struct Preferences {
    store: PreferenceStore,
    namespace: String,
}

impl Preferences {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn key(&self, name: &str) -> String {
        format!("{}{NAMESPACE_SEPARATOR}{name}", self.namespace)
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.store.get(&self.key(name)).is_some()
    }

    pub fn get_bool(&self, name: &str, default: bool) -> bool {
        match self.store.get(&self.key(name)) {
            Some(PrefValue::Bool(b)) => b,
            _ => default,
        }
    }

    pub fn set_bool(&self, name: &str, value: bool) {
        self.store.set(self.key(name), PrefValue::Bool(value));
    }

    pub fn get_long(&self, name: &str, default: i64) -> i64 {
        match self.store.get(&self.key(name)) {
            Some(PrefValue::Long(v)) => v,
            _ => default,
        }
    }

    pub fn set_long(&self, name: &str, value: i64) {
        self.store.set(self.key(name), PrefValue::Long(value));
    }

    pub fn get_double(&self, name: &str, default: f64) -> f64 {
        match self.store.get(&self.key(name)) {
            Some(PrefValue::Double(v)) => v,
            Some(PrefValue::Long(v)) => v as f64,
            _ => default,
        }
    }

    pub fn set_double(&self, name: &str, value: f64) {
        self.store.set(self.key(name), PrefValue::Double(value));
    }

    pub fn get_string(&self, name: &str, default: &str) -> String {
        match self.store.get(&self.key(name)) {
            Some(PrefValue::Text(s)) => s,
            _ => default.to_owned(),
        }
    }

    pub fn set_string(&self, name: &str, value: &str) {
        self.store.set(self.key(name), PrefValue::Text(value.to_owned()));
    }

    /// Store a raw value mirrored from the UI process.
    pub fn set_raw(&self, name: &str, raw: &str) {
        self.store.set(self.key(name), PrefValue::from_raw(raw));
    }

    pub fn remove(&self, name: &str) {
        self.store.remove(&self.key(name));
    }
}
