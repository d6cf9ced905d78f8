//! Command firewall.
//!
//! Every outbound command is evaluated before it reaches the pump:
//!
//!   1. An allow-preference for the kind that is anything but `true` denies
//!      it. Unset allow-preferences are set to `true` at construction.
//!   2. If the kind requires user authorization, a bolus whose amount still
//!      fits the sliding-window quota passes without a prompt. Anything else
//!      is escalated to the user and waits for a decision.
//!   3. Everything else is allowed.
//!
//! Denial is a plain `false`; reasons go to the log.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use sight_core::config::FirewallConfig;
use sight_core::control::ControlError;
use sight_core::{Command, ControlMessage, MessageKind};

use crate::authorization::{
    AuthorizationGate, AuthorizationRequester, PendingAuthorization, DEFAULT_POLL_INTERVAL,
    DEFAULT_TIMEOUT,
};
use crate::clock::{Clock, SystemClock};
use crate::error::ConfigurationError;
use crate::preferences::{PreferenceStore, Preferences};
use crate::sliding_window::SlidingWindow;

pub const FIREWALL_NAMESPACE: &str = "SERVICE_FIREWALL";

pub const ALLOW_STANDARD_BOLUS: &str = "firewall_allow_standard_bolus";
pub const ALLOW_EXTENDED_BOLUS: &str = "firewall_allow_extended_bolus";
pub const ALLOW_TEMPORARY_BASAL: &str = "firewall_allow_temporary_basal";
pub const AUTHORIZE_BOLUSES: &str = "firewall_password_boluses";

pub const PREF_WINDOW_LIMIT: &str = "sliding-window-limit";
pub const PREF_WINDOW_MS: &str = "sliding-window-ms";
pub const DEFAULT_WINDOW_MS: i64 = 86_400_000;
pub const QUOTA_IDENTIFIER: &str = "generic-bolus-restriction";

// ── Policy table ─────────────────────────────────────────────────────────────

fn default_allow_preference(kind: MessageKind) -> Option<&'static str> {
    match kind {
        MessageKind::StandardBolus => Some(ALLOW_STANDARD_BOLUS),
        MessageKind::ExtendedBolus | MessageKind::MultiwaveBolus => Some(ALLOW_EXTENDED_BOLUS),
        MessageKind::SetTbr | MessageKind::ChangeTbr | MessageKind::CancelTbr => {
            Some(ALLOW_TEMPORARY_BASAL)
        }
        MessageKind::PumpStatus
        | MessageKind::ActiveBoluses
        | MessageKind::CurrentTbr
        | MessageKind::CurrentBasal
        | MessageKind::BatteryAmount
        | MessageKind::CartridgeAmount => None,
    }
}

fn default_authorization_preference(kind: MessageKind) -> Option<&'static str> {
    match kind {
        MessageKind::StandardBolus | MessageKind::ExtendedBolus | MessageKind::MultiwaveBolus => {
            Some(AUTHORIZE_BOLUSES)
        }
        MessageKind::SetTbr
        | MessageKind::ChangeTbr
        | MessageKind::CancelTbr
        | MessageKind::PumpStatus
        | MessageKind::ActiveBoluses
        | MessageKind::CurrentTbr
        | MessageKind::CurrentBasal
        | MessageKind::BatteryAmount
        | MessageKind::CartridgeAmount => None,
    }
}

/// Kinds whose insulin amount can be measured against the quota.
fn has_quota_profile(kind: MessageKind) -> bool {
    match kind {
        MessageKind::StandardBolus | MessageKind::ExtendedBolus | MessageKind::MultiwaveBolus => {
            true
        }
        MessageKind::SetTbr
        | MessageKind::ChangeTbr
        | MessageKind::CancelTbr
        | MessageKind::PumpStatus
        | MessageKind::ActiveBoluses
        | MessageKind::CurrentTbr
        | MessageKind::CurrentBasal
        | MessageKind::BatteryAmount
        | MessageKind::CartridgeAmount => false,
    }
}

/// Kind → preference names consulted by the firewall.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    allow: HashMap<MessageKind, &'static str>,
    authorization: HashMap<MessageKind, &'static str>,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl PolicyTable {
    pub fn standard() -> Self {
        let mut allow = HashMap::new();
        let mut authorization = HashMap::new();
        for kind in MessageKind::ALL {
            if let Some(pref) = default_allow_preference(kind) {
                allow.insert(kind, pref);
            }
            if let Some(pref) = default_authorization_preference(kind) {
                authorization.insert(kind, pref);
            }
        }
        Self {
            allow,
            authorization,
        }
    }

    pub fn with_authorization(mut self, kind: MessageKind, preference: &'static str) -> Self {
        self.authorization.insert(kind, preference);
        self
    }

    pub fn allow_preference(&self, kind: MessageKind) -> Option<&'static str> {
        self.allow.get(&kind).copied()
    }

    pub fn authorization_preference(&self, kind: MessageKind) -> Option<&'static str> {
        self.authorization.get(&kind).copied()
    }

    /// Every authorization-gated kind needs a quota profile.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for kind in MessageKind::ALL {
            if self.authorization.contains_key(&kind) && !has_quota_profile(kind) {
                return Err(ConfigurationError::UnmappedQuotaKind(kind));
            }
        }
        Ok(())
    }

    fn allow_preferences(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.allow.values().copied()
    }
}

/// Amount charged against the quota, rounded half-up to 3 decimals.
/// Zero for anything that is not a bolus.
pub fn quota_value(command: &Command) -> f64 {
    let amount = match command {
        Command::StandardBolus(b) => f64::from(b.amount),
        Command::ExtendedBolus(b) => f64::from(b.amount),
        Command::MultiwaveBolus(b) => f64::from(b.amount) + f64::from(b.delayed_amount),
        Command::SetTbr(_)
        | Command::ChangeTbr(_)
        | Command::CancelTbr
        | Command::PumpStatus
        | Command::ActiveBoluses
        | Command::CurrentTbr
        | Command::CurrentBasal
        | Command::BatteryAmount
        | Command::CartridgeAmount => return 0.0,
    };
    (amount * 1000.0).round() / 1000.0
}

/// Human-readable reason shown to the user.
pub fn describe(command: &Command) -> String {
    match command {
        Command::StandardBolus(b) => format!("Standard Bolus {}U", b.amount),
        Command::ExtendedBolus(b) => {
            format!("Extended Bolus {}U over {} min", b.amount, b.duration)
        }
        Command::MultiwaveBolus(b) => format!(
            "Multiwave Bolus {}U + {}U over {} min",
            b.amount, b.delayed_amount, b.duration
        ),
        Command::SetTbr(t) => format!("Set TBR {}% for {} min", t.percentage, t.duration),
        Command::ChangeTbr(t) => format!("Change TBR {}% for {} min", t.percentage, t.duration),
        Command::CancelTbr => "Cancel TBR".to_owned(),
        Command::PumpStatus
        | Command::ActiveBoluses
        | Command::CurrentTbr
        | Command::CurrentBasal
        | Command::BatteryAmount
        | Command::CartridgeAmount => command.kind().name().to_owned(),
    }
}

// ── Engine ───────────────────────────────────────────────────────────────────

pub struct FirewallSettings {
    pub auth_timeout: Duration,
    pub poll_interval: Duration,
    pub policy: PolicyTable,
    pub clock: Arc<dyn Clock>,
}

impl Default for FirewallSettings {
    fn default() -> Self {
        Self {
            auth_timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            policy: PolicyTable::standard(),
            clock: Arc::new(SystemClock),
        }
    }
}

impl From<&FirewallConfig> for FirewallSettings {
    fn from(config: &FirewallConfig) -> Self {
        Self {
            auth_timeout: Duration::from_millis(config.auth_timeout_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            ..Self::default()
        }
    }
}

pub struct Firewall {
    prefs: Preferences,
    policy: PolicyTable,
    quota: RwLock<Arc<SlidingWindow>>,
    gate: AuthorizationGate,
}

impl Firewall {
    pub fn new(
        store: &PreferenceStore,
        requester: Arc<dyn AuthorizationRequester>,
        settings: FirewallSettings,
    ) -> Result<Self, ConfigurationError> {
        settings.policy.validate()?;

        let prefs = store.namespace(FIREWALL_NAMESPACE);
        for name in settings.policy.allow_preferences() {
            if !prefs.is_set(name) {
                prefs.set_bool(name, true);
            }
        }

        let quota = build_quota(&prefs, store, settings.clock.clone())?;
        tracing::info!(
            limit = quota.max(),
            window_ms = quota.period_ms(),
            "firewall initialized"
        );

        Ok(Self {
            prefs,
            policy: settings.policy,
            quota: RwLock::new(Arc::new(quota)),
            gate: AuthorizationGate::with_timing(
                requester,
                settings.auth_timeout,
                settings.poll_interval,
            ),
        })
    }

    /// Decide whether `command` may be sent. May block for up to the
    /// authorization timeout.
    pub fn is_allowed(&self, command: &Command) -> bool {
        let kind = command.kind();

        if let Some(pref) = self.policy.allow_preference(kind) {
            if !self.prefs.get_bool(pref, false) {
                tracing::info!(kind = %kind, preference = pref, "firewall denied: disabled");
                return false;
            }
        }

        let Some(auth_pref) = self.policy.authorization_preference(kind) else {
            return true;
        };
        if !self.prefs.get_bool(auth_pref, false) {
            return true;
        }

        let value = quota_value(command);
        if value > 0.0 && self.charge_quota(value) {
            tracing::info!(kind = %kind, value, "firewall allowed within quota");
            return true;
        }

        match self.gate.authorize(&describe(command)) {
            Ok(true) => {
                tracing::info!(kind = %kind, "firewall allowed by user");
                true
            }
            Ok(false) => {
                tracing::info!(kind = %kind, "firewall denied by user");
                false
            }
            Err(e) => {
                tracing::warn!(kind = %kind, error = %e, "firewall denied: no authorization");
                false
            }
        }
    }

    pub fn resolve_authorization(&self, token: &str, approved: bool) {
        self.gate.resolve(token, approved);
    }

    pub fn pending_authorization(&self) -> Option<PendingAuthorization> {
        self.gate.pending()
    }

    /// Apply a `CHANGE_PREFS` or `USER_AUTHORIZATION` string from the UI
    /// process.
    pub fn apply_control_message(&self, text: &str) -> Result<(), ControlError> {
        match ControlMessage::parse(text)? {
            ControlMessage::PreferenceChange { name, value } => {
                tracing::info!(preference = %name, value = %value, "preference changed");
                self.prefs.set_raw(&name, &value);
                if name == PREF_WINDOW_LIMIT || name == PREF_WINDOW_MS {
                    if let Err(e) = self.reload_quota() {
                        tracing::error!(error = %e, "quota settings rejected, keeping previous window");
                    }
                }
            }
            ControlMessage::Authorization { token, approved } => {
                self.resolve_authorization(&token, approved);
            }
            ControlMessage::AuthorizationRequest { token, .. } => {
                tracing::debug!(token = %token, "ignoring authorization request addressed to the UI");
            }
        }
        Ok(())
    }

    /// Rebuild the quota from the current preferences. Records carry over
    /// from the current window. Charges wait until the swap is done.
    pub fn reload_quota(&self) -> Result<(), ConfigurationError> {
        let (limit, window_ms) = quota_settings(&self.prefs);
        let mut current = self.quota.write().unwrap_or_else(PoisonError::into_inner);
        if current.max() == limit && current.period_ms() == window_ms {
            return Ok(());
        }
        let quota = current.reconfigured(limit, window_ms)?;
        tracing::info!(
            limit = quota.max(),
            window_ms = quota.period_ms(),
            records = quota.len(),
            "quota reloaded"
        );
        *current = Arc::new(quota);
        Ok(())
    }

    /// Check-and-add against the current window while holding off any
    /// rebuild.
    fn charge_quota(&self, value: f64) -> bool {
        self.quota
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .check_and_add_if_acceptable(value)
    }

    pub fn quota(&self) -> Arc<SlidingWindow> {
        self.quota
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn preferences(&self) -> &Preferences {
        &self.prefs
    }
}

fn quota_settings(prefs: &Preferences) -> (f64, i64) {
    let limit = prefs
        .get_string(PREF_WINDOW_LIMIT, "0")
        .trim()
        .parse::<f64>()
        .unwrap_or(0.0);
    let window_ms = prefs
        .get_string(PREF_WINDOW_MS, &DEFAULT_WINDOW_MS.to_string())
        .trim()
        .parse::<i64>()
        .unwrap_or(DEFAULT_WINDOW_MS);
    (limit, window_ms)
}

fn build_quota(
    prefs: &Preferences,
    store: &PreferenceStore,
    clock: Arc<dyn Clock>,
) -> Result<SlidingWindow, ConfigurationError> {
    let (limit, window_ms) = quota_settings(prefs);
    Ok(SlidingWindow::persistent(limit, window_ms, QUOTA_IDENTIFIER, store)?.with_clock(clock))
}
