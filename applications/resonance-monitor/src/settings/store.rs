use super::storage::{FileStorage, MemoryStorage, StorageBackend};
use crate::config::{SettingsConfig, THRESHOLD_MAX_KW, THRESHOLD_MIN_KW};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

pub const POWER_ON_KEY: &str = "resonance.power_on";
pub const ALERT_THRESHOLD_KEY: &str = "resonance.alert_threshold";

/// Persisted user settings.
///
/// Storage failures never reach the caller: a failed read yields the default
/// and a failed write is dropped.
#[derive(Clone)]
pub struct SettingsStore {
    backend: Arc<dyn StorageBackend>,
    default_power_on: bool,
    default_threshold_kw: f64,
}

impl SettingsStore {
    pub fn new(backend: Arc<dyn StorageBackend>, config: &SettingsConfig) -> Self {
        Self {
            backend,
            default_power_on: config.default_power_on,
            default_threshold_kw: config.default_threshold_kw,
        }
    }

    /// File-backed when a path is configured, in-memory otherwise
    pub fn from_config(config: &SettingsConfig) -> Self {
        let backend: Arc<dyn StorageBackend> = match &config.path {
            Some(path) => Arc::new(FileStorage::new(path)),
            None => Arc::new(MemoryStorage::new()),
        };
        Self::new(backend, config)
    }

    /// Read `key`, falling back to `default` when missing, unreadable or unparsable
    pub fn load<T: FromStr>(&self, key: &str, default: T) -> T {
        match self.backend.get(key) {
            Ok(Some(raw)) => match raw.trim().parse() {
                Ok(value) => value,
                Err(_) => {
                    warn!(key, raw = %raw, "ignoring unparsable persisted setting");
                    default
                }
            },
            Ok(None) => default,
            Err(e) => {
                debug!(key, error = %e, "settings storage unavailable, using default");
                default
            }
        }
    }

    /// Write `value` under `key`; dropped silently if storage is unavailable
    pub fn save<T: ToString>(&self, key: &str, value: T) {
        if let Err(e) = self.backend.set(key, &value.to_string()) {
            debug!(key, error = %e, "settings storage unavailable, write dropped");
        }
    }

    pub fn clear(&self, key: &str) {
        if let Err(e) = self.backend.remove(key) {
            debug!(key, error = %e, "settings storage unavailable, remove dropped");
        }
    }

    pub fn power_on(&self) -> bool {
        self.load(POWER_ON_KEY, self.default_power_on)
    }

    /// Persist the power switch. A running monitor does not observe this;
    /// change power through `MonitorHandle::set_power` instead.
    pub fn set_power_on(&self, on: bool) {
        self.save(POWER_ON_KEY, on);
    }

    pub fn alert_threshold(&self) -> f64 {
        let value = self.load(ALERT_THRESHOLD_KEY, self.default_threshold_kw);
        if value.is_finite() {
            value
        } else {
            self.default_threshold_kw
        }
    }

    /// Store a new threshold, clamped to the slider range. Returns the stored value.
    ///
    /// Like [`set_power_on`](Self::set_power_on) this bypasses a running
    /// monitor, which reads settings once at construction.
    pub fn set_alert_threshold(&self, threshold_kw: f64) -> f64 {
        let clamped = clamp_threshold(threshold_kw, self.default_threshold_kw);
        self.save(ALERT_THRESHOLD_KEY, clamped);
        clamped
    }
}

/// Clamp into the slider range; non-finite input falls back to `default`
pub fn clamp_threshold(threshold_kw: f64, default: f64) -> f64 {
    if threshold_kw.is_finite() {
        threshold_kw.clamp(THRESHOLD_MIN_KW, THRESHOLD_MAX_KW)
    } else {
        default
    }
}
