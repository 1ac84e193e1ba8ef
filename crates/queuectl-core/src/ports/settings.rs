//! Settings port - runtime tunables read by the worker loops.
//!
//! Providers hand out a fresh snapshot on every call. Workers read once per
//! iteration, so a change lands on the next iteration without a restart.

use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::RetryPolicy;
use crate::error::QueueError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Retry limit for jobs submitted without their own `max_retries`.
    pub max_retries: u32,
    pub backoff_base: f64,
    pub poll_interval_seconds: f64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: 2.0,
            poll_interval_seconds: 1.0,
        }
    }
}

impl QueueSettings {
    pub fn validate(&self) -> Result<(), QueueError> {
        if !(self.backoff_base.is_finite() && self.backoff_base > 0.0) {
            return Err(QueueError::Config(format!(
                "backoff_base must be a positive number, got {}",
                self.backoff_base
            )));
        }
        if !(self.poll_interval_seconds.is_finite() && self.poll_interval_seconds > 0.0) {
            return Err(QueueError::Config(format!(
                "poll_interval_seconds must be a positive number, got {}",
                self.poll_interval_seconds
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.poll_interval_seconds).unwrap_or(Duration::from_secs(1))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.backoff_base)
    }

    /// Current value of one setting as JSON.
    pub fn get(&self, key: SettingKey) -> serde_json::Value {
        match key {
            SettingKey::MaxRetries => serde_json::Value::from(self.max_retries),
            SettingKey::BackoffBase => serde_json::Value::from(self.backoff_base),
            SettingKey::PollIntervalSeconds => serde_json::Value::from(self.poll_interval_seconds),
        }
    }

    /// Parse `value` for `key` and store it. The result is validated as a whole;
    /// on error `self` is left unchanged.
    pub fn apply(&mut self, key: SettingKey, value: &str) -> Result<(), QueueError> {
        let mut next = *self;
        let value = value.trim();
        match key {
            SettingKey::MaxRetries => {
                next.max_retries = value.parse().map_err(|_| {
                    QueueError::Config(format!(
                        "max_retries must be a non-negative integer, got '{value}'"
                    ))
                })?;
            }
            SettingKey::BackoffBase => {
                next.backoff_base = parse_number(key, value)?;
            }
            SettingKey::PollIntervalSeconds => {
                next.poll_interval_seconds = parse_number(key, value)?;
            }
        }
        next.validate()?;
        *self = next;
        Ok(())
    }
}

fn parse_number(key: SettingKey, value: &str) -> Result<f64, QueueError> {
    value
        .parse::<f64>()
        .map_err(|_| QueueError::Config(format!("{key} must be a number, got '{value}'")))
}

/// Names of the settings that can be read and written individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    MaxRetries,
    BackoffBase,
    PollIntervalSeconds,
}

impl SettingKey {
    pub const ALL: [SettingKey; 3] = [
        SettingKey::MaxRetries,
        SettingKey::BackoffBase,
        SettingKey::PollIntervalSeconds,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            SettingKey::MaxRetries => "max_retries",
            SettingKey::BackoffBase => "backoff_base",
            SettingKey::PollIntervalSeconds => "poll_interval_seconds",
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SettingKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| {
                QueueError::Config(format!(
                    "unknown setting '{s}' (expected one of: max_retries, backoff_base, poll_interval_seconds)"
                ))
            })
    }
}

pub trait SettingsProvider: Send + Sync {
    fn current(&self) -> QueueSettings;
}

/// Mutable in-process settings.
#[derive(Debug, Default)]
pub struct InMemorySettings {
    inner: RwLock<QueueSettings>,
}

impl InMemorySettings {
    pub fn new(settings: QueueSettings) -> Self {
        Self {
            inner: RwLock::new(settings),
        }
    }

    pub fn replace(&self, settings: QueueSettings) -> Result<(), QueueError> {
        settings.validate()?;
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = settings;
        Ok(())
    }

    pub fn set(&self, key: SettingKey, value: &str) -> Result<(), QueueError> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .apply(key, value)
    }
}

impl SettingsProvider for InMemorySettings {
    fn current(&self) -> QueueSettings {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_are_three_retries_base_two_one_second_poll() {
        let s = QueueSettings::default();
        assert_eq!(s.max_retries, 3);
        assert_eq!(s.backoff_base, 2.0);
        assert_eq!(s.poll_interval(), Duration::from_secs(1));
        assert!(s.validate().is_ok());
    }

    #[rstest]
    #[case::zero_base(0.0, 1.0)]
    #[case::negative_base(-2.0, 1.0)]
    #[case::nan_base(f64::NAN, 1.0)]
    #[case::zero_poll(2.0, 0.0)]
    #[case::infinite_poll(2.0, f64::INFINITY)]
    fn invalid_values_are_rejected(#[case] backoff_base: f64, #[case] poll: f64) {
        let s = QueueSettings {
            max_retries: 3,
            backoff_base,
            poll_interval_seconds: poll,
        };
        assert!(matches!(s.validate(), Err(QueueError::Config(_))));
    }

    #[test]
    fn apply_parses_and_validates() {
        let mut s = QueueSettings::default();
        s.apply(SettingKey::MaxRetries, "5").unwrap();
        s.apply(SettingKey::BackoffBase, "1.5").unwrap();
        assert_eq!(s.max_retries, 5);
        assert_eq!(s.backoff_base, 1.5);

        assert!(s.apply(SettingKey::MaxRetries, "-1").is_err());
        assert!(s.apply(SettingKey::PollIntervalSeconds, "0").is_err());
        assert!(s.apply(SettingKey::BackoffBase, "fast").is_err());
        assert_eq!(s.max_retries, 5);
        assert_eq!(s.poll_interval_seconds, 1.0);
    }

    #[test]
    fn keys_parse_from_their_names() {
        for key in SettingKey::ALL {
            assert_eq!(key.as_str().parse::<SettingKey>().unwrap(), key);
        }
        assert!("retries".parse::<SettingKey>().is_err());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let s: QueueSettings = serde_json::from_str(r#"{"max_retries": 1}"#).unwrap();
        assert_eq!(s.max_retries, 1);
        assert_eq!(s.backoff_base, 2.0);
    }

    #[test]
    fn in_memory_settings_serve_updates() {
        let settings = InMemorySettings::default();
        settings.set(SettingKey::PollIntervalSeconds, "0.25").unwrap();
        assert_eq!(
            settings.current().poll_interval(),
            Duration::from_millis(250)
        );
        assert!(settings
            .replace(QueueSettings {
                backoff_base: 0.0,
                ..QueueSettings::default()
            })
            .is_err());
    }
}
