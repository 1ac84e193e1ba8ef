//! Settings backed by a JSON file with environment overrides.
//!
//! Layers, later wins:
//! 1. built-in defaults
//! 2. the JSON file (`queuectl-config.json` in the data directory)
//! 3. `QUEUECTL_*` environment variables (`QUEUECTL_MAX_RETRIES`, ...)

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use tracing::warn;

use crate::error::QueueError;
use crate::ports::{QueueSettings, SettingKey, SettingsProvider};

pub const CONFIG_FILE_NAME: &str = "queuectl-config.json";
pub const ENV_PREFIX: &str = "QUEUECTL_";

const SETTING_NAMES: [&str; 3] = ["max_retries", "backoff_base", "poll_interval_seconds"];

pub struct FileSettings {
    path: PathBuf,
    env_prefix: String,
    /// Served when the file stops parsing or validating.
    last_good: RwLock<QueueSettings>,
}

impl FileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            env_prefix: ENV_PREFIX.to_string(),
            last_good: RwLock::new(QueueSettings::default()),
        }
    }

    /// Settings file inside a data directory.
    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        Self::new(data_dir.as_ref().join(CONFIG_FILE_NAME))
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the defaults if the file does not exist yet.
    pub fn ensure_exists(&self) -> Result<(), QueueError> {
        if self.path.exists() {
            return Ok(());
        }
        self.write(&QueueSettings::default())
    }

    /// Load all layers and validate the result. A missing file is first
    /// written with the defaults.
    pub fn load(&self) -> Result<QueueSettings, QueueError> {
        self.ensure_exists()?;
        let settings: QueueSettings = self
            .file_layers()
            .merge(Env::prefixed(&self.env_prefix).only(&SETTING_NAMES))
            .extract()
            .map_err(|e| QueueError::Config(e.to_string()))?;
        settings.validate()?;

        *self.last_good.write().unwrap_or_else(PoisonError::into_inner) = settings;
        Ok(settings)
    }

    pub fn get(&self, key: SettingKey) -> Result<serde_json::Value, QueueError> {
        Ok(self.load()?.get(key))
    }

    /// Update one value in the file. Environment overrides are not written back.
    pub fn set(&self, key: SettingKey, value: &str) -> Result<QueueSettings, QueueError> {
        self.ensure_exists()?;
        let mut stored: QueueSettings = self
            .file_layers()
            .extract()
            .map_err(|e| QueueError::Config(e.to_string()))?;
        stored.apply(key, value)?;
        self.write(&stored)?;
        self.load()
    }

    fn file_layers(&self) -> Figment {
        Figment::from(Serialized::defaults(QueueSettings::default()))
            .merge(Json::file_exact(&self.path))
    }

    fn write(&self, settings: &QueueSettings) -> Result<(), QueueError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(settings)
            .map_err(|e| QueueError::Config(e.to_string()))?;
        std::fs::write(&self.path, json + "\n")?;
        Ok(())
    }
}

impl SettingsProvider for FileSettings {
    fn current(&self) -> QueueSettings {
        match self.load() {
            Ok(settings) => settings,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "using last good settings");
                *self.last_good.read().unwrap_or_else(PoisonError::into_inner)
            }
        }
    }
}
