//! AppBuilder - wires a data directory into a ready-to-use queue.
//!
//! Layout of a data directory:
//! - `queue.db`: the SQLite job store
//! - `queuectl-config.json`: settings (created with defaults)
//! - `queuectl.sock`: control socket of a running pool (Unix only)

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::pool::WorkerPool;
use super::queue::JobQueue;
use crate::error::QueueError;
use crate::impls::{FileSettings, ShellExecutor, SqliteJobStore};
use crate::ports::{CommandExecutor, JobStore, SettingsProvider};

pub const DATABASE_FILE_NAME: &str = "queue.db";

/// # Example
/// ```ignore
/// let app = AppBuilder::new("./data").build().await?;
/// app.queue.submit_json(r#"{"command":"echo hi"}"#).await?;
/// let pool = app.pool();
/// pool.start(3)?;
/// ```
pub struct AppBuilder {
    data_dir: PathBuf,
    executor: Option<Arc<dyn CommandExecutor>>,
    env_prefix: Option<String>,
}

impl AppBuilder {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            executor: None,
            env_prefix: None,
        }
    }

    /// Replace the default `ShellExecutor`.
    pub fn executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Prefix of the environment overrides (default `QUEUECTL_`).
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Create the directory, settings file and database if missing.
    ///
    /// Fails fast on an unusable directory or database; a broken settings
    /// file only produces a warning when it is read.
    pub async fn build(self) -> Result<App, QueueError> {
        std::fs::create_dir_all(&self.data_dir)?;

        let mut settings = FileSettings::in_dir(&self.data_dir);
        if let Some(prefix) = self.env_prefix {
            settings = settings.with_env_prefix(prefix);
        }
        settings.ensure_exists()?;
        let settings = Arc::new(settings);

        let store = Arc::new(SqliteJobStore::open(self.data_dir.join(DATABASE_FILE_NAME)).await?);
        let executor = self
            .executor
            .unwrap_or_else(|| Arc::new(ShellExecutor::new()));

        let queue = JobQueue::new(
            Arc::clone(&store) as Arc<dyn JobStore>,
            Arc::clone(&settings) as Arc<dyn SettingsProvider>,
        );

        Ok(App {
            data_dir: self.data_dir,
            store,
            settings,
            executor,
            queue,
        })
    }
}

/// Everything a queuectl process needs, opened on one data directory.
pub struct App {
    pub data_dir: PathBuf,
    pub store: Arc<SqliteJobStore>,
    pub settings: Arc<FileSettings>,
    pub executor: Arc<dyn CommandExecutor>,
    pub queue: JobQueue,
}

impl App {
    /// A new, stopped pool over this app's store, executor and settings.
    pub fn pool(&self) -> WorkerPool {
        WorkerPool::new(
            Arc::clone(&self.store) as Arc<dyn JobStore>,
            Arc::clone(&self.executor),
            Arc::clone(&self.settings) as Arc<dyn SettingsProvider>,
        )
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    #[cfg(unix)]
    pub fn socket_path(&self) -> PathBuf {
        super::control::socket_path(&self.data_dir)
    }
}
