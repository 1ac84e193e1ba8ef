//! Impls - concrete adapters for the ports.
//!
//! - **SqliteJobStore**: durable store used by the CLI
//! - **InMemoryJobStore**: non-durable store for tests and embedding
//! - **ShellExecutor**: runs commands through the platform shell
//! - **FileSettings**: JSON settings file with `QUEUECTL_*` overrides

pub mod file_settings;
pub mod memory_store;
pub mod shell;
pub mod sqlite_store;

pub use self::file_settings::FileSettings;
pub use self::memory_store::InMemoryJobStore;
pub use self::shell::ShellExecutor;
pub use self::sqlite_store::SqliteJobStore;
