//! Ports - the seams between the queue logic and the outside world.
//!
//! Each trait hides one external concern (storage, process execution,
//! configuration, time, id generation) so the worker loop can be tested
//! against in-memory doubles.

pub mod clock;
pub mod executor;
pub mod id_generator;
pub mod job_store;
pub mod settings;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::executor::CommandExecutor;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::job_store::JobStore;
pub use self::settings::{InMemorySettings, QueueSettings, SettingKey, SettingsProvider};
