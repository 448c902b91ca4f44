pub mod storage;
pub mod store;

pub use storage::{FileStorage, MemoryStorage, StorageBackend, StorageError};
pub use store::{SettingsStore, ALERT_THRESHOLD_KEY, POWER_ON_KEY};
