pub mod assistant;
pub mod config;
pub mod devices;
pub mod error;
pub mod hub;
pub mod monitor;
pub mod presenter;
pub mod settings;
pub mod usage;

// Re-export commonly used items
pub use config::Config;
pub use error::{AppError, Result};
pub use monitor::{EnergyMonitor, MonitorEvent, MonitorHandle, MonitorSnapshot};
pub use settings::SettingsStore;
