pub mod alert;
pub mod runner;
pub mod simulator;

pub use alert::{AlertState, SilentTone, TerminalBell, Tone, ToneSink};
pub use runner::{EnergyMonitor, MonitorEvent, MonitorHandle, MonitorSnapshot};
pub use simulator::ConsumptionSimulator;
