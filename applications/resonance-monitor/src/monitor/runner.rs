use super::alert::{self, sound_alert, AlertState, Tone, ToneSink};
use super::simulator::ConsumptionSimulator;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::settings::store::{clamp_threshold, SettingsStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 64;
const COMMAND_CAPACITY: usize = 16;

/// Latest observable state of the monitor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorSnapshot {
    pub power_on: bool,
    pub sample_kw: f64,
    pub threshold_kw: f64,
    pub alert: AlertState,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    Sample {
        at: DateTime<Utc>,
        kw: f64,
    },
    AlertRaised {
        at: DateTime<Utc>,
        device: String,
        usage_kw: f64,
        threshold_kw: f64,
    },
    AlertCleared {
        at: DateTime<Utc>,
        kw: f64,
    },
    PowerChanged {
        at: DateTime<Utc>,
        on: bool,
    },
    ThresholdChanged {
        at: DateTime<Utc>,
        kw: f64,
    },
}

enum MonitorCommand {
    SetPower {
        on: bool,
        ack: oneshot::Sender<MonitorSnapshot>,
    },
    SetThreshold {
        kw: f64,
        ack: oneshot::Sender<MonitorSnapshot>,
    },
    Shutdown,
}

/// Owns the simulator, the alert state and the write-through to settings.
///
/// Power and threshold are read from the store once, in [`EnergyMonitor::new`].
/// After [`spawn`](EnergyMonitor::spawn) every change must go through the
/// [`MonitorHandle`]; writes made directly on a cloned [`SettingsStore`] take
/// effect only on the next start.
pub struct EnergyMonitor {
    settings: SettingsStore,
    simulator: ConsumptionSimulator,
    tick_interval: Duration,
    circuit_name: String,
    threshold_kw: f64,
    sample_kw: f64,
    alert: AlertState,
    tone: Tone,
    tone_sink: Arc<dyn ToneSink>,
    events: broadcast::Sender<MonitorEvent>,
    snapshot: watch::Sender<MonitorSnapshot>,
}

impl EnergyMonitor {
    /// Build the monitor from persisted settings. The first sample is
    /// evaluated immediately.
    pub fn new(config: &Config, settings: SettingsStore, tone_sink: Arc<dyn ToneSink>) -> Self {
        let power_on = settings.power_on();
        let threshold_kw = clamp_threshold(
            settings.alert_threshold(),
            config.settings.default_threshold_kw,
        );

        let mut simulator = ConsumptionSimulator::new(config.monitor.clone());
        if power_on {
            simulator.start();
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (snapshot, _) = watch::channel(MonitorSnapshot {
            power_on,
            sample_kw: 0.0,
            threshold_kw,
            alert: AlertState::Inactive,
        });

        let mut monitor = Self {
            settings,
            simulator,
            tick_interval: config.monitor.tick_interval(),
            circuit_name: config.monitor.circuit_name.clone(),
            threshold_kw,
            sample_kw: 0.0,
            alert: AlertState::Inactive,
            tone: Tone::from_config(&config.alert),
            tone_sink,
            events,
            snapshot,
        };

        let initial = monitor.simulator.current();
        monitor.observe(initial);
        monitor
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            power_on: self.simulator.is_running(),
            sample_kw: self.sample_kw,
            threshold_kw: self.threshold_kw,
            alert: self.alert.clone(),
        }
    }

    /// Start the tick loop on the current runtime
    pub fn spawn(self) -> MonitorHandle {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let snapshot = self.snapshot.subscribe();
        let events = self.events.clone();

        let task = tokio::spawn(self.run(rx));

        MonitorHandle {
            commands: tx,
            snapshot,
            events,
            task: Some(task),
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<MonitorCommand>) {
        info!(
            "Energy monitor started (interval: {}ms, threshold: {} kW, power: {})",
            self.tick_interval.as_millis(),
            self.threshold_kw,
            if self.simulator.is_running() { "on" } else { "off" }
        );

        let mut ticker = interval_at(Instant::now() + self.tick_interval, self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                cmd = commands.recv() => match cmd {
                    Some(MonitorCommand::SetPower { on, ack }) => {
                        let was_running = self.simulator.is_running();
                        self.set_power(on);
                        if on && !was_running {
                            ticker.reset();
                        }
                        let _ = ack.send(self.snapshot());
                    }
                    Some(MonitorCommand::SetThreshold { kw, ack }) => {
                        self.set_threshold(kw);
                        let _ = ack.send(self.snapshot());
                    }
                    Some(MonitorCommand::Shutdown) | None => break,
                },
                _ = ticker.tick(), if self.simulator.is_running() => {
                    if let Some(kw) = self.simulator.step() {
                        self.observe(kw);
                    }
                }
            }
        }

        info!("Energy monitor stopped");
    }

    fn set_power(&mut self, on: bool) {
        self.settings.set_power_on(on);

        if on == self.simulator.is_running() {
            return;
        }

        if on {
            self.simulator.start();
        } else {
            self.simulator.stop();
        }
        info!("Power switched {}", if on { "on" } else { "off" });
        self.emit(MonitorEvent::PowerChanged { at: Utc::now(), on });

        let current = self.simulator.current();
        self.observe(current);
    }

    fn set_threshold(&mut self, kw: f64) {
        self.threshold_kw = self.settings.set_alert_threshold(kw);
        info!("Alert threshold set to {} kW", self.threshold_kw);
        self.emit(MonitorEvent::ThresholdChanged {
            at: Utc::now(),
            kw: self.threshold_kw,
        });

        self.evaluate();
        self.publish();
    }

    fn observe(&mut self, kw: f64) {
        self.sample_kw = kw;
        debug!(kw, "consumption sample");
        self.emit(MonitorEvent::Sample { at: Utc::now(), kw });

        self.evaluate();
        self.publish();
    }

    fn evaluate(&mut self) {
        let transition = alert::evaluate(
            self.sample_kw,
            self.threshold_kw,
            &self.alert,
            &self.circuit_name,
        );

        if transition.just_activated {
            warn!(
                device = %self.circuit_name,
                usage_kw = self.sample_kw,
                threshold_kw = self.threshold_kw,
                "consumption above alert threshold"
            );
            sound_alert(self.tone_sink.as_ref(), &self.tone);
            self.emit(MonitorEvent::AlertRaised {
                at: Utc::now(),
                device: self.circuit_name.clone(),
                usage_kw: self.sample_kw,
                threshold_kw: self.threshold_kw,
            });
        }

        if transition.just_cleared {
            info!(kw = self.sample_kw, "consumption back under alert threshold");
            self.emit(MonitorEvent::AlertCleared {
                at: Utc::now(),
                kw: self.sample_kw,
            });
        }

        self.alert = transition.state;
    }

    fn emit(&self, event: MonitorEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        self.snapshot.send_replace(self.snapshot());
    }
}

/// Control surface for a running [`EnergyMonitor`].
///
/// Dropping the handle closes the command channel, which stops the loop.
pub struct MonitorHandle {
    commands: mpsc::Sender<MonitorCommand>,
    snapshot: watch::Receiver<MonitorSnapshot>,
    events: broadcast::Sender<MonitorEvent>,
    task: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    pub fn snapshot(&self) -> MonitorSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<MonitorSnapshot> {
        self.snapshot.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    /// Switch power and return the state right after the change was applied
    pub async fn set_power(&self, on: bool) -> Result<MonitorSnapshot> {
        let (ack, rx) = oneshot::channel();
        self.send(MonitorCommand::SetPower { on, ack }).await?;
        rx.await
            .map_err(|_| AppError::Monitor("monitor stopped before acknowledging".to_string()))
    }

    pub async fn set_threshold(&self, kw: f64) -> Result<MonitorSnapshot> {
        let (ack, rx) = oneshot::channel();
        self.send(MonitorCommand::SetThreshold { kw, ack }).await?;
        rx.await
            .map_err(|_| AppError::Monitor("monitor stopped before acknowledging".to_string()))
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the loop and wait for it. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        let _ = self.commands.send(MonitorCommand::Shutdown).await;
        if let Err(e) = task.await {
            warn!("Energy monitor task ended abnormally: {}", e);
        }
    }

    async fn send(&self, cmd: MonitorCommand) -> Result<()> {
        self.commands
            .send(cmd)
            .await
            .map_err(|_| AppError::Monitor("monitor is not running".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use crate::monitor::alert::{SilentTone, ToneError};
    use crate::settings::{MemoryStorage, SettingsStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingTone(AtomicUsize);

    impl ToneSink for CountingTone {
        fn play(&self, _tone: &Tone) -> std::result::Result<(), ToneError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config(spike_probability: f64) -> Config {
        Config {
            monitor: MonitorConfig {
                seed: Some(11),
                spike_probability,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn store(config: &Config) -> SettingsStore {
        SettingsStore::new(Arc::new(MemoryStorage::new()), &config.settings)
    }

    fn drain(rx: &mut broadcast::Receiver<MonitorEvent>) -> Vec<MonitorEvent> {
        let mut out = Vec::new();
        while let Ok(e) = rx.try_recv() {
            out.push(e);
        }
        out
    }

    #[tokio::test]
    async fn test_initial_snapshot_from_settings() {
        let config = config(0.0);
        let settings = store(&config);
        settings.set_alert_threshold(3.0);

        let monitor = EnergyMonitor::new(&config, settings, Arc::new(SilentTone));
        let snap = monitor.snapshot();

        assert!(snap.power_on);
        assert_eq!(snap.threshold_kw, 3.0);
        assert_eq!(snap.sample_kw, 2.3);
        assert_eq!(snap.alert, AlertState::Inactive);
    }

    #[tokio::test]
    async fn test_starts_stopped_when_power_persisted_off() {
        let config = config(0.0);
        let settings = store(&config);
        settings.set_power_on(false);

        let monitor = EnergyMonitor::new(&config, settings, Arc::new(SilentTone));

        assert!(!monitor.snapshot().power_on);
        assert_eq!(monitor.snapshot().sample_kw, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spike_raises_alert_once_with_one_tone() {
        let config = config(1.0);
        let tone = Arc::new(CountingTone::default());
        let mut handle = EnergyMonitor::new(&config, store(&config), tone.clone()).spawn();
        let mut events = handle.subscribe();

        tokio::time::sleep(Duration::from_millis(7000)).await;

        let events = drain(&mut events);
        let samples = events
            .iter()
            .filter(|e| matches!(e, MonitorEvent::Sample { kw, .. } if *kw == 5.2))
            .count();
        let raised = events
            .iter()
            .filter(|e| matches!(e, MonitorEvent::AlertRaised { .. }))
            .count();

        assert_eq!(samples, 3);
        assert_eq!(raised, 1);
        assert_eq!(tone.0.load(Ordering::SeqCst), 1);
        assert!(handle.snapshot().alert.is_active());

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_power_off_reports_zero_and_stops_ticking() {
        let config = config(1.0);
        let settings = store(&config);
        let mut handle = EnergyMonitor::new(&config, settings.clone(), Arc::new(SilentTone)).spawn();

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(handle.snapshot().alert.is_active());

        let snap = handle.set_power(false).await.unwrap();
        assert!(!snap.power_on);
        assert_eq!(snap.sample_kw, 0.0);
        assert_eq!(snap.alert, AlertState::Inactive);
        assert!(!settings.power_on());

        let mut events = handle.subscribe();
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(drain(&mut events).is_empty());

        let snap = handle.set_power(true).await.unwrap();
        assert!(snap.power_on);
        assert_eq!(snap.sample_kw, 5.2);
        assert!(settings.power_on());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_threshold_change_is_persisted_and_reevaluated() {
        let config = config(0.0);
        let settings = store(&config);
        let mut handle = EnergyMonitor::new(&config, settings.clone(), Arc::new(SilentTone)).spawn();

        let snap = handle.set_threshold(1.0).await.unwrap();
        assert_eq!(snap.threshold_kw, 1.0);
        assert!(snap.alert.is_active());
        assert_eq!(settings.alert_threshold(), 1.0);

        let snap = handle.set_threshold(6.0).await.unwrap();
        assert_eq!(snap.alert, AlertState::Inactive);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent_and_rejects_commands() {
        let config = config(0.0);
        let mut handle = EnergyMonitor::new(&config, store(&config), Arc::new(SilentTone)).spawn();

        handle.shutdown().await;
        handle.shutdown().await;

        assert!(!handle.is_running());
        assert!(handle.set_power(false).await.is_err());
    }
}
