use crate::config::AlertConfig;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum AlertState {
    #[default]
    Inactive,
    Active { device: String, usage_kw: f64 },
}

impl AlertState {
    pub fn is_active(&self) -> bool {
        matches!(self, AlertState::Active { .. })
    }
}

/// Outcome of evaluating one sample against the threshold
#[derive(Debug, Clone, PartialEq)]
pub struct AlertTransition {
    pub state: AlertState,
    pub just_activated: bool,
    pub just_cleared: bool,
}

/// Edge-triggered threshold check.
///
/// Activates only when the sample exceeds the threshold while the previous
/// state was inactive; clears as soon as the sample is at or below it.
pub fn evaluate(
    sample_kw: f64,
    threshold_kw: f64,
    previous: &AlertState,
    device: &str,
) -> AlertTransition {
    let over = sample_kw > threshold_kw;
    let was_active = previous.is_active();

    let state = if over {
        AlertState::Active {
            device: device.to_string(),
            usage_kw: sample_kw,
        }
    } else {
        AlertState::Inactive
    };

    AlertTransition {
        state,
        just_activated: over && !was_active,
        just_cleared: !over && was_active,
    }
}

/// A fixed-pitch cue
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    pub frequency_hz: f32,
    pub duration: Duration,
}

impl Tone {
    pub fn from_config(config: &AlertConfig) -> Self {
        Self {
            frequency_hz: config.tone_hz,
            duration: Duration::from_millis(config.tone_ms),
        }
    }
}

#[derive(Error, Debug)]
pub enum ToneError {
    #[error("audio output unavailable: {0}")]
    Unavailable(String),

    #[error("audio IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub trait ToneSink: Send + Sync {
    fn play(&self, tone: &Tone) -> Result<(), ToneError>;
}

/// Rings the terminal bell on stderr
#[derive(Debug, Default)]
pub struct TerminalBell;

impl ToneSink for TerminalBell {
    fn play(&self, _tone: &Tone) -> Result<(), ToneError> {
        let mut stderr = std::io::stderr().lock();
        stderr.write_all(b"\x07")?;
        stderr.flush()?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct SilentTone;

impl ToneSink for SilentTone {
    fn play(&self, _tone: &Tone) -> Result<(), ToneError> {
        Ok(())
    }
}

/// Play the cue, swallowing any playback failure
pub fn sound_alert(sink: &dyn ToneSink, tone: &Tone) {
    if let Err(e) = sink.play(tone) {
        debug!(error = %e, "alert tone playback failed, ignoring");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Feed samples through the detector and return (state, just_activated) per sample.
    fn run(threshold: f64, samples: &[f64]) -> Vec<(bool, bool)> {
        let mut state = AlertState::Inactive;
        samples
            .iter()
            .map(|&s| {
                let t = evaluate(s, threshold, &state, "Whole Home");
                state = t.state;
                (state.is_active(), t.just_activated)
            })
            .collect()
    }

    #[test]
    fn test_scenario_threshold_four_and_a_half() {
        let out = run(4.5, &[2.3, 3.1, 4.8, 4.9, 4.0]);

        assert_eq!(
            out,
            vec![
                (false, false),
                (false, false),
                (true, true),
                (true, false),
                (false, false),
            ]
        );
        assert_eq!(out.iter().filter(|(_, fired)| *fired).count(), 1);
    }

    #[test]
    fn test_sample_equal_to_threshold_is_not_over() {
        let t = evaluate(4.5, 4.5, &AlertState::Inactive, "x");

        assert_eq!(t.state, AlertState::Inactive);
        assert!(!t.just_activated);
    }

    #[test]
    fn test_rearms_after_dropping_to_threshold() {
        let out = run(3.0, &[3.5, 3.6, 3.0, 3.1, 3.2]);
        let fired: Vec<_> = out.iter().map(|(_, f)| *f).collect();

        assert_eq!(fired, vec![true, false, false, true, false]);
    }

    #[test]
    fn test_sustained_excess_never_refires() {
        let samples = vec![5.2; 100];
        let out = run(1.0, &samples);

        assert_eq!(out.iter().filter(|(_, f)| *f).count(), 1);
        assert!(out.iter().all(|(active, _)| *active));
    }

    #[test]
    fn test_edge_property_over_pseudo_random_sequences() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(77);
        for _ in 0..50 {
            let threshold = rng.gen_range(1.0..=6.0);
            let samples: Vec<f64> = (0..100).map(|_| rng.gen_range(0.0..=6.0)).collect();
            let out = run(threshold, &samples);

            for (i, (_, fired)) in out.iter().enumerate() {
                let over = samples[i] > threshold;
                let prev_over = i > 0 && samples[i - 1] > threshold;
                assert_eq!(*fired, over && !prev_over);
            }
        }
    }

    #[test]
    fn test_active_state_records_device_and_usage() {
        let t = evaluate(5.2, 4.5, &AlertState::Inactive, "Tesla Charger");

        assert_eq!(
            t.state,
            AlertState::Active {
                device: "Tesla Charger".to_string(),
                usage_kw: 5.2
            }
        );
    }

    #[test]
    fn test_just_cleared_reported_once() {
        let active = AlertState::Active {
            device: "x".to_string(),
            usage_kw: 5.0,
        };
        let cleared = evaluate(1.0, 4.5, &active, "x");
        let again = evaluate(1.0, 4.5, &cleared.state, "x");

        assert!(cleared.just_cleared);
        assert!(!again.just_cleared);
    }

    struct FailingSink;

    impl ToneSink for FailingSink {
        fn play(&self, _tone: &Tone) -> Result<(), ToneError> {
            Err(ToneError::Unavailable("blocked by policy".to_string()))
        }
    }

    #[test]
    fn test_tone_failure_is_swallowed() {
        let tone = Tone::from_config(&AlertConfig::default());

        sound_alert(&FailingSink, &tone);
        sound_alert(&SilentTone, &tone);

        assert_eq!(tone.duration, Duration::from_millis(500));
    }

    #[test]
    fn test_alert_state_serialization() {
        let json = serde_json::to_string(&AlertState::Active {
            device: "Whole Home".to_string(),
            usage_kw: 4.8,
        })
        .unwrap();

        assert!(json.contains(r#""state":"active""#));
        assert!(json.contains(r#""device":"Whole Home""#));
    }
}
