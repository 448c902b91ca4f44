//! Attuner hub controls: range sliders with eased readouts, and the safety override.

use crate::presenter::AnimatedValue;
use serde::Serialize;
use std::time::{Duration, Instant};

pub const FIRMWARE_VERSION: &str = "v2.1.8";

#[derive(Debug, Clone)]
pub struct ControlSlider {
    pub title: &'static str,
    pub description: &'static str,
    pub unit: &'static str,
    pub min: f64,
    pub max: f64,
    value: f64,
    readout: AnimatedValue,
}

impl ControlSlider {
    pub fn new(
        title: &'static str,
        description: &'static str,
        unit: &'static str,
        min: f64,
        max: f64,
        initial: f64,
        animation: Duration,
    ) -> Self {
        let value = initial.clamp(min, max);
        Self {
            title,
            description,
            unit,
            min,
            max,
            value,
            readout: AnimatedValue::new(value, animation),
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Commit a slider position; values outside the track are clamped
    pub fn commit(&mut self, value: f64, now: Instant) -> f64 {
        self.value = value.clamp(self.min, self.max);
        self.readout.set_target(self.value, now);
        self.value
    }

    /// Whole-unit readout for the frame at `now`
    pub fn readout(&mut self, now: Instant) -> i64 {
        self.readout.sample(now).round() as i64
    }

    /// Position along the track in `0.0..=1.0`, used for the glow intensity
    pub fn intensity(&self) -> f64 {
        if self.max <= self.min {
            return 0.0;
        }
        (self.value - self.min) / (self.max - self.min)
    }

    pub fn cancel_animation(&mut self, now: Instant) {
        self.readout.cancel(now);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemHealth {
    Optimal,
    Degraded,
}

#[derive(Debug, Clone)]
pub struct HubControls {
    pub voltage_limit: ControlSlider,
    pub attuner_range: ControlSlider,
    safety_override: bool,
}

impl HubControls {
    pub fn new(animation: Duration) -> Self {
        Self {
            voltage_limit: ControlSlider::new(
                "Voltage Limit",
                "Adjust the maximum voltage draw for your entire system.",
                "V",
                180.0,
                250.0,
                220.0,
                animation,
            ),
            attuner_range: ControlSlider::new(
                "Attuner Range",
                "Set the effective wireless energy range from the central hub.",
                "m",
                5.0,
                50.0,
                25.0,
                animation,
            ),
            safety_override: true,
        }
    }

    pub fn safety_override(&self) -> bool {
        self.safety_override
    }

    pub fn toggle_safety_override(&mut self) -> bool {
        self.safety_override = !self.safety_override;
        self.safety_override
    }

    pub fn firmware(&self) -> &'static str {
        FIRMWARE_VERSION
    }

    /// Degraded while the safety override is off
    pub fn health(&self) -> SystemHealth {
        if self.safety_override {
            SystemHealth::Optimal
        } else {
            SystemHealth::Degraded
        }
    }

    /// Stop all readout animations, e.g. when the screen goes away
    pub fn teardown(&mut self, now: Instant) {
        self.voltage_limit.cancel_animation(now);
        self.attuner_range.cancel_animation(now);
    }
}
