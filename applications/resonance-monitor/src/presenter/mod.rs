//! Eased display values for discrete inputs such as slider commits.
//!
//! The animation is an explicit tween polled by whatever frame clock the
//! caller has; nothing here schedules itself.

use std::time::{Duration, Instant};

/// Cubic ease-out: fast start, decelerating into the target
pub fn ease_out_cubic(progress: f64) -> f64 {
    let p = progress.clamp(0.0, 1.0);
    1.0 - (1.0 - p).powi(3)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Tween {
    from: f64,
    to: f64,
    start: Instant,
    duration: Duration,
}

impl Tween {
    fn progress(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.start);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
    }

    fn value_at(&self, now: Instant) -> f64 {
        self.from + (self.to - self.from) * ease_out_cubic(self.progress(now))
    }
}

#[derive(Debug, Clone)]
pub struct AnimatedValue {
    display: f64,
    target: f64,
    duration: Duration,
    tween: Option<Tween>,
}

impl AnimatedValue {
    pub fn new(initial: f64, duration: Duration) -> Self {
        Self {
            display: initial,
            target: initial,
            duration,
            tween: None,
        }
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    /// Value computed on the last `sample` call
    pub fn display_value(&self) -> f64 {
        self.display
    }

    pub fn is_animating(&self) -> bool {
        self.tween.is_some()
    }

    /// Begin easing toward `value`. An in-flight animation is replaced,
    /// starting from whatever is on screen at `now`.
    pub fn set_target(&mut self, value: f64, now: Instant) {
        let from = self.sample(now);
        self.target = value;

        if from == value {
            self.tween = None;
            self.display = value;
            return;
        }

        self.tween = Some(Tween {
            from,
            to: value,
            start: now,
            duration: self.duration,
        });
    }

    /// Recompute the display value for the frame at `now`
    pub fn sample(&mut self, now: Instant) -> f64 {
        if let Some(tween) = self.tween {
            if tween.progress(now) >= 1.0 {
                self.display = tween.to;
                self.tween = None;
            } else {
                self.display = tween.value_at(now);
            }
        }
        self.display
    }

    /// Freeze at the current display value
    pub fn cancel(&mut self, now: Instant) {
        if self.tween.is_some() {
            self.sample(now);
            self.tween = None;
            self.target = self.display;
        }
    }
}
