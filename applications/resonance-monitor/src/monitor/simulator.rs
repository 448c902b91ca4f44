use crate::config::{MonitorConfig, ResumePolicy};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Random-walk generator for the live consumption feed.
///
/// The walk value survives a power-off so it can resume according to the
/// configured [`ResumePolicy`]; the *reported* sample is zero while stopped.
#[derive(Debug)]
pub struct ConsumptionSimulator {
    config: MonitorConfig,
    rng: StdRng,
    walk_kw: f64,
    running: bool,
}

impl ConsumptionSimulator {
    pub fn new(config: MonitorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let walk_kw = config.initial_kw.clamp(config.floor_kw, config.ceil_kw);

        Self {
            config,
            rng,
            walk_kw,
            running: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The sample as consumers should see it
    pub fn current(&self) -> f64 {
        if self.running {
            self.walk_kw
        } else {
            0.0
        }
    }

    pub fn start(&mut self) {
        if self.running {
            return;
        }
        if self.config.resume == ResumePolicy::Baseline {
            self.walk_kw = self
                .config
                .initial_kw
                .clamp(self.config.floor_kw, self.config.ceil_kw);
        }
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Advance one tick. Returns `None` while stopped.
    pub fn step(&mut self) -> Option<f64> {
        if !self.running {
            return None;
        }

        let c = &self.config;
        let spike = c.spike_probability > 0.0 && self.rng.gen_bool(c.spike_probability);

        self.walk_kw = if spike {
            c.spike_kw
        } else {
            let delta = if c.step_kw > 0.0 {
                self.rng.gen_range(-c.step_kw..=c.step_kw)
            } else {
                0.0
            };
            (self.walk_kw + delta * c.scale).clamp(c.floor_kw, c.ceil_kw)
        };

        Some(self.walk_kw)
    }
}
