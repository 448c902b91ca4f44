use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Bounds of the alert threshold slider, in kW.
pub const THRESHOLD_MIN_KW: f64 = 1.0;
pub const THRESHOLD_MAX_KW: f64 = 6.0;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub alert: AlertConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub presenter: PresenterConfig,
}

/// What the random walk does when power comes back on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumePolicy {
    /// Continue from the last value sampled before power was switched off
    #[default]
    LastValue,
    /// Restart from `initial_kw`
    Baseline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub tick_interval_ms: u64,
    pub initial_kw: f64,
    /// Half-width of the uniform step, before scaling
    pub step_kw: f64,
    pub scale: f64,
    pub floor_kw: f64,
    pub ceil_kw: f64,
    pub spike_probability: f64,
    pub spike_kw: f64,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
    pub resume: ResumePolicy,
    /// Name reported on an active alert
    pub circuit_name: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 2000,
            initial_kw: 2.3,
            step_kw: 0.2,
            scale: 1.0,
            floor_kw: 0.5,
            ceil_kw: 5.5,
            spike_probability: 0.05,
            spike_kw: 5.2,
            seed: None,
            resume: ResumePolicy::LastValue,
            circuit_name: "Whole Home".to_string(),
        }
    }
}

impl MonitorConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub audible: bool,
    pub tone_hz: f32,
    pub tone_ms: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            audible: true,
            tone_hz: 880.0,
            tone_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// JSON file holding persisted settings; in-memory only when unset
    pub path: Option<PathBuf>,
    pub default_power_on: bool,
    pub default_threshold_kw: f64,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            path: Some(PathBuf::from("data/settings.json")),
            default_power_on: true,
            default_threshold_kw: 4.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub chat_model: String,
    pub tip_model: String,
    pub analysis_model: String,
    pub image_model: String,
    pub speech_model: String,
    pub thinking_budget: u32,
    pub voice: String,
    /// Start in offline mode; no requests leave the process
    pub offline: bool,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_secs: 15,
            chat_model: "gemini-2.5-flash".to_string(),
            tip_model: "gemini-2.5-flash".to_string(),
            analysis_model: "gemini-2.5-pro".to_string(),
            image_model: "gemini-2.5-flash-image".to_string(),
            speech_model: "gemini-2.5-flash-preview-tts".to_string(),
            thinking_budget: 32768,
            voice: "Kore".to_string(),
            offline: false,
        }
    }
}

impl AssistantConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenterConfig {
    pub animation_ms: u64,
}

impl Default for PresenterConfig {
    fn default() -> Self {
        Self { animation_ms: 400 }
    }
}

impl PresenterConfig {
    pub fn animation_duration(&self) -> Duration {
        Duration::from_millis(self.animation_ms)
    }
}

impl Config {
    /// Load configuration from a YAML file with environment variable substitution
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text, expanding `$(VAR_NAME)` first
    pub fn from_yaml(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);

        let mut config: Config = serde_yaml::from_str(&expanded)?;

        // An unresolved placeholder means the variable is not set
        if let Some(key) = &config.assistant.api_key {
            if key.trim().is_empty() || key.contains("$(") {
                config.assistant.api_key = None;
            }
        }

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        let m = &self.monitor;

        if m.tick_interval_ms == 0 {
            return Err(AppError::Config(
                "monitor.tick_interval_ms must be greater than 0".to_string(),
            ));
        }

        let walk = [
            ("initial_kw", m.initial_kw),
            ("step_kw", m.step_kw),
            ("scale", m.scale),
            ("floor_kw", m.floor_kw),
            ("ceil_kw", m.ceil_kw),
            ("spike_kw", m.spike_kw),
        ];
        if let Some((name, value)) = walk.iter().find(|(_, v)| !v.is_finite()) {
            return Err(AppError::Config(format!(
                "monitor.{} must be a finite number, got {}",
                name, value
            )));
        }

        if m.floor_kw >= m.ceil_kw {
            return Err(AppError::Config(format!(
                "monitor.floor_kw ({}) must be below monitor.ceil_kw ({})",
                m.floor_kw, m.ceil_kw
            )));
        }

        if !(0.0..=1.0).contains(&m.spike_probability) {
            return Err(AppError::Config(
                "monitor.spike_probability must be between 0 and 1".to_string(),
            ));
        }

        if m.step_kw < 0.0 || m.scale < 0.0 {
            return Err(AppError::Config(
                "monitor.step_kw and monitor.scale cannot be negative".to_string(),
            ));
        }

        let threshold = self.settings.default_threshold_kw;
        if !(THRESHOLD_MIN_KW..=THRESHOLD_MAX_KW).contains(&threshold) {
            return Err(AppError::Config(format!(
                "settings.default_threshold_kw must be between {} and {}",
                THRESHOLD_MIN_KW, THRESHOLD_MAX_KW
            )));
        }

        if self.assistant.timeout_secs == 0 {
            return Err(AppError::Config(
                "assistant.timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.assistant.base_url.is_empty() {
            return Err(AppError::Config(
                "assistant.base_url cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Expand environment variables in the format $(VAR_NAME)
fn expand_env_vars(content: &str) -> String {
    let mut result = content.to_string();

    let re = match regex::Regex::new(r"\$\(([A-Z_][A-Z0-9_]*)\)") {
        Ok(re) => re,
        Err(_) => return result,
    };

    for cap in re.captures_iter(content) {
        let full_match = &cap[0];
        let var_name = &cap[1];

        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(full_match, &value);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_expand_env_vars() {
        std::env::set_var("RESONANCE_TEST_VAR", "test_value");

        let input = "api_key: $(RESONANCE_TEST_VAR)";
        let output = expand_env_vars(input);

        assert_eq!(output, "api_key: test_value");

        std::env::remove_var("RESONANCE_TEST_VAR");
    }

    #[test]
    fn test_expand_env_vars_not_found() {
        let input = "api_key: $(NONEXISTENT_RESONANCE_VAR)";
        let output = expand_env_vars(input);

        // Should leave it unchanged if not found
        assert_eq!(output, "api_key: $(NONEXISTENT_RESONANCE_VAR)");
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::from_yaml("{}").unwrap();

        assert_eq!(config.monitor.tick_interval_ms, 2000);
        assert_eq!(config.monitor.spike_kw, 5.2);
        assert_eq!(config.settings.default_threshold_kw, 4.5);
        assert_eq!(config.assistant.timeout_secs, 15);
        assert_eq!(config.presenter.animation_ms, 400);
        assert_eq!(config.monitor.resume, ResumePolicy::LastValue);
    }

    #[test]
    fn test_unresolved_api_key_is_absent() {
        let yaml = "assistant:\n  api_key: \"$(NONEXISTENT_RESONANCE_KEY)\"\n";
        let config = Config::from_yaml(yaml).unwrap();

        assert!(config.assistant.api_key.is_none());
    }

    #[test]
    fn test_rejects_inverted_walk_bounds() {
        let yaml = "monitor:\n  floor_kw: 6.0\n  ceil_kw: 1.0\n";
        let result = Config::from_yaml(yaml);

        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_rejects_non_finite_walk_parameters() {
        for field in ["initial_kw", "step_kw", "scale", "floor_kw", "ceil_kw", "spike_kw"] {
            for value in [".nan", ".inf", "-.inf"] {
                let yaml = format!("monitor:\n  {}: {}\n", field, value);
                let result = Config::from_yaml(&yaml);

                assert!(
                    matches!(result, Err(AppError::Config(_))),
                    "{} = {} was accepted",
                    field,
                    value
                );
            }
        }
    }

    #[test]
    fn test_rejects_spike_probability_out_of_range() {
        let yaml = "monitor:\n  spike_probability: 1.5\n";

        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_rejects_threshold_outside_slider() {
        let yaml = "settings:\n  default_threshold_kw: 9.0\n";

        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_resume_policy_parses_snake_case() {
        let yaml = "monitor:\n  resume: baseline\n  seed: 7\n";
        let config = Config::from_yaml(yaml).unwrap();

        assert_eq!(config.monitor.resume, ResumePolicy::Baseline);
        assert_eq!(config.monitor.seed, Some(7));
    }
}
