use std::path::Path;

use tracing::warn;

use crate::ai::actions::ActionSet;
use crate::ai::policy::PolicyConfig;
use crate::ai::value::{ApproxConfig, TabularConfig};
use crate::checkpoint::CheckpointManagerConfig;
use crate::error::ConfigError;
use crate::sim::SyntheticConfig;
use crate::training::control_loop::ControlConfig;
use crate::training::trainer::TrainerConfig;

/// Top-level application configuration, loadable from TOML.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub tabular: TabularConfig,
    pub approx: ApproxConfig,
    pub policy: PolicyConfig,
    pub control: ControlConfig,
    pub training: TrainerConfig,
    pub checkpoint: CheckpointManagerConfig,
    pub synthetic: SyntheticConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the file
    /// does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            warn!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tabular.alpha <= 0.0 || self.tabular.alpha > 1.0 {
            return Err(invalid("tabular.alpha must be in (0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.tabular.gamma) {
            return Err(invalid("tabular.gamma must be in [0, 1]"));
        }
        if self.tabular.state_cap == 0 {
            return Err(invalid("tabular.state_cap must be > 0"));
        }

        if !(0.0..=1.0).contains(&self.approx.gamma) {
            return Err(invalid("approx.gamma must be in [0, 1]"));
        }
        if self.approx.learning_rate <= 0.0 {
            return Err(invalid("approx.learning_rate must be > 0"));
        }
        if self.approx.hidden_size == 0 {
            return Err(invalid("approx.hidden_size must be > 0"));
        }
        if self.approx.state_size == 0 {
            return Err(invalid("approx.state_size must be > 0"));
        }
        if self.approx.batch_size == 0 {
            return Err(invalid("approx.batch_size must be > 0"));
        }
        if self.approx.replay_capacity < self.approx.batch_size {
            return Err(invalid("approx.replay_capacity must be >= approx.batch_size"));
        }

        if !(0.0..=1.0).contains(&self.policy.epsilon) {
            return Err(invalid("policy.epsilon must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.policy.epsilon_min) {
            return Err(invalid("policy.epsilon_min must be in [0, 1]"));
        }
        if self.policy.decay <= 0.0 || self.policy.decay > 1.0 {
            return Err(invalid("policy.decay must be in (0, 1]"));
        }

        if self.control.max_steps == 0 {
            return Err(invalid("control.max_steps must be > 0"));
        }
        if self.control.episode_steps == 0 {
            return Err(invalid("control.episode_steps must be > 0"));
        }
        if let ActionSet::GreenDurations(durations) = &self.control.actions {
            if durations.is_empty() {
                return Err(invalid("control.actions green_durations must not be empty"));
            }
            if durations.contains(&0) {
                return Err(invalid("control.actions green_durations must be > 0"));
            }
        }
        if let Some(extension) = &self.control.green_extension {
            if extension.base_green > extension.max_green {
                return Err(invalid(
                    "control.green_extension.base_green must be <= max_green",
                ));
            }
        }

        if self.training.live_update_interval == 0 {
            return Err(invalid("training.live_update_interval must be > 0"));
        }
        if self.training.snapshot_interval == 0 {
            return Err(invalid("training.snapshot_interval must be > 0"));
        }
        if self.training.metrics_window == 0 {
            return Err(invalid("training.metrics_window must be > 0"));
        }

        if self.synthetic.agents == 0 {
            return Err(invalid("synthetic.agents must be > 0"));
        }
        if self.synthetic.lanes_per_agent == 0 {
            return Err(invalid("synthetic.lanes_per_agent must be > 0"));
        }
        if self.synthetic.arrival_rate < 0.0 {
            return Err(invalid("synthetic.arrival_rate must be >= 0"));
        }

        Ok(())
    }

    /// Generate a TOML string with all default values (useful for creating
    /// example config files).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&AppConfig::default()).expect("default config serializes")
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Validation(message.to_string())
}
