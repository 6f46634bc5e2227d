//! Layered configuration with environment variable support and validation.

use crate::{
    agent::QLearningConfig,
    dataset::DatasetConfig,
    env::{EnvironmentConfig, GridWorldEnv},
    feedback::FeedbackConfig,
    training::TrainingConfig,
};
use anyhow::{anyhow, Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
    pub enable_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            enable_target: false,
        }
    }
}

/// Main settings structure with all configuration sections
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub environment: EnvironmentConfig,
    pub agent: QLearningConfig,
    pub feedback: FeedbackConfig,
    pub training: TrainingConfig,
    pub dataset: DatasetConfig,
    pub logging: LoggingConfig,
}

impl Settings {
    /// Load settings from the bundled defaults, an optional `gridworld.toml`
    /// in the working directory and `GRIDWORLD_` environment variables.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Like [`Settings::load`], but reads `path` (required) instead of the
    /// optional local file when given.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let local = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("gridworld").required(false),
        };

        let config = Config::builder()
            // Start with default settings
            .add_source(File::from_str(include_str!("../config.toml"), FileFormat::Toml))
            .add_source(local)
            // e.g. GRIDWORLD_TRAINING__EPISODES=500
            .add_source(
                Environment::with_prefix("GRIDWORLD")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let mut settings: Settings = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Self::apply_env_overrides(&mut settings)?;
        settings.validate()?;

        Ok(settings)
    }

    /// Apply flat environment variable overrides
    fn apply_env_overrides(settings: &mut Settings) -> Result<()> {
        if let Ok(path) = std::env::var("GRIDWORLD_FEEDBACK_PATH") {
            settings.feedback.path = PathBuf::from(path);
        }
        if let Ok(level) = std::env::var("GRIDWORLD_LOG_LEVEL") {
            settings.logging.level = level;
        }
        if let Ok(seed) = std::env::var("GRIDWORLD_SEED") {
            let seed: u64 = seed.parse().context("GRIDWORLD_SEED must be an integer")?;
            settings.training.seed = seed;
            settings.agent.seed = Some(seed);
        }
        Ok(())
    }

    /// Validate settings for consistency
    pub fn validate(&self) -> Result<()> {
        self.environment.grid.validate()?;
        if self.environment.max_episode_steps == Some(0) {
            return Err(anyhow!("environment.max_episode_steps must be positive when set"));
        }
        self.agent.validate()?;
        self.feedback.validate()?;

        if self.training.episodes == 0 {
            warn!("training.episodes is 0; training will not run any episode");
        }
        if self.dataset.max_steps_per_episode == 0 {
            return Err(anyhow!("dataset.max_steps_per_episode cannot be 0"));
        }
        if !matches!(self.logging.format.as_str(), "json" | "text") {
            return Err(anyhow!(
                "logging.format must be \"json\" or \"text\", got {:?}",
                self.logging.format
            ));
        }

        Ok(())
    }

    /// Build the environment described by the `environment` section.
    pub fn build_environment(&self) -> Result<GridWorldEnv> {
        Ok(GridWorldEnv::from_config(&self.environment)?)
    }

    /// Get a configuration value by JSON pointer (e.g., "/training/episodes")
    pub fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let value = serde_json::to_value(self)?;
        let value = value
            .pointer(path)
            .ok_or_else(|| anyhow!("Configuration path not found: {}", path))?;

        Ok(serde_json::from_value(value.clone())?)
    }

    /// Effective configuration rendered as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
