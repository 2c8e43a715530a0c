use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

use crate::domain::errors::ConfigError;
use crate::domain::models::Config;

/// Project configuration directory, relative to the working directory
pub const PROJECT_DIR: &str = ".prismatic";

/// Primary project configuration file inside [`PROJECT_DIR`]
pub const CONFIG_FILE: &str = "config.yaml";

/// Optional local overrides inside [`PROJECT_DIR`]
pub const LOCAL_FILE: &str = "local.yaml";

/// Prefix of environment overrides; `__` separates nesting levels
pub const ENV_PREFIX: &str = "PRISMATIC_";

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a project directory
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. `<dir>/config.yaml` (project config)
    /// 3. `<dir>/local.yaml` (project local overrides, optional)
    /// 4. Environment variables (PRISMATIC_* prefix, highest priority)
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let dir = dir.as_ref();
        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join(CONFIG_FILE)));
        Self::finish(figment, dir)
    }

    /// Load with `document` standing in for the project config file
    ///
    /// Used to check a pending update before it is persisted.
    pub fn load_with_document<T: Serialize>(
        dir: impl AsRef<Path>,
        document: &T,
    ) -> Result<Config, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Serialized::defaults(document));
        Self::finish(figment, dir.as_ref())
    }

    fn finish(figment: Figment, dir: &Path) -> Result<Config, ConfigError> {
        let config: Config = figment
            .merge(Yaml::file(dir.join(LOCAL_FILE)))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        // Pipeline shape
        if config.pipeline.perspective_count == 0 {
            return Err(ConfigError::InvalidPerspectiveCount(
                config.pipeline.perspective_count,
            ));
        }
        if config.pipeline.cluster_count == 0 {
            return Err(ConfigError::InvalidClusterCount(config.pipeline.cluster_count));
        }
        if config.pipeline.bands.is_empty() {
            return Err(ConfigError::EmptyBands);
        }
        let mut seen = HashSet::new();
        for band in &config.pipeline.bands {
            if !seen.insert(band.trim().to_lowercase()) {
                return Err(ConfigError::DuplicateBand(band.clone()));
            }
        }

        // Generation
        let temperature = config.generation.temperature;
        if !temperature.is_finite() || temperature < 0.0 {
            return Err(ConfigError::InvalidTemperature(temperature));
        }
        if config.generation.max_output == 0 {
            return Err(ConfigError::InvalidMaxOutput(config.generation.max_output));
        }
        if config.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(config.retry.max_attempts));
        }

        // Backend
        if config.backend.base_url.trim().is_empty() {
            return Err(ConfigError::EmptyBaseUrl);
        }
        if config.backend.probe_attempts == 0 {
            return Err(ConfigError::InvalidProbeAttempts(config.backend.probe_attempts));
        }

        if config.orchestrator.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout(config.orchestrator.timeout_secs));
        }

        // Logging
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        Ok(())
    }
}
