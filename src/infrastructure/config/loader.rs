use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid max_concurrent_agents: {0}. Must be between 1 and 64")]
    InvalidMaxConcurrentAgents(usize),

    #[error("Invalid timeout for phase {0}: must be at least 1 second")]
    InvalidPhaseTimeout(String),

    #[error("Invalid budget_limit_usd: {0}. Must be positive")]
    InvalidBudget(f64),

    #[error("Invalid agent_rate_limit_per_minute: must be at least 1")]
    InvalidRateLimit,

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must not exceed max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for the project in the current directory.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .kriptik/config.yaml (project config)
    /// 3. .kriptik/local.yaml (local overrides, optional)
    /// 4. Environment variables (KRIPTIK_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        Self::load_from(Path::new("."))
    }

    /// Load configuration for the project rooted at `project_dir`.
    pub fn load_from(project_dir: &Path) -> Result<Config> {
        let dir = project_dir.join(".kriptik");
        let config: Config = Self::figment()
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed("KRIPTIK_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, without environment overrides.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Self::figment()
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn figment() -> Figment {
        Figment::new().merge(Serialized::defaults(Config::default()))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let orchestrator = &config.orchestrator;
        if orchestrator.max_concurrent_agents == 0 || orchestrator.max_concurrent_agents > 64 {
            return Err(ConfigError::InvalidMaxConcurrentAgents(
                orchestrator.max_concurrent_agents,
            ));
        }

        for (phase, secs) in orchestrator.phase_timeouts.as_map() {
            if secs == 0 {
                return Err(ConfigError::InvalidPhaseTimeout(phase.to_string()));
            }
        }

        if let Some(limit) = orchestrator.budget_limit_usd {
            if !(limit > 0.0) {
                return Err(ConfigError::InvalidBudget(limit));
            }
        }

        if orchestrator.agent_rate_limit_per_minute == Some(0) {
            return Err(ConfigError::InvalidRateLimit);
        }

        if config.retry.initial_backoff_ms > config.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.retry.initial_backoff_ms,
                config.retry.max_backoff_ms,
            ));
        }

        for check in &config.verification.commands {
            if check.name.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "verification command name cannot be empty".to_string(),
                ));
            }
            if check.program.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "verification command '{}' program cannot be empty",
                    check.name
                )));
            }
        }

        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }

        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

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
