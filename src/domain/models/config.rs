use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::phase::BuildPhase;

/// Main configuration structure for the build orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Pipeline and dispatcher settings
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Retry policy for transient agent failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Merge resolver policy
    #[serde(default)]
    pub merge: MergeConfig,

    /// Verification swarm checks
    #[serde(default)]
    pub verification: VerificationConfig,

    /// Report store configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorConfig::default(),
            retry: RetryConfig::default(),
            merge: MergeConfig::default(),
            verification: VerificationConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Pipeline and dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OrchestratorConfig {
    /// Maximum number of agents running at once (1-64)
    #[serde(default = "default_max_concurrent_agents")]
    pub max_concurrent_agents: usize,

    /// Per-phase deadlines
    #[serde(default)]
    pub phase_timeouts: PhaseTimeouts,

    /// Stop dispatching new agents once this much has been spent
    #[serde(default)]
    pub budget_limit_usd: Option<f64>,

    /// Cap on agent starts per minute, shared across a build
    #[serde(default)]
    pub agent_rate_limit_per_minute: Option<u32>,

    /// How long to wait for agents to stop after cancel or timeout
    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,
}

const fn default_max_concurrent_agents() -> usize {
    4
}

const fn default_cancel_grace_ms() -> u64 {
    5000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_agents: default_max_concurrent_agents(),
            phase_timeouts: PhaseTimeouts::default(),
            budget_limit_usd: None,
            agent_rate_limit_per_minute: None,
            cancel_grace_ms: default_cancel_grace_ms(),
        }
    }
}

impl OrchestratorConfig {
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}

/// Deadline per pipeline phase, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PhaseTimeouts {
    #[serde(default = "default_intent_lock_secs")]
    pub intent_lock: u64,
    #[serde(default = "default_initialization_secs")]
    pub initialization: u64,
    #[serde(default = "default_parallel_build_secs")]
    pub parallel_build: u64,
    #[serde(default = "default_integration_check_secs")]
    pub integration_check: u64,
    #[serde(default = "default_functional_test_secs")]
    pub functional_test: u64,
    #[serde(default = "default_intent_satisfaction_secs")]
    pub intent_satisfaction: u64,
    #[serde(default = "default_demo_secs")]
    pub demo: u64,
}

const fn default_intent_lock_secs() -> u64 {
    60
}

const fn default_initialization_secs() -> u64 {
    120
}

const fn default_parallel_build_secs() -> u64 {
    1800
}

const fn default_integration_check_secs() -> u64 {
    300
}

const fn default_functional_test_secs() -> u64 {
    600
}

const fn default_intent_satisfaction_secs() -> u64 {
    120
}

const fn default_demo_secs() -> u64 {
    120
}

impl Default for PhaseTimeouts {
    fn default() -> Self {
        Self {
            intent_lock: default_intent_lock_secs(),
            initialization: default_initialization_secs(),
            parallel_build: default_parallel_build_secs(),
            integration_check: default_integration_check_secs(),
            functional_test: default_functional_test_secs(),
            intent_satisfaction: default_intent_satisfaction_secs(),
            demo: default_demo_secs(),
        }
    }
}

impl PhaseTimeouts {
    /// Same deadline for every phase.
    pub fn uniform(secs: u64) -> Self {
        Self {
            intent_lock: secs,
            initialization: secs,
            parallel_build: secs,
            integration_check: secs,
            functional_test: secs,
            intent_satisfaction: secs,
            demo: secs,
        }
    }

    /// Deadline for `phase`; terminal phases have none.
    pub fn for_phase(&self, phase: BuildPhase) -> Option<Duration> {
        let secs = match phase {
            BuildPhase::IntentLock => self.intent_lock,
            BuildPhase::Initialization => self.initialization,
            BuildPhase::ParallelBuild => self.parallel_build,
            BuildPhase::IntegrationCheck => self.integration_check,
            BuildPhase::FunctionalTest => self.functional_test,
            BuildPhase::IntentSatisfaction => self.intent_satisfaction,
            BuildPhase::Demo => self.demo,
            BuildPhase::Done | BuildPhase::Failed | BuildPhase::Cancelled => return None,
        };
        Some(Duration::from_secs(secs))
    }

    pub fn as_map(&self) -> BTreeMap<BuildPhase, u64> {
        BuildPhase::PIPELINE
            .iter()
            .filter_map(|p| self.for_phase(*p).map(|d| (*p, d.as_secs())))
            .collect()
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_retries() -> u32 {
    2
}

const fn default_initial_backoff_ms() -> u64 {
    500
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// What to do with a true merge conflict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Leave the conflict unresolved and fail the build.
    #[default]
    Fail,
    /// Keep the highest-priority agent's version.
    PreferPriority,
}

/// Merge resolver configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MergeConfig {
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
}

/// A verification check that runs a command in the sandbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CommandCheckConfig {
    pub name: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_true")]
    pub blocking: bool,
}

/// Verification swarm configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct VerificationConfig {
    /// Command checks; `build` (blocking) and `lint` (advisory) by default
    #[serde(default = "default_commands")]
    pub commands: Vec<CommandCheckConfig>,

    /// Markers that flag unfinished code
    #[serde(default = "default_placeholder_markers")]
    pub placeholder_markers: Vec<String>,

    /// URL for the runtime smoke test; the check is skipped when unset
    #[serde(default)]
    pub smoke_test_url: Option<String>,

    /// Paths that must never end up in the workspace
    #[serde(default = "default_forbidden_paths")]
    pub forbidden_paths: Vec<String>,
}

impl CommandCheckConfig {
    /// `npm run <script>` as a command check.
    pub fn npm_script(script: &str, blocking: bool) -> Self {
        Self {
            name: script.to_string(),
            program: "npm".to_string(),
            args: vec!["run".to_string(), script.to_string()],
            blocking,
        }
    }
}

fn default_commands() -> Vec<CommandCheckConfig> {
    vec![
        CommandCheckConfig::npm_script("build", true),
        CommandCheckConfig::npm_script("lint", false),
    ]
}

fn default_placeholder_markers() -> Vec<String> {
    ["TODO", "FIXME", "lorem ipsum", "placeholder", "not implemented", "unimplemented!"]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

fn default_forbidden_paths() -> Vec<String> {
    [".env", ".env.local", "id_rsa", ".npmrc"]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            commands: default_commands(),
            placeholder_markers: default_placeholder_markers(),
            smoke_test_url: None,
            forbidden_paths: default_forbidden_paths(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".kriptik/reports.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,

    /// Number of days to retain logs
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

const fn default_retention_days() -> u32 {
    30
}

const fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
            retention_days: default_retention_days(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.orchestrator.max_concurrent_agents, 4);
        assert_eq!(config.orchestrator.phase_timeouts.parallel_build, 1800);
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.merge.conflict_policy, ConflictPolicy::Fail);
        assert!(config.verification.placeholder_markers.contains(&"TODO".to_string()));
        assert!(config.verification.smoke_test_url.is_none());
    }

    #[test]
    fn phase_timeout_lookup() {
        let timeouts = PhaseTimeouts::default();
        assert_eq!(
            timeouts.for_phase(BuildPhase::FunctionalTest),
            Some(Duration::from_secs(600))
        );
        assert_eq!(timeouts.for_phase(BuildPhase::Done), None);
        assert_eq!(timeouts.as_map().len(), 7);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = "orchestrator:\n  max_concurrent_agents: 8\nmerge:\n  conflict_policy: prefer_priority\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.orchestrator.max_concurrent_agents, 8);
        assert_eq!(config.orchestrator.cancel_grace_ms, 5000);
        assert_eq!(config.merge.conflict_policy, ConflictPolicy::PreferPriority);
        assert_eq!(config.database.max_connections, 5);
    }
}
