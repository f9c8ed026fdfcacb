//! Pinger configuration structures.

use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::monitor::{EngineSettings, GroupThresholds, Thresholds};

use super::validation::{ConfigError, expand_env_vars};

// =============================================================================
// Constants
// =============================================================================

/// Default per-round reply deadline (1 second).
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(1);

/// Default pause between rounds (5 seconds).
pub const DEFAULT_PAUSE: Duration = Duration::from_secs(5);

/// Default number of consecutive replies before a host is considered up.
pub const DEFAULT_ALIVE_COUNT: u32 = 3;

/// Default number of consecutive timeouts before a host is considered down.
pub const DEFAULT_DEAD_COUNT: u32 = 3;

fn default_wait_timeout() -> Duration {
    DEFAULT_WAIT_TIMEOUT
}

fn default_pause() -> Duration {
    DEFAULT_PAUSE
}

fn default_alive_count() -> u32 {
    DEFAULT_ALIVE_COUNT
}

fn default_dead_count() -> u32 {
    DEFAULT_DEAD_COUNT
}

// =============================================================================
// Actions
// =============================================================================

/// Shell commands run when the group verdict flips.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionsConfig {
    /// Command run once when the group becomes alive.
    pub on_alive: Option<String>,

    /// Command run once when the group becomes dead.
    pub on_dead: Option<String>,
}

// =============================================================================
// Pinger Configuration
// =============================================================================

/// Top-level pinger configuration.
///
/// Loaded once at startup and immutable afterwards. Command-line flags are
/// applied on top of the file before [`PingerConfig::validate`] runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingerConfig {
    /// Addresses to ping.
    #[serde(default)]
    pub targets: Vec<Ipv4Addr>,

    /// Per-round reply deadline (default: 1s).
    #[serde(default = "default_wait_timeout", with = "humantime_serde")]
    pub wait_timeout: Duration,

    /// Sleep between rounds (default: 5s).
    #[serde(default = "default_pause", with = "humantime_serde")]
    pub pause: Duration,

    /// Consecutive replies needed to mark a host up (default: 3).
    #[serde(default = "default_alive_count")]
    pub alive_count: u32,

    /// Consecutive timeouts needed to mark a host down (default: 3).
    #[serde(default = "default_dead_count")]
    pub dead_count: u32,

    /// Hosts that must be up for the group to become alive (default: all).
    #[serde(default)]
    pub group_alive: Option<usize>,

    /// The group becomes dead once the up count falls to this value (default: 0).
    #[serde(default)]
    pub group_dead: Option<usize>,

    /// ICMP echo identifier (default: random per process).
    #[serde(default)]
    pub identifier: Option<u16>,

    /// Verdict actions.
    #[serde(default)]
    pub actions: ActionsConfig,
}

impl Default for PingerConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            pause: DEFAULT_PAUSE,
            alive_count: DEFAULT_ALIVE_COUNT,
            dead_count: DEFAULT_DEAD_COUNT,
            group_alive: None,
            group_dead: None,
            identifier: None,
            actions: ActionsConfig::default(),
        }
    }
}

impl PingerConfig {
    /// Read and parse a YAML file without validating it.
    ///
    /// `${VAR}` / `${VAR:-default}` references are expanded before parsing.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse YAML text without validating it.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(&expand_env_vars(content))?)
    }

    /// Load and validate configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine_settings().map(|_| ())
    }

    /// Per-host hysteresis thresholds.
    pub fn host_thresholds(&self) -> Result<Thresholds, ConfigError> {
        Thresholds::new(self.alive_count, self.dead_count)
    }

    /// Group thresholds with defaults resolved against the target count.
    pub fn group_thresholds(&self) -> Result<GroupThresholds, ConfigError> {
        GroupThresholds::resolve(self.group_alive, self.group_dead, self.targets.len())
    }

    /// Validate and convert into the settings the engine runs with.
    pub fn engine_settings(&self) -> Result<EngineSettings, ConfigError> {
        EngineSettings::new(
            self.targets.clone(),
            self.wait_timeout,
            self.pause,
            self.host_thresholds()?,
            self.group_alive,
            self.group_dead,
        )
    }
}
