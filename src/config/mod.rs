//! Configuration module for the pinger.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Probe targets and timing (reply deadline, pause between rounds)
//! - Per-host and group hysteresis thresholds
//! - Shell actions run on group verdict changes

mod app;
mod validation;

pub use app::{ActionsConfig, PingerConfig};
pub use validation::{ConfigError, expand_env_vars, parse_duration};

// Re-export constants
pub use app::{DEFAULT_ALIVE_COUNT, DEFAULT_DEAD_COUNT, DEFAULT_PAUSE, DEFAULT_WAIT_TIMEOUT};
