//! Configuration options.
//!
//! The engine is configured by the surrounding transformer, typically from a
//! TOML file whose path arrives on the command line. Both timing knobs are
//! deliberately configurable: production runs use the defaults, tests shrink
//! them to keep time-based behavior observable in milliseconds.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Loads a configuration file from `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> FlowTrackConfig {
    let config_str = fs::read_to_string(path).expect("ERROR: File read failed");
    let config: FlowTrackConfig = toml::from_str(&config_str).expect("Invalid config file");
    if let Err(err) = config.validate() {
        log::error!("Invalid flow tracking configuration: {:#?}", config);
        panic!("{}", err);
    }
    config
}

/// Returns the default configuration: 10 second tracking deadline, 10 minute
/// carrier deadline, debug stream off.
pub fn default_config() -> FlowTrackConfig {
    FlowTrackConfig::default()
}

/* --------------------------------------------------------------------------------- */

/// Runtime options for the flow serialization core.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct FlowTrackConfig {
    /// Time (in milliseconds) a tracked request waits for its response before
    /// the unblocker releases its latch token. Defaults to `10_000`.
    #[serde(default = "default_tracking_deadline_ms")]
    pub tracking_deadline_ms: u64,

    /// Time (in milliseconds) before an idle carrier is evicted; also the
    /// reaper sweep period. Defaults to `600_000`.
    #[serde(default = "default_carrier_deadline_ms")]
    pub carrier_deadline_ms: u64,

    /// Emit one JSON record per state transition to the standard error
    /// stream. Defaults to `false`.
    #[serde(default = "default_debug")]
    pub debug: bool,
}

impl FlowTrackConfig {
    /// Deadline after which an unanswered request stops gating termination.
    pub fn tracking_deadline(&self) -> Duration {
        Duration::from_millis(self.tracking_deadline_ms)
    }

    /// Idle time after which a carrier is reclaimed.
    pub fn carrier_deadline(&self) -> Duration {
        Duration::from_millis(self.carrier_deadline_ms)
    }

    /// Rejects configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tracking_deadline_ms == 0 {
            return Err(ConfigError::ZeroDeadline("tracking_deadline_ms"));
        }
        if self.carrier_deadline_ms == 0 {
            return Err(ConfigError::ZeroDeadline("carrier_deadline_ms"));
        }
        if self.tracking_deadline_ms >= self.carrier_deadline_ms {
            return Err(ConfigError::DeadlineOrder);
        }
        Ok(())
    }
}

impl Default for FlowTrackConfig {
    fn default() -> Self {
        FlowTrackConfig {
            tracking_deadline_ms: default_tracking_deadline_ms(),
            carrier_deadline_ms: default_carrier_deadline_ms(),
            debug: default_debug(),
        }
    }
}

/// Invalid configuration values.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be non-zero")]
    ZeroDeadline(&'static str),
    #[error("tracking_deadline_ms must be shorter than carrier_deadline_ms")]
    DeadlineOrder,
}

fn default_tracking_deadline_ms() -> u64 {
    10_000
}

fn default_carrier_deadline_ms() -> u64 {
    600_000
}

fn default_debug() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = default_config();
        assert_eq!(config.tracking_deadline(), Duration::from_secs(10));
        assert_eq!(config.carrier_deadline(), Duration::from_secs(600));
        assert!(!config.debug);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: FlowTrackConfig = toml::from_str("debug = true").unwrap();
        assert!(config.debug);
        assert_eq!(config.tracking_deadline_ms, 10_000);
        assert_eq!(config.carrier_deadline_ms, 600_000);
    }

    #[test]
    fn rejects_inverted_deadlines() {
        let config = FlowTrackConfig {
            tracking_deadline_ms: 1_000,
            carrier_deadline_ms: 500,
            debug: false,
        };
        assert!(config.validate().is_err());

        let config = FlowTrackConfig {
            tracking_deadline_ms: 0,
            carrier_deadline_ms: 500,
            debug: false,
        };
        assert!(config.validate().is_err());
    }
}
