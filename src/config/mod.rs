mod watch;

pub use watch::watch_rules;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_STATUS_CODE: u16 = 301;
pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:8484";
pub const DEFAULT_METRICS_LISTEN_ADDRESS: &str = "0.0.0.0:8485";
pub const DEFAULT_CACHE_TTL: i64 = 86_400;
pub const DEFAULT_CACHE_CLEANUP_INTERVAL: u64 = 3_600;
pub const DEFAULT_STATUS_ON_MISS: u16 = 404;
/// Cache redirect responses downstream for one week unless a rule says otherwise.
pub const DEFAULT_CACHE_CONTROL_MAX_AGE: i64 = 86_400 * 7;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Redirect server listen address
    pub listen_address: String,
    /// Metrics server listen address
    pub metrics_server_listen_address: String,
    /// Location header emitted when no rule matches; empty disables the fallback
    pub location_on_miss: String,
    /// Status code emitted when no rule matches and no fallback is configured
    pub status_on_miss: u16,
    /// Parameter strategy applied to rules that don't declare one
    pub default_parameter_strategy: String,
    /// Server-wide Cache-Control max-age; -1 suppresses the header
    pub cache_control_max_age: i64,
    /// Response cache settings
    pub cache: CacheConfig,
    /// Redirect rules in declaration order
    pub rules: Vec<RawRule>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            metrics_server_listen_address: DEFAULT_METRICS_LISTEN_ADDRESS.to_string(),
            location_on_miss: String::new(),
            status_on_miss: DEFAULT_STATUS_ON_MISS,
            default_parameter_strategy: crate::rules::STRATEGY_COMBINE.to_string(),
            cache_control_max_age: DEFAULT_CACHE_CONTROL_MAX_AGE,
            cache: CacheConfig::default(),
            rules: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache entry lifetime in seconds
    pub ttl: i64,
    /// Seconds between eviction sweeps
    pub cleanup_interval: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CACHE_TTL,
            cleanup_interval: DEFAULT_CACHE_CLEANUP_INTERVAL,
        }
    }
}

/// A redirect rule as authored in the config file, before validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRule {
    /// Source directive: hostname plus optional path pattern, e.g. `example.com/blog/(?<slug>.+)`
    pub from: String,
    /// Target URL template; must carry a scheme and may reference capture groups
    pub to: String,
    /// Redirect status code; 0 means "use the server default"
    #[serde(default)]
    pub code: u16,
    /// Rule-level Cache-Control max-age; 0 inherits the server default, -1 suppresses the header
    #[serde(default)]
    pub cache_control_max_age: i64,
    /// Query parameter handling
    #[serde(default)]
    pub parameters: RuleParameters,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleParameters {
    /// One of `combine`, `replace`, or empty
    #[serde(default)]
    pub strategy: String,
    /// Parameters contributed by the rule; each key maps to an ordered value list
    #[serde(default)]
    pub values: HashMap<String, Vec<String>>,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Defaults applied by the rule compiler to fields a rule leaves unset
    pub fn rule_defaults(&self) -> crate::rules::RuleDefaults {
        crate::rules::RuleDefaults {
            code: DEFAULT_STATUS_CODE,
            strategy: self.default_parameter_strategy.clone(),
            cache_control_max_age: self.cache_control_max_age,
        }
    }
}
