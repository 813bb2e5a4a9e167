//! Cluster configuration
//!
//! Loaded from a JSON file. Every field has a default, so `{}` is a valid
//! single-shard cluster in unrestricted mode.
//!
//! ```json
//! {
//!   "shards": { "1": 3, "2": 3 },
//!   "limit": "mutations=strict;",
//!   "propose_timeout_ms": 5000,
//!   "route_timeout_ms": 2000,
//!   "route_attempts": 3
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mode::ClusterMode;
use crate::observability::Severity;
use crate::router::DEFAULT_DEDUP_CAPACITY;

/// Result type for configuration
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("invalid limit '{limit}': {reason}")]
    InvalidLimit { limit: String, reason: String },
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Io { .. } => "CONFIG_IO",
            ConfigError::Parse(_) => "CONFIG_PARSE",
            ConfigError::Invalid(_) => "CONFIG_INVALID",
            ConfigError::InvalidLimit { .. } => "CONFIG_INVALID_LIMIT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterConfig {
    /// Shard id -> number of replicas
    #[serde(default = "default_shards")]
    pub shards: BTreeMap<u32, usize>,

    /// Superflag string, e.g. `mutations=strict;`
    #[serde(default = "default_limit")]
    pub limit: String,

    /// Upper bound on waiting for a proposal to commit and apply
    #[serde(default = "default_propose_timeout_ms")]
    pub propose_timeout_ms: u64,

    /// Upper bound on one routed write attempt
    #[serde(default = "default_route_timeout_ms")]
    pub route_timeout_ms: u64,

    #[serde(default = "default_route_attempts")]
    pub route_attempts: u32,

    /// Request ids each shard remembers for dedup
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,

    /// trace, info, warn, error or fatal
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_shards() -> BTreeMap<u32, usize> {
    BTreeMap::from([(1, 1)])
}
fn default_limit() -> String {
    "mutations=allow;".to_string()
}
fn default_propose_timeout_ms() -> u64 {
    5000
}
fn default_route_timeout_ms() -> u64 {
    2000
}
fn default_route_attempts() -> u32 {
    3
}
fn default_dedup_capacity() -> usize {
    DEFAULT_DEDUP_CAPACITY
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            shards: default_shards(),
            limit: default_limit(),
            propose_timeout_ms: default_propose_timeout_ms(),
            route_timeout_ms: default_route_timeout_ms(),
            route_attempts: default_route_attempts(),
            dedup_capacity: default_dedup_capacity(),
            log_level: default_log_level(),
        }
    }
}

impl ClusterConfig {
    /// Read, parse and validate a config file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: ClusterConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// `count` shards with `replicas` replicas each, numbered from 1
    pub fn with_shards(mut self, count: u32, replicas: usize) -> Self {
        self.shards = (1..=count).map(|id| (id, replicas)).collect();
        self
    }

    pub fn with_mode(mut self, mode: ClusterMode) -> Self {
        self.limit = format!("mutations={};", mode.as_str());
        self
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.shards.is_empty() {
            return Err(ConfigError::Invalid("at least one shard is required".into()));
        }
        if let Some((id, _)) = self.shards.iter().find(|(_, replicas)| **replicas == 0) {
            return Err(ConfigError::Invalid(format!(
                "shard {} must have at least one replica",
                id
            )));
        }
        if self.shards.contains_key(&0) {
            return Err(ConfigError::Invalid("shard ids start at 1".into()));
        }
        if self.propose_timeout_ms == 0 {
            return Err(ConfigError::Invalid("propose_timeout_ms must be > 0".into()));
        }
        if self.route_timeout_ms == 0 {
            return Err(ConfigError::Invalid("route_timeout_ms must be > 0".into()));
        }
        if self.route_attempts == 0 {
            return Err(ConfigError::Invalid("route_attempts must be > 0".into()));
        }
        self.startup_mode()?;
        self.log_severity()?;
        Ok(())
    }

    /// Mode bootstrapped into the log when the cluster starts
    pub fn startup_mode(&self) -> ConfigResult<ClusterMode> {
        parse_limit(&self.limit)
    }

    pub fn log_severity(&self) -> ConfigResult<Severity> {
        match self.log_level.to_ascii_lowercase().as_str() {
            "trace" => Ok(Severity::Trace),
            "info" => Ok(Severity::Info),
            "warn" => Ok(Severity::Warn),
            "error" => Ok(Severity::Error),
            "fatal" => Ok(Severity::Fatal),
            other => Err(ConfigError::Invalid(format!("unknown log_level '{}'", other))),
        }
    }

    pub fn propose_timeout(&self) -> Duration {
        Duration::from_millis(self.propose_timeout_ms)
    }

    pub fn route_timeout(&self) -> Duration {
        Duration::from_millis(self.route_timeout_ms)
    }
}

/// Reads the `mutations` key of a limit superflag.
///
/// Keys are `;`-separated `key=value` pairs. Other keys are left to the
/// subsystems that own them; a missing `mutations` key means `allow`.
pub fn parse_limit(limit: &str) -> ConfigResult<ClusterMode> {
    let invalid = |reason: String| ConfigError::InvalidLimit {
        limit: limit.to_string(),
        reason,
    };

    let mut mode = ClusterMode::default();
    for pair in limit.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| invalid(format!("'{}' is not key=value", pair)))?;
        if key.trim().eq_ignore_ascii_case("mutations") {
            mode = value.trim().parse().map_err(invalid)?;
        }
    }
    Ok(mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = ClusterConfig::from_json("{}").unwrap();
        assert_eq!(config, ClusterConfig::default());
        assert_eq!(config.startup_mode().unwrap(), ClusterMode::Unrestricted);
        assert_eq!(config.propose_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit("mutations=strict;").unwrap(), ClusterMode::Strict);
        assert_eq!(parse_limit("mutations=disallow").unwrap(), ClusterMode::Disallow);
        assert_eq!(
            parse_limit("query-edge=1000; mutations=allow;").unwrap(),
            ClusterMode::Unrestricted
        );
        assert_eq!(parse_limit("").unwrap(), ClusterMode::Unrestricted);

        assert!(matches!(
            parse_limit("mutations=sometimes;"),
            Err(ConfigError::InvalidLimit { .. })
        ));
        assert!(parse_limit("mutations").is_err());
    }

    #[test]
    fn test_shard_keys_parse_from_json() {
        let config = ClusterConfig::from_json(r#"{"shards": {"1": 2, "2": 1}}"#).unwrap();
        assert_eq!(config.shards.get(&1), Some(&2));
        assert_eq!(config.shards.get(&2), Some(&1));
    }

    #[test]
    fn test_validation_failures() {
        let cases = [
            r#"{"shards": {}}"#,
            r#"{"shards": {"1": 0}}"#,
            r#"{"shards": {"0": 1}}"#,
            r#"{"propose_timeout_ms": 0}"#,
            r#"{"route_attempts": 0}"#,
            r#"{"limit": "mutations=maybe;"}"#,
            r#"{"log_level": "loud"}"#,
        ];
        for case in cases {
            assert!(ClusterConfig::from_json(case).is_err(), "{}", case);
        }
        assert_eq!(
            ClusterConfig::from_json(r#"{"unknown": 1}"#).unwrap_err().code(),
            "CONFIG_PARSE"
        );
    }

    #[test]
    fn test_builders() {
        let config = ClusterConfig::default()
            .with_shards(3, 2)
            .with_mode(ClusterMode::Strict);
        assert_eq!(config.shards.len(), 3);
        assert_eq!(config.startup_mode().unwrap(), ClusterMode::Strict);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster.json");
        fs::write(&path, r#"{"limit": "mutations=disallow;"}"#).unwrap();
        let config = ClusterConfig::load(&path).unwrap();
        assert_eq!(config.startup_mode().unwrap(), ClusterMode::Disallow);

        let missing = ClusterConfig::load(&dir.path().join("nope.json")).unwrap_err();
        assert_eq!(missing.code(), "CONFIG_IO");
    }
}
