//! Cluster admission mode
//!
//! Exactly one mode is in force cluster-wide at any log position:
//! - disallow: every schema and data mutation is rejected
//! - strict: schema changes allowed, data only on defined attributes
//! - allow (unrestricted): everything, schema is defined on first use

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Cluster-wide admission mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterMode {
    /// Reject every schema and data mutation
    Disallow,
    /// Allow schema changes; data mutations only on defined attributes
    Strict,
    /// Allow everything, defining missing attributes implicitly
    #[serde(rename = "allow", alias = "unrestricted")]
    Unrestricted,
}

impl ClusterMode {
    /// Returns the canonical flag value for this mode
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterMode::Disallow => "disallow",
            ClusterMode::Strict => "strict",
            ClusterMode::Unrestricted => "allow",
        }
    }

    /// Whether Alter requests may proceed in this mode
    pub fn allows_schema_changes(&self) -> bool {
        !matches!(self, ClusterMode::Disallow)
    }

    /// Whether unknown attributes may be defined on first use
    pub fn allows_implicit_schema(&self) -> bool {
        matches!(self, ClusterMode::Unrestricted)
    }
}

impl Default for ClusterMode {
    fn default() -> Self {
        ClusterMode::Unrestricted
    }
}

impl fmt::Display for ClusterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ClusterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disallow" => Ok(ClusterMode::Disallow),
            "strict" => Ok(ClusterMode::Strict),
            "allow" | "unrestricted" => Ok(ClusterMode::Unrestricted),
            other => Err(format!(
                "unknown mutations mode '{}': expected disallow, strict or allow",
                other
            )),
        }
    }
}
