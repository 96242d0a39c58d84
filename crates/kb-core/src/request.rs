//! Input shapes for one bisection iteration.

use std::convert::Infallible;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Where the build configuration baseline comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum ConfigSource {
    /// Keep whatever `.config` already exists in the tree.
    #[default]
    None,
    /// Copy the running kernel's configuration.
    Running,
    /// Copy the named configuration file.
    File(PathBuf),
}

impl FromStr for ConfigSource {
    type Err = Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        Ok(match value {
            "" | "none" | "NONE" => Self::None,
            "RUNNING" | "running" => Self::Running,
            path => Self::File(PathBuf::from(path)),
        })
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Running => f.write_str("RUNNING"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// One "build, protect, cleanup, arm" request handed in by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub commit: String,
    pub config_source: ConfigSource,
    pub min_free_mb: u64,
    pub keep_count: usize,
}
