//! # kb-config
//!
//! Layered configuration loading for kbisect using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`KBISECT_*` prefix, `__` as separator)
//! 2. An explicit file passed on the command line
//! 3. Host-level `/etc/kernel-bisect/config.toml`
//! 4. User-level `~/.config/kernel-bisect/config.toml`
//! 5. Built-in defaults
//!
//! CLI flags such as `--min-free-mb` are applied by the binary on top of the
//! loaded value.
//!
//! # Environment Variable Mapping
//!
//! Figment maps `KBISECT_POLICY__MIN_FREE_MB` -> `policy.min_free_mb`,
//! `KBISECT_PATHS__KERNEL_SRC` -> `paths.kernel_src`, etc.
//!
//! # Usage
//!
//! ```no_run
//! use kb_config::KbConfig;
//!
//! let config = KbConfig::load_with_dotenv(None).expect("config");
//! println!("keeping {} test kernels", config.policy.keep_count);
//! ```

mod build;
mod error;
mod paths;
mod policy;

pub use build::{BuildConfig, DEFAULT_INITRAMFS_MODULES, kernel_arch};
pub use error::ConfigError;
pub use paths::PathsConfig;
pub use policy::PolicyConfig;

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use kb_core::ConfigSource;
use serde::{Deserialize, Serialize};

/// Host-level configuration file.
pub const HOST_CONFIG_PATH: &str = "/etc/kernel-bisect/config.toml";

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct KbConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub build: BuildConfig,
}

impl KbConfig {
    /// Load configuration from defaults, TOML files, and environment
    /// variables, then validate it.
    ///
    /// Does NOT call `dotenvy` -- use [`KbConfig::load_with_dotenv`] for that.
    pub fn load(extra_file: Option<&Path>) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(extra_file).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration after reading a `.env` file from the current
    /// directory, if one exists.
    pub fn load_with_dotenv(extra_file: Option<&Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::load(extra_file)
    }

    /// Build the figment provider chain.
    ///
    /// This is public so tests can inspect the figment directly or add
    /// additional providers on top.
    pub fn figment(extra_file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Layer 1: User-level config
        if let Some(user_path) = Self::user_config_path() {
            if user_path.exists() {
                figment = figment.merge(Toml::file(user_path));
            }
        }

        // Layer 2: Host-level config
        let host_path = PathBuf::from(HOST_CONFIG_PATH);
        if host_path.exists() {
            figment = figment.merge(Toml::file(host_path));
        }

        // Layer 3: Explicit file from the command line
        if let Some(path) = extra_file {
            figment = figment.merge(Toml::file(path));
        }

        // Layer 4: Environment variables (highest priority)
        figment.merge(Env::prefixed("KBISECT_").split("__"))
    }

    /// The configured build baseline as a typed selector.
    #[must_use]
    pub fn config_source(&self) -> ConfigSource {
        self.build
            .config_source
            .parse()
            .unwrap_or(ConfigSource::None)
    }

    /// Reject values that would make every later step fail confusingly.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.paths.kernel_src.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "paths.kernel_src".into(),
                reason: "must not be empty".into(),
            });
        }
        if self.build.arch.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "build.arch".into(),
                reason: "must not be empty".into(),
            });
        }
        if self.build.panic_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "build.panic_timeout_secs".into(),
                reason: "0 disables the reboot-on-panic recovery".into(),
            });
        }
        Ok(())
    }

    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("kernel-bisect").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = KbConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.config_source(), ConfigSource::None);
    }

    #[test]
    fn zero_panic_timeout_is_rejected() {
        let mut config = KbConfig::default();
        config.build.panic_timeout_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "build.panic_timeout_secs"
        ));
    }

    #[test]
    fn running_selector_is_typed() {
        let mut config = KbConfig::default();
        config.build.config_source = "RUNNING".into();
        assert_eq!(config.config_source(), ConfigSource::Running);
    }
}
