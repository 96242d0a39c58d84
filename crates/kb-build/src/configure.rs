//! Build configuration for a bisection kernel.
//!
//! The tree's `.config` is copied aside before anything touches it and put
//! back when the iteration ends, whether it succeeded or not.

use std::fs;
use std::path::{Path, PathBuf};

use kb_core::{BisectLabel, BuildStage, ConfigSource, SafetyError};
use kb_exec::{CancellationToken, CommandRunner, CommandSpec};

use crate::make::{Make, stage_error};

const BACKUP_NAME: &str = ".config.kbisect-backup";

/// Saved copy of the pre-build `.config`, if there was one.
#[derive(Debug)]
pub struct ConfigBackup {
    config: PathBuf,
    backup: Option<PathBuf>,
}

impl ConfigBackup {
    /// # Errors
    ///
    /// [`SafetyError::BuildFailed`] if the existing config cannot be copied.
    pub fn take(config: &Path) -> Result<Self, SafetyError> {
        let backup = if config.is_file() {
            let target = config.with_file_name(BACKUP_NAME);
            fs::copy(config, &target).map_err(|error| configure_error(config, &error))?;
            tracing::debug!(path = %target.display(), "backed up kernel config");
            Some(target)
        } else {
            None
        };
        Ok(Self {
            config: config.to_path_buf(),
            backup,
        })
    }

    #[must_use]
    pub const fn has_backup(&self) -> bool {
        self.backup.is_some()
    }

    /// Put the pre-build config back (or remove the new one if there was
    /// none) and drop the saved copy. Failures are logged, not returned.
    pub fn restore(self) {
        let result = match &self.backup {
            Some(backup) => fs::rename(backup, &self.config),
            None if self.config.exists() => fs::remove_file(&self.config),
            None => Ok(()),
        };
        match result {
            Ok(()) => tracing::info!(path = %self.config.display(), "restored pre-build kernel config"),
            Err(error) => tracing::warn!(
                path = %self.config.display(),
                %error,
                "could not restore pre-build kernel config"
            ),
        }
    }
}

/// Inputs for [`configure`].
pub struct ConfigureStep<'a> {
    pub root: &'a Path,
    pub arch: &'a str,
    pub label: &'a BisectLabel,
    pub source: &'a ConfigSource,
    /// Where `RUNNING` finds the live kernel's config.
    pub running_config: &'a Path,
    pub panic_timeout_secs: u32,
}

/// Seed `.config`, pin the version suffix, and resolve the option set
/// against the checked-out tree without prompting.
///
/// # Errors
///
/// [`SafetyError::BuildFailed`] with [`BuildStage::Configure`].
pub async fn configure(
    runner: &dyn CommandRunner,
    step: &ConfigureStep<'_>,
    cancel: &CancellationToken,
) -> Result<(), SafetyError> {
    let config = step.root.join(".config");
    seed(step, &config)?;

    let make = Make {
        root: step.root,
        arch: step.arch,
        label: step.label,
    };
    if !config.is_file() {
        tracing::warn!("no configuration baseline in tree; starting from defaults");
        make.run(runner, BuildStage::Configure, ["olddefconfig"], cancel).await?;
    }

    // The suffix comes from LOCALVERSION on the make command line only.
    let timeout = step.panic_timeout_secs.to_string();
    let spec = CommandSpec::new("scripts/config")
        .args(["--file", ".config"])
        .args(["--set-str", "LOCALVERSION", ""])
        .args(["--disable", "LOCALVERSION_AUTO"])
        .args(["--set-val", "PANIC_TIMEOUT", timeout.as_str()])
        .current_dir(step.root);
    tracing::info!(label = %step.label, command = %spec, "pinning version suffix");
    runner
        .run_checked(&spec, cancel)
        .await
        .map_err(|error| stage_error(BuildStage::Configure, error))?;

    make.run(runner, BuildStage::Configure, ["olddefconfig"], cancel).await?;
    tracing::info!(label = %step.label, "kernel configured");
    Ok(())
}

fn seed(step: &ConfigureStep<'_>, config: &Path) -> Result<(), SafetyError> {
    match step.source {
        ConfigSource::None => {
            tracing::info!("using the configuration already in the tree");
            Ok(())
        }
        ConfigSource::Running => {
            if step.running_config.is_file() {
                copy_config(step.running_config, config)
            } else {
                tracing::warn!(
                    path = %step.running_config.display(),
                    "running kernel config not found; keeping the tree's config"
                );
                Ok(())
            }
        }
        ConfigSource::File(path) => {
            if !path.is_file() {
                return Err(SafetyError::BuildFailed {
                    stage: BuildStage::Configure,
                    reason: format!("config file {} not found", path.display()),
                });
            }
            copy_config(path, config)
        }
    }
}

fn copy_config(from: &Path, to: &Path) -> Result<(), SafetyError> {
    fs::copy(from, to).map_err(|error| configure_error(from, &error))?;
    tracing::info!(source = %from.display(), "seeded kernel config");
    Ok(())
}

fn configure_error(path: &Path, error: &std::io::Error) -> SafetyError {
    SafetyError::BuildFailed {
        stage: BuildStage::Configure,
        reason: format!("{}: {error}", path.display()),
    }
}
