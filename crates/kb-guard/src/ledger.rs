//! Persistent protection record.
//!
//! Layout under the state directory:
//!
//! ```text
//! <state_dir>/
//!   protection.json          # the full ProtectionRecord
//!   protected-kernels.list   # one protected path per line
//! ```
//!
//! Both files are mode 0600 and are rewritten atomically through a
//! temporary sibling.

use std::fs;
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use kb_boot::Bootloader;
use kb_boot::sticky::{StickyDefault, ensure_saved_default};
use kb_core::label::is_bisect_version;
use kb_core::{ProtectionRecord, SafetyError};
use kb_exec::CancellationToken;

use crate::inventory;

pub const RECORD_FILE: &str = "protection.json";
pub const PATHS_FILE: &str = "protected-kernels.list";

const FILE_MODE: u32 = 0o600;
const DIR_MODE: u32 = 0o700;

/// Inputs for establishing protection of the running kernel.
pub struct ProtectionSetup<'a> {
    pub running_kernel: &'a str,
    pub boot_dir: &'a Path,
    pub modules_dir: &'a Path,
    pub loader_entries_dir: &'a Path,
    /// The bootloader defaults file (`/etc/default/grub`).
    pub grub_defaults: &'a Path,
    pub bootloader: Option<&'a dyn Bootloader>,
    /// Replace a record that protects a different kernel.
    pub force: bool,
}

#[derive(Debug, Clone)]
pub struct ProtectionLedger {
    state_dir: PathBuf,
}

impl ProtectionLedger {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    #[must_use]
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    #[must_use]
    pub fn record_path(&self) -> PathBuf {
        self.state_dir.join(RECORD_FILE)
    }

    #[must_use]
    pub fn paths_file(&self) -> PathBuf {
        self.state_dir.join(PATHS_FILE)
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.record_path().is_file()
    }

    /// # Errors
    ///
    /// [`SafetyError::NotInitialized`] when no record has been written yet,
    /// [`SafetyError::ProtectionSetup`] when the record is unreadable.
    pub fn load(&self) -> Result<ProtectionRecord, SafetyError> {
        let path = self.record_path();
        if !path.is_file() {
            return Err(SafetyError::NotInitialized(self.state_dir.clone()));
        }
        let raw = fs::read_to_string(&path).map_err(|error| SafetyError::io(&path, error))?;
        serde_json::from_str(&raw).map_err(|error| {
            SafetyError::ProtectionSetup(format!("corrupt record {}: {error}", path.display()))
        })
    }

    /// Write the record and path list.
    ///
    /// # Errors
    ///
    /// Returns [`SafetyError::Io`] on any filesystem failure.
    pub fn persist(&self, record: &ProtectionRecord) -> Result<(), SafetyError> {
        fs::create_dir_all(&self.state_dir)
            .and_then(|()| {
                fs::set_permissions(&self.state_dir, fs::Permissions::from_mode(DIR_MODE))
            })
            .map_err(|error| SafetyError::io(&self.state_dir, error))?;

        let json = serde_json::to_string_pretty(record)
            .map_err(|error| SafetyError::Other(error.into()))?;
        write_private(&self.record_path(), json.as_bytes())?;

        let mut list = String::new();
        for path in record.protected_paths() {
            list.push_str(&path.to_string_lossy());
            list.push('\n');
        }
        write_private(&self.paths_file(), list.as_bytes())?;

        tracing::debug!(
            state_dir = %self.state_dir.display(),
            paths = record.protected_paths().len(),
            "persisted protection record"
        );
        Ok(())
    }

    /// Record the running kernel as the protected fallback and make it the
    /// persistent boot default.
    ///
    /// Re-running against the same kernel only adds paths. Every failure
    /// is reported as [`SafetyError::ProtectionSetup`].
    ///
    /// # Errors
    ///
    /// See above; cancellation surfaces as [`SafetyError::Cancelled`].
    pub async fn init_protection(
        &self,
        setup: &ProtectionSetup<'_>,
        cancel: &CancellationToken,
    ) -> Result<ProtectionRecord, SafetyError> {
        let version = setup.running_kernel;
        if version.is_empty() {
            return Err(SafetyError::ProtectionSetup(
                "running kernel release is unknown".into(),
            ));
        }
        if is_bisect_version(version) {
            return Err(SafetyError::ProtectionSetup(format!(
                "running kernel {version} is a bisection build; boot a stable kernel first"
            )));
        }

        let image = setup.boot_dir.join(format!("vmlinuz-{version}"));
        if !image.is_file() {
            return Err(SafetyError::ProtectionSetup(format!(
                "running kernel image {} not found",
                image.display()
            )));
        }

        let mut record = match self.load() {
            Ok(existing) if existing.safe_version == version => existing,
            Ok(existing) if !setup.force => {
                return Err(SafetyError::ProtectionSetup(format!(
                    "host already protects {}; pass --force to protect {version} instead",
                    existing.safe_version
                )));
            }
            Ok(_) | Err(SafetyError::NotInitialized(_)) => ProtectionRecord::new(version, &image),
            Err(error) => return Err(error),
        };

        let boot_files = inventory::boot_files_for(setup.boot_dir, version)
            .map_err(|error| SafetyError::ProtectionSetup(error.to_string()))?;
        for path in boot_files {
            record.protect(path);
        }
        let modules = setup.modules_dir.join(version);
        if modules.is_dir() {
            record.protect(modules);
        } else {
            tracing::warn!(path = %modules.display(), "running kernel has no modules directory");
        }
        for entry in loader_entries_for(setup.loader_entries_dir, version) {
            record.protect(entry);
        }

        let Some(bootloader) = setup.bootloader else {
            return Err(SafetyError::ProtectionSetup(
                "no supported bootloader found; cannot set the persistent default".into(),
            ));
        };

        match ensure_saved_default(setup.grub_defaults) {
            Ok(StickyDefault::AlreadySaved) => {}
            Ok(StickyDefault::Amended) => {
                tracing::info!(
                    file = %setup.grub_defaults.display(),
                    "enabled saved default mode; regenerating bootloader configuration"
                );
                bootloader
                    .regenerate_config(cancel)
                    .await
                    .map_err(|error| setup_error(cancel, error.into()))?;
            }
            Ok(StickyDefault::MissingFile) => tracing::warn!(
                file = %setup.grub_defaults.display(),
                "bootloader defaults file not found; one-time boots may not revert"
            ),
            Err(error) => {
                return Err(SafetyError::ProtectionSetup(format!(
                    "cannot update {}: {error}",
                    setup.grub_defaults.display()
                )));
            }
        }

        ensure_persistent_default(&record, bootloader, cancel).await?;
        record.verify().map_err(|error| SafetyError::ProtectionSetup(error.to_string()))?;
        self.persist(&record)
            .map_err(|error| SafetyError::ProtectionSetup(error.to_string()))?;

        tracing::info!(
            version,
            paths = record.protected_paths().len(),
            "protected kernel recorded"
        );
        Ok(record)
    }
}

/// Set the protected kernel as persistent default and confirm it reads back.
///
/// # Errors
///
/// [`SafetyError::ProtectionSetup`] when the bootloader rejects the change
/// or reports another default afterwards.
pub async fn ensure_persistent_default(
    record: &ProtectionRecord,
    bootloader: &dyn Bootloader,
    cancel: &CancellationToken,
) -> Result<(), SafetyError> {
    let version = record.safe_version.as_str();
    let image = record.safe_image_path.as_path();

    bootloader
        .set_persistent_default(version, image, cancel)
        .await
        .map_err(|error| setup_error(cancel, error.into()))?;

    let reported = bootloader
        .persistent_default(cancel)
        .await
        .map_err(|error| setup_error(cancel, error.into()))?;

    match reported {
        Some(reported) if bootloader.default_designates(&reported, version, image) => {
            tracing::debug!(version, reported = %reported, "persistent default confirmed");
            Ok(())
        }
        other => Err(SafetyError::ProtectionSetup(format!(
            "persistent default reads back as {other:?}, expected {version}"
        ))),
    }
}

fn setup_error(cancel: &CancellationToken, error: SafetyError) -> SafetyError {
    if cancel.is_cancelled() || matches!(error, SafetyError::Cancelled) {
        SafetyError::Cancelled
    } else {
        SafetyError::ProtectionSetup(error.to_string())
    }
}

fn loader_entries_for(dir: &Path, version: &str) -> Vec<PathBuf> {
    let suffix = format!("-{version}.conf");
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(&suffix))
        })
        .collect()
}

fn write_private(path: &Path, contents: &[u8]) -> Result<(), SafetyError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let write = || -> std::io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(FILE_MODE)
            .open(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::set_permissions(&tmp, fs::Permissions::from_mode(FILE_MODE))?;
        fs::rename(&tmp, path)
    };
    write().map_err(|error| SafetyError::io(path, error))
}
