use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::SafetyError;

/// The single kernel that must never be removed and must stay the
/// bootloader's persistent default.
///
/// `protected_paths` is an ordered set that only grows: there is no API to
/// remove an entry once it has been recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProtectionRecord {
    pub safe_version: String,
    pub safe_image_path: PathBuf,
    pub locked_at: DateTime<Utc>,
    protected_paths: Vec<PathBuf>,
}

impl ProtectionRecord {
    #[must_use]
    pub fn new(safe_version: impl Into<String>, safe_image_path: impl Into<PathBuf>) -> Self {
        Self::with_lock_time(safe_version, safe_image_path, Utc::now())
    }

    #[must_use]
    pub fn with_lock_time(
        safe_version: impl Into<String>,
        safe_image_path: impl Into<PathBuf>,
        locked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            safe_version: safe_version.into(),
            safe_image_path: safe_image_path.into(),
            locked_at,
            protected_paths: Vec::new(),
        }
    }

    /// Record `path` as protected. Returns `false` if it was already present.
    pub fn protect(&mut self, path: impl AsRef<Path>) -> bool {
        let path = normalize(path.as_ref());
        if self.protected_paths.contains(&path) {
            return false;
        }
        self.protected_paths.push(path);
        true
    }

    #[must_use]
    pub fn protected_paths(&self) -> &[PathBuf] {
        &self.protected_paths
    }

    /// Whether `path` equals a protected path or lies beneath a protected
    /// directory. Purely lexical: `path` need not exist.
    #[must_use]
    pub fn is_protected(&self, path: &Path) -> bool {
        let candidate = normalize(path);
        self.protected_paths
            .iter()
            .any(|protected| candidate.starts_with(protected))
    }

    /// Protected paths that no longer resolve to a filesystem entry.
    #[must_use]
    pub fn missing_paths(&self) -> Vec<PathBuf> {
        self.protected_paths
            .iter()
            .filter(|path| std::fs::symlink_metadata(path).is_err())
            .cloned()
            .collect()
    }

    /// # Errors
    ///
    /// Returns [`SafetyError::ProtectionViolation`] listing every protected
    /// path that has vanished.
    pub fn verify(&self) -> Result<(), SafetyError> {
        let missing = self.missing_paths();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SafetyError::ProtectionViolation { missing })
        }
    }
}

/// Drop `.` components and trailing separators so `/lib/modules/v/` and
/// `/lib/modules/v` compare equal.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}
