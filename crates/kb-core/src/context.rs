//! Explicit host context.

use std::path::{Path, PathBuf};

use crate::entities::ProtectionRecord;

/// Kernel release of the running system, as reported by procfs.
pub const OSRELEASE_PATH: &str = "/proc/sys/kernel/osrelease";

/// Facts about the host, captured once at session start and read-only after.
///
/// Components receive this instead of querying ambient machine state, so
/// tests can fabricate a host with temporary directories.
#[derive(Debug, Clone)]
pub struct HostContext {
    running_kernel: String,
    protection: ProtectionRecord,
    boot_dir: PathBuf,
    modules_dir: PathBuf,
}

impl HostContext {
    #[must_use]
    pub fn new(
        running_kernel: impl Into<String>,
        protection: ProtectionRecord,
        boot_dir: impl Into<PathBuf>,
        modules_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            running_kernel: running_kernel.into(),
            protection,
            boot_dir: boot_dir.into(),
            modules_dir: modules_dir.into(),
        }
    }

    #[must_use]
    pub fn running_kernel(&self) -> &str {
        &self.running_kernel
    }

    #[must_use]
    pub const fn protection(&self) -> &ProtectionRecord {
        &self.protection
    }

    #[must_use]
    pub fn boot_dir(&self) -> &Path {
        &self.boot_dir
    }

    #[must_use]
    pub fn modules_dir(&self) -> &Path {
        &self.modules_dir
    }
}

/// Read the running kernel release.
///
/// # Errors
///
/// Returns the underlying I/O error if procfs is unavailable.
pub fn read_running_release() -> std::io::Result<String> {
    std::fs::read_to_string(OSRELEASE_PATH).map(|release| release.trim().to_string())
}
