//! Safety error taxonomy.
//!
//! Every fatal outcome of the controller is one of these variants. Component
//! crates keep their own plumbing errors (`ExecError`, `BootError`, ...) and
//! convert into `SafetyError` at the point where the safety meaning is known.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// How far a fatal error propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorScope {
    /// No bisection iteration may proceed until an operator intervenes.
    Session,
    /// The current iteration is aborted; retrying the same commit is pointless.
    Iteration,
    /// The current commit is untestable; the bisection may move on.
    Recoverable,
}

/// Build step that failed, used in [`SafetyError::BuildFailed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStage {
    Configure,
    Compile,
    InstallModules,
    InstallKernel,
    KernelRelease,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configure => "configure",
            Self::Compile => "compile",
            Self::InstallModules => "modules_install",
            Self::InstallKernel => "install",
            Self::KernelRelease => "kernelrelease",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum SafetyError {
    /// The permanent fallback kernel could not be established or verified.
    #[error("protection setup failed: {0}")]
    ProtectionSetup(String),

    /// One or more protected paths no longer exist.
    #[error("protection violated: {} protected path(s) missing: {}", .missing.len(), join_paths(.missing))]
    ProtectionViolation { missing: Vec<PathBuf> },

    /// Headroom could not be reached even after emergency eviction.
    #[error(
        "insufficient space on {}: {free_mb} MB free, need more than {required_mb} MB",
        .volume.display()
    )]
    InsufficientSpace {
        volume: PathBuf,
        free_mb: u64,
        required_mb: u64,
    },

    #[error("checkout of {commit} failed: {reason}")]
    Checkout { commit: String, reason: String },

    #[error("build failed during {stage}: {reason}")]
    BuildFailed { stage: BuildStage, reason: String },

    /// The structured boot-entry id for a kernel could not be found.
    #[error("no boot entry id found for kernel {version}")]
    EntryResolution { version: String },

    /// The transient boot override did not read back as requested.
    #[error("one-time boot for {requested} not confirmed (bootloader reports {observed:?})")]
    OneTimeBootVerification {
        requested: String,
        observed: Option<String>,
    },

    #[error("no one-time boot primitive available on this host")]
    NoOneTimeBootSupport,

    #[error("protection record not found in {}; run `kbisect-host init` first", .0.display())]
    NotInitialized(PathBuf),

    #[error("operation cancelled")]
    Cancelled,

    #[error("io error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SafetyError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable machine-readable name for the error kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ProtectionSetup(_) => "protection_setup_error",
            Self::ProtectionViolation { .. } => "protection_violation_error",
            Self::InsufficientSpace { .. } => "insufficient_space_error",
            Self::Checkout { .. } => "checkout_error",
            Self::BuildFailed { .. } => "build_failed_error",
            Self::EntryResolution { .. } => "entry_resolution_error",
            Self::OneTimeBootVerification { .. } => "one_time_boot_verification_error",
            Self::NoOneTimeBootSupport => "no_one_time_boot_support_error",
            Self::NotInitialized(_) => "not_initialized",
            Self::Cancelled => "cancelled",
            Self::Io { .. } => "io_error",
            Self::Other(_) => "internal_error",
        }
    }

    #[must_use]
    pub const fn scope(&self) -> ErrorScope {
        match self {
            Self::ProtectionSetup(_)
            | Self::ProtectionViolation { .. }
            | Self::NotInitialized(_) => ErrorScope::Session,
            Self::Checkout { .. } | Self::BuildFailed { .. } => ErrorScope::Recoverable,
            Self::InsufficientSpace { .. }
            | Self::EntryResolution { .. }
            | Self::OneTimeBootVerification { .. }
            | Self::NoOneTimeBootSupport
            | Self::Cancelled
            | Self::Io { .. }
            | Self::Other(_) => ErrorScope::Iteration,
        }
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
