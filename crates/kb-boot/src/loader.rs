use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use kb_core::EntryIdentifier;
use kb_exec::CancellationToken;

use crate::error::BootError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootFamily {
    /// Boot Loader Specification entries managed by `grubby`.
    Bls,
    /// Classic GRUB menu entries selected by kernel release.
    Grub,
}

impl BootFamily {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bls => "bls",
            Self::Grub => "grub",
        }
    }
}

impl fmt::Display for BootFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The bootloader control surface the controller relies on.
///
/// Implementations only translate each operation into the family's tools;
/// sequencing and verification live in the callers.
#[async_trait]
pub trait Bootloader: Send + Sync {
    fn family(&self) -> BootFamily;

    /// Identifier the one-time boot primitive expects for `version`.
    async fn resolve_entry(
        &self,
        version: &str,
        image: &Path,
        cancel: &CancellationToken,
    ) -> Result<EntryIdentifier, BootError>;

    /// Make only the next boot use `entry`.
    async fn arm_once(
        &self,
        entry: &EntryIdentifier,
        cancel: &CancellationToken,
    ) -> Result<(), BootError>;

    /// Current transient override, `None` when nothing is armed.
    async fn one_time_state(&self, cancel: &CancellationToken)
    -> Result<Option<String>, BootError>;

    async fn clear_one_time(&self, cancel: &CancellationToken) -> Result<(), BootError>;

    async fn set_persistent_default(
        &self,
        version: &str,
        image: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), BootError>;

    /// Persistent default as the bootloader reports it.
    async fn persistent_default(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, BootError>;

    /// Whether a value returned by [`Bootloader::persistent_default`]
    /// designates the kernel `version` installed at `image`.
    fn default_designates(&self, reported: &str, version: &str, image: &Path) -> bool;

    async fn regenerate_config(&self, cancel: &CancellationToken) -> Result<(), BootError>;

    /// Append kernel command-line arguments to one installed kernel only.
    async fn add_kernel_args(
        &self,
        version: &str,
        image: &Path,
        args: &str,
        cancel: &CancellationToken,
    ) -> Result<(), BootError>;
}
