use std::fmt;

use serde::{Deserialize, Serialize};

/// How the bootloader names the entry to boot once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum EntryIdentifier {
    /// Structured id from the kernel's boot-entry metadata (BLS `id`).
    BootEntryId(String),
    /// The kernel release string itself.
    KernelVersion(String),
}

impl EntryIdentifier {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::BootEntryId(id) | Self::KernelVersion(id) => id,
        }
    }
}

impl fmt::Display for EntryIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The bootloader's transient "boot this once" pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneTimeBootEntry {
    pub entry_identifier: EntryIdentifier,
    pub target_version: String,
}
