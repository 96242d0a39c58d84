//! Host filesystem locations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_boot_dir() -> PathBuf {
    PathBuf::from("/boot")
}

fn default_modules_dir() -> PathBuf {
    PathBuf::from("/lib/modules")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/lib/kernel-bisect")
}

fn default_kernel_src() -> PathBuf {
    PathBuf::from("/root/kernel")
}

fn default_grub_defaults() -> PathBuf {
    PathBuf::from("/etc/default/grub")
}

fn default_loader_entries_dir() -> PathBuf {
    PathBuf::from("/boot/loader/entries")
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PathsConfig {
    /// Boot volume holding kernel images and initramfs files.
    #[serde(default = "default_boot_dir")]
    pub boot_dir: PathBuf,

    #[serde(default = "default_modules_dir")]
    pub modules_dir: PathBuf,

    /// Where the protection record and the host lock live.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Kernel source tree (a git work tree).
    #[serde(default = "default_kernel_src")]
    pub kernel_src: PathBuf,

    /// Bootloader defaults file carrying `GRUB_DEFAULT`.
    #[serde(default = "default_grub_defaults")]
    pub grub_defaults: PathBuf,

    /// BLS entry directory, consulted when `grubby` gives no id.
    #[serde(default = "default_loader_entries_dir")]
    pub loader_entries_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            boot_dir: default_boot_dir(),
            modules_dir: default_modules_dir(),
            state_dir: default_state_dir(),
            kernel_src: default_kernel_src(),
            grub_defaults: default_grub_defaults(),
            loader_entries_dir: default_loader_entries_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_standard_locations() {
        let config = PathsConfig::default();
        assert_eq!(config.boot_dir, PathBuf::from("/boot"));
        assert_eq!(config.state_dir, PathBuf::from("/var/lib/kernel-bisect"));
        assert_eq!(config.grub_defaults, PathBuf::from("/etc/default/grub"));
    }
}
