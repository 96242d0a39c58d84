//! Kernel build settings.

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// Drivers forced into the initramfs so the host stays reachable after
/// booting a test kernel: block storage first, then network.
pub const DEFAULT_INITRAMFS_MODULES: &[&str] = &[
    "virtio_blk",
    "virtio_scsi",
    "virtio_net",
    "nvme",
    "ahci",
    "sd_mod",
    "e1000",
    "e1000e",
    "igb",
    "ixgbe",
];

fn default_arch() -> String {
    kernel_arch(std::env::consts::ARCH).to_string()
}

fn default_initramfs_modules() -> Vec<String> {
    DEFAULT_INITRAMFS_MODULES
        .iter()
        .map(ToString::to_string)
        .collect()
}

const fn default_panic_timeout_secs() -> u32 {
    10
}

/// Map a Rust target architecture name to the kernel's `ARCH=` value.
#[must_use]
pub fn kernel_arch(rust_arch: &str) -> &str {
    match rust_arch {
        "aarch64" => "arm64",
        "arm" => "arm",
        "riscv64" => "riscv",
        "powerpc64" | "powerpc" => "powerpc",
        "s390x" => "s390",
        "loongarch64" => "loongarch",
        other => other,
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct BuildConfig {
    /// Kernel `ARCH=` selector.
    #[serde(default = "default_arch")]
    pub arch: String,

    /// Parallel make jobs; 0 means all available cores.
    #[serde(default)]
    pub jobs: usize,

    /// Configuration baseline: empty, `RUNNING`, or a file path.
    #[serde(default)]
    pub config_source: String,

    /// Install build prerequisites through the host package manager first.
    #[serde(default)]
    pub install_deps: bool,

    #[serde(default = "default_initramfs_modules")]
    pub initramfs_modules: Vec<String>,

    /// Seconds before a panicking test kernel reboots itself.
    #[serde(default = "default_panic_timeout_secs")]
    pub panic_timeout_secs: u32,
}

impl BuildConfig {
    #[must_use]
    pub fn effective_jobs(&self) -> usize {
        if self.jobs > 0 {
            return self.jobs;
        }
        std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            arch: default_arch(),
            jobs: 0,
            config_source: String::new(),
            install_deps: false,
            initramfs_modules: default_initramfs_modules(),
            panic_timeout_secs: default_panic_timeout_secs(),
        }
    }
}
