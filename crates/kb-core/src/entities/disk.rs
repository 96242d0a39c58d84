use serde::{Deserialize, Serialize};

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Point-in-time measurement of the boot volume.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiskSpaceSample {
    pub free_mb: u64,
    pub total_mb: u64,
    pub used_mb: u64,
}

impl DiskSpaceSample {
    #[must_use]
    pub const fn from_bytes(available: u64, total: u64) -> Self {
        let free_mb = available / BYTES_PER_MB;
        let total_mb = total / BYTES_PER_MB;
        Self {
            free_mb,
            total_mb,
            used_mb: total_mb.saturating_sub(free_mb),
        }
    }

    /// Strictly more than `min_free_mb` is free; equality is not enough.
    #[must_use]
    pub const fn has_headroom(&self, min_free_mb: u64) -> bool {
        self.free_mb > min_free_mb
    }
}
