//! Disk space governor for the boot volume.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use kb_core::{DiskSpaceSample, SafetyError};

/// Source of free/total space figures.
pub trait SpaceProbe: Send + Sync {
    fn sample(&self, volume: &Path) -> std::io::Result<DiskSpaceSample>;
}

/// Reads the filesystem's real statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSpaceProbe;

impl SpaceProbe for FsSpaceProbe {
    fn sample(&self, volume: &Path) -> std::io::Result<DiskSpaceSample> {
        let available = fs2::available_space(volume)?;
        let total = fs2::total_space(volume)?;
        Ok(DiskSpaceSample::from_bytes(available, total))
    }
}

/// Pure measurement; every call samples again so deletions are reflected.
#[derive(Clone)]
pub struct DiskGovernor {
    volume: PathBuf,
    probe: Arc<dyn SpaceProbe>,
}

impl DiskGovernor {
    pub fn new(volume: impl Into<PathBuf>, probe: Arc<dyn SpaceProbe>) -> Self {
        Self {
            volume: volume.into(),
            probe,
        }
    }

    #[must_use]
    pub fn volume(&self) -> &Path {
        &self.volume
    }

    pub fn sample(&self) -> Result<DiskSpaceSample, SafetyError> {
        let sample = self
            .probe
            .sample(&self.volume)
            .map_err(|error| SafetyError::io(&self.volume, error))?;
        tracing::debug!(
            volume = %self.volume.display(),
            free_mb = sample.free_mb,
            total_mb = sample.total_mb,
            "sampled boot volume"
        );
        Ok(sample)
    }

    /// Strictly more than `min_free_mb` is free.
    pub fn has_headroom(&self, min_free_mb: u64) -> Result<bool, SafetyError> {
        Ok(self.sample()?.has_headroom(min_free_mb))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_probe_reports_a_plausible_sample() {
        let dir = tempfile::tempdir().expect("tempdir");
        let governor = DiskGovernor::new(dir.path(), Arc::new(FsSpaceProbe));
        let sample = governor.sample().expect("sample");
        assert!(sample.total_mb >= sample.free_mb);
        assert_eq!(sample.used_mb, sample.total_mb - sample.free_mb);
        assert!(governor.has_headroom(0).expect("headroom") || sample.free_mb == 0);
    }

    #[test]
    fn missing_volume_is_an_io_error() {
        let governor = DiskGovernor::new("/definitely/not/mounted", Arc::new(FsSpaceProbe));
        assert!(matches!(governor.sample(), Err(SafetyError::Io { .. })));
    }
}
