use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::HostContext;
use crate::label::is_bisect_version;

/// Boot-volume files belonging to one kernel release. Each is optional
/// because distributions and partial installs differ.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct KernelImages {
    pub image: Option<PathBuf>,
    pub initramfs: Option<PathBuf>,
    pub crash_dump_initramfs: Option<PathBuf>,
    pub system_map: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

/// One installed kernel, classified once at enumeration time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KernelArtifact {
    pub version: String,
    pub images: KernelImages,
    pub modules_dir: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub is_bisect_artifact: bool,
    pub is_currently_running: bool,
    pub is_protected: bool,
}

impl KernelArtifact {
    /// Build an artifact and derive its classification flags from `ctx`.
    #[must_use]
    pub fn classify(
        ctx: &HostContext,
        version: impl Into<String>,
        images: KernelImages,
        modules_dir: Option<PathBuf>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let version = version.into();
        let protection = ctx.protection();
        let is_protected = version == protection.safe_version
            || images
                .image
                .as_deref()
                .is_some_and(|image| protection.is_protected(image))
            || modules_dir
                .as_deref()
                .is_some_and(|dir| protection.is_protected(dir));

        Self {
            is_bisect_artifact: is_bisect_version(&version),
            is_currently_running: version == ctx.running_kernel(),
            is_protected,
            version,
            images,
            modules_dir,
            created_at,
        }
    }

    /// Eligible for bounded-retention eviction.
    #[must_use]
    pub const fn is_evictable(&self) -> bool {
        self.is_bisect_artifact && !self.is_protected && !self.is_currently_running
    }

    /// Every path that belongs to this artifact, image first, modules last.
    #[must_use]
    pub fn paths(&self) -> Vec<&Path> {
        [
            self.images.image.as_deref(),
            self.images.initramfs.as_deref(),
            self.images.crash_dump_initramfs.as_deref(),
            self.images.system_map.as_deref(),
            self.images.config.as_deref(),
            self.modules_dir.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ProtectionRecord;

    fn ctx() -> HostContext {
        let mut record = ProtectionRecord::new("5.14.0-host", "/boot/vmlinuz-5.14.0-host");
        record.protect("/boot/vmlinuz-5.14.0-host");
        record.protect("/lib/modules/5.14.0-host");
        HostContext::new("5.15.0-bisect-ccc3333", record, "/boot", "/lib/modules")
    }

    fn artifact(ctx: &HostContext, version: &str) -> KernelArtifact {
        KernelArtifact::classify(
            ctx,
            version,
            KernelImages {
                image: Some(ctx.boot_dir().join(format!("vmlinuz-{version}"))),
                ..KernelImages::default()
            },
            Some(ctx.modules_dir().join(version)),
            Utc::now(),
        )
    }

    #[test]
    fn protected_kernel_is_not_evictable() {
        let ctx = ctx();
        let host = artifact(&ctx, "5.14.0-host");
        assert!(host.is_protected);
        assert!(!host.is_bisect_artifact);
        assert!(!host.is_evictable());
    }

    #[test]
    fn running_bisect_kernel_is_not_evictable() {
        let ctx = ctx();
        let running = artifact(&ctx, "5.15.0-bisect-ccc3333");
        assert!(running.is_bisect_artifact);
        assert!(running.is_currently_running);
        assert!(!running.is_evictable());
    }

    #[test]
    fn idle_bisect_kernel_is_evictable() {
        let ctx = ctx();
        let idle = artifact(&ctx, "5.15.0-bisect-aaa1111");
        assert!(idle.is_evictable());
        assert_eq!(idle.paths().len(), 2);
    }
}
