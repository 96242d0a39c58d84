//! Bounded retention of bisection kernels.
//!
//! Two tiers: crash-dump images go unconditionally, then versioned
//! bisection kernels are trimmed oldest-first down to a keep count. Each
//! artifact is removed as an ordered list of sub-deletions whose results are
//! collected rather than aborting on the first failure. The protection
//! record is verified after every pass.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use kb_core::{HostContext, KernelArtifact, SafetyError};
use serde::Serialize;

use crate::inventory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    Image,
    Initramfs,
    CrashDumpInitramfs,
    SystemMap,
    Config,
    Modules,
}

impl PathKind {
    /// Failure of these sub-deletions leaves a bootable or loadable kernel
    /// behind, so the artifact counts as not removed.
    const fn is_essential(self) -> bool {
        matches!(self, Self::Image | Self::Modules)
    }
}

impl fmt::Display for PathKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Image => "image",
            Self::Initramfs => "initramfs",
            Self::CrashDumpInitramfs => "crash-dump initramfs",
            Self::SystemMap => "symbol map",
            Self::Config => "config",
            Self::Modules => "modules",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum StepStatus {
    Removed,
    /// Already gone before this pass.
    Absent,
    /// Lies under a protected path; left in place.
    SkippedProtected,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovalStep {
    pub kind: PathKind,
    pub path: PathBuf,
    #[serde(flatten)]
    pub status: StepStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalOutcome {
    Removed,
    /// Image and modules are gone but an auxiliary file could not be removed.
    Partial,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactRemoval {
    pub version: String,
    pub outcome: RemovalOutcome,
    pub steps: Vec<RemovalStep>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EvictionReport {
    pub keep_count: usize,
    /// Fully or partially removed artifacts.
    pub removed: Vec<ArtifactRemoval>,
    pub failed: Vec<ArtifactRemoval>,
    /// Eligible artifacts left in place by the keep count.
    pub kept: Vec<String>,
    /// Candidates passed over because they are protected, running, or not
    /// bisection builds.
    pub skipped: Vec<String>,
}

impl EvictionReport {
    #[must_use]
    pub fn removed_versions(&self) -> Vec<&str> {
        self.removed.iter().map(|r| r.version.as_str()).collect()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CrashDumpReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Eviction over the kernels described by one [`HostContext`].
pub struct RetentionManager<'a> {
    ctx: &'a HostContext,
}

impl<'a> RetentionManager<'a> {
    #[must_use]
    pub const fn new(ctx: &'a HostContext) -> Self {
        Self { ctx }
    }

    /// Remove the oldest eligible bisection kernels until at most
    /// `keep_count` remain.
    ///
    /// # Errors
    ///
    /// [`SafetyError::ProtectionViolation`] when a protected path is missing
    /// after the pass, whatever else happened. Individual deletion failures
    /// are reported in the [`EvictionReport`], not as errors.
    pub fn evict(&self, keep_count: usize) -> Result<EvictionReport, SafetyError> {
        let mut report = EvictionReport {
            keep_count,
            ..EvictionReport::default()
        };

        let mut eligible = Vec::new();
        for artifact in inventory::bisect_candidates(self.ctx)? {
            if artifact.is_evictable() {
                eligible.push(artifact);
            } else {
                tracing::debug!(
                    version = %artifact.version,
                    protected = artifact.is_protected,
                    running = artifact.is_currently_running,
                    bisect = artifact.is_bisect_artifact,
                    "not eligible for eviction"
                );
                report.skipped.push(artifact.version);
            }
        }

        let excess = eligible.len().saturating_sub(keep_count);
        let mut eligible = eligible.into_iter();
        for artifact in eligible.by_ref().take(excess) {
            let removal = self.remove_artifact(&artifact);
            match removal.outcome {
                RemovalOutcome::Removed | RemovalOutcome::Partial => report.removed.push(removal),
                RemovalOutcome::Failed => report.failed.push(removal),
            }
        }
        report.kept = eligible.map(|artifact| artifact.version).collect();

        tracing::info!(
            keep_count,
            removed = report.removed.len(),
            failed = report.failed.len(),
            kept = report.kept.len(),
            "eviction pass complete"
        );

        self.verify_after_pass()?;
        Ok(report)
    }

    /// Remove every crash-dump initramfs, the protected kernel's included.
    ///
    /// # Errors
    ///
    /// [`SafetyError::Io`] if the boot directory cannot be listed, or
    /// [`SafetyError::ProtectionViolation`] from the post-pass check.
    pub fn evict_crash_dump_artifacts(&self) -> Result<CrashDumpReport, SafetyError> {
        let mut report = CrashDumpReport::default();
        for path in inventory::crash_dump_images(self.ctx.boot_dir())? {
            match fs::remove_file(&path) {
                Ok(()) => {
                    tracing::info!(path = %path.display(), "removed crash-dump initramfs");
                    report.removed.push(path);
                }
                Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "could not remove crash-dump initramfs");
                    report.failed.push((path, error.to_string()));
                }
            }
        }
        self.verify_after_pass()?;
        Ok(report)
    }

    fn remove_artifact(&self, artifact: &KernelArtifact) -> ArtifactRemoval {
        let modules = artifact.modules_dir.clone().or_else(|| {
            Some(self.ctx.modules_dir().join(&artifact.version)).filter(|dir| dir.exists())
        });
        let planned = [
            (PathKind::Image, artifact.images.image.clone()),
            (PathKind::Initramfs, artifact.images.initramfs.clone()),
            (
                PathKind::CrashDumpInitramfs,
                artifact.images.crash_dump_initramfs.clone(),
            ),
            (PathKind::SystemMap, artifact.images.system_map.clone()),
            (PathKind::Config, artifact.images.config.clone()),
            (PathKind::Modules, modules),
        ];

        tracing::info!(version = %artifact.version, "evicting kernel");
        let steps: Vec<RemovalStep> = planned
            .into_iter()
            .filter_map(|(kind, path)| path.map(|path| (kind, path)))
            .map(|(kind, path)| {
                let status = self.remove_path(kind, &path);
                if let StepStatus::Failed(reason) = &status {
                    tracing::warn!(
                        version = %artifact.version,
                        %kind,
                        path = %path.display(),
                        reason = %reason,
                        "sub-deletion failed"
                    );
                }
                RemovalStep { kind, path, status }
            })
            .collect();

        ArtifactRemoval {
            version: artifact.version.clone(),
            outcome: outcome_of(&steps),
            steps,
        }
    }

    fn remove_path(&self, kind: PathKind, path: &Path) -> StepStatus {
        if self.ctx.protection().is_protected(path) {
            tracing::error!(path = %path.display(), "refusing to delete protected path");
            return StepStatus::SkippedProtected;
        }
        let result = if kind == PathKind::Modules {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        match result {
            Ok(()) => StepStatus::Removed,
            Err(error) if error.kind() == io::ErrorKind::NotFound => StepStatus::Absent,
            Err(error) => StepStatus::Failed(error.to_string()),
        }
    }

    fn verify_after_pass(&self) -> Result<(), SafetyError> {
        self.ctx.protection().verify().inspect_err(|error| {
            tracing::error!(%error, "protection check failed after eviction");
        })
    }
}

fn outcome_of(steps: &[RemovalStep]) -> RemovalOutcome {
    let mut partial = false;
    for step in steps {
        let failed = matches!(
            step.status,
            StepStatus::Failed(_) | StepStatus::SkippedProtected
        );
        if failed && step.kind.is_essential() {
            return RemovalOutcome::Failed;
        }
        partial |= failed;
    }
    if partial {
        RemovalOutcome::Partial
    } else {
        RemovalOutcome::Removed
    }
}
