//! Enumeration of installed kernels on the boot volume.
//!
//! Every `vmlinuz-<version>` in the boot directory becomes one
//! [`KernelArtifact`]; the sibling files and the modules tree are attached
//! when present. Bisection versions whose image is already gone but which
//! still own a modules tree or boot files are listed too, with no image,
//! so an interrupted removal is retried by the next pass.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use globset::{Glob, GlobMatcher};
use kb_core::label::{BISECT_CANDIDATE_GLOB, is_bisect_version};
use kb_core::{HostContext, KernelArtifact, KernelImages, SafetyError};

const IMAGE_PREFIX: &str = "vmlinuz-";
const CRASH_DUMP_GLOB: &str = "initramfs-*kdump.img";

/// `(prefix, suffix)` of the boot files that name a kernel version.
const AUXILIARY_NAMES: [(&str, &str); 5] = [
    ("initramfs-", "kdump.img"),
    ("initramfs-", ".img"),
    ("initrd.img-", ""),
    ("System.map-", ""),
    ("config-", ""),
];

/// All installed kernels, oldest image first. Ties are broken by version.
///
/// # Errors
///
/// Returns [`SafetyError::Io`] if the boot directory cannot be read.
pub fn enumerate(ctx: &HostContext) -> Result<Vec<KernelArtifact>, SafetyError> {
    let boot_dir = ctx.boot_dir();
    let entries = fs::read_dir(boot_dir).map_err(|error| SafetyError::io(boot_dir, error))?;

    let mut artifacts = Vec::new();
    let mut leftovers = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(|error| SafetyError::io(boot_dir, error))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(version) = name.strip_prefix(IMAGE_PREFIX) else {
            if let Some(version) = auxiliary_version(name) {
                leftovers.insert(version.to_string());
            }
            continue;
        };
        if version.is_empty() || version.ends_with(".old") {
            continue;
        }
        let image = entry.path();
        let images = images_for(boot_dir, version, Some(image.clone()));
        let modules_dir = Some(ctx.modules_dir().join(version)).filter(|dir| dir.exists());
        let created_at = modified_at(&image);
        artifacts.push(KernelArtifact::classify(
            ctx,
            version,
            images,
            modules_dir,
            created_at,
        ));
    }

    leftovers.extend(module_versions(ctx.modules_dir()));
    for version in leftovers {
        if !is_bisect_version(&version) || artifacts.iter().any(|a| a.version == version) {
            continue;
        }
        let images = images_for(boot_dir, &version, None);
        let modules_dir = Some(ctx.modules_dir().join(&version)).filter(|dir| dir.is_dir());
        let epoch = SystemTime::UNIX_EPOCH.into();
        let mut artifact = KernelArtifact::classify(ctx, &version, images, modules_dir, epoch);
        if let Some(oldest) = artifact.paths().into_iter().map(modified_at).min() {
            artifact.created_at = oldest;
        }
        tracing::debug!(version = %version, "found leftovers of a kernel without an image");
        artifacts.push(artifact);
    }

    artifacts.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.version.cmp(&b.version))
    });
    Ok(artifacts)
}

/// Kernels whose version loosely looks like a bisection build.
///
/// This is a name filter only; callers still check
/// `is_bisect_artifact` before deleting anything.
///
/// # Errors
///
/// Same as [`enumerate`].
pub fn bisect_candidates(ctx: &HostContext) -> Result<Vec<KernelArtifact>, SafetyError> {
    let matcher = glob(BISECT_CANDIDATE_GLOB)?;
    Ok(enumerate(ctx)?
        .into_iter()
        .filter(|artifact| matcher.is_match(&artifact.version))
        .collect())
}

/// Every crash-dump initramfs on the boot volume, whichever kernel owns it.
///
/// # Errors
///
/// Returns [`SafetyError::Io`] if the boot directory cannot be read.
pub fn crash_dump_images(boot_dir: &Path) -> Result<Vec<PathBuf>, SafetyError> {
    let matcher = glob(CRASH_DUMP_GLOB)?;
    let entries = fs::read_dir(boot_dir).map_err(|error| SafetyError::io(boot_dir, error))?;
    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|error| SafetyError::io(boot_dir, error))?;
        if matcher.is_match(entry.file_name()) {
            found.push(entry.path());
        }
    }
    found.sort();
    Ok(found)
}

/// Files in `boot_dir` that belong to `version`, excluding crash-dump
/// images. Used to build the protection record.
///
/// # Errors
///
/// Returns [`SafetyError::Io`] if the boot directory cannot be read.
pub fn boot_files_for(boot_dir: &Path, version: &str) -> Result<Vec<PathBuf>, SafetyError> {
    let entries = fs::read_dir(boot_dir).map_err(|error| SafetyError::io(boot_dir, error))?;
    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|error| SafetyError::io(boot_dir, error))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if names_version(name, version) && !name.contains("kdump") {
            found.push(entry.path());
        }
    }
    found.sort();
    Ok(found)
}

/// Version named by a non-image boot file such as `System.map-<version>`.
fn auxiliary_version(name: &str) -> Option<&str> {
    AUXILIARY_NAMES.iter().find_map(|(prefix, suffix)| {
        name.strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(suffix))
            .filter(|version| !version.is_empty())
    })
}

/// Directory names under the modules root. A missing root lists nothing.
fn module_versions(modules_root: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(modules_root) else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_dir()))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect()
}

fn images_for(boot_dir: &Path, version: &str, image: Option<PathBuf>) -> KernelImages {
    let existing = |name: String| Some(boot_dir.join(name)).filter(|path| path.exists());
    KernelImages {
        image,
        initramfs: existing(format!("initramfs-{version}.img"))
            .or_else(|| existing(format!("initrd.img-{version}"))),
        crash_dump_initramfs: existing(format!("initramfs-{version}kdump.img")),
        system_map: existing(format!("System.map-{version}")),
        config: existing(format!("config-{version}")),
    }
}

/// `name` is `<prefix>-<version>` optionally followed by an extension.
fn names_version(name: &str, version: &str) -> bool {
    name.match_indices(version).any(|(at, _)| {
        let before = name[..at].ends_with('-');
        let rest = &name[at + version.len()..];
        before && (rest.is_empty() || rest.starts_with('.'))
    })
}

fn modified_at(path: &Path) -> DateTime<Utc> {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
        .into()
}

fn glob(pattern: &str) -> Result<GlobMatcher, SafetyError> {
    Glob::new(pattern)
        .map(|glob| glob.compile_matcher())
        .map_err(|error| SafetyError::Other(error.into()))
}
