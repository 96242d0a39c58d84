//! Initramfs regeneration for a freshly installed kernel.
//!
//! `dracut` gets an explicit driver list so storage and network come up on
//! the test kernel; if that fails a plain regeneration is tried. Hosts with
//! initramfs-tools use `update-initramfs` or `mkinitramfs`. None of this is
//! fatal.

use std::path::Path;

use kb_exec::{CancellationToken, CommandRunner, CommandSpec, ToolLocator};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InitramfsOutcome {
    /// Built with the explicit driver list.
    WithDrivers,
    /// Driver-list build failed or is unsupported; default contents.
    Plain,
    Failed,
    /// No initramfs generator is installed.
    NoTool,
}

pub struct InitramfsRequest<'a> {
    pub version: &'a str,
    pub boot_dir: &'a Path,
    pub modules: &'a [String],
}

pub async fn regenerate(
    runner: &dyn CommandRunner,
    tools: &dyn ToolLocator,
    request: &InitramfsRequest<'_>,
    cancel: &CancellationToken,
) -> InitramfsOutcome {
    let version = request.version;
    if tools.has("dracut") {
        let image = request.boot_dir.join(format!("initramfs-{version}.img"));
        let image = image.display().to_string();
        let drivers = request.modules.join(" ");

        let with_drivers = CommandSpec::new("dracut")
            .args(["--force", "--add-drivers", drivers.as_str()])
            .args([image.as_str(), version]);
        if attempt(runner, &with_drivers, cancel).await {
            tracing::info!(version, drivers = %drivers, "initramfs built with driver list");
            return InitramfsOutcome::WithDrivers;
        }
        tracing::warn!(version, "driver-list initramfs failed; falling back to plain regeneration");

        let plain = CommandSpec::new("dracut").args(["--force", image.as_str(), version]);
        return if attempt(runner, &plain, cancel).await {
            tracing::info!(version, "plain initramfs built");
            InitramfsOutcome::Plain
        } else {
            tracing::warn!(version, "initramfs regeneration failed; kernel may not reach the network");
            InitramfsOutcome::Failed
        };
    }

    let fallback = if tools.has("update-initramfs") {
        Some(CommandSpec::new("update-initramfs").args(["-c", "-k", version]))
    } else if tools.has("mkinitramfs") {
        let image = request.boot_dir.join(format!("initrd.img-{version}"));
        let image = image.display().to_string();
        Some(CommandSpec::new("mkinitramfs").args(["-o", image.as_str(), version]))
    } else {
        None
    };

    match fallback {
        Some(spec) if attempt(runner, &spec, cancel).await => {
            tracing::info!(version, tool = %spec.program, "initramfs built");
            InitramfsOutcome::Plain
        }
        Some(spec) => {
            tracing::warn!(version, tool = %spec.program, "initramfs regeneration failed");
            InitramfsOutcome::Failed
        }
        None => {
            tracing::warn!(version, "no initramfs generator found (dracut, update-initramfs, mkinitramfs)");
            InitramfsOutcome::NoTool
        }
    }
}

async fn attempt(runner: &dyn CommandRunner, spec: &CommandSpec, cancel: &CancellationToken) -> bool {
    tracing::debug!(command = %spec, "regenerating initramfs");
    match runner.run_checked(spec, cancel).await {
        Ok(_) => true,
        Err(error) => {
            tracing::warn!(command = %spec, %error, "initramfs command failed");
            false
        }
    }
}
