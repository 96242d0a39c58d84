use std::path::PathBuf;

use clap::{Args, Subcommand};
use kb_core::ConfigSource;

/// Top-level command tree.
#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Protect the running kernel and make it the persistent boot default.
    Init(InitArgs),
    /// Check that every protected path still exists.
    Verify,
    /// Report host readiness for a bisection session.
    Status,
    /// List installed kernels with their classification.
    List,
    /// Report free space on the boot volume.
    Disk,
    /// Remove old bisection kernels.
    Cleanup(CleanupArgs),
    /// Build, install, and arm a kernel for one commit.
    Build(BuildArgs),
    /// Arm an installed kernel for the next boot only.
    Arm(ArmArgs),
}

#[derive(Clone, Debug, Args)]
pub struct InitArgs {
    /// Replace an existing record that protects a different kernel
    #[arg(long)]
    pub force: bool,
}

#[derive(Clone, Debug, Args)]
pub struct CleanupArgs {
    /// Idle bisection kernels to keep (defaults to policy.keep_count)
    #[arg(long)]
    pub keep: Option<usize>,

    /// Also remove crash-dump initramfs images
    #[arg(long)]
    pub crash_dumps: bool,
}

#[derive(Clone, Debug, Args)]
pub struct BuildArgs {
    /// Commit, tag, or branch to build
    pub commit: String,

    /// Configuration baseline: none, RUNNING, or a config file path
    #[arg(long, value_parser = parse_config_source)]
    pub config_source: Option<ConfigSource>,

    /// Required free space on the boot volume, in MB
    #[arg(long)]
    pub min_free_mb: Option<u64>,

    /// Idle bisection kernels to keep after installing
    #[arg(long)]
    pub keep: Option<usize>,

    /// Kernel source tree
    #[arg(long)]
    pub kernel_src: Option<PathBuf>,
}

#[derive(Clone, Debug, Args)]
pub struct ArmArgs {
    /// Installed kernel release to boot once
    pub version: String,
}

fn parse_config_source(value: &str) -> Result<ConfigSource, String> {
    value.parse::<ConfigSource>().map_err(|never| match never {})
}
