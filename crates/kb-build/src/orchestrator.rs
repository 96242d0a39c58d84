use std::path::PathBuf;
use std::sync::Arc;

use kb_boot::{Bootloader, arm};
use kb_config::KbConfig;
use kb_core::{
    BisectLabel, BuildRequest, BuildStage, HostContext, OneTimeBootEntry, SafetyError,
};
use kb_exec::{CancellationToken, CommandRunner, ToolLocator};
use kb_guard::{DiskGovernor, RetentionManager, ensure_persistent_default};
use serde::Serialize;

use crate::configure::{ConfigBackup, ConfigureStep, configure};
use crate::deps::{self, DependencyOutcome};
use crate::initramfs::{self, InitramfsOutcome, InitramfsRequest};
use crate::make::Make;
use crate::source::KernelTree;

/// Test kernels kept going into a build, whatever the steady-state policy.
const PRE_BUILD_KEEP: usize = 1;

/// Host-level build knobs that do not change between iterations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSettings {
    pub kernel_src: PathBuf,
    pub arch: String,
    pub jobs: usize,
    pub install_deps: bool,
    pub initramfs_modules: Vec<String>,
    pub panic_timeout_secs: u32,
}

impl BuildSettings {
    #[must_use]
    pub fn from_config(config: &KbConfig) -> Self {
        Self {
            kernel_src: config.paths.kernel_src.clone(),
            arch: config.build.arch.clone(),
            jobs: config.build.effective_jobs(),
            install_deps: config.build.install_deps,
            initramfs_modules: config.build.initramfs_modules.clone(),
            panic_timeout_secs: config.build.panic_timeout_secs,
        }
    }
}

/// Result of one successful iteration.
#[derive(Debug, Clone, Serialize)]
pub struct BuildOutcome {
    pub version: String,
    pub commit: String,
    pub label: String,
    pub image: PathBuf,
    pub one_time_boot: OneTimeBootEntry,
    pub initramfs: InitramfsOutcome,
    pub panic_parameter: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<DependencyOutcome>,
}

pub struct BuildOrchestrator {
    runner: Arc<dyn CommandRunner>,
    tools: Arc<dyn ToolLocator>,
    bootloader: Option<Arc<dyn Bootloader>>,
    governor: DiskGovernor,
    settings: BuildSettings,
}

impl BuildOrchestrator {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        tools: Arc<dyn ToolLocator>,
        bootloader: Option<Arc<dyn Bootloader>>,
        governor: DiskGovernor,
        settings: BuildSettings,
    ) -> Self {
        Self {
            runner,
            tools,
            bootloader,
            governor,
            settings,
        }
    }

    /// Run one build iteration for `request` and leave the new kernel armed
    /// for exactly the next boot.
    ///
    /// # Errors
    ///
    /// The first fatal [`SafetyError`] from any step.
    pub async fn build(
        &self,
        ctx: &HostContext,
        request: &BuildRequest,
        cancel: &CancellationToken,
    ) -> Result<BuildOutcome, SafetyError> {
        ctx.protection().verify()?;

        let dependencies = if self.settings.install_deps {
            Some(deps::install(self.runner.as_ref(), self.tools.as_ref(), cancel).await)
        } else {
            None
        };

        self.make_room(ctx, request.min_free_mb)?;

        let tree = KernelTree::new(&self.settings.kernel_src);
        let commit = tree.resolve(&request.commit)?;
        tree.checkout(self.runner.as_ref(), &commit, cancel).await?;

        let label = BisectLabel::from_commit(&commit.id)?;
        tracing::info!(commit = %commit.id, label = %label, "building bisection kernel");

        let backup = ConfigBackup::take(&tree.config_path())?;
        let outcome = self.install_and_arm(ctx, &tree, &commit.id, &label, request, cancel).await;
        backup.restore();

        let mut outcome = outcome?;
        outcome.dependencies = dependencies;
        tracing::info!(version = %outcome.version, commit = %outcome.commit, "kernel installed and armed for next boot");
        Ok(outcome)
    }

    async fn install_and_arm(
        &self,
        ctx: &HostContext,
        tree: &KernelTree,
        commit: &str,
        label: &BisectLabel,
        request: &BuildRequest,
        cancel: &CancellationToken,
    ) -> Result<BuildOutcome, SafetyError> {
        let make = Make {
            root: tree.root(),
            arch: &self.settings.arch,
            label,
        };
        self.configure_and_compile(ctx, tree, &make, request, cancel).await?;
        let version = match install(self.runner.as_ref(), &make, cancel).await {
            Ok(version) => version,
            Err(error) => return Err(self.recover_protected_default(ctx, error).await),
        };

        if let Err(error) = self.reassert_protected_default(ctx, cancel).await {
            return Err(self.recover_protected_default(ctx, error).await);
        }
        trim_to_policy(ctx, request.keep_count)?;

        let image = ctx.boot_dir().join(format!("vmlinuz-{version}"));
        let initramfs = initramfs::regenerate(
            self.runner.as_ref(),
            self.tools.as_ref(),
            &InitramfsRequest {
                version: &version,
                boot_dir: ctx.boot_dir(),
                modules: &self.settings.initramfs_modules,
            },
            cancel,
        )
        .await;

        let panic_parameter = self.set_panic_parameter(&version, &image, cancel).await;

        let one_time_boot = arm(self.bootloader.as_deref(), &version, &image, cancel).await?;
        Ok(BuildOutcome {
            version,
            commit: commit.to_string(),
            label: label.to_string(),
            image,
            one_time_boot,
            initramfs,
            panic_parameter,
            dependencies: None,
        })
    }

    /// Pre-clean, then check headroom with `evict(0)` as the last resort.
    fn make_room(&self, ctx: &HostContext, min_free_mb: u64) -> Result<(), SafetyError> {
        let retention = RetentionManager::new(ctx);
        retention.evict(PRE_BUILD_KEEP)?;
        retention.evict_crash_dump_artifacts()?;

        if self.governor.has_headroom(min_free_mb)? {
            return Ok(());
        }
        tracing::warn!(min_free_mb, "low space on boot volume; evicting every idle test kernel");
        retention.evict(0)?;

        let sample = self.governor.sample()?;
        if sample.has_headroom(min_free_mb) {
            return Ok(());
        }
        tracing::error!(
            free_mb = sample.free_mb,
            required_mb = min_free_mb,
            "insufficient space even after emergency eviction"
        );
        Err(SafetyError::InsufficientSpace {
            volume: self.governor.volume().to_path_buf(),
            free_mb: sample.free_mb,
            required_mb: min_free_mb,
        })
    }

    async fn configure_and_compile(
        &self,
        ctx: &HostContext,
        tree: &KernelTree,
        make: &Make<'_>,
        request: &BuildRequest,
        cancel: &CancellationToken,
    ) -> Result<(), SafetyError> {
        let runner = self.runner.as_ref();
        let running_config = ctx.boot_dir().join(format!("config-{}", ctx.running_kernel()));
        configure(
            runner,
            &ConfigureStep {
                root: tree.root(),
                arch: &self.settings.arch,
                label: make.label,
                source: &request.config_source,
                running_config: &running_config,
                panic_timeout_secs: self.settings.panic_timeout_secs,
            },
            cancel,
        )
        .await?;

        let jobs = format!("-j{}", self.settings.jobs.max(1));
        make.run(runner, BuildStage::Compile, [jobs], cancel).await?;
        make.run(runner, BuildStage::InstallModules, ["modules_install"], cancel).await?;
        Ok(())
    }

    /// Once `make install` has started, installkernel hooks may already have
    /// pointed the persistent default at the partial kernel. Put the
    /// protected kernel back before `error` propagates, on a token of its
    /// own so cancellation cannot skip it.
    async fn recover_protected_default(&self, ctx: &HostContext, error: SafetyError) -> SafetyError {
        let Some(bootloader) = self.bootloader.as_deref() else {
            tracing::warn!(%error, "no bootloader control; cannot re-assert the protected default");
            return error;
        };
        match ensure_persistent_default(ctx.protection(), bootloader, &CancellationToken::new()).await {
            Ok(()) => {
                tracing::info!(
                    version = %ctx.protection().safe_version,
                    "protected kernel re-asserted after failed install"
                );
                error
            }
            Err(setup) => {
                tracing::error!(%error, %setup, "could not re-assert the protected default after failed install");
                setup
            }
        }
    }

    /// `make install` hooks may retarget the persistent default.
    async fn reassert_protected_default(
        &self,
        ctx: &HostContext,
        cancel: &CancellationToken,
    ) -> Result<(), SafetyError> {
        let Some(bootloader) = self.bootloader.as_deref() else {
            tracing::warn!("no bootloader control; cannot re-assert the protected default");
            return Ok(());
        };
        ensure_persistent_default(ctx.protection(), bootloader, cancel).await?;
        tracing::info!(version = %ctx.protection().safe_version, "protected kernel is still the persistent default");
        Ok(())
    }

    async fn set_panic_parameter(
        &self,
        version: &str,
        image: &std::path::Path,
        cancel: &CancellationToken,
    ) -> bool {
        let Some(bootloader) = self.bootloader.as_deref() else {
            tracing::warn!(version, "no bootloader control; panic reboot parameter not set");
            return false;
        };
        let args = format!("panic={}", self.settings.panic_timeout_secs);
        match bootloader.add_kernel_args(version, image, &args, cancel).await {
            Ok(()) => {
                tracing::info!(version, args = %args, "panic reboot parameter set");
                true
            }
            Err(error) => {
                tracing::warn!(version, %error, "could not set panic reboot parameter; relying on CONFIG_PANIC_TIMEOUT");
                false
            }
        }
    }
}

/// `make install`, then confirm the installed release carries `make.label`.
async fn install(
    runner: &dyn CommandRunner,
    make: &Make<'_>,
    cancel: &CancellationToken,
) -> Result<String, SafetyError> {
    make.run(runner, BuildStage::InstallKernel, ["install"], cancel).await?;

    let release = make
        .run(runner, BuildStage::KernelRelease, ["-s", "kernelrelease"], cancel)
        .await?;
    let version = release.stdout.trim().to_string();
    if !make.label.matches_version(&version) {
        tracing::error!(version = %version, label = %make.label, "built kernel does not carry the bisection label");
        return Err(SafetyError::BuildFailed {
            stage: BuildStage::KernelRelease,
            reason: format!("kernel release {version:?} does not end in {}", make.label),
        });
    }
    tracing::info!(version = %version, "kernel installed");
    Ok(version)
}

/// Apply the steady-state keep count now that the new kernel is the newest
/// artifact. Never trims below one so the new kernel survives.
fn trim_to_policy(ctx: &HostContext, keep_count: usize) -> Result<(), SafetyError> {
    let report = RetentionManager::new(ctx).evict(keep_count.max(1))?;
    if !report.failed.is_empty() {
        tracing::warn!(failed = report.failed.len(), "some old kernels could not be removed");
    }
    Ok(())
}
