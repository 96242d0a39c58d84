use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use kb_core::EntryIdentifier;
use kb_exec::{CancellationToken, CommandRunner, CommandSpec};

use crate::editenv;
use crate::error::BootError;
use crate::loader::{BootFamily, Bootloader};

/// `grubby`-managed BLS hosts (Fedora, RHEL, CentOS Stream).
pub struct BlsBootloader {
    runner: Arc<dyn CommandRunner>,
    loader_entries_dir: PathBuf,
    grub_cfg: PathBuf,
}

impl BlsBootloader {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        loader_entries_dir: impl Into<PathBuf>,
        grub_cfg: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            loader_entries_dir: loader_entries_dir.into(),
            grub_cfg: grub_cfg.into(),
        }
    }

    /// Entry file stem whose name ends with the kernel release.
    fn entry_from_loader_dir(&self, version: &str) -> Option<String> {
        let suffix = format!("{version}.conf");
        let entries = std::fs::read_dir(&self.loader_entries_dir).ok()?;
        let mut stems = entries
            .filter_map(Result::ok)
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| {
                name.strip_suffix(&suffix)
                    .is_some_and(|head| head.is_empty() || head.ends_with('-'))
            })
            .filter_map(|name| name.strip_suffix(".conf").map(ToString::to_string))
            .collect::<Vec<_>>();
        stems.sort();
        stems.into_iter().next()
    }
}

/// `id="..."` from `grubby --info` output.
fn parse_grubby_id(info: &str) -> Option<String> {
    info.lines()
        .filter_map(|line| line.trim().strip_prefix("id="))
        .map(|value| value.trim().trim_matches('"').to_string())
        .find(|value| !value.is_empty())
}

#[async_trait]
impl Bootloader for BlsBootloader {
    fn family(&self) -> BootFamily {
        BootFamily::Bls
    }

    async fn resolve_entry(
        &self,
        version: &str,
        image: &Path,
        cancel: &CancellationToken,
    ) -> Result<EntryIdentifier, BootError> {
        let spec = CommandSpec::new("grubby").arg(format!("--info={}", image.display()));
        let output = self.runner.run(&spec, cancel).await?;
        if output.success() {
            if let Some(id) = parse_grubby_id(&output.stdout) {
                return Ok(EntryIdentifier::BootEntryId(id));
            }
        }

        tracing::debug!(
            version,
            dir = %self.loader_entries_dir.display(),
            "grubby reported no id; scanning loader entries"
        );
        self.entry_from_loader_dir(version)
            .map(EntryIdentifier::BootEntryId)
            .ok_or_else(|| BootError::EntryNotFound {
                version: version.to_string(),
            })
    }

    async fn arm_once(
        &self,
        entry: &EntryIdentifier,
        cancel: &CancellationToken,
    ) -> Result<(), BootError> {
        let spec = CommandSpec::new("grub2-reboot").arg(entry.as_str());
        self.runner.run_checked(&spec, cancel).await?;
        Ok(())
    }

    async fn one_time_state(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, BootError> {
        let spec = CommandSpec::new("grub2-editenv").args(["-", "list"]);
        let output = self.runner.run_checked(&spec, cancel).await?;
        Ok(editenv::lookup(&output.stdout, "next_entry"))
    }

    async fn clear_one_time(&self, cancel: &CancellationToken) -> Result<(), BootError> {
        let spec = CommandSpec::new("grub2-editenv").args(["-", "unset", "next_entry"]);
        self.runner.run_checked(&spec, cancel).await?;
        Ok(())
    }

    async fn set_persistent_default(
        &self,
        _version: &str,
        image: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), BootError> {
        let spec = CommandSpec::new("grubby").arg(format!("--set-default={}", image.display()));
        self.runner.run_checked(&spec, cancel).await?;
        Ok(())
    }

    async fn persistent_default(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, BootError> {
        let spec = CommandSpec::new("grubby").arg("--default-kernel");
        let output = self.runner.run_checked(&spec, cancel).await?;
        let reported = output.stdout.trim();
        Ok((!reported.is_empty()).then(|| reported.to_string()))
    }

    fn default_designates(&self, reported: &str, _version: &str, image: &Path) -> bool {
        Path::new(reported.trim()) == image
    }

    async fn regenerate_config(&self, cancel: &CancellationToken) -> Result<(), BootError> {
        let spec = CommandSpec::new("grub2-mkconfig")
            .arg("-o")
            .arg(self.grub_cfg.display().to_string());
        self.runner.run_checked(&spec, cancel).await?;
        Ok(())
    }

    async fn add_kernel_args(
        &self,
        _version: &str,
        image: &Path,
        args: &str,
        cancel: &CancellationToken,
    ) -> Result<(), BootError> {
        let spec = CommandSpec::new("grubby")
            .arg(format!("--update-kernel={}", image.display()))
            .arg(format!("--args={args}"));
        self.runner.run_checked(&spec, cancel).await?;
        Ok(())
    }
}
