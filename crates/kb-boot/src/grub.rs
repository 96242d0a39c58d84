use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use kb_core::EntryIdentifier;
use kb_exec::{CancellationToken, CommandRunner, CommandSpec};

use crate::editenv;
use crate::error::BootError;
use crate::loader::{BootFamily, Bootloader};

/// Classic GRUB hosts where `grub-reboot` takes the kernel release directly.
///
/// `tool_prefix` is `grub` on Debian-style hosts and `grub2` on hosts that
/// ship the renamed tools without `grubby`.
pub struct GrubBootloader {
    runner: Arc<dyn CommandRunner>,
    tool_prefix: &'static str,
    grub_cfg: PathBuf,
}

impl GrubBootloader {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        tool_prefix: &'static str,
        grub_cfg: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            tool_prefix,
            grub_cfg: grub_cfg.into(),
        }
    }

    fn tool(&self, name: &str) -> String {
        format!("{}-{name}", self.tool_prefix)
    }

    async fn env_value(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, BootError> {
        let spec = CommandSpec::new(self.tool("editenv")).args(["-", "list"]);
        let output = self.runner.run_checked(&spec, cancel).await?;
        Ok(editenv::lookup(&output.stdout, key))
    }
}

#[async_trait]
impl Bootloader for GrubBootloader {
    fn family(&self) -> BootFamily {
        BootFamily::Grub
    }

    async fn resolve_entry(
        &self,
        version: &str,
        _image: &Path,
        _cancel: &CancellationToken,
    ) -> Result<EntryIdentifier, BootError> {
        Ok(EntryIdentifier::KernelVersion(version.to_string()))
    }

    async fn arm_once(
        &self,
        entry: &EntryIdentifier,
        cancel: &CancellationToken,
    ) -> Result<(), BootError> {
        let spec = CommandSpec::new(self.tool("reboot")).arg(entry.as_str());
        self.runner.run_checked(&spec, cancel).await?;
        Ok(())
    }

    async fn one_time_state(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, BootError> {
        self.env_value("next_entry", cancel).await
    }

    async fn clear_one_time(&self, cancel: &CancellationToken) -> Result<(), BootError> {
        let spec = CommandSpec::new(self.tool("editenv")).args(["-", "unset", "next_entry"]);
        self.runner.run_checked(&spec, cancel).await?;
        Ok(())
    }

    async fn set_persistent_default(
        &self,
        version: &str,
        _image: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), BootError> {
        let spec = CommandSpec::new(self.tool("set-default")).arg(version);
        self.runner.run_checked(&spec, cancel).await?;
        Ok(())
    }

    async fn persistent_default(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, BootError> {
        self.env_value("saved_entry", cancel).await
    }

    /// `saved_entry` may be the bare release, a menu title ending in it, or a
    /// `submenu>entry` path whose last element does.
    fn default_designates(&self, reported: &str, version: &str, _image: &Path) -> bool {
        let last = reported.rsplit('>').next().unwrap_or(reported).trim();
        last == version || last.ends_with(&format!(" {version}"))
    }

    async fn regenerate_config(&self, cancel: &CancellationToken) -> Result<(), BootError> {
        let spec = CommandSpec::new(self.tool("mkconfig"))
            .arg("-o")
            .arg(self.grub_cfg.display().to_string());
        self.runner.run_checked(&spec, cancel).await?;
        Ok(())
    }

    async fn add_kernel_args(
        &self,
        _version: &str,
        _image: &Path,
        _args: &str,
        _cancel: &CancellationToken,
    ) -> Result<(), BootError> {
        Err(BootError::Unsupported {
            family: "grub",
            operation: "per-kernel command-line arguments",
        })
    }
}

#[cfg(test)]
mod tests {
    use kb_exec::CommandOutput;
    use kb_exec::fake::ScriptedRunner;
    use rstest::rstest;

    use super::*;

    fn loader(runner: ScriptedRunner) -> GrubBootloader {
        GrubBootloader::new(Arc::new(runner), "grub", "/boot/grub/grub.cfg")
    }

    #[tokio::test]
    async fn resolves_to_raw_version_without_running_anything() {
        let runner = Arc::new(ScriptedRunner::new());
        let grub = GrubBootloader::new(runner.clone(), "grub", "/boot/grub/grub.cfg");
        let entry = grub
            .resolve_entry(
                "5.15.0-bisect-aaa1111",
                Path::new("/boot/vmlinuz-5.15.0-bisect-aaa1111"),
                &CancellationToken::new(),
            )
            .await
            .expect("entry");
        assert_eq!(
            entry,
            EntryIdentifier::KernelVersion("5.15.0-bisect-aaa1111".into())
        );
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn reads_saved_entry_as_persistent_default() {
        let grub = loader(ScriptedRunner::new().on(
            "grub-editenv - list",
            CommandOutput::ok("saved_entry=5.14.0-host\nnext_entry=\n"),
        ));
        let token = CancellationToken::new();
        assert_eq!(
            grub.persistent_default(&token).await.expect("default").as_deref(),
            Some("5.14.0-host")
        );
        assert_eq!(grub.one_time_state(&token).await.expect("state"), None);
    }

    #[rstest]
    #[case("5.14.0-host", true)]
    #[case("Advanced options for Debian GNU/Linux>Debian GNU/Linux, with Linux 5.14.0-host", true)]
    #[case("5.14.0-host-debug", false)]
    #[case("Debian GNU/Linux, with Linux 5.15.0-bisect-aaa1111", false)]
    fn default_readback_matching(#[case] reported: &str, #[case] expected: bool) {
        let grub = loader(ScriptedRunner::new());
        assert_eq!(
            grub.default_designates(reported, "5.14.0-host", Path::new("/boot/vmlinuz-5.14.0-host")),
            expected
        );
    }

    #[tokio::test]
    async fn kernel_args_are_unsupported() {
        let grub = loader(ScriptedRunner::new());
        let result = grub
            .add_kernel_args("v", Path::new("/boot/vmlinuz-v"), "panic=10", &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(BootError::Unsupported { .. })));
    }
}
