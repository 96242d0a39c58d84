//! Kernel build prerequisites through the host package manager.

use kb_exec::{CancellationToken, CommandRunner, CommandSpec, ToolLocator};
use serde::Serialize;

const RPM_PACKAGES: &[&str] = &[
    "gcc",
    "make",
    "git",
    "bc",
    "bison",
    "flex",
    "perl",
    "dwarves",
    "elfutils-libelf-devel",
    "openssl-devel",
    "ncurses-devel",
    "dracut",
];

const DEB_PACKAGES: &[&str] = &[
    "build-essential",
    "git",
    "bc",
    "bison",
    "flex",
    "dwarves",
    "libelf-dev",
    "libssl-dev",
    "libncurses-dev",
    "initramfs-tools",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "manager", rename_all = "snake_case")]
pub enum DependencyOutcome {
    Installed(String),
    Failed(String),
    NoPackageManager,
}

/// Install build prerequisites. Never fails the build; problems are
/// logged with manual guidance.
pub async fn install(
    runner: &dyn CommandRunner,
    tools: &dyn ToolLocator,
    cancel: &CancellationToken,
) -> DependencyOutcome {
    let Some(manager) = tools.first_of(&["dnf", "yum", "apt-get"]) else {
        tracing::warn!(
            "no supported package manager (dnf, yum, apt-get); install gcc, make, bison, flex, \
             bc, libelf and openssl headers manually"
        );
        return DependencyOutcome::NoPackageManager;
    };

    let spec = if manager == "apt-get" {
        CommandSpec::new(manager)
            .args(["install", "-y", "--no-install-recommends"])
            .args(DEB_PACKAGES.iter().copied())
            .env("DEBIAN_FRONTEND", "noninteractive")
    } else {
        CommandSpec::new(manager)
            .args(["install", "-y"])
            .args(RPM_PACKAGES.iter().copied())
    };

    tracing::info!(manager, "installing kernel build dependencies");
    match runner.run_checked(&spec, cancel).await {
        Ok(_) => DependencyOutcome::Installed(manager.to_string()),
        Err(error) => {
            tracing::warn!(manager, %error, "dependency installation failed; continuing");
            DependencyOutcome::Failed(manager.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use kb_exec::CommandOutput;
    use kb_exec::fake::{FakeTools, ScriptedRunner};
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn prefers_dnf_over_yum() {
        let runner = ScriptedRunner::new();
        let outcome = install(
            &runner,
            &FakeTools::with(&["yum", "dnf"]),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(outcome, DependencyOutcome::Installed("dnf".into()));
        assert!(runner.called("dnf install -y gcc make"));
    }

    #[tokio::test]
    async fn failure_is_a_warning_not_an_error() {
        let runner = ScriptedRunner::new().on("apt-get", CommandOutput::failed(100, "lock held"));
        let outcome = install(
            &runner,
            &FakeTools::with(&["apt-get"]),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(outcome, DependencyOutcome::Failed("apt-get".into()));
    }

    #[tokio::test]
    async fn without_package_manager_nothing_runs() {
        let runner = ScriptedRunner::new();
        let outcome = install(&runner, &FakeTools::with(&["sh"]), &CancellationToken::new()).await;
        assert_eq!(outcome, DependencyOutcome::NoPackageManager);
        assert!(runner.calls().is_empty());
    }
}
