use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use kb_boot::{Bootloader, GrubBootloader};
use kb_build::{BuildOrchestrator, BuildSettings, InitramfsOutcome, KernelTree};
use kb_core::{
    BuildRequest, BuildStage, ConfigSource, DiskSpaceSample, EntryIdentifier, HostContext,
    ProtectionRecord, SafetyError,
};
use kb_exec::fake::{FakeTools, ScriptedRunner};
use kb_exec::{CancellationToken, CommandOutput};
use kb_guard::{DiskGovernor, SpaceProbe};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const HOST: &str = "5.14.0-host";
const ARCH: &str = "x86_64";
const MB: u64 = 1024 * 1024;

struct FixedSpace {
    free_mb: u64,
}

impl SpaceProbe for FixedSpace {
    fn sample(&self, _volume: &Path) -> std::io::Result<DiskSpaceSample> {
        Ok(DiskSpaceSample::from_bytes(self.free_mb * MB, 10_000 * MB))
    }
}

struct Host {
    dir: TempDir,
}

impl Host {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let host = Self { dir };
        fs::create_dir_all(host.boot()).expect("boot");
        host.install(HOST);
        host
    }

    fn boot(&self) -> PathBuf {
        self.dir.path().join("boot")
    }

    fn modules(&self) -> PathBuf {
        self.dir.path().join("lib/modules")
    }

    fn install(&self, version: &str) {
        fs::write(self.boot().join(format!("vmlinuz-{version}")), version).expect("image");
        fs::write(self.boot().join(format!("config-{version}")), "CONFIG_RUNNING=y\n")
            .expect("config");
        fs::create_dir_all(self.modules().join(version)).expect("modules");
    }

    fn ctx(&self) -> HostContext {
        let image = self.boot().join(format!("vmlinuz-{HOST}"));
        let mut record = ProtectionRecord::new(HOST, &image);
        record.protect(&image);
        record.protect(self.boot().join(format!("config-{HOST}")));
        record.protect(self.modules().join(HOST));
        HostContext::new(HOST, record, self.boot(), self.modules())
    }
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(["-c", "user.name=kbisect", "-c", "user.email=kbisect@localhost"])
        .args(["-c", "commit.gpgsign=false"])
        .args(args)
        .current_dir(dir)
        .status()
        .expect("git should run");
    assert!(status.success(), "git {args:?} failed");
}

/// A one-commit repository standing in for the kernel tree.
fn kernel_repo() -> (TempDir, String) {
    let dir = tempfile::tempdir().expect("tempdir");
    git(dir.path(), &["init", "-q"]);
    fs::write(dir.path().join("Makefile"), "VERSION = 5\nPATCHLEVEL = 15\n").expect("Makefile");
    git(dir.path(), &["add", "Makefile"]);
    git(dir.path(), &["commit", "-q", "-m", "v5.15"]);
    let head = KernelTree::new(dir.path()).head().expect("head");
    (dir, head)
}

fn settings(kernel_src: &Path) -> BuildSettings {
    BuildSettings {
        kernel_src: kernel_src.to_path_buf(),
        arch: ARCH.to_string(),
        jobs: 4,
        install_deps: false,
        initramfs_modules: vec!["virtio_blk".into(), "virtio_net".into()],
        panic_timeout_secs: 10,
    }
}

fn request(commit: &str, config_source: ConfigSource) -> BuildRequest {
    BuildRequest {
        commit: commit.to_string(),
        config_source,
        min_free_mb: 500,
        keep_count: 2,
    }
}

fn orchestrator(
    runner: &Arc<ScriptedRunner>,
    bootloader: Option<Arc<dyn Bootloader>>,
    free_mb: u64,
    host: &Host,
    kernel_src: &Path,
) -> BuildOrchestrator {
    BuildOrchestrator::new(
        runner.clone(),
        Arc::new(FakeTools::with(&[])),
        bootloader,
        DiskGovernor::new(host.boot(), Arc::new(FixedSpace { free_mb })),
        settings(kernel_src),
    )
}

fn make_prefix(label: &str) -> String {
    format!("make ARCH={ARCH} LOCALVERSION={label}")
}

#[tokio::test]
async fn insufficient_space_fails_before_any_checkout() {
    let host = Host::new();
    host.install("5.15.0-bisect-aaa1111");
    host.install("5.15.0-bisect-bbb2222");
    let runner = Arc::new(ScriptedRunner::new());
    let missing_tree = host.dir.path().join("no-such-tree");
    let build = orchestrator(&runner, None, 100, &host, &missing_tree);

    let result = build
        .build(&host.ctx(), &request("aaa1111", ConfigSource::None), &CancellationToken::new())
        .await;

    match result {
        Err(SafetyError::InsufficientSpace {
            free_mb,
            required_mb,
            ..
        }) => {
            assert_eq!(free_mb, 100);
            assert_eq!(required_mb, 500);
        }
        other => panic!("expected insufficient space, got {other:?}"),
    }
    assert!(!runner.called("git"));
    assert!(!runner.called("make"));
    assert!(!host.boot().join("vmlinuz-5.15.0-bisect-bbb2222").exists());
    assert!(host.boot().join(format!("vmlinuz-{HOST}")).exists());
}

#[tokio::test]
async fn no_one_time_primitive_never_touches_the_persistent_default() {
    let host = Host::new();
    let (tree, head) = kernel_repo();
    let label = format!("-bisect-{}", &head[..7]);
    let version = format!("5.15.0{label}");
    let runner = Arc::new(ScriptedRunner::new().on(
        format!("{} -s kernelrelease", make_prefix(&label)),
        CommandOutput::ok(format!("{version}\n")),
    ));
    let build = orchestrator(&runner, None, 5_000, &host, tree.path());

    let result = build
        .build(&host.ctx(), &request(&head, ConfigSource::None), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(SafetyError::NoOneTimeBootSupport)));
    assert!(!runner.called("grub"));
    assert!(runner.called(&format!("{} -j4", make_prefix(&label))));
}

#[tokio::test]
async fn successful_build_is_labeled_installed_and_armed() {
    let host = Host::new();
    let (tree, head) = kernel_repo();
    let label = format!("-bisect-{}", &head[..7]);
    let version = format!("5.15.0{label}");
    fs::write(tree.path().join(".config"), "CONFIG_OLD=y\n").expect(".config");
    let seed = host.dir.path().join("seed.config");
    fs::write(&seed, "CONFIG_NEW=y\n").expect("seed");

    let runner = Arc::new(
        ScriptedRunner::new()
            .on(
                format!("{} -s kernelrelease", make_prefix(&label)),
                CommandOutput::ok(format!("{version}\n")),
            )
            .on(
                "grub-editenv - list",
                CommandOutput::ok(format!("saved_entry={HOST}\nnext_entry={version}\n")),
            ),
    );
    let loader: Arc<dyn Bootloader> = Arc::new(GrubBootloader::new(
        runner.clone(),
        "grub",
        host.boot().join("grub/grub.cfg"),
    ));
    let build = orchestrator(&runner, Some(loader), 5_000, &host, tree.path());

    let outcome = build
        .build(
            &host.ctx(),
            &request(&head, ConfigSource::File(seed)),
            &CancellationToken::new(),
        )
        .await
        .expect("build");

    assert_eq!(outcome.version, version);
    assert_eq!(outcome.commit, head);
    assert_eq!(outcome.label, label);
    assert_eq!(
        outcome.one_time_boot.entry_identifier,
        EntryIdentifier::KernelVersion(version.clone())
    );
    assert_eq!(outcome.initramfs, InitramfsOutcome::NoTool);
    assert!(!outcome.panic_parameter);

    let calls = runner.calls();
    let position = |prefix: &str| {
        calls
            .iter()
            .position(|call| call.starts_with(prefix))
            .unwrap_or_else(|| panic!("{prefix} not called; calls: {calls:#?}"))
    };
    assert!(position("git reset --hard") < position("git clean -fd"));
    assert!(position("git clean -fd") < position("git checkout"));
    assert!(position("git checkout") < position("scripts/config"));
    assert!(position(&format!("{} -j4", make_prefix(&label))) < position(&format!("{} install", make_prefix(&label))));
    assert!(position(&format!("grub-set-default {HOST}")) < position(&format!("grub-reboot {version}")));
    assert!(!calls.iter().any(|call| call == &format!("grub-set-default {version}")));
    assert_eq!(
        fs::read_to_string(tree.path().join(".config")).expect(".config"),
        "CONFIG_OLD=y\n"
    );
    assert!(!tree.path().join(".config.kbisect-backup").exists());
}

fn bootloader_calls_after(calls: &[String], prefix: &str) -> Vec<String> {
    let start = calls
        .iter()
        .position(|call| call.starts_with(prefix))
        .unwrap_or_else(|| panic!("{prefix} not called; calls: {calls:#?}"));
    calls[start..]
        .iter()
        .filter(|call| call.starts_with("grub-"))
        .cloned()
        .collect()
}

#[tokio::test]
async fn failure_after_install_reasserts_the_protected_default() {
    let host = Host::new();
    let (tree, head) = kernel_repo();
    let label = format!("-bisect-{}", &head[..7]);
    let runner = Arc::new(
        ScriptedRunner::new()
            .on(
                format!("{} -s kernelrelease", make_prefix(&label)),
                CommandOutput::ok("5.15.0\n"),
            )
            .on("grub-editenv - list", CommandOutput::ok(format!("saved_entry={HOST}\n"))),
    );
    let loader: Arc<dyn Bootloader> = Arc::new(GrubBootloader::new(
        runner.clone(),
        "grub",
        host.boot().join("grub/grub.cfg"),
    ));
    let build = orchestrator(&runner, Some(loader), 5_000, &host, tree.path());

    let result = build
        .build(&host.ctx(), &request(&head, ConfigSource::None), &CancellationToken::new())
        .await;

    assert!(matches!(
        result,
        Err(SafetyError::BuildFailed {
            stage: BuildStage::KernelRelease,
            ..
        })
    ));
    assert_eq!(
        bootloader_calls_after(&runner.calls(), &format!("{} install", make_prefix(&label))),
        vec![format!("grub-set-default {HOST}"), "grub-editenv - list".to_string()]
    );
    assert!(!runner.called("grub-reboot"));
}

#[tokio::test]
async fn unconfirmed_recovery_after_install_is_a_setup_error() {
    let host = Host::new();
    let (tree, head) = kernel_repo();
    let label = format!("-bisect-{}", &head[..7]);
    let runner = Arc::new(
        ScriptedRunner::new()
            .on(
                format!("{} install", make_prefix(&label)),
                CommandOutput::failed(1, "installkernel: dracut failed"),
            )
            .on("grub-editenv - list", CommandOutput::ok("saved_entry=5.15.0\n")),
    );
    let loader: Arc<dyn Bootloader> = Arc::new(GrubBootloader::new(
        runner.clone(),
        "grub",
        host.boot().join("grub/grub.cfg"),
    ));
    let build = orchestrator(&runner, Some(loader), 5_000, &host, tree.path());

    let result = build
        .build(&host.ctx(), &request(&head, ConfigSource::None), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(SafetyError::ProtectionSetup(_))), "got {result:?}");
    assert!(runner.called(&format!("grub-set-default {HOST}")));
}

#[tokio::test]
async fn cancellation_during_install_still_reasserts_the_protected_default() {
    let host = Host::new();
    let (tree, head) = kernel_repo();
    let label = format!("-bisect-{}", &head[..7]);
    let cancel = CancellationToken::new();
    let install = format!("{} install", make_prefix(&label));
    let runner = Arc::new(
        ScriptedRunner::new()
            .cancel_on(install.clone(), &cancel)
            .on("grub-editenv - list", CommandOutput::ok(format!("saved_entry={HOST}\n"))),
    );
    let loader: Arc<dyn Bootloader> = Arc::new(GrubBootloader::new(
        runner.clone(),
        "grub",
        host.boot().join("grub/grub.cfg"),
    ));
    let build = orchestrator(&runner, Some(loader), 5_000, &host, tree.path());

    let result = build
        .build(&host.ctx(), &request(&head, ConfigSource::None), &cancel)
        .await;

    assert!(matches!(result, Err(SafetyError::Cancelled)), "got {result:?}");
    assert_eq!(
        bootloader_calls_after(&runner.calls(), &install),
        vec![format!("grub-set-default {HOST}"), "grub-editenv - list".to_string()]
    );
}

#[tokio::test]
async fn compile_failure_restores_config_and_never_arms() {
    let host = Host::new();
    let (tree, head) = kernel_repo();
    let label = format!("-bisect-{}", &head[..7]);
    fs::write(tree.path().join(".config"), "CONFIG_OLD=y\n").expect(".config");
    let seed = host.dir.path().join("seed.config");
    fs::write(&seed, "CONFIG_NEW=y\n").expect("seed");

    let runner = Arc::new(ScriptedRunner::new().on(
        format!("{} -j4", make_prefix(&label)),
        CommandOutput::failed(2, "error: implicit declaration"),
    ));
    let loader: Arc<dyn Bootloader> = Arc::new(GrubBootloader::new(
        runner.clone(),
        "grub",
        host.boot().join("grub/grub.cfg"),
    ));
    let build = orchestrator(&runner, Some(loader), 5_000, &host, tree.path());

    let result = build
        .build(
            &host.ctx(),
            &request(&head, ConfigSource::File(seed)),
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(
        result,
        Err(SafetyError::BuildFailed {
            stage: BuildStage::Compile,
            ..
        })
    ));
    assert_eq!(
        fs::read_to_string(tree.path().join(".config")).expect(".config"),
        "CONFIG_OLD=y\n"
    );
    assert!(!runner.called("grub-reboot"));
    assert!(!runner.called(&format!("{} install", make_prefix(&label))));
}

#[tokio::test]
async fn unlabeled_release_is_a_build_failure() {
    let host = Host::new();
    let (tree, head) = kernel_repo();
    let label = format!("-bisect-{}", &head[..7]);
    let runner = Arc::new(ScriptedRunner::new().on(
        format!("{} -s kernelrelease", make_prefix(&label)),
        CommandOutput::ok("5.15.0\n"),
    ));
    let build = orchestrator(&runner, None, 5_000, &host, tree.path());

    let result = build
        .build(&host.ctx(), &request(&head, ConfigSource::None), &CancellationToken::new())
        .await;

    assert!(matches!(
        result,
        Err(SafetyError::BuildFailed {
            stage: BuildStage::KernelRelease,
            ..
        })
    ));
}

#[tokio::test]
async fn failed_checkout_stops_before_configure() {
    let host = Host::new();
    let (tree, head) = kernel_repo();
    let runner = Arc::new(
        ScriptedRunner::new().on("git checkout", CommandOutput::failed(1, "local changes")),
    );
    let build = orchestrator(&runner, None, 5_000, &host, tree.path());

    let result = build
        .build(&host.ctx(), &request(&head, ConfigSource::None), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(SafetyError::Checkout { .. })));
    assert!(!runner.called("scripts/config"));
    assert!(!runner.called("make"));
}

#[tokio::test]
async fn unknown_revision_is_a_checkout_error() {
    let host = Host::new();
    let (tree, _head) = kernel_repo();
    let runner = Arc::new(ScriptedRunner::new());
    let build = orchestrator(&runner, None, 5_000, &host, tree.path());

    let result = build
        .build(
            &host.ctx(),
            &request("deadbeefdeadbeef", ConfigSource::None),
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(SafetyError::Checkout { .. })));
    assert!(!runner.called("git"));
}

#[tokio::test]
async fn cancellation_surfaces_as_cancelled() {
    let host = Host::new();
    let (tree, head) = kernel_repo();
    let runner = Arc::new(ScriptedRunner::new());
    let build = orchestrator(&runner, None, 5_000, &host, tree.path());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = build
        .build(&host.ctx(), &request(&head, ConfigSource::None), &cancel)
        .await;

    assert!(matches!(result, Err(SafetyError::Cancelled)));
    assert!(runner.calls().is_empty());
}
