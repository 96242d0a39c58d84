use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use kb_boot::GrubBootloader;
use kb_core::SafetyError;
use kb_exec::CancellationToken;
use kb_exec::CommandOutput;
use kb_exec::fake::ScriptedRunner;
use kb_guard::{ProtectionLedger, ProtectionSetup};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const HOST: &str = "5.14.0-host";

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let boot = dir.path().join("boot");
        fs::create_dir_all(boot.join("loader/entries")).expect("entries");
        fs::create_dir_all(dir.path().join("lib/modules").join(HOST)).expect("modules");
        for name in [
            format!("vmlinuz-{HOST}"),
            format!("initramfs-{HOST}.img"),
            format!("initramfs-{HOST}kdump.img"),
            format!("System.map-{HOST}"),
            format!("config-{HOST}"),
            "vmlinuz-5.15.0-bisect-aaa1111".to_string(),
        ] {
            fs::write(boot.join(name), b"x").expect("boot file");
        }
        fs::write(
            boot.join("loader/entries").join(format!("0a1b2c-{HOST}.conf")),
            b"title host\n",
        )
        .expect("entry");
        fs::write(dir.path().join("grub"), "GRUB_TIMEOUT=5\nGRUB_DEFAULT=0\n").expect("defaults");
        Self { dir }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    fn ledger(&self) -> ProtectionLedger {
        ProtectionLedger::new(self.path("state"))
    }
}

fn setup<'a>(
    paths: &'a (PathBuf, PathBuf, PathBuf, PathBuf),
    running: &'a str,
    bootloader: Option<&'a GrubBootloader>,
) -> ProtectionSetup<'a> {
    ProtectionSetup {
        running_kernel: running,
        boot_dir: &paths.0,
        modules_dir: &paths.1,
        loader_entries_dir: &paths.2,
        grub_defaults: &paths.3,
        bootloader: bootloader.map(|loader| loader as &dyn kb_boot::Bootloader),
        force: false,
    }
}

fn paths(fixture: &Fixture) -> (PathBuf, PathBuf, PathBuf, PathBuf) {
    (
        fixture.path("boot"),
        fixture.path("lib/modules"),
        fixture.path("boot/loader/entries"),
        fixture.path("grub"),
    )
}

fn confirming_runner() -> Arc<ScriptedRunner> {
    Arc::new(ScriptedRunner::new().on(
        "grub-editenv - list",
        CommandOutput::ok(format!("saved_entry={HOST}\n")),
    ))
}

#[tokio::test]
async fn init_records_running_kernel_and_sets_persistent_default() {
    let fixture = Fixture::new();
    let paths = paths(&fixture);
    let runner = confirming_runner();
    let loader = GrubBootloader::new(runner.clone(), "grub", fixture.path("boot/grub/grub.cfg"));
    let ledger = fixture.ledger();

    let record = ledger
        .init_protection(
            &setup(&paths, HOST, Some(&loader)),
            &CancellationToken::new(),
        )
        .await
        .expect("init");

    assert_eq!(record.safe_version, HOST);
    let boot = fixture.path("boot");
    assert!(record.is_protected(&boot.join(format!("vmlinuz-{HOST}"))));
    assert!(record.is_protected(&boot.join(format!("initramfs-{HOST}.img"))));
    assert!(record.is_protected(&fixture.path("lib/modules").join(HOST).join("kernel/x.ko")));
    assert!(record.is_protected(
        &boot.join("loader/entries").join(format!("0a1b2c-{HOST}.conf"))
    ));
    assert!(!record.is_protected(&boot.join(format!("initramfs-{HOST}kdump.img"))));
    assert!(!record.is_protected(&boot.join("vmlinuz-5.15.0-bisect-aaa1111")));

    assert!(runner.called(&format!("grub-set-default {HOST}")));
    assert!(runner.called("grub-mkconfig -o"));
    assert_eq!(
        fs::read_to_string(fixture.path("grub")).expect("defaults"),
        "GRUB_TIMEOUT=5\nGRUB_DEFAULT=saved\n"
    );
    assert_eq!(ledger.load().expect("reload"), record);
}

#[tokio::test]
async fn default_that_does_not_read_back_fails_setup() {
    let fixture = Fixture::new();
    let paths = paths(&fixture);
    let runner = Arc::new(ScriptedRunner::new().on(
        "grub-editenv - list",
        CommandOutput::ok("saved_entry=5.15.0-bisect-aaa1111\n"),
    ));
    let loader = GrubBootloader::new(runner, "grub", fixture.path("boot/grub/grub.cfg"));
    let ledger = fixture.ledger();

    let result = ledger
        .init_protection(
            &setup(&paths, HOST, Some(&loader)),
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(SafetyError::ProtectionSetup(_))));
    assert!(!ledger.is_initialized());
}

#[tokio::test]
async fn refuses_to_protect_a_bisection_kernel() {
    let fixture = Fixture::new();
    let paths = paths(&fixture);
    let runner = confirming_runner();
    let loader = GrubBootloader::new(runner.clone(), "grub", fixture.path("boot/grub/grub.cfg"));

    let result = fixture
        .ledger()
        .init_protection(
            &setup(&paths, "5.15.0-bisect-aaa1111", Some(&loader)),
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(SafetyError::ProtectionSetup(_))));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn missing_bootloader_fails_setup() {
    let fixture = Fixture::new();
    let paths = paths(&fixture);

    let result = fixture
        .ledger()
        .init_protection(&setup(&paths, HOST, None), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(SafetyError::ProtectionSetup(_))));
}

#[tokio::test]
async fn reinit_on_same_kernel_keeps_existing_paths() {
    let fixture = Fixture::new();
    let paths = paths(&fixture);
    let runner = confirming_runner();
    let loader = GrubBootloader::new(runner, "grub", fixture.path("boot/grub/grub.cfg"));
    let ledger = fixture.ledger();
    let cancel = CancellationToken::new();

    let first = ledger
        .init_protection(&setup(&paths, HOST, Some(&loader)), &cancel)
        .await
        .expect("first init");
    fs::write(fixture.path("boot").join(format!("vmlinuz-{HOST}.hmac")), b"x").expect("hmac");
    let second = ledger
        .init_protection(&setup(&paths, HOST, Some(&loader)), &cancel)
        .await
        .expect("second init");

    assert_eq!(first.locked_at, second.locked_at);
    assert_eq!(
        &second.protected_paths()[..first.protected_paths().len()],
        first.protected_paths()
    );
    assert_eq!(second.protected_paths().len(), first.protected_paths().len() + 1);
}
