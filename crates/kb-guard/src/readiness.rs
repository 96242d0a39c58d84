//! Host readiness checks run by `kbisect-host status`.

use std::path::Path;

use kb_boot::Bootloader;
use kb_boot::sticky::is_saved_mode;
use kb_exec::CancellationToken;
use serde::Serialize;

use crate::ledger::ProtectionLedger;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReadinessCheck {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    pub ready: bool,
    pub checks: Vec<ReadinessCheck>,
}

impl ReadinessReport {
    fn from_checks(checks: Vec<ReadinessCheck>) -> Self {
        Self {
            ready: checks.iter().all(|check| check.passed),
            checks,
        }
    }

    #[must_use]
    pub fn failed(&self) -> Vec<&ReadinessCheck> {
        self.checks.iter().filter(|check| !check.passed).collect()
    }
}

fn check(name: &'static str, passed: bool, detail: impl Into<String>) -> ReadinessCheck {
    ReadinessCheck {
        name,
        passed,
        detail: detail.into(),
    }
}

/// Run every check; never fails, each problem becomes a failed check.
pub async fn assess(
    ledger: &ProtectionLedger,
    bootloader: Option<&dyn Bootloader>,
    grub_defaults: &Path,
    kernel_src: &Path,
    cancel: &CancellationToken,
) -> ReadinessReport {
    let mut checks = Vec::new();

    let state_dir = ledger.state_dir();
    checks.push(check(
        "state_dir",
        state_dir.is_dir(),
        state_dir.display().to_string(),
    ));

    let record = ledger.load();
    checks.push(match &record {
        Ok(record) => check("protection_record", true, record.safe_version.clone()),
        Err(error) => check("protection_record", false, error.to_string()),
    });

    let list = ledger.paths_file();
    checks.push(check("protected_list", list.is_file(), list.display().to_string()));

    if let Ok(record) = &record {
        let missing = record.missing_paths();
        checks.push(if missing.is_empty() {
            check(
                "protected_paths",
                true,
                format!("{} path(s) present", record.protected_paths().len()),
            )
        } else {
            check(
                "protected_paths",
                false,
                format!("missing: {}", display_paths(&missing)),
            )
        });
    }

    match bootloader {
        Some(loader) => {
            checks.push(check("bootloader", true, loader.family().to_string()));
            if let Ok(record) = &record {
                checks.push(persistent_default_check(loader, record, cancel).await);
            }
        }
        None => checks.push(check("bootloader", false, "no one-time boot tool found")),
    }

    checks.push(match std::fs::read_to_string(grub_defaults) {
        Ok(contents) if is_saved_mode(&contents) => {
            check("saved_default_mode", true, "GRUB_DEFAULT=saved")
        }
        Ok(_) => check(
            "saved_default_mode",
            false,
            format!("{} does not set GRUB_DEFAULT=saved", grub_defaults.display()),
        ),
        Err(error) => check(
            "saved_default_mode",
            false,
            format!("{}: {error}", grub_defaults.display()),
        ),
    });

    let makefile = kernel_src.join("Makefile");
    checks.push(check(
        "kernel_source",
        makefile.is_file(),
        kernel_src.display().to_string(),
    ));

    ReadinessReport::from_checks(checks)
}

async fn persistent_default_check(
    loader: &dyn Bootloader,
    record: &kb_core::ProtectionRecord,
    cancel: &CancellationToken,
) -> ReadinessCheck {
    let version = record.safe_version.as_str();
    match loader.persistent_default(cancel).await {
        Ok(Some(reported))
            if loader.default_designates(&reported, version, &record.safe_image_path) =>
        {
            check("persistent_default", true, reported)
        }
        Ok(reported) => check(
            "persistent_default",
            false,
            format!("default is {reported:?}, expected {version}"),
        ),
        Err(error) => check("persistent_default", false, error.to_string()),
    }
}

fn display_paths(paths: &[std::path::PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
