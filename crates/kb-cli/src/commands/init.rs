use kb_core::ProtectionRecord;
use kb_guard::ProtectionSetup;
use serde::Serialize;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::InitArgs;
use crate::context::HostApp;
use crate::output::output;

#[derive(Debug, Serialize)]
struct InitResponse<'a> {
    #[serde(flatten)]
    record: &'a ProtectionRecord,
    record_path: std::path::PathBuf,
}

/// Handle `kbisect-host init`.
pub async fn handle(args: &InitArgs, app: &HostApp, flags: &GlobalFlags) -> anyhow::Result<()> {
    let paths = &app.config.paths;
    let setup = ProtectionSetup {
        running_kernel: &app.running_kernel,
        boot_dir: &paths.boot_dir,
        modules_dir: &paths.modules_dir,
        loader_entries_dir: &paths.loader_entries_dir,
        grub_defaults: &paths.grub_defaults,
        bootloader: app.bootloader(),
        force: args.force,
    };

    let record = app.ledger.init_protection(&setup, &app.cancel).await?;
    output(
        &InitResponse {
            record: &record,
            record_path: app.ledger.record_path(),
        },
        flags.format,
    )
}
