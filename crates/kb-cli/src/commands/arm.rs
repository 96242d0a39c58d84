use kb_boot::arm;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::ArmArgs;
use crate::context::HostApp;
use crate::output::output;

/// Handle `kbisect-host arm <version>`.
pub async fn handle(args: &ArmArgs, app: &HostApp, flags: &GlobalFlags) -> anyhow::Result<()> {
    let image = app
        .config
        .paths
        .boot_dir
        .join(format!("vmlinuz-{}", args.version));
    if !image.is_file() {
        anyhow::bail!(
            "kernel {} is not installed ({} not found)",
            args.version,
            image.display()
        );
    }

    let entry = arm(app.bootloader(), &args.version, &image, &app.cancel).await?;
    output(&entry, flags.format)
}
