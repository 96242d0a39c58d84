use kb_guard::readiness;

use crate::cli::GlobalFlags;
use crate::context::HostApp;
use crate::exit::NotReady;
use crate::output::output;

/// Handle `kbisect-host status`. Exits 1 when any check fails.
pub async fn handle(app: &HostApp, flags: &GlobalFlags) -> anyhow::Result<()> {
    let report = readiness::assess(
        &app.ledger,
        app.bootloader(),
        &app.config.paths.grub_defaults,
        &app.config.paths.kernel_src,
        &app.cancel,
    )
    .await;

    for check in report.failed() {
        tracing::warn!(check = check.name, detail = %check.detail, "readiness check failed");
    }
    output(&report, flags.format)?;

    if report.ready {
        Ok(())
    } else {
        Err(NotReady.into())
    }
}
