use kb_guard::inventory;

use crate::cli::GlobalFlags;
use crate::context::HostApp;
use crate::output::output;

/// Handle `kbisect-host list`.
pub fn handle(app: &HostApp, flags: &GlobalFlags) -> anyhow::Result<()> {
    let ctx = app.host_context()?;
    let kernels = inventory::enumerate(&ctx)?;
    output(&kernels, flags.format)
}
