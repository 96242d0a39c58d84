use serde::Serialize;

use crate::cli::GlobalFlags;
use crate::context::HostApp;
use crate::output::output;

#[derive(Debug, Serialize)]
struct VerifyResponse<'a> {
    verified: bool,
    safe_version: &'a str,
    protected_paths: usize,
}

/// Handle `kbisect-host verify`.
pub fn handle(app: &HostApp, flags: &GlobalFlags) -> anyhow::Result<()> {
    let ctx = app.host_context()?;
    let record = ctx.protection();
    record.verify()?;

    output(
        &VerifyResponse {
            verified: true,
            safe_version: &record.safe_version,
            protected_paths: record.protected_paths().len(),
        },
        flags.format,
    )
}
