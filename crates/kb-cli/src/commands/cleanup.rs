use kb_guard::{CrashDumpReport, EvictionReport, RetentionManager};
use serde::Serialize;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::CleanupArgs;
use crate::context::HostApp;
use crate::output::output;

#[derive(Debug, Serialize)]
struct CleanupResponse {
    eviction: EvictionReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    crash_dumps: Option<CrashDumpReport>,
}

/// Handle `kbisect-host cleanup`.
pub fn handle(args: &CleanupArgs, app: &HostApp, flags: &GlobalFlags) -> anyhow::Result<()> {
    let ctx = app.host_context()?;
    let retention = RetentionManager::new(&ctx);
    let keep = args.keep.unwrap_or(app.config.policy.keep_count);

    let eviction = retention.evict(keep)?;
    let crash_dumps = if args.crash_dumps {
        Some(retention.evict_crash_dump_artifacts()?)
    } else {
        None
    };

    output(
        &CleanupResponse {
            eviction,
            crash_dumps,
        },
        flags.format,
    )
}
