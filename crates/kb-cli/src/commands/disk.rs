use std::path::Path;

use kb_core::DiskSpaceSample;
use serde::Serialize;

use crate::cli::GlobalFlags;
use crate::context::HostApp;
use crate::output::output;

#[derive(Debug, Serialize)]
struct DiskResponse<'a> {
    volume: &'a Path,
    #[serde(flatten)]
    sample: DiskSpaceSample,
    min_free_mb: u64,
    has_headroom: bool,
}

/// Handle `kbisect-host disk`.
pub fn handle(app: &HostApp, flags: &GlobalFlags) -> anyhow::Result<()> {
    let governor = app.governor();
    let sample = governor.sample()?;
    let min_free_mb = app.config.policy.min_free_mb;

    output(
        &DiskResponse {
            volume: governor.volume(),
            sample,
            min_free_mb,
            has_headroom: sample.has_headroom(min_free_mb),
        },
        flags.format,
    )
}
