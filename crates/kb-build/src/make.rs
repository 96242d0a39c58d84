use std::path::Path;

use kb_core::{BisectLabel, BuildStage, SafetyError};
use kb_exec::{CancellationToken, CommandOutput, CommandRunner, CommandSpec};

/// `make` invocations against one tree with fixed `ARCH` and label.
pub struct Make<'a> {
    pub root: &'a Path,
    pub arch: &'a str,
    pub label: &'a BisectLabel,
}

impl Make<'_> {
    pub fn spec<I, S>(&self, targets: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::new("make")
            .arg(format!("ARCH={}", self.arch))
            .arg(format!("LOCALVERSION={}", self.label.local_version()))
            .args(targets)
            .current_dir(self.root)
    }

    pub async fn run<I, S>(
        &self,
        runner: &dyn CommandRunner,
        stage: BuildStage,
        targets: I,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, SafetyError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let spec = self.spec(targets);
        tracing::info!(%stage, command = %spec, "build step");
        runner
            .run_checked(&spec, cancel)
            .await
            .map_err(|error| stage_error(stage, error))
    }
}

pub fn stage_error(stage: BuildStage, error: kb_exec::ExecError) -> SafetyError {
    if error.is_cancelled() {
        SafetyError::Cancelled
    } else {
        tracing::error!(%stage, %error, "build step failed");
        SafetyError::BuildFailed {
            stage,
            reason: error.to_string(),
        }
    }
}
