use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("`{command}` cancelled")]
    Cancelled { command: String },
}

impl ExecError {
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

impl From<ExecError> for kb_core::SafetyError {
    fn from(error: ExecError) -> Self {
        if error.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Other(anyhow::Error::new(error))
        }
    }
}
