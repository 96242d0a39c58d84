use kb_core::SafetyError;
use kb_exec::ExecError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BootError {
    #[error(transparent)]
    Command(#[from] ExecError),

    #[error("no boot entry found for kernel {version}")]
    EntryNotFound { version: String },

    #[error("{operation} is not supported by the {family} bootloader family")]
    Unsupported {
        family: &'static str,
        operation: &'static str,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<BootError> for SafetyError {
    fn from(error: BootError) -> Self {
        match error {
            BootError::Command(exec) => exec.into(),
            BootError::EntryNotFound { version } => Self::EntryResolution { version },
            other => Self::Other(anyhow::Error::new(other)),
        }
    }
}
