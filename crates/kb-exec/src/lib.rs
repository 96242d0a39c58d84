//! # kb-exec
//!
//! External command execution for kbisect.
//!
//! Every command the controller runs (git, make, bootloader tools, initramfs
//! generators) goes through [`CommandRunner`], so that:
//! - each invocation races a caller-owned `CancellationToken`
//! - stdin is closed and interactive prompts cannot block
//! - tests can substitute `fake::ScriptedRunner` for the real host
//!
//! Tool presence is probed through [`ToolLocator`] for the same reason.
//!
//! The `fake` doubles are compiled only with the `test-support` feature,
//! which the other workspace crates enable from their dev-dependencies.

mod command;
mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod fake;
mod runner;
mod tools;

pub use command::{CommandOutput, CommandSpec};
pub use error::ExecError;
pub use runner::{CommandRunner, SystemRunner};
pub use tokio_util::sync::CancellationToken;
pub use tools::{SystemTools, ToolLocator};
