//! In-memory doubles for [`CommandRunner`] and [`ToolLocator`].
//!
//! Used by the tests of every crate that drives host commands.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::command::{CommandOutput, CommandSpec};
use crate::error::ExecError;
use crate::runner::CommandRunner;
use crate::tools::ToolLocator;

#[derive(Debug)]
struct Rule {
    prefix: String,
    output: CommandOutput,
    once: bool,
}

/// Returns programmed outputs for command lines and records every call.
///
/// Rules are matched by command-line prefix in insertion order; a `once`
/// rule is consumed by its first match. Unmatched commands succeed with
/// empty output.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<String>>,
    interrupts: Mutex<Vec<(String, CancellationToken)>>,
}

impl ScriptedRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every command starting with `prefix` with `output`.
    #[must_use]
    pub fn on(self, prefix: impl Into<String>, output: CommandOutput) -> Self {
        self.push(prefix.into(), output, false);
        self
    }

    /// Answer only the next command starting with `prefix`.
    #[must_use]
    pub fn once(self, prefix: impl Into<String>, output: CommandOutput) -> Self {
        self.push(prefix.into(), output, true);
        self
    }

    /// Fire `token` when a command starting with `prefix` runs, as a
    /// signal arriving mid-command would. That command is recorded and then
    /// fails as cancelled.
    #[must_use]
    pub fn cancel_on(self, prefix: impl Into<String>, token: &CancellationToken) -> Self {
        self.interrupts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((prefix.into(), token.clone()));
        self
    }

    /// Command lines seen so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn called(&self, prefix: &str) -> bool {
        self.calls().iter().any(|call| call.starts_with(prefix))
    }

    fn push(&self, prefix: String, output: CommandOutput, once: bool) {
        self.rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Rule {
                prefix,
                output,
                once,
            });
    }

    fn answer(&self, line: &str) -> CommandOutput {
        let mut rules = self.rules.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(index) = rules.iter().position(|rule| line.starts_with(&rule.prefix)) else {
            return CommandOutput::ok("");
        };
        if rules[index].once {
            rules.remove(index).output
        } else {
            rules[index].output.clone()
        }
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, ExecError> {
        let line = spec.command_line();
        if cancel.is_cancelled() {
            return Err(ExecError::Cancelled { command: line });
        }
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.clone());

        let mut interrupted = false;
        for (prefix, token) in self
            .interrupts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            if line.starts_with(prefix.as_str()) {
                token.cancel();
                interrupted = true;
            }
        }
        if interrupted && cancel.is_cancelled() {
            return Err(ExecError::Cancelled { command: line });
        }
        Ok(self.answer(&line))
    }
}

/// A fixed set of installed tools.
#[derive(Debug, Clone, Default)]
pub struct FakeTools {
    installed: BTreeSet<String>,
}

impl FakeTools {
    #[must_use]
    pub fn with(tools: &[&str]) -> Self {
        Self {
            installed: tools.iter().map(ToString::to_string).collect(),
        }
    }
}

impl ToolLocator for FakeTools {
    fn find(&self, tool: &str) -> Option<PathBuf> {
        self.installed
            .contains(tool)
            .then(|| PathBuf::from("/usr/sbin").join(tool))
    }
}
