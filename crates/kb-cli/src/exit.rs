//! Error reporting and exit codes for the coordinating host.
//!
//! | code | meaning |
//! |------|---------|
//! | 1 | not ready, bad usage, or an internal failure |
//! | 2 | session-fatal: stop the bisection until an operator intervenes |
//! | 3 | iteration-fatal: abort this iteration |
//! | 4 | this commit is untestable; the bisection may skip it |

use kb_config::ConfigError;
use kb_core::{ErrorScope, SafetyError};
use serde::Serialize;

/// Returned by `status` after the report has been printed.
#[derive(Debug)]
pub struct NotReady;

impl std::fmt::Display for NotReady {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("host is not ready for bisection")
    }
}

impl std::error::Error for NotReady {}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

/// Print `error` for humans and machines and pick the process exit code.
pub fn report(error: &anyhow::Error) -> i32 {
    if error.downcast_ref::<NotReady>().is_some() {
        return 1;
    }

    eprintln!("kbisect-host error: {error:#}");
    let body = classify(error);
    match serde_json::to_string(&body) {
        Ok(json) => println!("{json}"),
        Err(encode) => eprintln!("kbisect-host: could not encode error: {encode}"),
    }
    exit_code(error)
}

fn classify(error: &anyhow::Error) -> ErrorBody {
    let kind = if let Some(safety) = error.downcast_ref::<SafetyError>() {
        safety.kind()
    } else if error.downcast_ref::<ConfigError>().is_some() {
        "config_error"
    } else {
        "internal_error"
    };
    ErrorBody {
        error: kind,
        message: format!("{error:#}"),
    }
}

fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<SafetyError>().map(SafetyError::scope) {
        Some(ErrorScope::Session) => 2,
        Some(ErrorScope::Iteration) => 3,
        Some(ErrorScope::Recoverable) => 4,
        None => 1,
    }
}
