//! Exclusive host lock for mutating subcommands.
//!
//! The lock is a file holding the owner's PID. A lock whose PID is no
//! longer alive is reclaimed; a live one fails immediately.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;

pub const LOCK_FILE: &str = "controller.lock";

/// Removes the lock file when dropped.
#[derive(Debug)]
pub struct HostLockGuard {
    path: PathBuf,
}

impl Drop for HostLockGuard {
    fn drop(&mut self) {
        if let Err(error) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), %error, "could not release host lock");
        }
    }
}

#[derive(Debug)]
enum LockState {
    HeldBy(u32),
    Stale(Option<u32>),
}

pub fn acquire(state_dir: &Path) -> anyhow::Result<HostLockGuard> {
    std::fs::create_dir_all(state_dir)
        .with_context(|| format!("failed to create state directory {}", state_dir.display()))?;
    let lock_path = state_dir.join(LOCK_FILE);

    match try_acquire(&lock_path)? {
        Ok(guard) => Ok(guard),
        Err(LockState::HeldBy(pid)) => anyhow::bail!(
            "another kbisect-host operation is running (pid {pid}); lock at {}",
            lock_path.display()
        ),
        Err(LockState::Stale(pid)) => {
            tracing::warn!(path = %lock_path.display(), pid = ?pid, "reclaiming stale host lock");
            std::fs::remove_file(&lock_path).with_context(|| {
                format!("failed to remove stale lock {}", lock_path.display())
            })?;
            match try_acquire(&lock_path)? {
                Ok(guard) => Ok(guard),
                Err(_) => anyhow::bail!(
                    "host lock at {} was taken while reclaiming it",
                    lock_path.display()
                ),
            }
        }
    }
}

fn try_acquire(lock_path: &Path) -> anyhow::Result<Result<HostLockGuard, LockState>> {
    match OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(lock_path)
    {
        Ok(mut file) => {
            let guard = HostLockGuard {
                path: lock_path.to_path_buf(),
            };
            writeln!(file, "{}", std::process::id())
                .with_context(|| format!("failed to write {}", lock_path.display()))?;
            tracing::debug!(path = %lock_path.display(), "host lock acquired");
            Ok(Ok(guard))
        }
        Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => {
            let contents = std::fs::read_to_string(lock_path)
                .with_context(|| format!("failed to read {}", lock_path.display()))?;
            let pid = contents.trim().parse::<u32>().ok();
            Ok(Err(match pid {
                Some(pid) if is_process_running(pid) => LockState::HeldBy(pid),
                other => LockState::Stale(other),
            }))
        }
        Err(error) => {
            Err(error).with_context(|| format!("failed to create {}", lock_path.display()))
        }
    }
}

fn is_process_running(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}
