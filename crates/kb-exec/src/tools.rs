use std::path::PathBuf;

/// Finds executables on the host.
pub trait ToolLocator: Send + Sync {
    fn find(&self, tool: &str) -> Option<PathBuf>;

    fn has(&self, tool: &str) -> bool {
        self.find(tool).is_some()
    }

    /// First tool from `candidates` that is installed.
    fn first_of<'a>(&self, candidates: &[&'a str]) -> Option<&'a str> {
        candidates.iter().copied().find(|tool| self.has(tool))
    }
}

/// Looks tools up on `PATH` plus the sbin directories root shells usually have.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTools;

const EXTRA_DIRS: &[&str] = &["/usr/sbin", "/sbin", "/usr/local/sbin"];

impl ToolLocator for SystemTools {
    fn find(&self, tool: &str) -> Option<PathBuf> {
        if let Ok(path) = which::which(tool) {
            return Some(path);
        }
        EXTRA_DIRS
            .iter()
            .map(|dir| PathBuf::from(dir).join(tool))
            .find(|path| path.is_file())
    }
}
