//! # kb-build
//!
//! Everything between "a commit id" and "an installed, labeled, armed
//! kernel". [`BuildOrchestrator::build`] runs the whole sequence:
//!
//! 1. pre-clean (`evict(1)`, then crash-dump images)
//! 2. headroom check, with `evict(0)` as the emergency escalation
//! 3. checkout of the resolved commit
//! 4. label and configure
//! 5. compile and install, then re-assert the protected default
//! 6. initramfs regeneration with a driver list, plain fallback
//! 7. panic-reboot boot parameter
//! 8. one-time boot arming
//!
//! The first fatal step ends the run. Compile or install failures put the
//! previous `.config` back before returning.

pub mod configure;
pub mod deps;
pub mod initramfs;
mod make;
mod orchestrator;
pub mod source;

pub use initramfs::InitramfsOutcome;
pub use orchestrator::{BuildOrchestrator, BuildOutcome, BuildSettings};
pub use source::{KernelTree, ResolvedCommit};
