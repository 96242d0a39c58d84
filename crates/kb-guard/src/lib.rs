//! # kb-guard
//!
//! The parts of kbisect that decide what may be deleted:
//! - [`ledger`]: the persisted protection record and its bootloader setup
//! - [`disk`]: free-space sampling of the boot volume
//! - [`inventory`]: enumeration of installed kernels into typed artifacts
//! - [`retention`]: bounded eviction of old bisection kernels
//! - [`readiness`]: host readiness checks before a bisection session

pub mod disk;
pub mod inventory;
pub mod ledger;
pub mod readiness;
pub mod retention;

pub use disk::{DiskGovernor, FsSpaceProbe, SpaceProbe};
pub use ledger::{ProtectionLedger, ProtectionSetup, ensure_persistent_default};
pub use readiness::{ReadinessCheck, ReadinessReport};
pub use retention::{
    ArtifactRemoval, CrashDumpReport, EvictionReport, PathKind, RemovalOutcome, RetentionManager,
    StepStatus,
};
