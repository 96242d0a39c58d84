//! Entity types for the host model.

mod artifact;
mod boot_entry;
mod disk;
mod protection;

pub use artifact::{KernelArtifact, KernelImages};
pub use boot_entry::{EntryIdentifier, OneTimeBootEntry};
pub use disk::DiskSpaceSample;
pub use protection::ProtectionRecord;
