//! # kb-core
//!
//! Core types and error taxonomy for the kbisect host safety controller.
//!
//! This crate provides the foundational types shared across all kbisect crates:
//! - Entity structs for the host model (kernel artifacts, protection record,
//!   disk samples, one-time boot entries)
//! - Bisection-label derivation and matching
//! - The explicit [`HostContext`] handed to every component
//! - The [`SafetyError`] taxonomy and its propagation scopes

pub mod context;
pub mod entities;
pub mod errors;
pub mod label;
pub mod request;

pub use context::HostContext;
pub use entities::{
    DiskSpaceSample, EntryIdentifier, KernelArtifact, KernelImages, OneTimeBootEntry,
    ProtectionRecord,
};
pub use errors::{BuildStage, ErrorScope, SafetyError};
pub use label::BisectLabel;
pub use request::{BuildRequest, ConfigSource};
