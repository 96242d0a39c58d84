//! # kb-boot
//!
//! Bootloader control for kbisect.
//!
//! Two bootloader families are supported behind the [`Bootloader`] trait:
//! - [`BlsBootloader`]: `grubby` + `grub2-reboot`, entries named by their
//!   structured BLS id
//! - [`GrubBootloader`]: `grub-reboot` (or bare `grub2-reboot`), entries
//!   named by the raw kernel release
//!
//! [`probe`] selects the family from the installed tools. The arming
//! protocol in [`arming`] is written once against the trait and always
//! verifies the transient override by reading it back.

pub mod arming;
mod bls;
mod editenv;
mod error;
mod grub;
mod loader;
mod probe;
pub mod sticky;

pub use arming::{arm, disarm};
pub use bls::BlsBootloader;
pub use error::BootError;
pub use grub::GrubBootloader;
pub use loader::{BootFamily, Bootloader};
pub use probe::{BootPaths, probe};
