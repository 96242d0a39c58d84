//! One-time boot arming protocol.
//!
//! `arm` never trusts the arming command's exit status on its own: the
//! transient override is read back and must name exactly the requested
//! entry. Anything else is disarmed and reported as unverified.
//!
//! Disarming runs on its own token so a cancelled caller never leaves a
//! half-armed override behind.

use std::path::Path;

use kb_core::{OneTimeBootEntry, SafetyError};
use kb_exec::CancellationToken;

use crate::loader::Bootloader;

/// Arm `version` (installed at `image`) for the next boot only.
///
/// # Errors
///
/// - [`SafetyError::NoOneTimeBootSupport`] when `bootloader` is `None`
/// - [`SafetyError::EntryResolution`] when the entry id cannot be found
/// - [`SafetyError::OneTimeBootVerification`] when the override does not
///   read back as requested
/// - [`SafetyError::Cancelled`] when `cancel` fires once arming has begun;
///   the override is cleared first
pub async fn arm(
    bootloader: Option<&dyn Bootloader>,
    version: &str,
    image: &Path,
    cancel: &CancellationToken,
) -> Result<OneTimeBootEntry, SafetyError> {
    let Some(bootloader) = bootloader else {
        tracing::error!(version, "no one-time boot primitive; refusing to change the default");
        return Err(SafetyError::NoOneTimeBootSupport);
    };

    let entry_identifier = bootloader.resolve_entry(version, image, cancel).await?;
    tracing::info!(
        version,
        family = %bootloader.family(),
        entry = %entry_identifier,
        "arming one-time boot"
    );

    if let Err(error) = bootloader.arm_once(&entry_identifier, cancel).await {
        tracing::error!(version, %error, "one-time boot command failed");
        let error = SafetyError::from(error);
        disarm(bootloader).await;
        if cancel.is_cancelled() || matches!(error, SafetyError::Cancelled) {
            return Err(SafetyError::Cancelled);
        }
        return Err(SafetyError::OneTimeBootVerification {
            requested: entry_identifier.to_string(),
            observed: None,
        });
    }

    let observed = match bootloader.one_time_state(cancel).await {
        Ok(state) => state,
        Err(error) => {
            tracing::error!(version, %error, "could not read back one-time boot state");
            None
        }
    };

    if cancel.is_cancelled() {
        tracing::warn!(version, "cancelled while arming; clearing one-time boot override");
        disarm(bootloader).await;
        return Err(SafetyError::Cancelled);
    }

    if observed.as_deref() != Some(entry_identifier.as_str()) {
        tracing::error!(
            version,
            requested = %entry_identifier,
            observed = ?observed,
            "one-time boot readback mismatch"
        );
        disarm(bootloader).await;
        return Err(SafetyError::OneTimeBootVerification {
            requested: entry_identifier.to_string(),
            observed,
        });
    }

    tracing::info!(version, entry = %entry_identifier, "one-time boot armed and verified");
    Ok(OneTimeBootEntry {
        entry_identifier,
        target_version: version.to_string(),
    })
}

/// Best-effort removal of any outstanding one-time override.
///
/// Runs to completion even after the caller's token has fired.
pub async fn disarm(bootloader: &dyn Bootloader) {
    match bootloader.clear_one_time(&CancellationToken::new()).await {
        Ok(()) => tracing::info!("cleared one-time boot override"),
        Err(error) => tracing::warn!(%error, "failed to clear one-time boot override"),
    }
}
