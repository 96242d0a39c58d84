use std::path::PathBuf;
use std::sync::Arc;

use kb_exec::{CommandRunner, ToolLocator};

use crate::bls::BlsBootloader;
use crate::grub::GrubBootloader;
use crate::loader::Bootloader;

/// Filesystem locations the bootloader implementations need.
#[derive(Debug, Clone)]
pub struct BootPaths {
    pub boot_dir: PathBuf,
    pub loader_entries_dir: PathBuf,
}

/// Select the bootloader family from the installed control tools.
///
/// Returns `None` when no one-time boot primitive is installed at all.
pub fn probe(
    tools: &dyn ToolLocator,
    runner: Arc<dyn CommandRunner>,
    paths: &BootPaths,
) -> Option<Arc<dyn Bootloader>> {
    if tools.has("grubby") && tools.has("grub2-reboot") && tools.has("grub2-editenv") {
        tracing::debug!("bootloader family: bls (grubby + grub2-reboot)");
        return Some(Arc::new(BlsBootloader::new(
            runner,
            &paths.loader_entries_dir,
            paths.boot_dir.join("grub2").join("grub.cfg"),
        )));
    }

    for prefix in ["grub", "grub2"] {
        if tools.has(&format!("{prefix}-reboot")) {
            tracing::debug!(prefix, "bootloader family: grub ({prefix}-reboot)");
            return Some(Arc::new(GrubBootloader::new(
                runner,
                prefix,
                paths.boot_dir.join(prefix).join("grub.cfg"),
            )));
        }
    }

    tracing::warn!("no one-time boot tool found (grub2-reboot, grub-reboot)");
    None
}

#[cfg(test)]
mod tests {
    use kb_exec::fake::{FakeTools, ScriptedRunner};

    use super::*;
    use crate::loader::BootFamily;

    fn paths() -> BootPaths {
        BootPaths {
            boot_dir: PathBuf::from("/boot"),
            loader_entries_dir: PathBuf::from("/boot/loader/entries"),
        }
    }

    fn family(tools: &[&str]) -> Option<BootFamily> {
        probe(&FakeTools::with(tools), Arc::new(ScriptedRunner::new()), &paths())
            .map(|loader| loader.family())
    }

    #[test]
    fn grubby_hosts_use_bls_ids() {
        assert_eq!(
            family(&["grubby", "grub2-reboot", "grub2-editenv"]),
            Some(BootFamily::Bls)
        );
    }

    #[test]
    fn debian_hosts_use_raw_versions() {
        assert_eq!(family(&["grub-reboot", "grub-editenv"]), Some(BootFamily::Grub));
    }

    #[test]
    fn grub2_without_grubby_uses_raw_versions() {
        assert_eq!(family(&["grub2-reboot", "grub2-editenv"]), Some(BootFamily::Grub));
    }

    #[test]
    fn no_tools_means_no_support() {
        assert_eq!(family(&["grubby"]), None);
        assert_eq!(family(&[]), None);
    }
}
