use std::sync::Arc;

use anyhow::Context;
use kb_boot::{BootPaths, Bootloader};
use kb_config::KbConfig;
use kb_core::context::read_running_release;
use kb_core::{HostContext, SafetyError};
use kb_exec::{CancellationToken, CommandRunner, SystemRunner, SystemTools, ToolLocator};
use kb_guard::{DiskGovernor, FsSpaceProbe, ProtectionLedger};

/// Host collaborators wired once at startup and shared by every handler.
pub struct HostApp {
    pub config: KbConfig,
    pub runner: Arc<dyn CommandRunner>,
    pub tools: Arc<dyn ToolLocator>,
    pub bootloader: Option<Arc<dyn Bootloader>>,
    pub ledger: ProtectionLedger,
    pub running_kernel: String,
    pub cancel: CancellationToken,
}

impl HostApp {
    pub fn init(config: KbConfig, cancel: CancellationToken) -> anyhow::Result<Self> {
        let running_kernel =
            read_running_release().context("failed to read the running kernel release")?;

        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
        let tools: Arc<dyn ToolLocator> = Arc::new(SystemTools);
        let bootloader = kb_boot::probe(
            tools.as_ref(),
            Arc::clone(&runner),
            &BootPaths {
                boot_dir: config.paths.boot_dir.clone(),
                loader_entries_dir: config.paths.loader_entries_dir.clone(),
            },
        );
        let ledger = ProtectionLedger::new(&config.paths.state_dir);

        tracing::debug!(
            running = %running_kernel,
            bootloader = ?bootloader.as_ref().map(|loader| loader.family()),
            state_dir = %config.paths.state_dir.display(),
            "host controller initialized"
        );

        Ok(Self {
            config,
            runner,
            tools,
            bootloader,
            ledger,
            running_kernel,
            cancel,
        })
    }

    /// Build the read-only context every core operation takes.
    ///
    /// # Errors
    ///
    /// [`SafetyError::NotInitialized`] before `init` has recorded a
    /// protected kernel.
    pub fn host_context(&self) -> Result<HostContext, SafetyError> {
        let protection = self.ledger.load()?;
        Ok(HostContext::new(
            self.running_kernel.clone(),
            protection,
            &self.config.paths.boot_dir,
            &self.config.paths.modules_dir,
        ))
    }

    #[must_use]
    pub fn governor(&self) -> DiskGovernor {
        DiskGovernor::new(&self.config.paths.boot_dir, Arc::new(FsSpaceProbe))
    }

    #[must_use]
    pub fn bootloader(&self) -> Option<&dyn Bootloader> {
        self.bootloader.as_deref()
    }
}
