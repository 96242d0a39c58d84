use std::sync::Arc;

use kb_build::{BuildOrchestrator, BuildSettings};
use kb_config::KbConfig;
use kb_core::BuildRequest;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::BuildArgs;
use crate::context::HostApp;
use crate::output::output;

/// Handle `kbisect-host build <commit>`.
pub async fn handle(args: &BuildArgs, app: &HostApp, flags: &GlobalFlags) -> anyhow::Result<()> {
    let ctx = app.host_context()?;
    let (settings, request) = plan(&app.config, args);
    tracing::info!(
        commit = %request.commit,
        config_source = %request.config_source,
        min_free_mb = request.min_free_mb,
        keep = request.keep_count,
        kernel_src = %settings.kernel_src.display(),
        "starting bisection build"
    );

    let orchestrator = BuildOrchestrator::new(
        Arc::clone(&app.runner),
        Arc::clone(&app.tools),
        app.bootloader.clone(),
        app.governor(),
        settings,
    );
    let outcome = orchestrator.build(&ctx, &request, &app.cancel).await?;
    output(&outcome, flags.format)
}

/// Command-line overrides win over every configuration layer.
fn plan(config: &KbConfig, args: &BuildArgs) -> (BuildSettings, BuildRequest) {
    let mut settings = BuildSettings::from_config(config);
    if let Some(kernel_src) = &args.kernel_src {
        settings.kernel_src.clone_from(kernel_src);
    }

    let request = BuildRequest {
        commit: args.commit.clone(),
        config_source: args
            .config_source
            .clone()
            .unwrap_or_else(|| config.config_source()),
        min_free_mb: args.min_free_mb.unwrap_or(config.policy.min_free_mb),
        keep_count: args.keep.unwrap_or(config.policy.keep_count),
    };
    (settings, request)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use kb_core::ConfigSource;
    use pretty_assertions::assert_eq;

    use super::*;

    fn args(commit: &str) -> BuildArgs {
        BuildArgs {
            commit: commit.into(),
            config_source: None,
            min_free_mb: None,
            keep: None,
            kernel_src: None,
        }
    }

    #[test]
    fn defaults_come_from_configuration() {
        let mut config = KbConfig::default();
        config.build.config_source = "RUNNING".into();
        config.policy.keep_count = 4;

        let (settings, request) = plan(&config, &args("v6.8"));
        assert_eq!(settings.kernel_src, config.paths.kernel_src);
        assert_eq!(
            request,
            BuildRequest {
                commit: "v6.8".into(),
                config_source: ConfigSource::Running,
                min_free_mb: 500,
                keep_count: 4,
            }
        );
    }

    #[test]
    fn flags_override_configuration() {
        let config = KbConfig::default();
        let mut args = args("abc1234");
        args.config_source = Some(ConfigSource::File(PathBuf::from("/root/kconfig")));
        args.min_free_mb = Some(900);
        args.keep = Some(0);
        args.kernel_src = Some(PathBuf::from("/srv/linux"));

        let (settings, request) = plan(&config, &args);
        assert_eq!(settings.kernel_src, PathBuf::from("/srv/linux"));
        assert_eq!(request.config_source, ConfigSource::File(PathBuf::from("/root/kconfig")));
        assert_eq!(request.min_free_mb, 900);
        assert_eq!(request.keep_count, 0);
    }
}
