use anyhow::Context;
use clap::Parser;
use kb_exec::CancellationToken;

mod cli;
mod commands;
mod context;
mod exit;
mod host_lock;
mod output;
mod ui;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        std::process::exit(exit::report(&error));
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    init_tracing(cli.quiet, cli.verbose)?;

    let flags = cli.global_flags();
    ui::init(&flags);

    let config = kb_config::KbConfig::load_with_dotenv(flags.config.as_deref())
        .context("failed to load kbisect configuration")?;

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let command = cli.command;
    let host_lock = if command_requires_host_lock(&command) {
        Some(host_lock::acquire(&config.paths.state_dir)?)
    } else {
        None
    };

    let app = context::HostApp::init(config, cancel)
        .context("failed to initialize host controller context")?;

    let result = commands::dispatch::dispatch(command, &app, &flags).await;
    drop(host_lock);
    result
}

fn init_tracing(quiet: bool, verbose: bool) -> anyhow::Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("KBISECT_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

/// Cancel in-flight external commands on SIGINT or SIGTERM.
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut terminate =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(error) => {
                    tracing::warn!(%error, "could not install SIGTERM handler");
                    let _ = tokio::signal::ctrl_c().await;
                    cancel.cancel();
                    return;
                }
            };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
        tracing::warn!("termination requested; cancelling running commands");
        cancel.cancel();
    });
}

fn command_requires_host_lock(command: &cli::Commands) -> bool {
    match command {
        cli::Commands::Init(_)
        | cli::Commands::Cleanup(_)
        | cli::Commands::Build(_)
        | cli::Commands::Arm(_) => true,
        cli::Commands::Verify
        | cli::Commands::Status
        | cli::Commands::List
        | cli::Commands::Disk => false,
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::command_requires_host_lock;
    use crate::cli::Cli;

    fn requires_lock(args: &[&str]) -> bool {
        let cli = Cli::try_parse_from(args).expect("cli should parse");
        command_requires_host_lock(&cli.command)
    }

    #[test]
    fn mutating_commands_take_the_host_lock() {
        assert!(requires_lock(&["kbisect-host", "init"]));
        assert!(requires_lock(&["kbisect-host", "cleanup", "--keep", "1"]));
        assert!(requires_lock(&["kbisect-host", "build", "v6.8"]));
        assert!(requires_lock(&["kbisect-host", "arm", "6.8.0-bisect-abc1234"]));
    }

    #[test]
    fn read_only_commands_do_not_lock() {
        assert!(!requires_lock(&["kbisect-host", "verify"]));
        assert!(!requires_lock(&["kbisect-host", "status"]));
        assert!(!requires_lock(&["kbisect-host", "list"]));
        assert!(!requires_lock(&["kbisect-host", "disk"]));
    }
}
