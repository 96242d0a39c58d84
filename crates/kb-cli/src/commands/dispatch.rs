use crate::cli::GlobalFlags;
use crate::cli::root_commands::Commands;
use crate::commands;
use crate::context::HostApp;

/// Dispatch a parsed command to the corresponding handler module.
pub async fn dispatch(command: Commands, app: &HostApp, flags: &GlobalFlags) -> anyhow::Result<()> {
    match command {
        Commands::Init(args) => commands::init::handle(&args, app, flags).await,
        Commands::Verify => commands::verify::handle(app, flags),
        Commands::Status => commands::status::handle(app, flags).await,
        Commands::List => commands::list::handle(app, flags),
        Commands::Disk => commands::disk::handle(app, flags),
        Commands::Cleanup(args) => commands::cleanup::handle(&args, app, flags),
        Commands::Build(args) => commands::build::handle(&args, app, flags).await,
        Commands::Arm(args) => commands::arm::handle(&args, app, flags).await,
    }
}
