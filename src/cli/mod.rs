//! CLI argument parsing and command dispatch.

pub mod args;
pub mod catalog;
pub mod context;
pub mod estimate;
pub mod generate;
pub mod jobs;
pub mod keys;

pub use args::{Cli, Commands, OutputFormat};
pub use context::CommandContext;

use crate::error::Result;

/// Run one parsed command.
pub async fn dispatch(ctx: &CommandContext, command: &Commands) -> Result<()> {
    match command {
        Commands::Estimate(args) => estimate::execute(ctx, args),
        Commands::Generate(args) => generate::execute(ctx, args).await,
        Commands::Get(args) => jobs::get(ctx, args),
        Commands::List(args) => jobs::list(ctx, args),
        Commands::Cancel(args) => jobs::cancel(ctx, args),
        Commands::Delete(args) => jobs::delete(ctx, args).await,
        Commands::Resume(args) => jobs::resume(ctx, args).await,
        Commands::Stats => jobs::stats(ctx),
        Commands::Providers => catalog::providers(ctx),
        Commands::Pricing => catalog::pricing(ctx),
        Commands::Keys(command) => keys::execute(ctx, command).await,
    }
}
