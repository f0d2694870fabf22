//! Actor directory commands.

use anyhow::Result;
use clap::{Args, Subcommand};

use super::{Context, emit};

/// Arguments for the `actor` command.
#[derive(Args, Debug)]
pub struct ActorArgs {
    #[command(subcommand)]
    pub command: ActorCommand,
}

#[derive(Subcommand, Debug)]
pub enum ActorCommand {
    /// Register an actor
    Add {
        #[arg(long)]
        email: String,

        #[arg(long)]
        name: String,
    },

    /// Show an actor
    Show {
        /// Actor id
        id: i64,
    },
}

pub fn run(args: ActorArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ActorCommand::Add { email, name } => emit(ctx.service.add_actor(&email, &name), ctx),
        ActorCommand::Show { id } => emit(ctx.service.get_actor(id), ctx),
    }
}
