//! Flow template commands.

use std::collections::BTreeMap;

use acolyte_core::BindArgs;
use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use serde_json::Value;

use super::{Context, emit, parse_object};

/// Arguments for the `template` command.
#[derive(Args, Debug)]
pub struct TemplateArgs {
    #[command(subcommand)]
    pub command: TemplateCommand,
}

#[derive(Subcommand, Debug)]
pub enum TemplateCommand {
    /// Create a template from a flow meta
    Create {
        /// Flow meta name
        #[arg(long)]
        meta: String,

        /// Unique template name
        #[arg(long)]
        name: String,

        /// Bind args as JSON: {"<step>": {"<event>": {"<arg>": value}}}
        #[arg(long, default_value = "{}")]
        bind: String,

        /// Maximum concurrently running instances (0 = unbounded)
        #[arg(long = "max-run", default_value = "0", allow_negative_numbers = true)]
        max_run: i64,

        /// Creator actor id
        #[arg(long)]
        creator: i64,
    },

    /// Show one template
    Show {
        /// Template id
        id: i64,
    },
}

pub fn run(args: TemplateArgs, ctx: &Context) -> Result<()> {
    match args.command {
        TemplateCommand::Create {
            meta,
            name,
            bind,
            max_run,
            creator,
        } => {
            let bind_args = parse_bind_args(&bind)?;
            emit(
                ctx.service
                    .create_flow_template(&meta, &name, &bind_args, max_run, creator),
                ctx,
            )
        }
        TemplateCommand::Show { id } => emit(ctx.service.get_flow_template(id), ctx),
    }
}

pub fn list(ctx: &Context) -> Result<()> {
    emit(ctx.service.get_all_flow_templates(), ctx)
}

fn parse_bind_args(raw: &str) -> Result<BindArgs> {
    let mut bind_args = BindArgs::new();
    for (step, events) in parse_object(raw, "--bind")? {
        let Value::Object(events) = events else {
            bail!("--bind: step '{step}' must map to an object of events");
        };
        let mut per_event = BTreeMap::new();
        for (event, args) in events {
            let Value::Object(args) = args else {
                bail!("--bind: '{step}.{event}' must map to an object of arguments");
            };
            per_event.insert(event, args);
        }
        bind_args.insert(step, per_event);
    }
    Ok(bind_args)
}
