//! Flow instance commands: start, act and inspect.

use anyhow::Result;
use clap::Args;

use super::{Context, emit, parse_object};

/// Arguments for the `start` command.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Template id
    #[arg(long)]
    pub template: i64,

    /// Initiating actor id
    #[arg(long)]
    pub initiator: i64,

    /// Free-text description of the run
    #[arg(long, default_value = "")]
    pub description: String,

    /// Start arguments as a JSON object
    #[arg(long, default_value = "{}")]
    pub args: String,
}

/// Arguments for the `act` command.
#[derive(Args, Debug)]
pub struct ActArgs {
    /// Flow instance id
    #[arg(long)]
    pub instance: i64,

    /// Target step
    #[arg(long)]
    pub step: String,

    /// Action (event) name
    #[arg(long)]
    pub action: String,

    /// Acting actor id
    #[arg(long)]
    pub actor: i64,

    /// Action arguments as a JSON object
    #[arg(long, default_value = "{}")]
    pub args: String,
}

/// Arguments for the `instance` command.
#[derive(Args, Debug)]
pub struct InstanceArgs {
    /// Flow instance id
    pub id: i64,
}

/// Arguments for the `instances` command.
#[derive(Args, Debug)]
pub struct InstancesArgs {
    /// Only instances in this status (init, running, finished, stopped, exception)
    #[arg(long)]
    pub status: Option<String>,

    /// Only instances of this template
    #[arg(long)]
    pub template: Option<i64>,

    /// Only instances with an id below this one
    #[arg(long)]
    pub offset: Option<i64>,

    /// Page size
    #[arg(short, long, default_value = "20")]
    pub limit: usize,
}

pub fn start(args: StartArgs, ctx: &Context) -> Result<()> {
    let start_args = parse_object(&args.args, "--args")?;
    emit(
        ctx.executor
            .start_flow(args.template, args.initiator, &args.description, &start_args),
        ctx,
    )
}

pub fn act(args: ActArgs, ctx: &Context) -> Result<()> {
    let action_args = parse_object(&args.args, "--args")?;
    emit(
        ctx.executor.handle_job_action(
            args.instance,
            &args.step,
            &args.action,
            args.actor,
            &action_args,
        ),
        ctx,
    )
}

pub fn show(args: InstanceArgs, ctx: &Context) -> Result<()> {
    emit(ctx.service.get_flow_instance(args.id), ctx)
}

pub fn list(args: InstancesArgs, ctx: &Context) -> Result<()> {
    emit(
        ctx.service.get_flow_instances(
            args.status.as_deref(),
            args.template,
            args.offset,
            args.limit,
        ),
        ctx,
    )
}
