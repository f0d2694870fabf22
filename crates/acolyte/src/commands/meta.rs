//! Flow meta and job inspection commands.

use anyhow::Result;
use clap::Args;

use super::{Context, emit};

/// Arguments for the `meta` command.
#[derive(Args, Debug)]
pub struct MetaArgs {
    /// Flow meta name
    pub name: String,
}

/// Arguments for the `job` command.
#[derive(Args, Debug)]
pub struct JobArgs {
    /// Job name
    pub name: String,
}

pub fn list_metas(ctx: &Context) -> Result<()> {
    emit(ctx.service.get_all_flow_meta(), ctx)
}

pub fn show_meta(args: MetaArgs, ctx: &Context) -> Result<()> {
    emit(ctx.service.get_flow_meta_info(&args.name), ctx)
}

pub fn list_jobs(ctx: &Context) -> Result<()> {
    emit(ctx.service.get_all_jobs(), ctx)
}

pub fn show_job(args: JobArgs, ctx: &Context) -> Result<()> {
    emit(ctx.service.get_job_info(&args.name), ctx)
}
