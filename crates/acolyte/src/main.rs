//! Acolyte - human-in-the-loop flow engine
//!
//! Main entry point for the Acolyte CLI.

use std::path::PathBuf;
use std::sync::Arc;

use acolyte_config::{AcolyteConfig, LoggingConfig};
use acolyte_core::{FlowExecutor, FlowService, InProcessLock, NamedLock};
use acolyte_store::{SqliteLock, SqliteStore};
use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod builtin;
mod commands;

use commands::{actor, config, flow, meta, template};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Acolyte - human-in-the-loop flow engine
#[derive(Parser)]
#[command(name = "acolyte")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file layered over the discovered ones
    #[arg(short, long, global = true, env = "ACOLYTE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List flow metas
    Metas,

    /// Show a flow meta with its steps and arguments
    Meta(meta::MetaArgs),

    /// List jobs
    Jobs,

    /// Show a job with its events and arguments
    Job(meta::JobArgs),

    /// Flow template management
    Template(template::TemplateArgs),

    /// List flow templates
    Templates,

    /// Start a flow instance from a template
    Start(flow::StartArgs),

    /// Run an action of a step on a flow instance
    Act(flow::ActArgs),

    /// Show a flow instance with its job instances and action records
    Instance(flow::InstanceArgs),

    /// List flow instances
    Instances(flow::InstancesArgs),

    /// Actor management
    Actor(actor::ActorArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = acolyte_config::load_config(cli.config.as_deref())?;
    init_tracing(&loaded.config.logging(), cli.verbose);
    debug!(sources = ?loaded.loaded_from(), "Loaded config");

    let ctx = || build_context(&loaded.config, cli.json, cli.verbose);

    match cli.command {
        Commands::Config(args) => config::run(args, &loaded, cli.json),
        Commands::Metas => meta::list_metas(&ctx()?),
        Commands::Meta(args) => meta::show_meta(args, &ctx()?),
        Commands::Jobs => meta::list_jobs(&ctx()?),
        Commands::Job(args) => meta::show_job(args, &ctx()?),
        Commands::Template(args) => template::run(args, &ctx()?),
        Commands::Templates => template::list(&ctx()?),
        Commands::Start(args) => flow::start(args, &ctx()?),
        Commands::Act(args) => flow::act(args, &ctx()?),
        Commands::Instance(args) => flow::show(args, &ctx()?),
        Commands::Instances(args) => flow::list(args, &ctx()?),
        Commands::Actor(args) => actor::run(args, &ctx()?),
    }
}

/// Logs go to stderr so stdout stays parseable. `RUST_LOG` wins over config.
fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "acolyte={level},acolyte_core={level},acolyte_store={level},warn"
        ))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_context(config: &AcolyteConfig, json_output: bool, verbose: bool) -> Result<commands::Context> {
    let database = config.database();
    let open_failed = || format!("failed to open database '{}'", database.path.display());
    // An in-memory database is private to this process.
    let (store, locks) = if database.is_in_memory() {
        let store = SqliteStore::open_in_memory().with_context(open_failed)?;
        let locks: Arc<dyn NamedLock> = Arc::new(InProcessLock::new());
        (store, locks)
    } else {
        let store = SqliteStore::open(&database.path).with_context(open_failed)?;
        let locks: Arc<dyn NamedLock> =
            Arc::new(SqliteLock::open(&database.path).with_context(open_failed)?);
        (store, locks)
    };
    let store = Arc::new(store);

    let definitions = Arc::new(builtin::definitions()?);
    let executor = FlowExecutor::new(definitions.clone(), store.clone(), store.clone(), locks)
        .with_lock_namespace(config.engine().lock_namespace);
    let service = FlowService::new(definitions, store.clone(), store);

    Ok(commands::Context {
        executor,
        service,
        json_output,
        verbose,
    })
}
