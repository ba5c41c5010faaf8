mod cmd;
mod context;
mod output;
mod tools;

use clap::{Parser, Subcommand};
use cmd::{
    plan::PlanSubcommand, project::ProjectSubcommand, slot::SlotSubcommand, task::TaskSubcommand,
};
use taskctl_core::{paths, TaskctlError};

#[derive(Parser)]
#[command(
    name = "taskctl",
    about = "Decompose change requests into task DAGs and coordinate them to merged PRs",
    version,
    propagate_version = true
)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the current repository as a project
    Init {
        /// Override the main branch (default: global config)
        #[arg(long)]
        main_branch: Option<String>,

        /// Maximum concurrently active tasks for this project
        #[arg(long)]
        max_concurrent: Option<u32>,
    },

    /// Manage projects
    Project {
        #[command(subcommand)]
        subcommand: ProjectSubcommand,
    },

    /// Manage plans
    Plan {
        #[command(subcommand)]
        subcommand: PlanSubcommand,
    },

    /// Manage tasks
    Task {
        #[command(subcommand)]
        subcommand: TaskSubcommand,
    },

    /// Manage execution slots (git worktrees)
    Slot {
        #[command(subcommand)]
        subcommand: SlotSubcommand,
    },

    /// Run one scheduler pass for a plan
    Run {
        plan: String,

        /// Compute the batch without assigning anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Poll the forge and apply PR status changes for a plan
    Sync { plan: String },

    /// Show a plan with its tasks and progress
    Status { plan: String },

    /// Run as an MCP stdio query server
    Mcp,
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Mcp => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env(paths::LOG_LEVEL_ENV).unwrap_or_else(
                |_| tracing_subscriber::EnvFilter::default().add_directive(default_level.into()),
            ),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Init {
            main_branch,
            max_concurrent,
        } => cmd::init::run(main_branch.as_deref(), max_concurrent, cli.json),
        Commands::Project { subcommand } => cmd::project::run(subcommand, cli.json),
        Commands::Plan { subcommand } => cmd::plan::run(subcommand, cli.json),
        Commands::Task { subcommand } => cmd::task::run(subcommand, cli.json),
        Commands::Slot { subcommand } => cmd::slot::run(subcommand, cli.json),
        Commands::Run { plan, dry_run } => cmd::run::run(&plan, dry_run, cli.json),
        Commands::Sync { plan } => cmd::sync::run(&plan, cli.json),
        Commands::Status { plan } => cmd::status::run(&plan, cli.json),
        Commands::Mcp => cmd::mcp::run(),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(exit_code(&e));
    }
}

/// 1 for user errors, 2 for external failures, 3 for store/internal ones.
fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<TaskctlError>())
        .map(TaskctlError::exit_code)
        .unwrap_or(1)
}
