mod cmd;
mod operator;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "hubmigrate",
    about = "Resumable, operator-gated migration of sites and fleets between syndication integration versions",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .hubmigrate/)
    #[arg(long, global = true, env = "HUBMIGRATE_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize hubmigrate in the current directory
    Init,

    /// Migrate a site or fleet to the new integration (resumes by default)
    Migrate {
        /// Target alias from config.yaml
        #[arg(long)]
        target: String,
        /// Discard recorded progress and start from the first stage
        #[arg(long)]
        restart: bool,
    },

    /// Upgrade an already migrated site or fleet (resumes by default)
    Upgrade {
        /// Target alias from config.yaml
        #[arg(long)]
        target: String,
        /// Discard recorded progress and start from the first stage
        #[arg(long)]
        restart: bool,
    },

    /// Show recorded stage progress for a target
    Status {
        #[arg(long)]
        target: String,
    },

    /// Scan a target's members for entities orphaned on all of them
    Orphans {
        #[arg(long)]
        target: String,
    },

    /// List the stages of every workflow
    Stages,

    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Migrate { target, restart } => {
            cmd::run::run(&root, &hubmigrate_core::workflow::MIGRATION, &target, restart, cli.json)
        }
        Commands::Upgrade { target, restart } => {
            cmd::run::run(&root, &hubmigrate_core::workflow::UPGRADE, &target, restart, cli.json)
        }
        Commands::Status { target } => cmd::status::run(&root, &target, cli.json),
        Commands::Orphans { target } => cmd::orphans::run(&root, &target, cli.json),
        Commands::Stages => cmd::stages::run(cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
