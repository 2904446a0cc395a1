mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, plan::PlanSubcommand, rotation::RotationSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "postline",
    about = "Rotating-archetype publication scheduler for a Telegram channel",
    version,
    propagate_version = true
)]
struct Cli {
    /// Deployment root (default: auto-detect from .postline/)
    #[arg(long, global = true, env = "POSTLINE_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .postline/ with a default config and an empty content plan
    Init {
        /// Channel name recorded in the config
        #[arg(long)]
        channel: Option<String>,
    },

    /// Show rotation status
    Status,

    /// Inspect the archetype rotation
    Rotation {
        #[command(subcommand)]
        subcommand: RotationSubcommand,
    },

    /// Inspect and validate the content plan
    Plan {
        #[command(subcommand)]
        subcommand: PlanSubcommand,
    },

    /// Run the publication pipeline once
    Publish {
        /// Ignore the minimum interval between publications
        #[arg(long)]
        force: bool,

        /// Generate the post and print it without publishing or recording it
        #[arg(long)]
        dry_run: bool,
    },

    /// Start the scheduler daemon
    Run {
        /// Also arm a one-off publication SECS after start
        /// (defaults to pipeline.immediate_delay_secs)
        #[arg(long, value_name = "SECS", num_args = 0..=1)]
        immediate: Option<Option<u64>>,
    },

    /// Arm a one-off publication on the running scheduler
    ScheduleNow {
        /// Seconds from now (defaults to pipeline.immediate_delay_secs)
        #[arg(value_name = "SECS")]
        delay: Option<u64>,
    },

    /// Show and validate the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } | Commands::Publish { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init { channel } => cmd::init::run(&root, channel.as_deref()),
        Commands::Status => cmd::status::run(&root, cli.json),
        Commands::Rotation { subcommand } => cmd::rotation::run(&root, subcommand, cli.json),
        Commands::Plan { subcommand } => cmd::plan::run(&root, subcommand, cli.json),
        Commands::Publish { force, dry_run } => cmd::publish::run(&root, force, dry_run, cli.json),
        Commands::Run { immediate } => cmd::run::run(&root, immediate),
        Commands::ScheduleNow { delay } => cmd::schedule_now::run(&root, delay, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
