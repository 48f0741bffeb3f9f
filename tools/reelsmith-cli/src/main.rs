//! Reelsmith CLI — render photo reels from JSON render plans.
//!
//! Usage:
//!   reelsmith render <PLAN> -o <OUT>   Render a plan to a video file
//!   reelsmith validate <PLAN>          Validate a render plan
//!   reelsmith info <PLAN>              Show plan contents and timing
//!   reelsmith check                    Check encoder and memory status
//!   reelsmith init <PATH>              Write a sample render plan

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reelsmith_common::config::AppConfig;

mod commands;

use commands::render::RenderArgs;

#[derive(Parser)]
#[command(
    name = "reelsmith",
    about = "Turn photos, clips, music and captions into short vertical videos",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a plan to a video file
    Render(RenderArgs),

    /// Validate a render plan
    Validate {
        /// Path to the plan JSON
        plan: PathBuf,
    },

    /// Show plan contents and timing
    Info {
        /// Path to the plan JSON
        plan: PathBuf,
    },

    /// Check encoder availability and memory status
    Check,

    /// Write a sample render plan
    Init {
        /// Where to write the plan JSON
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load();

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    reelsmith_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Render(args) => commands::render::run(args, &config).await,
        Commands::Validate { plan } => commands::validate::run(plan),
        Commands::Info { plan } => commands::info::run(plan),
        Commands::Check => commands::check::run(&config).await,
        Commands::Init { path, force } => commands::init::run(path, force),
    }
}
