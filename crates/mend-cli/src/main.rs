mod cmd_config;
mod cmd_cycle;
mod cmd_init;
mod cmd_patch;
mod workspace;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mend", version, about = "Preview, apply, and publish auto-fix patches")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize a new .mend/ workspace
    Init,
    /// Evolution cycles (run, history, latest)
    Cycle {
        #[command(subcommand)]
        cmd: cmd_cycle::CycleCmd,
    },
    /// Check or apply a batch of patches
    Patch {
        #[command(subcommand)]
        cmd: cmd_patch::PatchCmd,
    },
    /// Manage workspace configuration
    Config {
        #[command(subcommand)]
        cmd: cmd_config::ConfigCmd,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("MEND_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let repo_root = std::env::current_dir()?;

    match cli.cmd {
        Command::Init => cmd_init::execute(&repo_root),
        Command::Cycle { cmd } => cmd_cycle::run(cmd, &repo_root),
        Command::Patch { cmd } => cmd_patch::run(cmd, &repo_root),
        Command::Config { cmd } => cmd_config::run(cmd, &repo_root),
    }
}
