use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{LaunchConfig, PolicyKind};

#[derive(Debug, Parser)]
#[command(name = "envstarter")]
#[command(about = "Start groups of applications and websites as isolated environments")]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to ~/.envstarter/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List stored environments
    List,
    /// Launch one environment by name or id, or `all`
    Launch(LaunchArgs),
    /// Show the resolved configuration
    Status,
}

#[derive(Debug, Args)]
pub struct LaunchArgs {
    /// Environment name, id, or `all`
    pub target: String,

    /// Keep running and print status until Ctrl-C, then stop everything
    #[arg(long)]
    pub monitor: bool,

    #[arg(long, value_enum)]
    pub policy: Option<PolicyKind>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    #[arg(long = "stagger-ms")]
    pub stagger_ms: Option<u64>,

    /// Switch to the (last) launched environment's desktop
    #[arg(long)]
    pub switch: bool,
}

impl LaunchArgs {
    pub fn launches_all(&self) -> bool {
        self.target.eq_ignore_ascii_case("all")
    }

    /// Command-line flags take precedence over the configured launch section.
    pub fn apply_to(&self, launch: &mut LaunchConfig) {
        if let Some(policy) = self.policy {
            launch.policy = policy;
        }
        if let Some(size) = self.batch_size {
            launch.batch_size = size;
        }
        if let Some(ms) = self.stagger_ms {
            launch.stagger_delay_ms = ms;
        }
    }
}
