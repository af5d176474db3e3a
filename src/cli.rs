use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Force-directed 3D assembly of semantic word fields.
#[derive(Parser, Debug)]
#[command(name = "wordfield")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (.yaml, .yml or .json)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Fixed RNG seed, overrides the configuration file
    #[arg(long, global = true)]
    pub seed: Option<u64>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Lay out a JSON distance matrix and print the positions
    Layout {
        /// JSON file holding an N x N array of distances
        #[arg(short, long)]
        matrix: PathBuf,
    },
    /// Run one assembly headlessly and print its topology summary
    Simulate {
        /// Question to assemble
        #[arg(short, long)]
        question: String,

        #[command(flatten)]
        provider: ProviderArgs,

        /// Simulated seconds to run after the question is asked
        #[arg(long, default_value = "12")]
        seconds: f32,

        /// Simulated frame rate
        #[arg(long, default_value = "60")]
        fps: u32,
    },
    /// Start the control server
    Serve {
        /// Port to run the server on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Directory of renderer assets to serve at /
        #[arg(long)]
        static_dir: Option<PathBuf>,

        #[command(flatten)]
        provider: ProviderArgs,

        /// Frame rate of the simulation loop
        #[arg(long, default_value = "60")]
        fps: u32,
    },
}

/// Which completion provider answers prompts
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    /// Deterministic, no network
    Offline,
    /// OpenAI-compatible chat completions
    Http,
}

#[derive(Args, Debug, Clone)]
pub struct ProviderArgs {
    /// Completion provider
    #[arg(long, value_enum, default_value_t = ProviderKind::Offline)]
    pub provider: ProviderKind,

    /// Chat-completions endpoint (falls back to WORDFIELD_API_URL)
    #[arg(long)]
    pub api_url: Option<String>,

    /// Model name (falls back to WORDFIELD_MODEL)
    #[arg(long)]
    pub model: Option<String>,
}
