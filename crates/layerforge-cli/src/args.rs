use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "layerforge",
    about = "Generate unique layered image collections with constraint-safe trait sampling",
    version,
    after_help = "Examples:\n  layerforge generate --out ./dist\n  layerforge generate --count 500 --seed 42 --workers 8\n  layerforge check\n  layerforge preview --rules"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the project manifest
    #[arg(long, global = true, default_value = crate::manifest::MANIFEST_FILE_NAME)]
    pub manifest: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate the collection: images, metadata and a rarity report
    Generate(GenerateArgs),

    /// Validate the project and report the feasibility bound
    Check(CheckArgs),

    /// Preview layers, traits and weights without generating anything
    Preview(PreviewArgs),
}

#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Output directory (receives images/ and metadata/)
    #[arg(short, long, default_value = "out")]
    pub out: PathBuf,

    /// Override the manifest's target item count
    #[arg(long)]
    pub count: Option<u32>,

    /// Random seed for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,

    /// Worker thread cap
    #[arg(long)]
    pub workers: Option<u32>,
}

#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct PreviewArgs {
    /// Also list ruler rules per trait
    #[arg(long)]
    pub rules: bool,
}
