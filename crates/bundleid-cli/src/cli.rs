//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// bundleid - give every target of an iOS build its own bundle identifier
#[derive(Parser)]
#[command(name = "bundleid")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only print warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Rewrite identifiers in a project descriptor
    Resolve(ResolveArgs),

    /// Rewrite identifiers in a built .app directory
    ApplyBundle(ApplyBundleArgs),

    /// Rewrite identifiers inside a packaged .ipa
    ApplyArchive(ApplyArchiveArgs),

    /// Check any layer for duplicate identifiers without changing it
    Validate(ValidateArgs),
}

/// Options shared by every command that rewrites.
#[derive(Args)]
pub struct PlanArgs {
    /// Base identifier of the main application
    #[arg(long = "base-id", env = "BUNDLE_ID")]
    pub base_id: String,

    /// Override map (TOML) pinning roles or identifiers per target
    #[arg(long, env = "BUNDLEID_OVERRIDES")]
    pub overrides: Option<PathBuf>,

    /// Show what would change without writing
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Args)]
pub struct OutputArgs {
    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,

    /// Also write the JSON result to this file
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(Args)]
pub struct ResolveArgs {
    /// project.pbxproj or .xcodeproj directory
    #[arg(long)]
    pub descriptor: PathBuf,

    #[command(flatten)]
    pub plan: PlanArgs,
}

#[derive(Args)]
pub struct ApplyBundleArgs {
    /// .app directory, or a directory holding Payload/<App>.app
    #[arg(long = "bundle-dir")]
    pub bundle_dir: PathBuf,

    /// Project descriptor to match components against
    #[arg(long)]
    pub descriptor: Option<PathBuf>,

    #[command(flatten)]
    pub plan: PlanArgs,
}

#[derive(Args)]
pub struct ApplyArchiveArgs {
    /// .ipa file
    #[arg(long)]
    pub archive: PathBuf,

    /// Project descriptor to match components against
    #[arg(long)]
    pub descriptor: Option<PathBuf>,

    #[command(flatten)]
    pub plan: PlanArgs,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Descriptor, .app directory or .ipa (detected automatically)
    #[arg(long)]
    pub target: PathBuf,

    #[command(flatten)]
    pub output: OutputArgs,
}
