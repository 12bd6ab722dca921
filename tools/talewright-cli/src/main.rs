//! Talewright CLI - export and publish tool for Talewright projects
//!
//! # Commands
//!
//! - `talewright export` - Compile scenes into a script bundle
//! - `talewright publish` - Package the export into per-target archives
//! - `talewright check` - Validate the manifest and preview an export (dry run)
//!
//! # Usage
//!
//! In a project directory with talewright.toml:
//! ```bash
//! # Export into build/export
//! talewright export
//!
//! # See what a re-export would change
//! talewright export --dry-run --diff
//!
//! # Export, then package every configured target
//! talewright publish --export
//! ```
//!
//! # Manifest (talewright.toml)
//!
//! ```toml
//! [project]
//! id = "my-tale"
//! title = "My Tale"
//! author = "Writer"
//! version = "1.0.0"
//!
//! [export]
//! output = "build/export"
//! assets = "assets"
//! timeline = "main"
//! route_mode = "auto"
//!
//! [[publish.targets]]
//! name = "itch"
//! platforms = ["windows", "linux", "mac"]
//! ```
//!
//! Set `SOURCE_DATE_EPOCH` to pin the manifest timestamp for reproducible builds.

mod check;
mod export;
mod manifest;
mod publish;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Talewright CLI - export and publish tool for Talewright projects
#[derive(Parser)]
#[command(name = "talewright")]
#[command(about = "Export and publish tool for Talewright projects")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile scenes into a script bundle
    Export(export::ExportArgs),

    /// Package the export into per-target archives
    Publish(publish::PublishArgs),

    /// Validate the manifest and preview an export (dry run)
    Check(check::CheckArgs),
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Export(args) => export::execute(args),
        Commands::Publish(args) => publish::execute(args),
        Commands::Check(args) => check::execute(args),
    }
}
