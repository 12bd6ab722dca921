//! Check command - validate the manifest and preview an export
//!
//! Loads every document, resolves assets and plans routes through a dry-run
//! export, then reports warnings and the files an export would change.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use talewright_export::{export, DirectoryStore, Oracles};

use crate::export::{export_options, print_diffs, print_summary, ExportArgs};
use crate::manifest::{project_dir, resolve, ProjectManifest};

/// Arguments for the check command
#[derive(Args)]
pub struct CheckArgs {
    /// Path to talewright.toml manifest file
    #[arg(short, long, default_value = "talewright.toml")]
    pub manifest: PathBuf,

    /// Print unified diffs for modified files
    #[arg(long)]
    pub diff: bool,

    /// Fail when the export has warnings or pending changes
    #[arg(long)]
    pub strict: bool,
}

/// Execute the check command
pub fn execute(args: CheckArgs) -> Result<()> {
    let manifest = ProjectManifest::load(&args.manifest)?;
    manifest.validate()?;
    println!("Checking: {} ({})", manifest.title(), manifest.project.id);

    let export_args = ExportArgs {
        manifest: args.manifest.clone(),
        output: None,
        timeline: None,
        world: None,
        route_mode: None,
        no_switch_menu: false,
        per_scene_modules: false,
        force: false,
        dry_run: true,
        diff: args.diff,
        ack_rating: false,
        ack_token: None,
    };
    let options = export_options(&manifest, &args.manifest, &export_args)?;
    let store = DirectoryStore::new(resolve(project_dir(&args.manifest), &manifest.export.root));
    let result = export(&store, &options, &Oracles::default())
        .with_context(|| format!("Check failed for project '{}'", manifest.project.id))?;

    print_summary(&result);
    print_diffs(&result.diffs, args.diff);

    let changes = result.changes().count();
    if args.strict && (!result.warnings.is_empty() || changes > 0) {
        anyhow::bail!(
            "Check failed: {} warning(s), {} pending change(s)",
            result.warnings.len(),
            changes
        );
    }
    println!("Check passed");
    Ok(())
}
