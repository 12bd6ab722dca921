use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use talewright_export::{export, package, DirectoryStore, Oracles};

use super::output::{package_options, print_results};
use crate::export::{export_options, print_summary, ExportArgs};
use crate::manifest::{project_dir, resolve, ProjectManifest};

/// Arguments for the publish command
#[derive(Args)]
pub struct PublishArgs {
    /// Path to talewright.toml manifest file
    #[arg(short, long, default_value = "talewright.toml")]
    pub manifest: PathBuf,

    /// Export tree to package (overrides export.output)
    #[arg(long)]
    pub export_dir: Option<PathBuf>,

    /// Output directory for archives (overrides publish.dist)
    #[arg(short, long)]
    pub dist: Option<PathBuf>,

    /// Only package these targets (repeatable)
    #[arg(short, long = "target")]
    pub targets: Vec<String>,

    /// Run a forced export before packaging
    #[arg(long)]
    pub export: bool,

    /// Embed debug/hook_catalog.json
    #[arg(long)]
    pub debug: bool,

    /// Skip fork archives
    #[arg(long)]
    pub no_forks: bool,

    /// Compute archives and diff them against dist without writing
    #[arg(long)]
    pub dry_run: bool,
}

/// Execute the publish command
pub fn execute(args: PublishArgs) -> Result<()> {
    let manifest = ProjectManifest::load(&args.manifest)?;
    manifest.validate()?;

    println!(
        "Publishing: {} {} ({})",
        manifest.title(),
        manifest.project.version,
        manifest.project.id
    );

    let dir = project_dir(&args.manifest);
    let export_root = args
        .export_dir
        .clone()
        .unwrap_or_else(|| resolve(dir, &manifest.export.output));

    if args.export {
        let export_args = ExportArgs {
            manifest: args.manifest.clone(),
            output: Some(export_root.clone()),
            timeline: None,
            world: None,
            route_mode: None,
            no_switch_menu: false,
            per_scene_modules: false,
            force: true,
            dry_run: false,
            diff: false,
            ack_rating: false,
            ack_token: None,
        };
        let options = export_options(&manifest, &args.manifest, &export_args)?;
        let store = DirectoryStore::new(resolve(dir, &manifest.export.root));
        let result = export(&store, &options, &Oracles::default())
            .with_context(|| format!("Failed to export project '{}'", manifest.project.id))?;
        print_summary(&result);
    }

    let options = package_options(&manifest, &args.manifest, &args, export_root)?;
    let results = package(&options).context("Failed to package archives")?;
    print_results(&results, options.dry_run);
    Ok(())
}
