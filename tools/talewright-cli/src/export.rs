//! Export command - compile the project into a script bundle

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use clap::Args;
use std::path::PathBuf;

use talewright_export::{
    export, DiffDetail, DiffEntry, DiffStatus, DirectoryStore, ExportOptions, ExportResult,
    Oracles, RouteMode,
};

use crate::manifest::{project_dir, resolve, ProjectManifest};

/// Arguments for the export command
#[derive(Args)]
pub struct ExportArgs {
    /// Path to talewright.toml manifest file
    #[arg(short, long, default_value = "talewright.toml")]
    pub manifest: PathBuf,

    /// Output directory (overrides export.output)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Timeline id (overrides export.timeline)
    #[arg(long)]
    pub timeline: Option<String>,

    /// Viewpoint world id (overrides export.world)
    #[arg(long)]
    pub world: Option<String>,

    /// Route mode: disabled, master, forks, both, auto
    #[arg(long)]
    pub route_mode: Option<RouteMode>,

    /// Do not emit the in-script viewpoint menu
    #[arg(long)]
    pub no_switch_menu: bool,

    /// Render each scene into its own module
    #[arg(long)]
    pub per_scene_modules: bool,

    /// Overwrite a non-empty output directory
    #[arg(short, long)]
    pub force: bool,

    /// Compute diffs against the output directory without writing
    #[arg(long)]
    pub dry_run: bool,

    /// Print unified diffs for modified files (with --dry-run)
    #[arg(long)]
    pub diff: bool,

    /// Acknowledge the content rating
    #[arg(long)]
    pub ack_rating: bool,

    /// Acknowledgement token passed to the rating service
    #[arg(long)]
    pub ack_token: Option<String>,
}

/// Build export options from the manifest plus command-line overrides
pub fn export_options(
    manifest: &ProjectManifest,
    manifest_path: &std::path::Path,
    args: &ExportArgs,
) -> Result<ExportOptions> {
    let dir = project_dir(manifest_path);
    let section = &manifest.export;

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| resolve(dir, &section.output));
    let mut options = ExportOptions::new(&manifest.project.id, output, resolve(dir, &section.assets))
        .with_route_mode(args.route_mode.unwrap_or(section.route_mode))
        .with_switch_menu(section.switch_menu && !args.no_switch_menu)
        .with_per_scene_modules(section.per_scene_modules || args.per_scene_modules)
        .with_force(args.force)
        .with_dry_run(args.dry_run)
        .with_rating_ack(args.ack_rating, args.ack_token.clone());

    if let Some(timeline) = args.timeline.clone().or_else(|| section.timeline.clone()) {
        options = options.with_timeline(timeline);
    }
    if let Some(world) = args.world.clone().or_else(|| section.world.clone()) {
        options = options.with_world(world);
    }
    if let Some(at) = source_date_epoch()? {
        options = options.with_generated_at(at);
    }
    Ok(options)
}

/// `SOURCE_DATE_EPOCH`, when set, pins the manifest timestamp
pub fn source_date_epoch() -> Result<Option<DateTime<Utc>>> {
    let Ok(raw) = std::env::var("SOURCE_DATE_EPOCH") else {
        return Ok(None);
    };
    parse_epoch(&raw).map(Some)
}

fn parse_epoch(raw: &str) -> Result<DateTime<Utc>> {
    let secs: i64 = raw
        .trim()
        .parse()
        .with_context(|| format!("Invalid SOURCE_DATE_EPOCH '{raw}'"))?;
    Utc.timestamp_opt(secs, 0)
        .single()
        .with_context(|| format!("SOURCE_DATE_EPOCH out of range: {secs}"))
}

/// Execute the export command
pub fn execute(args: ExportArgs) -> Result<()> {
    let manifest = ProjectManifest::load(&args.manifest)?;
    manifest.validate()?;

    println!("Exporting: {} ({})", manifest.title(), manifest.project.id);

    let options = export_options(&manifest, &args.manifest, &args)?;
    let store = DirectoryStore::new(resolve(project_dir(&args.manifest), &manifest.export.root));
    let result = export(&store, &options, &Oracles::default())
        .with_context(|| format!("Failed to export project '{}'", manifest.project.id))?;

    print_summary(&result);
    if result.dry_run {
        print_diffs(&result.diffs, args.diff);
    }
    Ok(())
}

pub fn print_summary(result: &ExportResult) {
    println!("  Scenes: {}", result.labels.len());
    println!(
        "  Assets: {} background(s), {} portrait(s)",
        result.backgrounds.len(),
        result.portraits.len()
    );
    if !result.missing_backgrounds.is_empty() {
        println!("  Missing backgrounds: {}", result.missing_backgrounds.join(", "));
    }
    if !result.missing_portraits.is_empty() {
        println!("  Missing portraits: {}", result.missing_portraits.join(", "));
    }
    if !result.routes.is_empty() {
        let routes: Vec<String> = result
            .routes
            .iter()
            .map(|r| format!("{} ({} scenes)", r.display_name, r.scene_labels.len()))
            .collect();
        println!("  Routes: {}", routes.join(", "));
    }
    if result.menu_enabled {
        println!("  Viewpoint menu: enabled");
    }
    for fork in &result.forks {
        println!("  Fork: {} -> {}", fork.pov_id, fork.dir.display());
    }
    for warning in &result.warnings {
        println!("  Warning: {}", warning);
    }
    for finding in &result.advisories {
        println!("  Advisory [{}]: {}", finding.code, finding.message);
    }
    if !result.dry_run {
        println!("  Script: {}", result.script_path.display());
        println!("  Manifest: {}", result.manifest_path.display());
    }
}

pub fn print_diffs(diffs: &[DiffEntry], show_text: bool) {
    let changed = diffs.iter().filter(|d| !d.is_unchanged()).count();
    println!("Dry run: {} file(s), {} would change", diffs.len(), changed);
    for entry in diffs.iter().filter(|d| !d.is_unchanged()) {
        let marker = match entry.status {
            DiffStatus::New => "new",
            DiffStatus::Modified => "modified",
            DiffStatus::Unchanged => "unchanged",
            DiffStatus::Removed => "removed",
        };
        println!("  {:<9} {}", marker, entry.path);
        if !show_text {
            continue;
        }
        match &entry.detail {
            Some(DiffDetail::Unified { text, .. }) => print!("{text}"),
            Some(DiffDetail::Hashes { before, after }) => println!(
                "    sha256 {} -> {}",
                before.as_deref().unwrap_or("-"),
                after
            ),
            None => {}
        }
    }
}
