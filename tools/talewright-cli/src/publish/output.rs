use anyhow::Result;
use std::path::{Path, PathBuf};

use talewright_export::{PackageOptions, PackageResult, PublishTarget};

use super::command::PublishArgs;
use crate::export::print_diffs;
use crate::manifest::{project_dir, resolve, ProjectManifest};

/// Build package options from the manifest plus command-line overrides
pub fn package_options(
    manifest: &ProjectManifest,
    manifest_path: &Path,
    args: &PublishArgs,
    export_root: PathBuf,
) -> Result<PackageOptions> {
    let dir = project_dir(manifest_path);
    let section = &manifest.publish;

    for wanted in &args.targets {
        if !section.targets.iter().any(|t| &t.name == wanted) {
            let known: Vec<&str> = section.targets.iter().map(|t| t.name.as_str()).collect();
            anyhow::bail!(
                "Unknown publish target '{}' (configured: {})",
                wanted,
                if known.is_empty() { "none".to_string() } else { known.join(", ") }
            );
        }
    }

    let dist = args
        .dist
        .clone()
        .unwrap_or_else(|| resolve(dir, &section.dist));
    let mut options = PackageOptions::new(manifest.slug(), export_root, dist);
    options.title = manifest.title().to_string();
    options.version = manifest.project.version.clone();
    options.author = manifest.project.author.clone();
    options.icon = section.icon.as_ref().map(|p| resolve(dir, p));
    options.eula = section.eula.as_ref().map(|p| resolve(dir, p));
    options.license = section.license.as_ref().map(|p| resolve(dir, p));
    options.debug = section.debug || args.debug;
    options.include_forks = section.forks && !args.no_forks;
    options.dry_run = args.dry_run;
    options.targets = section
        .targets
        .iter()
        .filter(|t| args.targets.is_empty() || args.targets.contains(&t.name))
        .map(|t| PublishTarget {
            name: t.name.clone(),
            platforms: t.platforms.clone(),
        })
        .collect();

    Ok(options)
}

pub fn print_results(results: &[PackageResult], dry_run: bool) {
    for result in results {
        let label = match &result.fork {
            Some(fork) => format!("{} [{}]", result.target, fork),
            None => result.target.clone(),
        };
        println!(
            "  {}: {} ({} bytes)",
            label,
            result.archive_path.display(),
            result.size
        );
        println!("    sha256: {}", result.checksum);
        if dry_run {
            print_diffs(&result.diffs, false);
        } else {
            println!("    manifest: {}", result.manifest_path.display());
        }
    }
    println!("Packaged {} archive(s)", results.len());
}
