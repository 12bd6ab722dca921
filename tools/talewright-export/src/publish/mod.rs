//! Packager: deterministic per-target archives of an export tree.
//!
//! Archive layout, under `<slug>/<target>/`:
//! - `game/...` (the exported game tree)
//! - `publish_manifest.json`, `channels.json`, `provenance.json`, `icon.png`
//! - `legal/{EULA.txt,LICENSE.txt,license_manifest.json}`
//! - `debug/hook_catalog.json` when debug output is requested
//!
//! Next to each archive in the dist directory go `<stem>.publish_manifest.json`,
//! `<stem>.license_manifest.json` and provenance sidecars for the manifest and
//! the archive. Forks listed in the export manifest are packaged the same way
//! from their `forks/<slug>/` trees.

mod archive;
mod icon;
mod legal;
mod platform;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use talewright_shared::{is_safe_path_component, read_file_with_limit, sha256_hex, MAX_DOCUMENT_BYTES, TALEWRIGHT_FORMAT};

use crate::diff::{ArtifactSink, DiffEntry};
use crate::error::ExportError;
use crate::manifest::ForkDescriptor;
use crate::oracle::HOOK_CATALOG;
use crate::provenance::{to_pretty_json, ProvenanceInput, ProvenanceStamp};

pub use archive::{ArchiveBuilder, TreeFile, DEFLATE_LEVEL, ENTRY_PERMISSIONS};
pub use icon::{icon_png, placeholder_icon, ICON_SIZE};
pub use legal::{default_eula, default_license, license_manifest, LicenseEntry, LicenseManifest};
pub use platform::{channels_for, parse_platforms, Channel, ChannelsFile, Platform, SUPPORTED_PLATFORMS};

pub const PUBLISH_SCHEMA: &str = "talewright.publish/1";

/// A named distribution target and its platforms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishTarget {
    pub name: String,
    pub platforms: Vec<String>,
}

impl PublishTarget {
    pub fn new(name: impl Into<String>, platforms: &[&str]) -> Self {
        Self {
            name: name.into(),
            platforms: platforms.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Per-publish configuration.
#[derive(Debug, Clone)]
pub struct PackageOptions {
    pub slug: String,
    pub title: String,
    pub version: String,
    pub author: String,
    /// Export output directory holding `game/` (and `forks/`)
    pub export_root: PathBuf,
    pub dist_dir: PathBuf,
    pub targets: Vec<PublishTarget>,
    pub icon: Option<PathBuf>,
    pub eula: Option<PathBuf>,
    pub license: Option<PathBuf>,
    /// Embed `debug/hook_catalog.json`
    pub debug: bool,
    /// Also package every fork tree
    pub include_forks: bool,
    pub dry_run: bool,
}

impl PackageOptions {
    pub fn new(slug: impl Into<String>, export_root: impl Into<PathBuf>, dist_dir: impl Into<PathBuf>) -> Self {
        let slug = slug.into();
        Self {
            title: slug.clone(),
            slug,
            version: "0.1.0".to_string(),
            author: String::new(),
            export_root: export_root.into(),
            dist_dir: dist_dir.into(),
            targets: Vec::new(),
            icon: None,
            eula: None,
            license: None,
            debug: false,
            include_forks: true,
            dry_run: false,
        }
    }

    pub fn with_target(mut self, target: PublishTarget) -> Self {
        self.targets.push(target);
        self
    }
}

/// Outcome for one archive.
#[derive(Debug, Clone)]
pub struct PackageResult {
    pub target: String,
    /// Fork slug for fork archives
    pub fork: Option<String>,
    pub archive_path: PathBuf,
    pub manifest_path: PathBuf,
    pub license_manifest_path: PathBuf,
    /// SHA-256 of the archive bytes
    pub checksum: String,
    pub size: u64,
    /// Dry-run diffs (empty otherwise)
    pub diffs: Vec<DiffEntry>,
    /// Provenance sidecars written (empty in a dry run)
    pub provenance_paths: Vec<PathBuf>,
}

/// `publish_manifest.json` payload. Carries no timestamps.
#[derive(Debug, Clone, Serialize)]
pub struct PublishManifest {
    pub schema: String,
    pub slug: String,
    pub title: String,
    pub version: String,
    pub author: String,
    pub target: String,
    pub storefront: String,
    pub platforms: Vec<Platform>,
    pub fork: Option<String>,
    pub archive: String,
    pub files: Vec<TreeFile>,
}

/// One tree to package: the main export or a fork.
struct PackageSource {
    fork: Option<String>,
    slug: String,
    root: PathBuf,
}

/// Package every target (and every fork, when enabled).
///
/// All validation happens before the first write: unknown/empty platform
/// lists, unsafe target names and a missing `game` tree fail up front.
pub fn package(options: &PackageOptions) -> Result<Vec<PackageResult>, ExportError> {
    if options.targets.is_empty() {
        return Err(ExportError::packaging("no publish targets configured"));
    }
    let mut targets = Vec::with_capacity(options.targets.len());
    for target in &options.targets {
        if !is_safe_path_component(&target.name) || target.name.contains(' ') {
            return Err(ExportError::packaging(format!(
                "invalid target name '{}'",
                target.name
            )));
        }
        targets.push((target, parse_platforms(&target.name, &target.platforms)?));
    }

    let sources = package_sources(options)?;

    if options.dist_dir.exists() && !options.dist_dir.is_dir() {
        return Err(ExportError::invalid_output(
            &options.dist_dir,
            "dist path exists and is not a directory",
        ));
    }

    let icon = icon_png(options.icon.as_deref(), &options.slug)?;
    let eula = legal::text_or_default(options.eula.as_deref(), || {
        default_eula(&options.title, &options.version, &options.author)
    })?;
    let license = legal::text_or_default(options.license.as_deref(), || {
        default_license(&options.title, &options.author)
    })?;

    let mut results = Vec::new();
    for source in &sources {
        for (target, platforms) in &targets {
            let result = package_one(options, source, target, platforms, &icon, &eula, &license)?;
            tracing::info!(
                "Packaged {} ({} bytes, sha256 {})",
                result.archive_path.display(),
                result.size,
                result.checksum
            );
            results.push(result);
        }
    }
    Ok(results)
}

fn package_sources(options: &PackageOptions) -> Result<Vec<PackageSource>, ExportError> {
    let game = options.export_root.join(TALEWRIGHT_FORMAT.game_dir);
    if !game.is_dir() {
        return Err(ExportError::packaging(format!(
            "missing game tree at {}",
            game.display()
        )));
    }

    let mut sources = vec![PackageSource {
        fork: None,
        slug: options.slug.clone(),
        root: options.export_root.clone(),
    }];
    if !options.include_forks {
        return Ok(sources);
    }

    for fork in exported_forks(&options.export_root)? {
        let expected = format!("{}/{}", TALEWRIGHT_FORMAT.forks_dir, fork.slug);
        if !is_safe_path_component(&fork.slug) || fork.path != expected {
            return Err(ExportError::packaging(format!(
                "fork '{}' has an unexpected path '{}'",
                fork.slug, fork.path
            )));
        }
        let root = options.export_root.join(&fork.path);
        if !root.join(TALEWRIGHT_FORMAT.game_dir).is_dir() {
            return Err(ExportError::packaging(format!(
                "fork '{}' has no game tree",
                fork.slug
            )));
        }
        sources.push(PackageSource {
            slug: format!("{}-{}", options.slug, fork.slug),
            fork: Some(fork.slug),
            root,
        });
    }
    Ok(sources)
}

#[derive(Deserialize)]
struct ExportedManifest {
    pov: ExportedPov,
}

#[derive(Deserialize)]
struct ExportedPov {
    #[serde(default)]
    forks: Vec<ForkDescriptor>,
}

/// Forks recorded by the export that produced `export_root`. A tree without
/// an export manifest has none.
fn exported_forks(export_root: &std::path::Path) -> Result<Vec<ForkDescriptor>, ExportError> {
    let path = export_root.join(TALEWRIGHT_FORMAT.export_manifest);
    if !path.is_file() {
        tracing::debug!("No {} in {}; packaging without forks", TALEWRIGHT_FORMAT.export_manifest, export_root.display());
        return Ok(Vec::new());
    }
    let bytes = read_file_with_limit(&path, MAX_DOCUMENT_BYTES)?;
    let manifest: ExportedManifest = serde_json::from_slice(&bytes).map_err(|e| {
        ExportError::packaging(format!("unreadable {}: {e}", path.display()))
    })?;
    Ok(manifest.pov.forks)
}

#[allow(clippy::too_many_arguments)]
fn package_one(
    options: &PackageOptions,
    source: &PackageSource,
    target: &PublishTarget,
    platforms: &[Platform],
    icon: &[u8],
    eula: &str,
    license: &str,
) -> Result<PackageResult, ExportError> {
    let stem = format!("{}-{}", source.slug, target.name);
    let archive_name = format!("{stem}.{}", TALEWRIGHT_FORMAT.archive_ext);
    let prefix = format!("{}/{}", source.slug, target.name);

    let mut builder = ArchiveBuilder::new();
    let files = builder.add_tree(
        &format!("{prefix}/{}", TALEWRIGHT_FORMAT.game_dir),
        &source.root.join(TALEWRIGHT_FORMAT.game_dir),
    )?;

    let channels = channels_for(&target.name, &source.slug, &archive_name, platforms);
    let manifest = PublishManifest {
        schema: PUBLISH_SCHEMA.to_string(),
        slug: source.slug.clone(),
        title: options.title.clone(),
        version: options.version.clone(),
        author: options.author.clone(),
        target: target.name.clone(),
        storefront: channels.storefront.clone(),
        platforms: platforms.to_vec(),
        fork: source.fork.clone(),
        archive: archive_name.clone(),
        files,
    };
    let manifest_json = to_pretty_json(&manifest)?;
    let licenses = license_manifest(&source.root, &source.slug, &options.version)?;
    let licenses_json = to_pretty_json(&licenses)?;

    let mut inputs = Vec::new();
    let export_manifest = source.root.join(TALEWRIGHT_FORMAT.export_manifest);
    if export_manifest.is_file() {
        let bytes = read_file_with_limit(&export_manifest, MAX_DOCUMENT_BYTES)?;
        inputs.push(ProvenanceInput::artifact(
            "export_manifest",
            TALEWRIGHT_FORMAT.export_manifest,
            &bytes,
        ));
    }
    let stamp = ProvenanceStamp::for_bytes(
        TALEWRIGHT_FORMAT.publish_manifest,
        manifest_json.as_bytes(),
        inputs.clone(),
    );

    builder.add(format!("{prefix}/{}", TALEWRIGHT_FORMAT.publish_manifest), manifest_json.clone());
    builder.add(format!("{prefix}/{}", TALEWRIGHT_FORMAT.channels_file), to_pretty_json(&channels)?);
    builder.add(format!("{prefix}/legal/EULA.txt"), eula);
    builder.add(format!("{prefix}/legal/LICENSE.txt"), license);
    builder.add(format!("{prefix}/legal/license_manifest.json"), licenses_json.clone());
    builder.add(format!("{prefix}/{}", TALEWRIGHT_FORMAT.provenance_file), stamp.to_json()?);
    builder.add(format!("{prefix}/icon.png"), icon);
    if options.debug {
        builder.add(format!("{prefix}/debug/hook_catalog.json"), to_pretty_json(HOOK_CATALOG)?);
    }

    let archive = builder.build()?;
    let checksum = sha256_hex(&archive);

    let manifest_name = format!("{stem}.{}", TALEWRIGHT_FORMAT.publish_manifest);
    let licenses_name = format!("{stem}.license_manifest.json");

    let mut sink = ArtifactSink::new(&options.dist_dir, options.dry_run);
    let archive_path = sink.write_bytes(&archive_name, &archive)?;
    let manifest_path = sink.write_text(&manifest_name, &manifest_json)?;
    let license_manifest_path = sink.write_text(&licenses_name, &licenses_json)?;

    let mut provenance_paths = Vec::new();
    if !options.dry_run {
        let manifest_stamp = ProvenanceStamp::for_bytes(&manifest_name, manifest_json.as_bytes(), inputs);
        let archive_stamp = ProvenanceStamp::for_bytes(
            &archive_name,
            &archive,
            vec![ProvenanceInput::artifact(
                "publish_manifest",
                &manifest_name,
                manifest_json.as_bytes(),
            )],
        );
        provenance_paths.push(sink.write_text(
            &TALEWRIGHT_FORMAT.provenance_sidecar(&manifest_name),
            &manifest_stamp.to_json()?,
        )?);
        provenance_paths.push(sink.write_text(
            &TALEWRIGHT_FORMAT.provenance_sidecar(&archive_name),
            &archive_stamp.to_json()?,
        )?);
    }

    Ok(PackageResult {
        target: target.name.clone(),
        fork: source.fork.clone(),
        archive_path,
        manifest_path,
        license_manifest_path,
        checksum,
        size: archive.len() as u64,
        diffs: sink.into_diffs(),
        provenance_paths,
    })
}
