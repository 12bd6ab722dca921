//! `export_manifest.json` and `label_manifest.json`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use talewright_shared::{ProjectDocument, TimelineDocument, WorldDocument};

use crate::assets::{AssetCatalog, AssetUsage, ExpressionFallback, ResolutionStep};
use crate::error::{ExportError, ExportWarning};
use crate::oracle::{GateDecision, RatingDecision};
use crate::provenance::to_pretty_json;
use crate::routes::{PovRoute, RoutePlan};
use crate::viewpoint::PovCatalog;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportManifest {
    pub project: ProjectSnapshot,
    pub timeline: Option<TimelineSnapshot>,
    pub generated_at: String,
    pub script: ScriptSection,
    pub pov: PovSection,
    pub worlds: WorldsSection,
    pub assets: AssetsSection,
    pub missing_assets: MissingAssets,
    pub gate: GateDecision,
    pub rating: RatingDecision,
    pub warnings: Vec<ExportWarning>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectSnapshot {
    pub id: String,
    pub title: String,
    pub author: String,
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineSnapshot {
    pub id: String,
    pub title: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScriptSection {
    /// Main script, relative to the export root
    pub path: String,
    /// scene id → label
    pub labels: BTreeMap<String, String>,
    /// Per-scene module paths, relative to the export root
    pub modules: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PovSection {
    pub mode: String,
    pub menu_enabled: bool,
    /// Viewpoints this script plays
    pub active: Vec<String>,
    pub default: Option<String>,
    pub routes: Vec<PovRoute>,
    pub forks: Vec<ForkDescriptor>,
}

/// Where a fork's isolated tree lives, relative to the export root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkDescriptor {
    pub pov_id: String,
    pub slug: String,
    pub path: String,
    pub script: String,
    pub manifest: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorldsSection {
    pub selected: Option<WorldSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorldSnapshot {
    pub id: String,
    pub name: Option<String>,
    pub timeline: Option<String>,
    pub default_pov: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssetsSection {
    pub backgrounds: Vec<AssetRecord>,
    pub portraits: Vec<AssetRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetRecord {
    pub alias: String,
    pub logical_name: String,
    pub path: String,
    pub output_path: String,
    pub sha256: String,
    pub size: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub license: Option<String>,
    pub author: Option<String>,
    pub source: Option<String>,
    pub resolved_by: ResolutionStep,
    pub fallback: Option<ExpressionFallback>,
}

impl From<&AssetUsage> for AssetRecord {
    fn from(usage: &AssetUsage) -> Self {
        Self {
            alias: usage.alias.clone(),
            logical_name: usage.logical_name.clone(),
            path: usage.rel_path.clone(),
            output_path: usage.output_path.clone(),
            sha256: usage.sha256.clone(),
            size: usage.size,
            width: usage.width,
            height: usage.height,
            license: usage.provenance.license.clone(),
            author: usage.provenance.author.clone(),
            source: usage.provenance.source.clone(),
            resolved_by: usage.step,
            fallback: usage.fallback.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MissingAssets {
    pub backgrounds: Vec<String>,
    pub portraits: Vec<String>,
}

/// One `label_manifest.json` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelRecord {
    pub scene_id: String,
    pub label: String,
    pub pov_ids: Vec<String>,
    pub pov_names: Vec<String>,
}

/// What one manifest covers: the master script or a single fork.
#[derive(Debug, Clone, Default)]
pub struct ManifestScope {
    pub script: ScriptSection,
    pub active: Vec<String>,
    pub routes: Vec<PovRoute>,
    pub menu_enabled: bool,
    pub forks: Vec<ForkDescriptor>,
    /// Restrict asset records to these aliases; `None` keeps every asset
    pub aliases: Option<BTreeSet<String>>,
}

/// Collects the stage outputs a manifest is assembled from.
pub struct ManifestBuilder<'a> {
    pub project: &'a ProjectDocument,
    pub timeline: Option<&'a TimelineDocument>,
    pub world: Option<&'a WorldDocument>,
    pub catalog: &'a AssetCatalog,
    pub plan: &'a RoutePlan,
    pub gate: &'a GateDecision,
    pub rating: &'a RatingDecision,
    pub warnings: &'a [ExportWarning],
}

impl ManifestBuilder<'_> {
    /// Build a manifest with an empty `generated_at`; see [`resolve_generated_at`].
    pub fn build(&self, scope: ManifestScope) -> ExportManifest {
        let keep = |usage: &&AssetUsage| {
            scope
                .aliases
                .as_ref()
                .map(|aliases| aliases.contains(&usage.alias))
                .unwrap_or(true)
        };

        ExportManifest {
            project: ProjectSnapshot {
                id: self.project.id.clone(),
                title: self.project.display_title().to_string(),
                author: self.project.author.clone(),
                source: display_path(self.project.source_path.as_deref()),
            },
            timeline: self.timeline.map(|t| TimelineSnapshot {
                id: t.id.clone(),
                title: t.title.clone(),
                source: display_path(t.source_path.as_deref()),
            }),
            generated_at: String::new(),
            script: scope.script,
            pov: PovSection {
                mode: self.plan.mode.as_str().to_string(),
                menu_enabled: scope.menu_enabled,
                active: scope.active,
                default: self.plan.default_pov.clone(),
                routes: scope.routes,
                forks: scope.forks,
            },
            worlds: WorldsSection {
                selected: self.world.map(|w| WorldSnapshot {
                    id: w.id.clone(),
                    name: w.name.clone(),
                    timeline: w.timeline.clone(),
                    default_pov: w.default_pov.clone(),
                    source: display_path(w.source_path.as_deref()),
                }),
            },
            assets: AssetsSection {
                backgrounds: self.catalog.backgrounds().filter(keep).map(AssetRecord::from).collect(),
                portraits: self.catalog.portraits().filter(keep).map(AssetRecord::from).collect(),
            },
            missing_assets: MissingAssets {
                backgrounds: self.catalog.missing_backgrounds().iter().cloned().collect(),
                portraits: self.catalog.missing_portraits().iter().cloned().collect(),
            },
            gate: self.gate.clone(),
            rating: self.rating.clone(),
            warnings: self.warnings.to_vec(),
        }
    }
}

/// Rows for `label_manifest.json`, one per scene.
pub fn label_records(
    labels: &[(String, String)],
    routes: &[PovRoute],
    catalog: &PovCatalog,
) -> Vec<LabelRecord> {
    labels
        .iter()
        .map(|(scene_id, label)| {
            let pov_ids: Vec<String> = routes
                .iter()
                .filter(|r| r.scene_ids.iter().any(|id| id == scene_id))
                .map(|r| r.pov_id.clone())
                .collect();
            let pov_names = pov_ids
                .iter()
                .map(|id| {
                    catalog
                        .get(id)
                        .map(|e| e.display_name().to_string())
                        .unwrap_or_else(|| id.clone())
                })
                .collect();
            LabelRecord {
                scene_id: scene_id.clone(),
                label: label.clone(),
                pov_ids,
                pov_names,
            }
        })
        .collect()
}

/// Pick `generated_at` and render the manifest to JSON.
///
/// A fixed timestamp always wins. Otherwise the previous manifest's timestamp
/// is kept when every other field is identical, so unchanged re-runs produce
/// identical bytes; anything else gets the current time.
pub fn resolve_generated_at(
    manifest: &mut ExportManifest,
    previous: Option<&str>,
    fixed: Option<DateTime<Utc>>,
) -> Result<String, ExportError> {
    if let Some(fixed) = fixed {
        manifest.generated_at = format_timestamp(fixed);
        return to_pretty_json(manifest);
    }

    if let Some(previous_at) = previous.and_then(|p| reusable_timestamp(manifest, p)) {
        tracing::debug!("Manifest unchanged; keeping generated_at {}", previous_at);
        manifest.generated_at = previous_at;
        return to_pretty_json(manifest);
    }

    manifest.generated_at = format_timestamp(Utc::now());
    to_pretty_json(manifest)
}

fn reusable_timestamp(manifest: &ExportManifest, previous: &str) -> Option<String> {
    let mut previous: Value = serde_json::from_str(previous).ok()?;
    let timestamp = previous
        .as_object_mut()?
        .remove("generated_at")?
        .as_str()?
        .to_string();

    let mut current = serde_json::to_value(manifest).ok()?;
    current.as_object_mut()?.remove("generated_at");

    (current == previous).then_some(timestamp)
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn display_path(path: Option<&Path>) -> Option<String> {
    path.map(|p| p.display().to_string())
}
