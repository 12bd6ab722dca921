//! Export orchestration: load → gate → resolve → plan → render → write.
//!
//! Every fatal check (missing documents, gate/rating denial, unusable output
//! directory) runs before the first write. Writes go through an
//! [`ArtifactSink`] in a fixed order, so a dry run reports exactly the diffs a
//! real run would produce. Files left in generated directories by earlier runs
//! are pruned last.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use talewright_shared::{
    read_file_with_limit, ProjectDocument, SceneDocument, TimelineDocument, TimelineEntry,
    WorldDocument, MAX_DOCUMENT_BYTES, TALEWRIGHT_FORMAT,
};

use crate::assets::{AssetCatalog, AssetIndex, AssetResolver, BackgroundUsage, PortraitUsage};
use crate::diff::{ArtifactSink, DiffEntry};
use crate::error::{AssetKind, DocumentKind, ExportError, ExportWarning};
use crate::manifest::{
    label_records, resolve_generated_at, ExportManifest, ForkDescriptor, ManifestBuilder,
    ManifestScope, ScriptSection,
};
use crate::options::ExportOptions;
use crate::oracle::{AdvisoryFinding, BundleContext, GateDecision, Oracles, RatingDecision, RatingRequest};
use crate::provenance::{to_pretty_json, ProvenanceInput, ProvenanceStamp};
use crate::render::{normalize_scene, scene_warnings, CompiledScene, RenderedScript, SceneNode, ScriptPlan, ScriptRenderer};
use crate::routes::{plan_routes, LabelAllocator, PovRoute, RoutePlan, SequenceEntry};
use crate::store::DocumentStore;
use crate::viewpoint::{collect_placement_povs, collect_scene_povs};

/// Mode sent to the rating oracle, dry run or not.
const RATING_MODE: &str = "export";

const SCENE_LABEL_PREFIX: &str = "scene_";

/// Documents loaded for one invocation.
#[derive(Debug, Clone)]
pub struct ExportContext {
    pub project: ProjectDocument,
    pub timeline: Option<TimelineDocument>,
    pub world: Option<WorldDocument>,
    /// Ordered placements (timeline order, or the project's scene list)
    pub sequence: Vec<TimelineEntry>,
    /// Distinct scenes in first-placement order
    pub scenes: Vec<SceneDocument>,
}

impl ExportContext {
    /// Load the project, world, timeline and every placed scene.
    pub fn load(store: &dyn DocumentStore, options: &ExportOptions) -> Result<Self, ExportError> {
        let project = store.project(&options.project_id)?;

        let world = options
            .world_id
            .as_deref()
            .map(|id| store.world(id))
            .transpose()?;

        let timeline_id = options
            .timeline_id
            .clone()
            .or_else(|| world.as_ref().and_then(|w| w.timeline.clone()));
        let timeline = timeline_id
            .as_deref()
            .map(|id| store.timeline(id))
            .transpose()?;

        let sequence: Vec<TimelineEntry> = match &timeline {
            Some(timeline) => timeline.scene_order.clone(),
            None => project
                .scenes
                .iter()
                .map(|id| TimelineEntry::SceneId(id.clone()))
                .collect(),
        };

        let mut seen = BTreeSet::new();
        let mut scenes = Vec::new();
        for entry in &sequence {
            let scene_id = entry.scene_id().trim();
            if seen.insert(scene_id.to_string()) {
                scenes.push(store.scene(scene_id)?);
            }
        }

        tracing::info!(
            "Loaded project '{}' ({} placements, {} scenes{})",
            project.id,
            sequence.len(),
            scenes.len(),
            timeline
                .as_ref()
                .map(|t| format!(", timeline '{}'", t.id))
                .unwrap_or_default()
        );

        Ok(Self {
            project,
            timeline,
            world,
            sequence,
            scenes,
        })
    }

    /// Input documents with content hashes, for provenance stamps.
    pub fn provenance_inputs(&self) -> Result<Vec<ProvenanceInput>, ExportError> {
        let mut inputs = vec![ProvenanceInput::document(
            DocumentKind::Project,
            &self.project.id,
            self.project.source_path.as_deref(),
            &self.project,
        )?];
        if let Some(timeline) = &self.timeline {
            inputs.push(ProvenanceInput::document(
                DocumentKind::Timeline,
                &timeline.id,
                timeline.source_path.as_deref(),
                timeline,
            )?);
        }
        if let Some(world) = &self.world {
            inputs.push(ProvenanceInput::document(
                DocumentKind::World,
                &world.id,
                world.source_path.as_deref(),
                world,
            )?);
        }
        for scene in &self.scenes {
            inputs.push(ProvenanceInput::document(
                DocumentKind::Scene,
                &scene.id,
                scene.source_path.as_deref(),
                scene,
            )?);
        }
        Ok(inputs)
    }
}

/// A route's independent output tree under `forks/<slug>/`.
#[derive(Debug, Clone)]
pub struct PovFork {
    pub pov_id: String,
    pub slug: String,
    pub dir: PathBuf,
    pub script_path: PathBuf,
    pub manifest_path: PathBuf,
    pub scene_labels: Vec<String>,
}

/// Everything an export produced.
#[derive(Debug, Clone)]
pub struct ExportResult {
    pub output_dir: PathBuf,
    pub script_path: PathBuf,
    pub module_paths: Vec<PathBuf>,
    pub manifest_path: PathBuf,
    pub label_manifest_path: PathBuf,
    /// scene id → label
    pub labels: BTreeMap<String, String>,
    pub backgrounds: Vec<BackgroundUsage>,
    pub portraits: Vec<PortraitUsage>,
    pub missing_backgrounds: Vec<String>,
    pub missing_portraits: Vec<String>,
    pub routes: Vec<PovRoute>,
    pub menu_enabled: bool,
    pub default_pov: Option<String>,
    pub forks: Vec<PovFork>,
    pub manifest: ExportManifest,
    /// Per-file diffs (dry run only)
    pub diffs: Vec<DiffEntry>,
    pub gate: GateDecision,
    pub rating: RatingDecision,
    pub warnings: Vec<ExportWarning>,
    pub advisories: Vec<AdvisoryFinding>,
    pub dry_run: bool,
}

impl ExportResult {
    /// Dry-run diffs that would change something.
    pub fn changes(&self) -> impl Iterator<Item = &DiffEntry> {
        self.diffs.iter().filter(|d| !d.is_unchanged())
    }
}

/// Compile a project into a script bundle under `options.output_dir`.
pub fn export(
    store: &dyn DocumentStore,
    options: &ExportOptions,
    oracles: &Oracles<'_>,
) -> Result<ExportResult, ExportError> {
    let context = ExportContext::load(store, options)?;

    let gate = oracles.gate.evaluate(&options.gate_action);
    for warning in &gate.warnings {
        tracing::warn!("Gate: {}", warning);
    }
    if !gate.allow {
        return Err(ExportError::GateBlocked {
            oracle: "gate",
            payload: serde_json::to_value(&gate).map_err(anyhow::Error::from)?,
        });
    }

    let index = AssetIndex::build(&options.asset_root)?;
    let resolver = AssetResolver::new(&index);
    let mut catalog = AssetCatalog::new();
    let mut warnings = Vec::new();

    let mut labels = LabelAllocator::new();
    let mut scene_labels = BTreeMap::new();
    let mut compiled = Vec::with_capacity(context.scenes.len());
    for scene in &context.scenes {
        let label = labels.allocate(&scene.id, SCENE_LABEL_PREFIX);
        scene_labels.insert(scene.id.clone(), label.clone());
        compiled.push(compile_scene(scene, label, &resolver, &mut catalog, &mut warnings)?);
    }
    for scene in &compiled {
        warnings.extend(scene_warnings(scene, &scene_labels));
    }

    let content = rating_content(&compiled);
    let rating = oracles.rating.evaluate(&RatingRequest {
        subject: &context.project.id,
        content: &content,
        mode: RATING_MODE,
        acknowledged: options.rating_acknowledged,
        action: &options.gate_action,
        ack_token: options.ack_token.as_deref(),
    });
    if !rating.allowed {
        return Err(ExportError::GateBlocked {
            oracle: "rating",
            payload: serde_json::to_value(&rating).map_err(anyhow::Error::from)?,
        });
    }

    check_output_dir(options)?;

    let sequence: Vec<SequenceEntry> = context
        .sequence
        .iter()
        .filter_map(|entry| {
            let scene_id = entry.scene_id().trim();
            let scene = context.scenes.iter().find(|s| s.id == scene_id)?;
            Some(SequenceEntry {
                scene_id: scene.id.clone(),
                label: scene_labels.get(&scene.id)?.clone(),
                scene_povs: collect_scene_povs(scene),
                placement_povs: collect_placement_povs(entry),
            })
        })
        .collect();

    let plan = plan_routes(
        &sequence,
        &mut labels,
        options.route_mode,
        options.switch_menu,
        context.world.as_ref(),
    );

    let renderer = ScriptRenderer::new(&catalog, &scene_labels);
    let master = renderer.render(&ScriptPlan {
        scenes: compiled.iter().collect(),
        start_calls: sequence.iter().map(|e| e.label.clone()).collect(),
        menu_routes: if plan.menu { plan.routes.iter().collect() } else { Vec::new() },
        per_scene_modules: options.per_scene_modules,
    });

    for warning in &warnings {
        tracing::warn!("{}", warning);
    }

    let inputs = context.provenance_inputs()?;
    let manifests = ManifestBuilder {
        project: &context.project,
        timeline: context.timeline.as_ref(),
        world: context.world.as_ref(),
        catalog: &catalog,
        plan: &plan,
        gate: &gate,
        rating: &rating,
        warnings: &warnings,
    };

    let mut sink = ArtifactSink::new(&options.output_dir, options.dry_run);
    let script_path = write_game_tree(&mut sink, "", &master, &catalog, &inputs)?;
    let module_paths = master
        .modules
        .iter()
        .map(|m| options.output_dir.join(&m.path))
        .collect();

    let mut forks = Vec::new();
    let mut fork_descriptors = Vec::new();
    if plan.forks {
        for route in &plan.routes {
            let (fork, descriptor) = write_fork(
                &mut sink,
                route,
                &compiled,
                &renderer,
                &manifests,
                &inputs,
                options,
            )?;
            forks.push(fork);
            fork_descriptors.push(descriptor);
        }
    }

    let scene_pairs: Vec<(String, String)> = compiled
        .iter()
        .map(|s| (s.scene_id.clone(), s.label.clone()))
        .collect();
    let label_json = to_pretty_json(&label_records(&scene_pairs, &plan.routes, &plan.catalog))?;
    let label_manifest_path = sink.write_text(TALEWRIGHT_FORMAT.label_manifest, &label_json)?;

    let mut manifest = manifests.build(ManifestScope {
        script: script_section(&master, &scene_pairs),
        active: plan.routes.iter().map(|r| r.pov_id.clone()).collect(),
        routes: plan.routes.clone(),
        menu_enabled: plan.menu,
        forks: fork_descriptors,
        aliases: None,
    });
    let (manifest_path, _) = write_manifest(&mut sink, "", &mut manifest, options, &inputs)?;

    // Generated trees hold only what this run produced
    for dir in generated_dirs() {
        let stale = sink.prune(&dir)?;
        if stale > 0 {
            tracing::info!("{} stale file(s) under {}", stale, dir);
        }
    }

    let advisories = if options.dry_run {
        Vec::new()
    } else {
        run_advisory(oracles, &context, options, &catalog)
    };

    let diffs = sink.into_diffs();
    if options.dry_run {
        let changed = diffs.iter().filter(|d| !d.is_unchanged()).count();
        tracing::info!("Dry run: {} file(s), {} would change", diffs.len(), changed);
    } else {
        tracing::info!(
            "Exported {} scene(s) to {}",
            compiled.len(),
            options.output_dir.display()
        );
    }

    Ok(ExportResult {
        output_dir: options.output_dir.clone(),
        script_path,
        module_paths,
        manifest_path,
        label_manifest_path,
        labels: scene_labels,
        backgrounds: catalog.backgrounds().cloned().collect(),
        portraits: catalog.portraits().cloned().collect(),
        missing_backgrounds: catalog.missing_backgrounds().iter().cloned().collect(),
        missing_portraits: catalog.missing_portraits().iter().cloned().collect(),
        routes: plan.routes.clone(),
        menu_enabled: plan.menu,
        default_pov: plan.default_pov.clone(),
        forks,
        manifest,
        diffs,
        gate,
        rating,
        warnings,
        advisories,
        dry_run: options.dry_run,
    })
}

fn compile_scene(
    scene: &SceneDocument,
    label: String,
    resolver: &AssetResolver<'_>,
    catalog: &mut AssetCatalog,
    warnings: &mut Vec<ExportWarning>,
) -> Result<CompiledScene, ExportError> {
    let nodes = normalize_scene(scene);
    for node in &nodes {
        match node {
            SceneNode::Background { reference } => {
                catalog.register(AssetKind::Background, reference, &scene.id, resolver, warnings)?;
            }
            SceneNode::Portrait { reference } => {
                catalog.register(AssetKind::Portrait, reference, &scene.id, resolver, warnings)?;
            }
            _ => {}
        }
    }

    tracing::debug!("Compiled scene '{}' as '{}' ({} nodes)", scene.id, label, nodes.len());
    Ok(CompiledScene {
        scene_id: scene.id.clone(),
        label,
        title: scene.title.clone(),
        nodes,
    })
}

/// Everything the rating oracle reads: titles, speakers, lines and options.
fn rating_content(scenes: &[CompiledScene]) -> String {
    let mut parts = Vec::new();
    for scene in scenes {
        if let Some(title) = &scene.title {
            parts.push(title.clone());
        }
        for node in &scene.nodes {
            match node {
                SceneNode::Line { speaker, text } => match speaker {
                    Some(speaker) => parts.push(format!("{speaker}: {text}")),
                    None => parts.push(text.clone()),
                },
                SceneNode::Choice { prompt, options } => {
                    parts.extend(prompt.iter().cloned());
                    parts.extend(options.iter().map(|o| o.text.clone()));
                }
                _ => {}
            }
        }
    }
    parts.join("\n")
}

fn check_output_dir(options: &ExportOptions) -> Result<(), ExportError> {
    let dir = options.output_dir();
    if !dir.exists() {
        return Ok(());
    }
    if !dir.is_dir() {
        return Err(ExportError::invalid_output(dir, "exists and is not a directory"));
    }
    if options.force || options.dry_run {
        return Ok(());
    }
    let mut entries = std::fs::read_dir(dir).map_err(|e| ExportError::io(dir, e))?;
    if entries.next().is_some() {
        return Err(ExportError::invalid_output(
            dir,
            "directory is not empty (use --force to overwrite)",
        ));
    }
    Ok(())
}

/// Write images, modules, script and its provenance stamp below `prefix`
/// (empty for the export root). Returns the script path.
fn write_game_tree(
    sink: &mut ArtifactSink,
    prefix: &str,
    rendered: &RenderedScript,
    catalog: &AssetCatalog,
    inputs: &[ProvenanceInput],
) -> Result<PathBuf, ExportError> {
    let mut images: Vec<(&str, &Path)> = rendered
        .aliases
        .iter()
        .filter_map(|alias| catalog.by_alias(alias))
        .map(|usage| (usage.output_path.as_str(), usage.source_path.as_path()))
        .collect();
    images.sort();
    images.dedup_by(|a, b| a.0 == b.0);
    for (output_path, source) in images {
        sink.copy_file(&join_rel(prefix, output_path), source)?;
    }

    for module in &rendered.modules {
        sink.write_text(&join_rel(prefix, &module.path), &module.text)?;
    }

    let script_rel = TALEWRIGHT_FORMAT.script_path();
    let script_path = sink.write_text(&join_rel(prefix, &script_rel), &rendered.script)?;

    let stamp = ProvenanceStamp::for_bytes(&script_rel, rendered.script.as_bytes(), inputs.to_vec());
    sink.write_text(
        &join_rel(prefix, &TALEWRIGHT_FORMAT.provenance_sidecar(&script_rel)),
        &stamp.to_json()?,
    )?;

    Ok(script_path)
}

/// Resolve `generated_at` against the manifest already on disk, then write
/// the manifest and its provenance stamp.
fn write_manifest(
    sink: &mut ArtifactSink,
    prefix: &str,
    manifest: &mut ExportManifest,
    options: &ExportOptions,
    inputs: &[ProvenanceInput],
) -> Result<(PathBuf, String), ExportError> {
    let rel = join_rel(prefix, TALEWRIGHT_FORMAT.export_manifest);
    let previous = read_previous(&options.output_dir.join(&rel));
    let json = resolve_generated_at(manifest, previous.as_deref(), options.generated_at)?;
    let path = sink.write_text(&rel, &json)?;

    let stamp = ProvenanceStamp::for_bytes(TALEWRIGHT_FORMAT.export_manifest, json.as_bytes(), inputs.to_vec());
    sink.write_text(&TALEWRIGHT_FORMAT.provenance_sidecar(&rel), &stamp.to_json()?)?;
    Ok((path, json))
}

fn write_fork(
    sink: &mut ArtifactSink,
    route: &PovRoute,
    compiled: &[CompiledScene],
    renderer: &ScriptRenderer<'_>,
    manifests: &ManifestBuilder<'_>,
    inputs: &[ProvenanceInput],
    options: &ExportOptions,
) -> Result<(PovFork, ForkDescriptor), ExportError> {
    let prefix = format!("{}/{}", TALEWRIGHT_FORMAT.forks_dir, route.slug);
    let scenes: Vec<&CompiledScene> = compiled
        .iter()
        .filter(|s| route.scene_ids.contains(&s.scene_id))
        .collect();
    let rendered = renderer.render(&ScriptPlan {
        scenes: scenes.clone(),
        start_calls: route.scene_labels.clone(),
        menu_routes: Vec::new(),
        per_scene_modules: options.per_scene_modules,
    });

    let script_path = write_game_tree(sink, &prefix, &rendered, manifests.catalog, inputs)?;

    let scene_pairs: Vec<(String, String)> = scenes
        .iter()
        .map(|s| (s.scene_id.clone(), s.label.clone()))
        .collect();
    let mut manifest = manifests.build(ManifestScope {
        script: script_section(&rendered, &scene_pairs),
        active: vec![route.pov_id.clone()],
        routes: vec![route.clone()],
        menu_enabled: false,
        forks: Vec::new(),
        aliases: Some(rendered.aliases.clone()),
    });
    let (manifest_path, _) = write_manifest(sink, &prefix, &mut manifest, options, inputs)?;

    tracing::info!(
        "Fork '{}': {} scene(s) under {}",
        route.pov_id,
        scenes.len(),
        prefix
    );

    let descriptor = ForkDescriptor {
        pov_id: route.pov_id.clone(),
        slug: route.slug.clone(),
        path: prefix.clone(),
        script: join_rel(&prefix, &TALEWRIGHT_FORMAT.script_path()),
        manifest: join_rel(&prefix, TALEWRIGHT_FORMAT.export_manifest),
    };
    let fork = PovFork {
        pov_id: route.pov_id.clone(),
        slug: route.slug.clone(),
        dir: options.output_dir.join(&prefix),
        script_path,
        manifest_path,
        scene_labels: route.scene_labels.clone(),
    };
    Ok((fork, descriptor))
}

/// Output directories owned entirely by the exporter.
fn generated_dirs() -> [String; 3] {
    [
        join_rel(TALEWRIGHT_FORMAT.game_dir, TALEWRIGHT_FORMAT.scenes_dir),
        join_rel(TALEWRIGHT_FORMAT.game_dir, TALEWRIGHT_FORMAT.images_dir),
        TALEWRIGHT_FORMAT.forks_dir.to_string(),
    ]
}

fn script_section(rendered: &RenderedScript, scenes: &[(String, String)]) -> ScriptSection {
    ScriptSection {
        path: TALEWRIGHT_FORMAT.script_path(),
        labels: scenes.iter().cloned().collect(),
        modules: rendered.modules.iter().map(|m| m.path.clone()).collect(),
    }
}

fn run_advisory(
    oracles: &Oracles<'_>,
    context: &ExportContext,
    options: &ExportOptions,
    catalog: &AssetCatalog,
) -> Vec<AdvisoryFinding> {
    let bundle = BundleContext {
        project_id: &context.project.id,
        output_dir: &options.output_dir,
        scenes: &context.scenes,
        scene_sources: context.scenes.iter().map(|s| s.source_path.clone()).collect(),
        assets: catalog.resolved_pairs(),
    };
    let findings = oracles.advisory.scan(&bundle);
    for finding in &findings {
        match &finding.scene_id {
            Some(scene_id) => tracing::warn!("Advisory [{}] {}: {}", finding.code, scene_id, finding.message),
            None => tracing::warn!("Advisory [{}] {}", finding.code, finding.message),
        }
    }
    findings
}

fn read_previous(path: &Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }
    let bytes = read_file_with_limit(path, MAX_DOCUMENT_BYTES).ok()?;
    String::from_utf8(bytes).ok()
}

fn join_rel(prefix: &str, rel: &str) -> String {
    if prefix.is_empty() {
        rel.to_string()
    } else {
        format!("{prefix}/{rel}")
    }
}
