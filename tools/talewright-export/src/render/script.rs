//! Label/jump script text generation.
//!
//! Output is a pure function of the compiled scenes, the label map and the
//! asset catalog: declarations are sorted by alias and nothing time-dependent
//! is written.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use talewright_shared::{slugify, TALEWRIGHT_FORMAT};

use super::nodes::SceneNode;
use crate::assets::{AssetCatalog, AssetRef, IMAGE_EXTENSIONS};
use crate::error::{AssetKind, ExportWarning};
use crate::routes::{PovRoute, ROUTE_MENU_LABEL};

const INDENT: &str = "    ";
const HEADER: &str = "# Generated by talewright. Do not edit by hand.\n";
const MENU_CAPTION: &str = "Choose a viewpoint.";
const MISSING_TAG: &str = "missing_asset";

/// A scene ready for rendering: normalized nodes under an allocated label.
#[derive(Debug, Clone)]
pub struct CompiledScene {
    pub scene_id: String,
    pub label: String,
    pub title: Option<String>,
    pub nodes: Vec<SceneNode>,
}

/// What a single script should contain.
#[derive(Debug, Clone, Default)]
pub struct ScriptPlan<'a> {
    /// Distinct scenes, in render order
    pub scenes: Vec<&'a CompiledScene>,
    /// Labels `start` calls, in sequence order (repeats allowed)
    pub start_calls: Vec<String>,
    /// Routes offered by the switch menu; empty means no menu
    pub menu_routes: Vec<&'a PovRoute>,
    pub per_scene_modules: bool,
}

/// A per-scene module file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptModule {
    /// Path relative to the export root
    pub path: String,
    pub label: String,
    pub text: String,
}

/// Rendered script text plus what it references.
#[derive(Debug, Clone, Default)]
pub struct RenderedScript {
    pub script: String,
    pub modules: Vec<ScriptModule>,
    /// Every label the script (and its modules) defines
    pub labels: Vec<String>,
    /// Asset aliases used by the rendered scenes
    pub aliases: BTreeSet<String>,
}

pub struct ScriptRenderer<'a> {
    catalog: &'a AssetCatalog,
    /// scene id → label
    scene_labels: &'a BTreeMap<String, String>,
}

impl<'a> ScriptRenderer<'a> {
    pub fn new(catalog: &'a AssetCatalog, scene_labels: &'a BTreeMap<String, String>) -> Self {
        Self {
            catalog,
            scene_labels,
        }
    }

    pub fn render(&self, plan: &ScriptPlan<'_>) -> RenderedScript {
        let available: BTreeSet<&str> = plan.scenes.iter().map(|s| s.label.as_str()).collect();
        let mut aliases = BTreeSet::new();
        let mut labels = vec!["start".to_string()];

        let blocks: Vec<(&CompiledScene, String)> = plan
            .scenes
            .iter()
            .map(|scene| (*scene, self.render_scene(scene, &available, &mut aliases)))
            .collect();

        let mut sections = Vec::new();
        if let Some(declarations) = self.render_declarations(&aliases) {
            sections.push(declarations);
        }

        if plan.menu_routes.is_empty() {
            sections.push(call_block("start", &plan.start_calls));
        } else {
            sections.push(format!("label start:\n{INDENT}jump {ROUTE_MENU_LABEL}\n"));
            sections.push(render_menu(&plan.menu_routes));
            labels.push(ROUTE_MENU_LABEL.to_string());
            for route in &plan.menu_routes {
                sections.push(call_block(&route.entry_label, &route.scene_labels));
                labels.push(route.entry_label.clone());
            }
        }

        let mut modules = Vec::new();
        for (scene, block) in blocks {
            labels.push(scene.label.clone());
            if plan.per_scene_modules {
                modules.push(ScriptModule {
                    path: TALEWRIGHT_FORMAT.scene_module_path(&scene.label),
                    label: scene.label.clone(),
                    text: format!("{HEADER}\n{block}"),
                });
            } else {
                sections.push(block);
            }
        }

        RenderedScript {
            script: format!("{HEADER}\n{}", sections.join("\n")),
            modules,
            labels,
            aliases,
        }
    }

    /// Label for a jump target: a scene id first, then a literal label.
    pub fn resolve_target<'s>(&'s self, target: &'s str, available: &BTreeSet<&str>) -> Option<&'s str> {
        let target = target.trim();
        match self.scene_labels.get(target) {
            Some(label) if available.contains(label.as_str()) => Some(label.as_str()),
            _ if available.contains(target) => Some(target),
            _ => None,
        }
    }

    fn render_declarations(&self, aliases: &BTreeSet<String>) -> Option<String> {
        let mut out = String::new();
        for alias in aliases {
            if let Some(usage) = self.catalog.by_alias(alias) {
                let path = format!("{}/{}", TALEWRIGHT_FORMAT.images_dir, usage.rel_path);
                let _ = writeln!(out, "image {alias} = {}", quote(&path));
            }
        }
        (!out.is_empty()).then_some(out)
    }

    fn render_scene(
        &self,
        scene: &CompiledScene,
        available: &BTreeSet<&str>,
        aliases: &mut BTreeSet<String>,
    ) -> String {
        let mut out = format!("label {}:\n", scene.label);

        for node in &scene.nodes {
            match node {
                SceneNode::Line { speaker, text } => {
                    let _ = match speaker {
                        Some(speaker) => writeln!(out, "{INDENT}{} {}", quote(speaker), quote(text)),
                        None => writeln!(out, "{INDENT}{}", quote(text)),
                    };
                }
                SceneNode::Choice { prompt, options } => {
                    if options.is_empty() {
                        if let Some(prompt) = prompt {
                            let _ = writeln!(out, "{INDENT}{}", quote(prompt));
                        }
                        let _ = writeln!(out, "{INDENT}# choice without options");
                        continue;
                    }
                    let _ = writeln!(out, "{INDENT}menu:");
                    if let Some(prompt) = prompt {
                        let _ = writeln!(out, "{INDENT}{INDENT}{}", quote(prompt));
                    }
                    for option in options {
                        let _ = writeln!(out, "{INDENT}{INDENT}{}:", quote(&option.text));
                        let target = option
                            .target
                            .as_deref()
                            .and_then(|t| self.resolve_target(t, available));
                        let _ = match target {
                            Some(label) => writeln!(out, "{INDENT}{INDENT}{INDENT}jump {label}"),
                            None => writeln!(out, "{INDENT}{INDENT}{INDENT}pass"),
                        };
                    }
                }
                SceneNode::Jump { target } => {
                    let _ = match self.resolve_target(target, available) {
                        Some(label) => writeln!(out, "{INDENT}jump {label}"),
                        None => writeln!(
                            out,
                            "{INDENT}# unresolved jump: {}\n{INDENT}pass",
                            comment_text(target)
                        ),
                    };
                }
                SceneNode::Background { reference } => {
                    let token = self.token(AssetKind::Background, reference, aliases);
                    let _ = writeln!(out, "{INDENT}scene {token}");
                }
                SceneNode::Portrait { reference } => {
                    let token = self.token(AssetKind::Portrait, reference, aliases);
                    let _ = writeln!(out, "{INDENT}show {token}");
                }
                SceneNode::Unsupported { node_type } => {
                    let _ = writeln!(out, "{INDENT}# unsupported node: {}", comment_text(node_type));
                }
            }
        }

        let _ = writeln!(out, "{INDENT}return");
        out
    }

    fn token(&self, kind: AssetKind, reference: &str, aliases: &mut BTreeSet<String>) -> String {
        match self.catalog.lookup(kind, reference) {
            AssetRef::Alias(alias) => {
                aliases.insert(alias.clone());
                alias
            }
            AssetRef::Raw(raw) => raw_tag(&raw),
        }
    }
}

/// Non-fatal findings for a scene: unsupported nodes and unresolvable jumps.
pub fn scene_warnings(scene: &CompiledScene, scene_labels: &BTreeMap<String, String>) -> Vec<ExportWarning> {
    let known: BTreeSet<&str> = scene_labels.values().map(String::as_str).collect();
    let resolves = |target: &str| {
        let target = target.trim();
        scene_labels.contains_key(target) || known.contains(target)
    };

    let mut warnings = Vec::new();
    for node in &scene.nodes {
        match node {
            SceneNode::Unsupported { node_type } => warnings.push(ExportWarning::UnsupportedNode {
                scene_id: scene.scene_id.clone(),
                node_type: node_type.clone(),
            }),
            SceneNode::Jump { target } if !resolves(target.as_str()) => {
                warnings.push(ExportWarning::UnresolvedJump {
                    scene_id: scene.scene_id.clone(),
                    target: target.clone(),
                })
            }
            SceneNode::Choice { options, .. } => {
                for target in options.iter().filter_map(|o| o.target.as_deref()) {
                    if !resolves(target) {
                        warnings.push(ExportWarning::UnresolvedJump {
                            scene_id: scene.scene_id.clone(),
                            target: target.to_string(),
                        });
                    }
                }
            }
            _ => {}
        }
    }
    warnings
}

fn call_block(label: &str, calls: &[String]) -> String {
    let mut out = format!("label {label}:\n");
    for call in calls {
        let _ = writeln!(out, "{INDENT}call {call}");
    }
    let _ = writeln!(out, "{INDENT}return");
    out
}

fn render_menu(routes: &[&PovRoute]) -> String {
    let mut out = format!("label {ROUTE_MENU_LABEL}:\n{INDENT}menu:\n");
    let _ = writeln!(out, "{INDENT}{INDENT}{}", quote(MENU_CAPTION));
    for route in routes {
        let _ = writeln!(out, "{INDENT}{INDENT}{}:", quote(&route.display_name));
        let _ = writeln!(out, "{INDENT}{INDENT}{INDENT}jump {}", route.entry_label);
    }
    out
}

/// Quote text as a script string literal.
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            '\t' => out.push_str("\\t"),
            // Interpolation and text tags are literal in authored text
            '[' => out.push_str("[["),
            '{' => out.push_str("{{"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

fn comment_text(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

/// Image tag for an unresolved reference: image extension dropped, then
/// reduced to a single `[a-z0-9_]` token so it stays one statement.
fn raw_tag(reference: &str) -> String {
    let trimmed = reference.trim();
    let stem = match trimmed.rsplit_once('.') {
        Some((stem, ext)) if IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) => stem,
        _ => trimmed,
    };
    let tag = slugify(stem);
    if tag.is_empty() {
        MISSING_TAG.to_string()
    } else {
        tag
    }
}
