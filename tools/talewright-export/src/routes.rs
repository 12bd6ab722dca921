//! Label allocation and per-viewpoint route planning.

use std::collections::BTreeSet;

use serde::Serialize;
use talewright_shared::{slugify, WorldDocument};

use crate::options::RouteMode;
use crate::viewpoint::PovCatalog;

/// Labels the target runtime defines or reserves for itself.
pub const RESERVED_LABELS: &[&str] = &[
    "start",
    "main_menu",
    "quit",
    "after_load",
    "splashscreen",
    "route_menu",
];

/// Label of the generated switch menu.
pub const ROUTE_MENU_LABEL: &str = "route_menu";

/// Hands out unique script labels. Collisions get `_2`, `_3`, ...
#[derive(Debug, Clone)]
pub struct LabelAllocator {
    used: BTreeSet<String>,
}

impl Default for LabelAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl LabelAllocator {
    pub fn new() -> Self {
        Self {
            used: RESERVED_LABELS.iter().map(|l| l.to_string()).collect(),
        }
    }

    /// Allocate a label derived from `raw` with the given fallback prefix.
    pub fn allocate(&mut self, raw: &str, prefix: &str) -> String {
        let mut base = slugify(raw);
        if base.is_empty() {
            base = prefix.trim_end_matches('_').to_string();
        } else if base.starts_with(|c: char| c.is_ascii_digit()) {
            base = format!("{prefix}{base}");
        }

        let mut label = base.clone();
        let mut suffix = 2;
        while self.used.contains(&label) {
            label = format!("{base}_{suffix}");
            suffix += 1;
        }
        self.used.insert(label.clone());
        label
    }

    pub fn is_used(&self, label: &str) -> bool {
        self.used.contains(label)
    }
}

/// One element of the ordered scene sequence, with its viewpoint sets.
#[derive(Debug, Clone)]
pub struct SequenceEntry {
    pub scene_id: String,
    pub label: String,
    /// Viewpoints the scene graph declares
    pub scene_povs: PovCatalog,
    /// Viewpoints the timeline placement lists explicitly
    pub placement_povs: PovCatalog,
}

impl SequenceEntry {
    /// Whether this placement contributes to the route of `pov_id`.
    pub fn carries(&self, pov_id: &str) -> bool {
        if self.placement_povs.is_empty() {
            self.scene_povs.contains(pov_id)
        } else {
            self.placement_povs.contains(pov_id)
        }
    }
}

/// A playable per-viewpoint route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PovRoute {
    pub pov_id: String,
    pub display_name: String,
    pub slug: String,
    pub entry_label: String,
    pub scene_labels: Vec<String>,
    pub scene_ids: Vec<String>,
}

/// Routes plus the output strategy the route mode selected.
#[derive(Debug, Clone)]
pub struct RoutePlan {
    pub catalog: PovCatalog,
    pub routes: Vec<PovRoute>,
    pub mode: RouteMode,
    pub multi_route: bool,
    /// Emit the in-script switch menu
    pub menu: bool,
    /// Emit per-route forks
    pub forks: bool,
    /// Default route's viewpoint id
    pub default_pov: Option<String>,
}

impl RoutePlan {
    pub fn route(&self, pov_id: &str) -> Option<&PovRoute> {
        self.routes.iter().find(|r| r.pov_id == pov_id)
    }
}

/// Group the sequence into routes and decide menu/fork output.
pub fn plan_routes(
    sequence: &[SequenceEntry],
    labels: &mut LabelAllocator,
    mode: RouteMode,
    switch_menu: bool,
    world: Option<&WorldDocument>,
) -> RoutePlan {
    let mut catalog = PovCatalog::new();
    for entry in sequence {
        catalog.extend(&entry.scene_povs);
    }
    for entry in sequence {
        catalog.extend(&entry.placement_povs);
    }
    if let Some(world) = world {
        catalog.apply_world_names(world);
    }

    let mut slugs = BTreeSet::new();
    let mut routes = Vec::new();
    for pov in catalog.entries() {
        let members: Vec<&SequenceEntry> = sequence.iter().filter(|e| e.carries(&pov.id)).collect();
        if members.is_empty() {
            tracing::debug!("Viewpoint '{}' has no scenes; dropping route", pov.id);
            continue;
        }

        let slug = unique_slug(&pov.id, &mut slugs);
        let entry_label = labels.allocate(&format!("pov_{slug}"), "pov_");
        routes.push(PovRoute {
            pov_id: pov.id.clone(),
            display_name: pov.display_name().to_string(),
            slug,
            entry_label,
            scene_labels: members.iter().map(|e| e.label.clone()).collect(),
            scene_ids: members.iter().map(|e| e.scene_id.clone()).collect(),
        });
    }

    let multi_route = routes.len() >= 2;
    let menu = multi_route && switch_menu && mode.wants_menu();
    let forks = multi_route && mode.wants_forks();

    let default_pov = world
        .and_then(|w| w.default_pov.as_deref())
        .filter(|id| routes.iter().any(|r| r.pov_id == *id))
        .map(str::to_string)
        .or_else(|| routes.first().map(|r| r.pov_id.clone()));

    tracing::info!(
        "Planned {} route(s) (mode: {}, menu: {}, forks: {})",
        routes.len(),
        mode,
        menu,
        forks
    );

    RoutePlan {
        catalog,
        routes,
        mode,
        multi_route,
        menu,
        forks,
        default_pov,
    }
}

fn unique_slug(pov_id: &str, used: &mut BTreeSet<String>) -> String {
    let mut base = slugify(pov_id);
    if base.is_empty() {
        base = "pov".to_string();
    }
    let mut slug = base.clone();
    let mut suffix = 2;
    while used.contains(&slug) {
        slug = format!("{base}_{suffix}");
        suffix += 1;
    }
    used.insert(slug.clone());
    slug
}
