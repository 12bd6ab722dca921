//! Viewpoint (POV) collection.
//!
//! Scans scene graphs and timeline placements for POV tags and builds an
//! ordered, deduplicated catalog. Collection is pure: absent tags simply give
//! an empty set.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use talewright_shared::{PovTag, SceneDocument, TimelineEntry, WorldDocument};

/// A catalog entry: id plus best-effort display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PovEntry {
    pub id: String,
    pub name: Option<String>,
}

impl PovEntry {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Ordered set of viewpoints keyed by id.
#[derive(Debug, Clone, Default)]
pub struct PovCatalog {
    entries: Vec<PovEntry>,
    index: BTreeMap<String, usize>,
}

impl PovCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or merge a tag. The first non-empty display name wins.
    pub fn insert(&mut self, id: &str, name: Option<&str>) {
        let id = id.trim();
        if id.is_empty() {
            return;
        }
        let name = name.map(str::trim).filter(|n| !n.is_empty());

        match self.index.get(id) {
            Some(&i) => {
                let entry = &mut self.entries[i];
                if entry.name.is_none() {
                    entry.name = name.map(str::to_string);
                }
            }
            None => {
                self.index.insert(id.to_string(), self.entries.len());
                self.entries.push(PovEntry {
                    id: id.to_string(),
                    name: name.map(str::to_string),
                });
            }
        }
    }

    pub fn insert_tag(&mut self, tag: &PovTag) {
        self.insert(tag.id(), tag.name());
    }

    /// Merge another catalog, preserving first-seen order.
    pub fn extend(&mut self, other: &PovCatalog) {
        for entry in &other.entries {
            self.insert(&entry.id, entry.name.as_deref());
        }
    }

    /// Fill in display names from a viewpoint world without adding entries.
    pub fn apply_world_names(&mut self, world: &WorldDocument) {
        for tag in &world.povs {
            if let (Some(&i), Some(name)) = (self.index.get(tag.id()), tag.name()) {
                if self.entries[i].name.is_none() {
                    self.entries[i].name = Some(name.to_string());
                }
            }
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&PovEntry> {
        self.index.get(id).map(|&i| &self.entries[i])
    }

    pub fn entries(&self) -> &[PovEntry] {
        &self.entries
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Collect the viewpoints a scene graph declares.
///
/// Looks at the top-level `pov`/`povs` fields, the `metadata` block, each
/// node's `content` block and each dialogue entry.
pub fn collect_scene_povs(scene: &SceneDocument) -> PovCatalog {
    let mut catalog = PovCatalog::new();

    if let Some(pov) = &scene.pov {
        collect_value(&mut catalog, pov);
    }
    for pov in &scene.povs {
        collect_value(&mut catalog, pov);
    }
    if let Some(metadata) = &scene.metadata {
        collect_fields(&mut catalog, metadata);
    }
    for node in &scene.nodes {
        collect_fields(&mut catalog, node);
        if let Some(content) = node.get("content") {
            collect_fields(&mut catalog, content);
        }
    }
    for entry in &scene.dialogue {
        collect_fields(&mut catalog, entry);
    }

    catalog
}

/// Collect the viewpoints a timeline placement lists explicitly.
pub fn collect_placement_povs(entry: &TimelineEntry) -> PovCatalog {
    let mut catalog = PovCatalog::new();
    for tag in entry.pov_tags() {
        catalog.insert_tag(tag);
    }
    catalog
}

/// Read `pov`, `povs` and a sibling `pov_name` from an object.
fn collect_fields(catalog: &mut PovCatalog, value: &Value) {
    let Some(map) = value.as_object() else {
        return;
    };

    if let Some(pov) = map.get("pov") {
        // `{"pov": "alice", "pov_name": "Alice"}` names a bare id.
        let sibling_name = map.get("pov_name").and_then(Value::as_str);
        match (pov.as_str(), sibling_name) {
            (Some(id), Some(name)) => catalog.insert(id, Some(name)),
            _ => collect_value(catalog, pov),
        }
    }
    if let Some(povs) = map.get("povs") {
        collect_value(catalog, povs);
    }
}

fn collect_value(catalog: &mut PovCatalog, value: &Value) {
    match value {
        Value::Array(items) => {
            for item in items {
                if let Some(tag) = PovTag::from_value(item) {
                    catalog.insert_tag(&tag);
                }
            }
        }
        other => {
            if let Some(tag) = PovTag::from_value(other) {
                catalog.insert_tag(&tag);
            }
        }
    }
}
