//! Normalized documents consumed by the export pipeline.
//!
//! Documents come from an external store keyed by id. Scene dialogue stays as
//! raw JSON here; the exporter normalizes it into a closed node type before
//! rendering.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Project metadata and the default scene order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectDocument {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    /// Scene order used when no timeline is selected
    #[serde(default)]
    pub scenes: Vec<String>,
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl ProjectDocument {
    /// Title for display, falling back to the id.
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            &self.id
        } else {
            &self.title
        }
    }
}

/// Ordered scene placements.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimelineDocument {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub scene_order: Vec<TimelineEntry>,
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

/// A timeline placement: either a bare scene id or an object with POV overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimelineEntry {
    SceneId(String),
    Placement {
        scene_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pov: Option<PovTag>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        povs: Vec<PovTag>,
    },
}

impl TimelineEntry {
    pub fn scene_id(&self) -> &str {
        match self {
            TimelineEntry::SceneId(id) => id,
            TimelineEntry::Placement { scene_id, .. } => scene_id,
        }
    }

    /// POV tags listed on the placement itself, `pov` first.
    pub fn pov_tags(&self) -> Vec<&PovTag> {
        match self {
            TimelineEntry::SceneId(_) => Vec::new(),
            TimelineEntry::Placement { pov, povs, .. } => pov.iter().chain(povs.iter()).collect(),
        }
    }
}

/// A viewpoint tag: bare id or `{id, name}` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PovTag {
    Id(String),
    Named {
        id: String,
        #[serde(default, alias = "display_name", alias = "label")]
        name: Option<String>,
    },
}

impl PovTag {
    /// Parse a tag out of arbitrary JSON, ignoring values of the wrong shape.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(PovTag::Id(s.clone())),
            Value::Object(map) => {
                let id = map.get("id").and_then(Value::as_str)?;
                let name = ["name", "display_name", "label"]
                    .iter()
                    .find_map(|key| map.get(*key).and_then(Value::as_str))
                    .map(str::to_string);
                Some(PovTag::Named {
                    id: id.to_string(),
                    name,
                })
            }
            _ => None,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            PovTag::Id(id) => id,
            PovTag::Named { id, .. } => id,
        }
    }

    /// Explicit display name, if the tag carries a non-empty one.
    pub fn name(&self) -> Option<&str> {
        match self {
            PovTag::Id(_) => None,
            PovTag::Named { name, .. } => name.as_deref().filter(|n| !n.trim().is_empty()),
        }
    }
}

/// A scene graph as stored by the authoring tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneDocument {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub pov: Option<Value>,
    #[serde(default)]
    pub povs: Vec<Value>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub portrait: Option<String>,
    /// Flat `{type: line|choice, ...}` entries
    #[serde(default)]
    pub dialogue: Vec<Value>,
    /// Richer `{type, content: {...}}` nodes
    #[serde(default)]
    pub nodes: Vec<Value>,
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

/// A viewpoint world: selects a timeline and names its viewpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldDocument {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub timeline: Option<String>,
    #[serde(default)]
    pub default_pov: Option<String>,
    #[serde(default)]
    pub povs: Vec<PovTag>,
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}
