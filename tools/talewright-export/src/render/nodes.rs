//! Normalization of raw scene dialogue/node arrays into [`SceneNode`]s.

use serde_json::{Map, Value};
use talewright_shared::SceneDocument;

/// A single normalized scene statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneNode {
    Line {
        speaker: Option<String>,
        text: String,
    },
    Choice {
        prompt: Option<String>,
        options: Vec<ChoiceOption>,
    },
    Jump {
        target: String,
    },
    Background {
        reference: String,
    },
    Portrait {
        reference: String,
    },
    Unsupported {
        node_type: String,
    },
}

/// One branch of a choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceOption {
    pub text: String,
    /// Scene id or label the branch jumps to
    pub target: Option<String>,
}

/// Normalize a scene document into an ordered node list.
///
/// Top-level `background`/`portrait` come first, then every `dialogue`
/// entry, then every `nodes` entry. Per-entry `background`/`portrait` fields
/// are emitted just before the entry itself.
pub fn normalize_scene(scene: &SceneDocument) -> Vec<SceneNode> {
    let mut nodes = Vec::new();

    if let Some(reference) = non_empty(scene.background.as_deref()) {
        nodes.push(SceneNode::Background { reference });
    }
    if let Some(reference) = non_empty(scene.portrait.as_deref()) {
        nodes.push(SceneNode::Portrait { reference });
    }

    for entry in scene.dialogue.iter().chain(scene.nodes.iter()) {
        normalize_entry(entry, &mut nodes);
    }

    nodes
}

fn normalize_entry(entry: &Value, out: &mut Vec<SceneNode>) {
    let map = match entry {
        Value::Object(map) => map,
        Value::String(text) => {
            if !text.trim().is_empty() {
                out.push(SceneNode::Line {
                    speaker: None,
                    text: text.clone(),
                });
            }
            return;
        }
        other => {
            out.push(SceneNode::Unsupported {
                node_type: json_type_name(other).to_string(),
            });
            return;
        }
    };
    let fields = Fields::new(map);

    let node_type = fields
        .string(&["type", "kind"])
        .map(|t| t.to_ascii_lowercase())
        .unwrap_or_else(|| {
            if fields.string(&["text"]).is_some() {
                "line".to_string()
            } else {
                "unknown".to_string()
            }
        });

    let is_background = matches!(node_type.as_str(), "background" | "scene" | "bg");
    let is_portrait = matches!(node_type.as_str(), "portrait" | "show" | "character");

    if !is_background {
        if let Some(reference) = fields.string(&["background"]) {
            out.push(SceneNode::Background { reference });
        }
    }
    if !is_portrait {
        if let Some(reference) = fields.string(&["portrait"]) {
            out.push(SceneNode::Portrait { reference });
        }
    }

    let unsupported = || SceneNode::Unsupported {
        node_type: node_type.clone(),
    };
    let node = match node_type.as_str() {
        "line" | "dialogue" | "text" | "narration" | "say" => {
            let Some(text) = fields.string(&["text", "line"]) else {
                return;
            };
            SceneNode::Line {
                speaker: fields.string(&["speaker", "character", "name"]),
                text,
            }
        }
        "choice" | "menu" => SceneNode::Choice {
            prompt: fields.string(&["prompt", "text"]),
            options: fields
                .array(&["options", "choices"])
                .map(|items| items.iter().filter_map(choice_option).collect())
                .unwrap_or_default(),
        },
        "jump" | "goto" => match fields.string(&["target", "scene_id", "scene", "label"]) {
            Some(target) => SceneNode::Jump { target },
            None => unsupported(),
        },
        "background" | "scene" | "bg" => {
            match fields.string(&["background", "image", "asset", "path", "name"]) {
                Some(reference) => SceneNode::Background { reference },
                None => unsupported(),
            }
        }
        "portrait" | "show" | "character" => match portrait_reference(&fields) {
            Some(reference) => SceneNode::Portrait { reference },
            None => unsupported(),
        },
        _ => unsupported(),
    };
    out.push(node);
}

fn choice_option(value: &Value) -> Option<ChoiceOption> {
    match value {
        Value::String(text) => Some(ChoiceOption {
            text: text.clone(),
            target: None,
        }),
        Value::Object(map) => {
            let fields = Fields::new(map);
            let text = fields.string(&["text", "label", "title"])?;
            Some(ChoiceOption {
                text,
                target: fields.string(&["target", "jump", "next", "goto", "scene_id", "scene"]),
            })
        }
        _ => None,
    }
}

/// `portrait`/`image` wins; otherwise `character` + optional `expression`.
fn portrait_reference(fields: &Fields<'_>) -> Option<String> {
    if let Some(reference) = fields.string(&["portrait", "image", "asset", "path"]) {
        return Some(reference);
    }
    let character = fields.string(&["character", "name"])?;
    Some(match fields.string(&["expression"]) {
        Some(expression) => format!("{character}:{expression}"),
        None => character,
    })
}

/// Field lookup over an entry and its nested `content` block; `content` wins.
struct Fields<'a> {
    entry: &'a Map<String, Value>,
    content: Option<&'a Map<String, Value>>,
}

impl<'a> Fields<'a> {
    fn new(entry: &'a Map<String, Value>) -> Self {
        Self {
            entry,
            content: entry.get("content").and_then(Value::as_object),
        }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.content
            .and_then(|c| c.get(key))
            .or_else(|| self.entry.get(key))
    }

    /// First non-empty string among `keys`.
    fn string(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .filter_map(|k| self.get(k).and_then(Value::as_str))
            .find_map(|s| non_empty(Some(s)))
    }

    fn array(&self, keys: &[&str]) -> Option<&'a Vec<Value>> {
        keys.iter().find_map(|k| self.get(k).and_then(Value::as_array))
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
