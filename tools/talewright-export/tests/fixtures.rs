//! On-disk project fixtures shared by the integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use image::{Rgba, RgbaImage};
use serde_json::{json, Value};
use walkdir::WalkDir;

/// A project directory (documents + assets) inside a temp dir.
pub struct ProjectFixture {
    pub root: PathBuf,
}

impl ProjectFixture {
    pub fn new(root: &Path) -> Self {
        for dir in ["projects", "timelines", "scenes", "worlds", "assets"] {
            std::fs::create_dir_all(root.join(dir)).expect("Failed to create fixture dir");
        }
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn assets(&self) -> PathBuf {
        self.root.join("assets")
    }

    pub fn project(&self, id: &str, scenes: &[&str]) -> &Self {
        self.document("projects", id, json!({"id": id, "title": "A Tale", "author": "Ann", "scenes": scenes}))
    }

    pub fn timeline(&self, id: &str, scene_order: Value) -> &Self {
        self.document("timelines", id, json!({"id": id, "scene_order": scene_order}))
    }

    pub fn scene(&self, id: &str, body: Value) -> &Self {
        self.document("scenes", id, body)
    }

    pub fn world(&self, id: &str, body: Value) -> &Self {
        self.document("worlds", id, body)
    }

    fn document(&self, dir: &str, id: &str, body: Value) -> &Self {
        let path = self.root.join(dir).join(format!("{id}.json"));
        let text = serde_json::to_string_pretty(&body).expect("Failed to serialize fixture");
        std::fs::write(path, text).expect("Failed to write fixture document");
        self
    }

    /// Write a small solid-color PNG under the asset root.
    pub fn image(&self, rel: &str, color: [u8; 4]) -> &Self {
        let path = self.assets().join(rel);
        std::fs::create_dir_all(path.parent().expect("asset has a parent"))
            .expect("Failed to create asset dir");
        RgbaImage::from_pixel(8, 4, Rgba(color))
            .save(&path)
            .expect("Failed to write PNG");
        self
    }
}

/// Two-POV project: `alice` narrates `meet` and `forest`, `bob` narrates
/// `meet` and `castle`. `orphan` declares `carol` but is never placed.
pub fn two_pov_project(root: &Path) -> ProjectFixture {
    let fixture = ProjectFixture::new(root);
    fixture
        .project("tale", &["meet", "forest", "castle"])
        .timeline(
            "main",
            json!([
                {"scene_id": "meet", "povs": ["alice", "bob"]},
                "forest",
                {"scene_id": "castle", "pov": {"id": "bob", "name": "Bob"}}
            ]),
        )
        .scene(
            "meet",
            json!({
                "title": "Meeting",
                "background": "town",
                "dialogue": [
                    {"type": "line", "speaker": "Alice", "text": "Hi, Bob."},
                    {"type": "choice", "text": "Where to?", "options": [
                        {"text": "Forest", "target": "forest"},
                        {"text": "Castle", "target": "castle"}
                    ]}
                ]
            }),
        )
        .scene(
            "forest",
            json!({
                "pov": {"id": "alice", "name": "Alice"},
                "nodes": [
                    {"type": "background", "content": {"image": "forest"}},
                    {"type": "portrait", "content": {"character": "alice", "expression": "happy"}},
                    {"type": "line", "content": {"speaker": "Alice", "text": "So green."}}
                ]
            }),
        )
        .scene(
            "castle",
            json!({
                "background": "castle",
                "portrait": "bob:angry",
                "dialogue": [{"type": "line", "speaker": "Bob", "text": "Halt!"}]
            }),
        )
        .scene("orphan", json!({"pov": "carol", "dialogue": ["Nobody reads this."]}))
        .world(
            "realm",
            json!({"id": "realm", "name": "Realm", "timeline": "main", "default_pov": "bob"}),
        )
        .image("backgrounds/town.png", [200, 180, 120, 255])
        .image("backgrounds/forest.png", [20, 140, 40, 255])
        .image("backgrounds/castle.png", [90, 90, 100, 255])
        .image("characters/alice/happy.png", [250, 200, 200, 255])
        .image("characters/bob/neutral.png", [120, 120, 250, 255]);
    fixture
}

/// Every file under `root` with its bytes, keyed by relative path.
pub fn snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
    if !root.exists() {
        return BTreeMap::new();
    }
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e
                .path()
                .strip_prefix(root)
                .expect("walked path is under root")
                .to_string_lossy()
                .replace('\\', "/");
            let bytes = std::fs::read(e.path()).expect("Failed to read snapshot file");
            (rel, bytes)
        })
        .collect()
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|e| panic!("Failed to read {}: {e}", path.display()))
}
