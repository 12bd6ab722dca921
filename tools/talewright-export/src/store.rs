//! Read-only document store consulted by the pipeline.
//!
//! The authoring tool owns project storage; the exporter only needs lookups
//! by id. `DirectoryStore` reads JSON files laid out as
//!
//! ```text
//! <root>/projects/<id>.json
//! <root>/timelines/<id>.json
//! <root>/scenes/<id>.json
//! <root>/worlds/<id>.json
//! ```
//!
//! and `MemoryStore` serves documents inserted by the caller.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use talewright_shared::{
    is_safe_path_component, read_file_with_limit, ProjectDocument, SceneDocument,
    TimelineDocument, WorldDocument, MAX_DOCUMENT_BYTES,
};

use crate::error::{DocumentKind, ExportError};

/// Lookup of normalized documents by id.
pub trait DocumentStore {
    fn project(&self, id: &str) -> Result<ProjectDocument, ExportError>;
    fn timeline(&self, id: &str) -> Result<TimelineDocument, ExportError>;
    fn scene(&self, id: &str) -> Result<SceneDocument, ExportError>;
    fn world(&self, id: &str) -> Result<WorldDocument, ExportError>;
}

/// Store backed by JSON files under a project directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self, kind: DocumentKind, id: &str) -> Option<PathBuf> {
        if !is_safe_path_component(id) {
            return None;
        }
        let dir = match kind {
            DocumentKind::Project => "projects",
            DocumentKind::Timeline => "timelines",
            DocumentKind::Scene => "scenes",
            DocumentKind::World => "worlds",
        };
        Some(self.root.join(dir).join(format!("{id}.json")))
    }

    fn load<T: DeserializeOwned>(&self, kind: DocumentKind, id: &str) -> Result<(T, PathBuf), ExportError> {
        let path = self
            .document_path(kind, id)
            .filter(|p| p.is_file())
            .ok_or_else(|| ExportError::not_found(kind, id))?;

        let bytes = read_file_with_limit(&path, MAX_DOCUMENT_BYTES)?;
        let doc = serde_json::from_slice(&bytes).map_err(|source| ExportError::Malformed {
            kind,
            id: id.to_string(),
            source,
        })?;

        tracing::debug!("Loaded {} '{}' from {}", kind, id, path.display());
        Ok((doc, path))
    }
}

impl DocumentStore for DirectoryStore {
    fn project(&self, id: &str) -> Result<ProjectDocument, ExportError> {
        let (mut doc, path): (ProjectDocument, _) = self.load(DocumentKind::Project, id)?;
        if doc.id.is_empty() {
            doc.id = id.to_string();
        }
        doc.source_path = Some(path);
        Ok(doc)
    }

    fn timeline(&self, id: &str) -> Result<TimelineDocument, ExportError> {
        let (mut doc, path): (TimelineDocument, _) = self.load(DocumentKind::Timeline, id)?;
        if doc.id.is_empty() {
            doc.id = id.to_string();
        }
        doc.source_path = Some(path);
        Ok(doc)
    }

    fn scene(&self, id: &str) -> Result<SceneDocument, ExportError> {
        let (mut doc, path): (SceneDocument, _) = self.load(DocumentKind::Scene, id)?;
        // Scene files are addressed by file stem; the stored id may be stale.
        doc.id = id.to_string();
        doc.source_path = Some(path);
        Ok(doc)
    }

    fn world(&self, id: &str) -> Result<WorldDocument, ExportError> {
        let (mut doc, path): (WorldDocument, _) = self.load(DocumentKind::World, id)?;
        if doc.id.is_empty() {
            doc.id = id.to_string();
        }
        doc.source_path = Some(path);
        Ok(doc)
    }
}

/// In-memory store for embedders and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    projects: BTreeMap<String, ProjectDocument>,
    timelines: BTreeMap<String, TimelineDocument>,
    scenes: BTreeMap<String, SceneDocument>,
    worlds: BTreeMap<String, WorldDocument>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_project(&mut self, doc: ProjectDocument) -> &mut Self {
        self.projects.insert(doc.id.clone(), doc);
        self
    }

    pub fn insert_timeline(&mut self, doc: TimelineDocument) -> &mut Self {
        self.timelines.insert(doc.id.clone(), doc);
        self
    }

    pub fn insert_scene(&mut self, doc: SceneDocument) -> &mut Self {
        self.scenes.insert(doc.id.clone(), doc);
        self
    }

    pub fn insert_world(&mut self, doc: WorldDocument) -> &mut Self {
        self.worlds.insert(doc.id.clone(), doc);
        self
    }
}

impl DocumentStore for MemoryStore {
    fn project(&self, id: &str) -> Result<ProjectDocument, ExportError> {
        self.projects
            .get(id)
            .cloned()
            .ok_or_else(|| ExportError::not_found(DocumentKind::Project, id))
    }

    fn timeline(&self, id: &str) -> Result<TimelineDocument, ExportError> {
        self.timelines
            .get(id)
            .cloned()
            .ok_or_else(|| ExportError::not_found(DocumentKind::Timeline, id))
    }

    fn scene(&self, id: &str) -> Result<SceneDocument, ExportError> {
        self.scenes
            .get(id)
            .cloned()
            .ok_or_else(|| ExportError::not_found(DocumentKind::Scene, id))
    }

    fn world(&self, id: &str) -> Result<WorldDocument, ExportError> {
        self.worlds
            .get(id)
            .cloned()
            .ok_or_else(|| ExportError::not_found(DocumentKind::World, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_directory_store_loads_scene_by_stem() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("scenes")).unwrap();
        std::fs::write(
            dir.path().join("scenes/intro.json"),
            r#"{"id": "old-name", "title": "Intro", "dialogue": []}"#,
        )
        .unwrap();

        let store = DirectoryStore::new(dir.path());
        let scene = store.scene("intro").unwrap();
        assert_eq!(scene.id, "intro");
        assert_eq!(scene.title.as_deref(), Some("Intro"));
        assert!(scene.source_path.unwrap().ends_with("scenes/intro.json"));
    }

    #[test]
    fn test_directory_store_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let store = DirectoryStore::new(dir.path());
        let err = store.timeline("main").unwrap_err();
        assert!(matches!(
            err,
            ExportError::NotFound {
                kind: DocumentKind::Timeline,
                ..
            }
        ));
    }

    #[test]
    fn test_directory_store_rejects_path_traversal() {
        let dir = tempdir().unwrap();
        let store = DirectoryStore::new(dir.path());
        assert!(matches!(
            store.scene("../secrets").unwrap_err(),
            ExportError::NotFound { .. }
        ));
    }

    #[test]
    fn test_directory_store_malformed_json() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("projects")).unwrap();
        std::fs::write(dir.path().join("projects/tale.json"), "{not json").unwrap();

        let store = DirectoryStore::new(dir.path());
        assert!(matches!(
            store.project("tale").unwrap_err(),
            ExportError::Malformed { .. }
        ));
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let mut store = MemoryStore::new();
        store.insert_project(ProjectDocument {
            id: "tale".into(),
            title: "A Tale".into(),
            ..Default::default()
        });
        assert_eq!(store.project("tale").unwrap().title, "A Tale");
        assert!(store.scene("nope").is_err());
    }
}
