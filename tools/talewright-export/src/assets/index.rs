//! Physical asset index.
//!
//! Built once per export by walking the asset root. Entries are keyed by
//! forward-slash relative path in a `BTreeMap`, so every lookup that iterates
//! the index sees the same sorted order on every platform.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use talewright_shared::{slugify, TALEWRIGHT_FORMAT};
use walkdir::WalkDir;

use crate::error::ExportError;

/// Image extensions the index picks up.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif", "bmp"];

/// Broad category derived from the first path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetCategory {
    Background,
    Character,
    Other,
}

impl AssetCategory {
    fn from_root_segment(segment: &str) -> Self {
        match segment.to_ascii_lowercase().as_str() {
            "backgrounds" | "background" | "bg" | "bgs" => AssetCategory::Background,
            "characters" | "character" | "portraits" | "sprites" => AssetCategory::Character,
            _ => AssetCategory::Other,
        }
    }
}

/// A single indexed file.
#[derive(Debug, Clone)]
pub struct IndexedAsset {
    /// Forward-slash path relative to the asset root
    pub rel_path: String,
    /// Absolute (or root-joined) path on disk
    pub path: PathBuf,
    pub category: AssetCategory,
    /// Canonical character name for character assets
    pub character: Option<String>,
    /// Canonical expression name for character assets
    pub expression: Option<String>,
}

impl IndexedAsset {
    pub fn file_name(&self) -> &str {
        self.rel_path.rsplit('/').next().unwrap_or(&self.rel_path)
    }

    pub fn file_stem(&self) -> &str {
        let name = self.file_name();
        name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name)
    }
}

/// Sorted relative-path → file index over an asset root.
#[derive(Debug, Clone, Default)]
pub struct AssetIndex {
    root: PathBuf,
    entries: BTreeMap<String, IndexedAsset>,
}

impl AssetIndex {
    /// Walk `root` and index every image file. A missing root gives an empty
    /// index, since every reference then simply ends up missing.
    pub fn build(root: &Path) -> Result<Self, ExportError> {
        let mut index = Self {
            root: root.to_path_buf(),
            entries: BTreeMap::new(),
        };
        if !root.is_dir() {
            tracing::warn!("Asset root {} does not exist", root.display());
            return Ok(index);
        }

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                ExportError::io(path, e.into())
            })?;
            if !entry.file_type().is_file() || !is_image(entry.path()) {
                continue;
            }
            let Some(rel_path) = relative_slash_path(root, entry.path()) else {
                continue;
            };
            index.insert(rel_path, entry.path().to_path_buf());
        }

        tracing::debug!(
            "Indexed {} assets under {}",
            index.entries.len(),
            root.display()
        );
        Ok(index)
    }

    /// Build an index from explicit (relative path, file) pairs.
    pub fn from_entries<I>(root: impl Into<PathBuf>, entries: I) -> Self
    where
        I: IntoIterator<Item = (String, PathBuf)>,
    {
        let mut index = Self {
            root: root.into(),
            entries: BTreeMap::new(),
        };
        for (rel_path, path) in entries {
            index.insert(rel_path, path);
        }
        index
    }

    fn insert(&mut self, rel_path: String, path: PathBuf) {
        let segments: Vec<&str> = rel_path.split('/').collect();
        let category = if segments.len() > 1 {
            AssetCategory::from_root_segment(segments[0])
        } else {
            AssetCategory::Other
        };

        let (character, expression) = if category == AssetCategory::Character {
            character_and_expression(&segments)
        } else {
            (None, None)
        };

        self.entries.insert(
            rel_path.clone(),
            IndexedAsset {
                rel_path,
                path,
                category,
                character,
                expression,
            },
        );
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get(&self, rel_path: &str) -> Option<&IndexedAsset> {
        self.entries.get(rel_path)
    }

    /// Entries in sorted relative-path order.
    pub fn iter(&self) -> impl Iterator<Item = &IndexedAsset> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Whether a path carries one of [`IMAGE_EXTENSIONS`].
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Forward-slash relative path of `path` under `root`.
pub fn relative_slash_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Derive (character, expression) from a character asset path.
///
/// - `characters/alice/happy.png` → (alice, happy)
/// - `characters/alice_happy.png` → (alice, happy)
/// - `characters/alice.png` → (alice, neutral)
fn character_and_expression(segments: &[&str]) -> (Option<String>, Option<String>) {
    let file = segments[segments.len() - 1];
    let stem = file.rsplit_once('.').map(|(s, _)| s).unwrap_or(file);

    if segments.len() >= 3 {
        let character = slugify(segments[segments.len() - 2]);
        return (Some(character), Some(slugify(stem)));
    }

    let slug = slugify(stem);
    match slug.split_once('_') {
        Some((character, expression)) => (Some(character.to_string()), Some(expression.to_string())),
        None => (Some(slug), Some("neutral".to_string())),
    }
}

/// Asset metadata sidecar next to a source file (`<asset>.meta.json`).
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(TALEWRIGHT_FORMAT.asset_sidecar_suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"img").unwrap();
    }

    #[test]
    fn test_build_indexes_images_in_sorted_order() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "backgrounds/forest.png");
        touch(dir.path(), "backgrounds/castle.jpg");
        touch(dir.path(), "characters/alice/happy.png");
        touch(dir.path(), "notes.txt");

        let index = AssetIndex::build(dir.path()).unwrap();
        let paths: Vec<_> = index.iter().map(|a| a.rel_path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "backgrounds/castle.jpg",
                "backgrounds/forest.png",
                "characters/alice/happy.png"
            ]
        );
    }

    #[test]
    fn test_missing_root_is_empty() {
        let dir = tempdir().unwrap();
        let index = AssetIndex::build(&dir.path().join("nope")).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_categories_and_character_parsing() {
        let index = AssetIndex::from_entries(
            "/assets",
            [
                ("bg/forest.png".to_string(), PathBuf::from("/assets/bg/forest.png")),
                (
                    "characters/Alice/Happy.png".to_string(),
                    PathBuf::from("/assets/characters/Alice/Happy.png"),
                ),
                (
                    "sprites/bob_sad.png".to_string(),
                    PathBuf::from("/assets/sprites/bob_sad.png"),
                ),
                (
                    "portraits/carol.png".to_string(),
                    PathBuf::from("/assets/portraits/carol.png"),
                ),
            ],
        );

        assert_eq!(
            index.get("bg/forest.png").unwrap().category,
            AssetCategory::Background
        );
        let alice = index.get("characters/Alice/Happy.png").unwrap();
        assert_eq!(alice.category, AssetCategory::Character);
        assert_eq!(alice.character.as_deref(), Some("alice"));
        assert_eq!(alice.expression.as_deref(), Some("happy"));

        let bob = index.get("sprites/bob_sad.png").unwrap();
        assert_eq!(bob.character.as_deref(), Some("bob"));
        assert_eq!(bob.expression.as_deref(), Some("sad"));

        let carol = index.get("portraits/carol.png").unwrap();
        assert_eq!(carol.expression.as_deref(), Some("neutral"));
    }

    #[test]
    fn test_file_name_and_stem() {
        let index = AssetIndex::from_entries(
            "/a",
            [("bg/Forest.Night.png".to_string(), PathBuf::from("/a/bg/Forest.Night.png"))],
        );
        let asset = index.get("bg/Forest.Night.png").unwrap();
        assert_eq!(asset.file_name(), "Forest.Night.png");
        assert_eq!(asset.file_stem(), "Forest.Night");
    }

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            sidecar_path(Path::new("/a/bg/forest.png")),
            PathBuf::from("/a/bg/forest.png.meta.json")
        );
    }
}
