//! Resolved asset catalog with alias allocation.
//!
//! Every background/portrait reference seen during an export is registered
//! here exactly once: it either becomes an [`AssetUsage`] or lands in the
//! matching missing set, never both.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use talewright_shared::{sha256_file, slugify, MAX_DOCUMENT_BYTES, TALEWRIGHT_FORMAT};

use super::index::sidecar_path;
use super::resolve::{AssetResolver, ExpressionFallback, ResolutionStep};
use crate::error::{AssetKind, ExportError, ExportWarning};

/// License/author/source hints read from an asset's `.meta.json` sidecar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetProvenance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// A resolved asset as used by the rendered script.
#[derive(Debug, Clone)]
pub struct AssetUsage {
    pub kind: AssetKind,
    /// Reference as written by the author (trimmed)
    pub logical_name: String,
    /// Path relative to the asset root
    pub rel_path: String,
    pub source_path: PathBuf,
    /// Identifier used in script text; unique per distinct file
    pub alias: String,
    /// Path relative to the export root
    pub output_path: String,
    pub sha256: String,
    pub size: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub provenance: AssetProvenance,
    pub step: ResolutionStep,
    pub fallback: Option<ExpressionFallback>,
}

pub type BackgroundUsage = AssetUsage;
pub type PortraitUsage = AssetUsage;

/// What the renderer should put in script text for a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetRef {
    Alias(String),
    /// Unresolved; the script carries a tag derived from the logical name
    Raw(String),
}

impl AssetRef {
    pub fn token(&self) -> &str {
        match self {
            AssetRef::Alias(alias) => alias,
            AssetRef::Raw(raw) => raw,
        }
    }
}

/// Accumulates resolved and missing assets for one export.
#[derive(Debug, Default)]
pub struct AssetCatalog {
    backgrounds: BTreeMap<String, AssetUsage>,
    portraits: BTreeMap<String, AssetUsage>,
    missing_backgrounds: BTreeSet<String>,
    missing_portraits: BTreeSet<String>,
    /// (kind, rel_path) → alias, so one file keeps one alias
    file_aliases: BTreeMap<(AssetKind, String), String>,
    aliases: BTreeSet<String>,
    /// Registration order of logical names, for stable advisory input
    order: Vec<(AssetKind, String)>,
}

impl AssetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reference and return the script token for it.
    ///
    /// Newly unresolved references push an `UnresolvedAsset` warning; newly
    /// substituted portraits push a `PortraitFallback` warning.
    pub fn register(
        &mut self,
        kind: AssetKind,
        reference: &str,
        scene_id: &str,
        resolver: &AssetResolver<'_>,
        warnings: &mut Vec<ExportWarning>,
    ) -> Result<AssetRef, ExportError> {
        let logical = reference.trim().to_string();

        let (resolved_map, missing_set) = match kind {
            AssetKind::Background => (&self.backgrounds, &self.missing_backgrounds),
            AssetKind::Portrait => (&self.portraits, &self.missing_portraits),
        };
        if let Some(usage) = resolved_map.get(&logical) {
            return Ok(AssetRef::Alias(usage.alias.clone()));
        }
        if missing_set.contains(&logical) {
            return Ok(AssetRef::Raw(logical));
        }

        let resolved = match kind {
            AssetKind::Background => resolver.resolve_background(&logical),
            AssetKind::Portrait => resolver.resolve_portrait(&logical),
        };

        let Some(resolved) = resolved else {
            tracing::debug!("Unresolved {} '{}' in scene '{}'", kind, logical, scene_id);
            warnings.push(ExportWarning::UnresolvedAsset {
                asset: kind,
                scene_id: scene_id.to_string(),
                reference: logical.clone(),
            });
            match kind {
                AssetKind::Background => self.missing_backgrounds.insert(logical.clone()),
                AssetKind::Portrait => self.missing_portraits.insert(logical.clone()),
            };
            self.order.push((kind, logical.clone()));
            return Ok(AssetRef::Raw(logical));
        };

        if let Some(fallback) = &resolved.fallback {
            warnings.push(ExportWarning::PortraitFallback {
                reference: logical.clone(),
                requested: fallback.requested.clone(),
                substituted: fallback.substituted.clone(),
            });
        }

        let alias = self.alias_for(kind, &resolved.rel_path);
        let (sha256, size) = sha256_file(&resolved.path)?;
        let (width, height) = match image::image_dimensions(&resolved.path) {
            Ok((w, h)) => (Some(w), Some(h)),
            Err(e) => {
                tracing::debug!("No dimensions for {}: {}", resolved.path.display(), e);
                (None, None)
            }
        };

        let usage = AssetUsage {
            kind,
            logical_name: logical.clone(),
            output_path: TALEWRIGHT_FORMAT.image_path(&resolved.rel_path),
            rel_path: resolved.rel_path,
            provenance: read_sidecar(&resolved.path),
            source_path: resolved.path,
            alias: alias.clone(),
            sha256,
            size,
            width,
            height,
            step: resolved.step,
            fallback: resolved.fallback,
        };

        match kind {
            AssetKind::Background => self.backgrounds.insert(logical.clone(), usage),
            AssetKind::Portrait => self.portraits.insert(logical.clone(), usage),
        };
        self.order.push((kind, logical));
        Ok(AssetRef::Alias(alias))
    }

    fn alias_for(&mut self, kind: AssetKind, rel_path: &str) -> String {
        let key = (kind, rel_path.to_string());
        if let Some(alias) = self.file_aliases.get(&key) {
            return alias.clone();
        }

        let prefix = match kind {
            AssetKind::Background => "bg",
            AssetKind::Portrait => "ch",
        };
        let base = alias_base(rel_path);
        let base = if base.is_empty() {
            format!("{prefix}_asset")
        } else {
            format!("{prefix}_{base}")
        };

        let mut alias = base.clone();
        let mut suffix = 2;
        while self.aliases.contains(&alias) {
            alias = format!("{base}_{suffix}");
            suffix += 1;
        }

        self.aliases.insert(alias.clone());
        self.file_aliases.insert(key, alias.clone());
        alias
    }

    /// Script token for an already registered reference.
    pub fn lookup(&self, kind: AssetKind, reference: &str) -> AssetRef {
        let logical = reference.trim();
        let map = match kind {
            AssetKind::Background => &self.backgrounds,
            AssetKind::Portrait => &self.portraits,
        };
        match map.get(logical) {
            Some(usage) => AssetRef::Alias(usage.alias.clone()),
            None => AssetRef::Raw(logical.to_string()),
        }
    }

    pub fn backgrounds(&self) -> impl Iterator<Item = &BackgroundUsage> {
        self.backgrounds.values()
    }

    pub fn portraits(&self) -> impl Iterator<Item = &PortraitUsage> {
        self.portraits.values()
    }

    pub fn usages(&self) -> impl Iterator<Item = &AssetUsage> {
        self.backgrounds.values().chain(self.portraits.values())
    }

    /// Look up the usage that owns an alias.
    pub fn by_alias(&self, alias: &str) -> Option<&AssetUsage> {
        self.usages().find(|u| u.alias == alias)
    }

    pub fn missing_backgrounds(&self) -> &BTreeSet<String> {
        &self.missing_backgrounds
    }

    pub fn missing_portraits(&self) -> &BTreeSet<String> {
        &self.missing_portraits
    }

    /// (logical reference, resolved relative path) pairs in registration order.
    pub fn resolved_pairs(&self) -> Vec<(String, String)> {
        self.order
            .iter()
            .filter_map(|(kind, logical)| {
                let map = match kind {
                    AssetKind::Background => &self.backgrounds,
                    AssetKind::Portrait => &self.portraits,
                };
                map.get(logical)
                    .map(|u| (logical.clone(), u.rel_path.clone()))
            })
            .collect()
    }
}

/// Alias stem from a relative path: extension and category directory dropped.
fn alias_base(rel_path: &str) -> String {
    let without_ext = match rel_path.rsplit_once('.') {
        Some((stem, ext)) if !ext.contains('/') => stem,
        _ => rel_path,
    };
    let mut segments: Vec<&str> = without_ext.split('/').collect();
    if segments.len() > 1 {
        let first = segments[0].to_ascii_lowercase();
        if matches!(
            first.as_str(),
            "backgrounds" | "background" | "bg" | "bgs" | "characters" | "character" | "portraits" | "sprites"
        ) {
            segments.remove(0);
        }
    }
    slugify(&segments.join("_"))
}

fn read_sidecar(path: &Path) -> AssetProvenance {
    let sidecar = sidecar_path(path);
    if !sidecar.is_file() {
        return AssetProvenance::default();
    }
    let parsed = talewright_shared::read_file_with_limit(&sidecar, MAX_DOCUMENT_BYTES)
        .map_err(|e| e.to_string())
        .and_then(|bytes| serde_json::from_slice(&bytes).map_err(|e| e.to_string()));
    match parsed {
        Ok(provenance) => provenance,
        Err(e) => {
            tracing::warn!("Ignoring unreadable sidecar {}: {}", sidecar.display(), e);
            AssetProvenance::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetIndex;
    use tempfile::tempdir;

    fn touch(root: &Path, rel: &str, bytes: &[u8]) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_alias_base() {
        assert_eq!(alias_base("backgrounds/forest.png"), "forest");
        assert_eq!(alias_base("characters/alice/happy.png"), "alice_happy");
        assert_eq!(alias_base("misc/Old Map.jpg"), "misc_old_map");
    }

    #[test]
    fn test_register_resolved_and_missing_are_disjoint() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("assets");
        touch(&root, "backgrounds/forest.png", b"forest");
        let index = AssetIndex::build(&root).unwrap();
        let resolver = AssetResolver::new(&index);
        let mut catalog = AssetCatalog::new();
        let mut warnings = Vec::new();

        let forest = catalog
            .register(AssetKind::Background, "forest", "intro", &resolver, &mut warnings)
            .unwrap();
        let swamp = catalog
            .register(AssetKind::Background, " swamp ", "intro", &resolver, &mut warnings)
            .unwrap();
        let swamp_again = catalog
            .register(AssetKind::Background, "swamp", "later", &resolver, &mut warnings)
            .unwrap();

        assert_eq!(forest, AssetRef::Alias("bg_forest".into()));
        assert_eq!(swamp, AssetRef::Raw("swamp".into()));
        assert_eq!(swamp_again, AssetRef::Raw("swamp".into()));
        assert_eq!(warnings.len(), 1);

        let usage = catalog.backgrounds().next().unwrap();
        assert_eq!(usage.output_path, "game/images/backgrounds/forest.png");
        assert_eq!(usage.size, 6);
        assert_eq!(usage.sha256, talewright_shared::sha256_hex(b"forest"));
        assert!(catalog.missing_backgrounds().contains("swamp"));
        assert!(!catalog.missing_backgrounds().contains("forest"));
    }

    #[test]
    fn test_alias_collisions_get_numeric_suffix() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("assets");
        touch(&root, "backgrounds/forest.png", b"a");
        touch(&root, "bg/forest.jpg", b"b");
        let index = AssetIndex::build(&root).unwrap();
        let resolver = AssetResolver::new(&index);
        let mut catalog = AssetCatalog::new();
        let mut warnings = Vec::new();

        let first = catalog
            .register(AssetKind::Background, "backgrounds/forest.png", "s", &resolver, &mut warnings)
            .unwrap();
        let second = catalog
            .register(AssetKind::Background, "bg/forest.jpg", "s", &resolver, &mut warnings)
            .unwrap();
        let same_file = catalog
            .register(AssetKind::Background, "Forest.png", "s", &resolver, &mut warnings)
            .unwrap();

        assert_eq!(first.token(), "bg_forest");
        assert_eq!(second.token(), "bg_forest_2");
        assert_eq!(same_file.token(), "bg_forest");
    }

    #[test]
    fn test_sidecar_provenance_is_read() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("assets");
        touch(&root, "backgrounds/forest.png", b"a");
        touch(
            &root,
            "backgrounds/forest.png.meta.json",
            br#"{"license": "CC-BY-4.0", "author": "Ann", "source": "https://example.com"}"#,
        );
        let index = AssetIndex::build(&root).unwrap();
        let resolver = AssetResolver::new(&index);
        let mut catalog = AssetCatalog::new();
        let mut warnings = Vec::new();

        catalog
            .register(AssetKind::Background, "forest.png", "s", &resolver, &mut warnings)
            .unwrap();
        let usage = catalog.backgrounds().next().unwrap();
        assert_eq!(usage.provenance.license.as_deref(), Some("CC-BY-4.0"));
        assert_eq!(usage.provenance.author.as_deref(), Some("Ann"));
    }

    #[test]
    fn test_portrait_fallback_warns() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("assets");
        touch(&root, "characters/alice/neutral.png", b"n");
        let index = AssetIndex::build(&root).unwrap();
        let resolver = AssetResolver::new(&index);
        let mut catalog = AssetCatalog::new();
        let mut warnings = Vec::new();

        let token = catalog
            .register(AssetKind::Portrait, "alice:angry", "s", &resolver, &mut warnings)
            .unwrap();
        assert_eq!(token.token(), "ch_alice_neutral");
        assert!(matches!(warnings[0], ExportWarning::PortraitFallback { .. }));
    }
}
