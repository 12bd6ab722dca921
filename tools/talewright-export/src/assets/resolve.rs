//! Logical reference → physical file resolution.
//!
//! Resolution order, first match wins:
//! 1. Normalize the reference (schemes, `./`, asset-root prefix); reject URLs
//! 2. Exact relative-path lookup in the index
//! 3. `asset_root / normalized` exists on disk
//! 4. Case-insensitive path or file-name match against the index
//! 5. Sorted recursive scan of the asset root for a matching file stem
//! 6. Portraits only: character + expression match, falling back to the
//!    character's `neutral` expression
//!
//! Ties go to the first match in sorted index order.

use std::path::{Path, PathBuf};

use serde::Serialize;
use talewright_shared::slugify;
use walkdir::WalkDir;

use super::index::{is_image, relative_slash_path, AssetCategory, AssetIndex};

const SCHEME_PREFIXES: &[&str] = &["asset://", "assets://", "file://", "res://"];
const NETWORK_PREFIXES: &[&str] = &["http://", "https://", "ftp://", "//"];

/// Which resolution step produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStep {
    ExactPath,
    OnDisk,
    CaseInsensitive,
    DirectoryScan,
    CharacterExpression,
    NeutralFallback,
}

/// Expression substitution applied by the neutral fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpressionFallback {
    pub requested: String,
    pub substituted: String,
}

/// A successfully resolved reference.
#[derive(Debug, Clone)]
pub struct ResolvedAsset {
    pub rel_path: String,
    pub path: PathBuf,
    pub step: ResolutionStep,
    pub fallback: Option<ExpressionFallback>,
}

/// Normalize an author-entered reference into a forward-slash relative path.
///
/// Returns `None` for empty references, network URLs and paths that escape
/// the asset root.
pub fn normalize_reference(raw: &str, asset_root: &Path) -> Option<String> {
    let mut reference = raw.trim().replace('\\', "/");
    let lower = reference.to_ascii_lowercase();

    if NETWORK_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return None;
    }
    if let Some(prefix) = SCHEME_PREFIXES.iter().find(|p| lower.starts_with(*p)) {
        reference = reference[prefix.len()..].to_string();
    }

    let mut rest = reference.as_str();
    loop {
        if let Some(stripped) = rest.strip_prefix("./") {
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix('/') {
            rest = stripped;
        } else {
            break;
        }
    }

    let root_name = asset_root
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase());
    if let Some((first, tail)) = rest.split_once('/') {
        let first = first.to_ascii_lowercase();
        if first == "assets" || root_name.as_deref() == Some(first.as_str()) {
            rest = tail;
        }
    }

    if rest.is_empty() || rest.split('/').any(|seg| seg == "..") {
        return None;
    }
    Some(rest.to_string())
}

/// Resolves background and portrait references against an [`AssetIndex`].
pub struct AssetResolver<'a> {
    index: &'a AssetIndex,
}

impl<'a> AssetResolver<'a> {
    pub fn new(index: &'a AssetIndex) -> Self {
        Self { index }
    }

    pub fn resolve_background(&self, reference: &str) -> Option<ResolvedAsset> {
        let normalized = normalize_reference(reference, self.index.root())?;
        self.resolve_path(&normalized)
    }

    pub fn resolve_portrait(&self, reference: &str) -> Option<ResolvedAsset> {
        let normalized = normalize_reference(reference, self.index.root())?;
        self.resolve_path(&normalized)
            .or_else(|| self.match_character(&normalized))
    }

    /// Steps 2-5.
    fn resolve_path(&self, normalized: &str) -> Option<ResolvedAsset> {
        if let Some(asset) = self.index.get(normalized) {
            return Some(ResolvedAsset {
                rel_path: asset.rel_path.clone(),
                path: asset.path.clone(),
                step: ResolutionStep::ExactPath,
                fallback: None,
            });
        }

        let on_disk = self.index.root().join(normalized);
        if on_disk.is_file() {
            return Some(ResolvedAsset {
                rel_path: normalized.to_string(),
                path: on_disk,
                step: ResolutionStep::OnDisk,
                fallback: None,
            });
        }

        if let Some(found) = self.match_case_insensitive(normalized) {
            return Some(found);
        }

        self.scan_for_stem(normalized)
    }

    fn match_case_insensitive(&self, normalized: &str) -> Option<ResolvedAsset> {
        let wanted_path = normalized.to_lowercase();
        let wanted_name = file_name(normalized).to_lowercase();

        let asset = self
            .index
            .iter()
            .find(|a| a.rel_path.to_lowercase() == wanted_path)
            .or_else(|| {
                self.index
                    .iter()
                    .find(|a| a.file_name().to_lowercase() == wanted_name)
            })?;

        Some(ResolvedAsset {
            rel_path: asset.rel_path.clone(),
            path: asset.path.clone(),
            step: ResolutionStep::CaseInsensitive,
            fallback: None,
        })
    }

    fn scan_for_stem(&self, normalized: &str) -> Option<ResolvedAsset> {
        let root = self.index.root();
        if !root.is_dir() {
            return None;
        }
        let wanted = file_stem(file_name(normalized)).to_lowercase();
        if wanted.is_empty() {
            return None;
        }

        WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file() && is_image(e.path()))
            .find(|e| {
                e.path()
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_lowercase() == wanted)
                    .unwrap_or(false)
            })
            .and_then(|e| {
                let rel_path = relative_slash_path(root, e.path())?;
                Some(ResolvedAsset {
                    rel_path,
                    path: e.path().to_path_buf(),
                    step: ResolutionStep::DirectoryScan,
                    fallback: None,
                })
            })
    }

    /// Step 6.
    fn match_character(&self, normalized: &str) -> Option<ResolvedAsset> {
        let (character, expression) = canonical_portrait(normalized)?;

        let find = |expr: &str| {
            self.index.iter().find(|a| {
                a.category == AssetCategory::Character
                    && a.character.as_deref() == Some(character.as_str())
                    && a.expression.as_deref() == Some(expr)
            })
        };

        if let Some(asset) = find(&expression) {
            return Some(ResolvedAsset {
                rel_path: asset.rel_path.clone(),
                path: asset.path.clone(),
                step: ResolutionStep::CharacterExpression,
                fallback: None,
            });
        }

        if expression == NEUTRAL {
            return None;
        }
        let asset = find(NEUTRAL)?;
        tracing::debug!(
            "Portrait '{}' falls back from '{}' to '{}'",
            normalized,
            expression,
            NEUTRAL
        );
        Some(ResolvedAsset {
            rel_path: asset.rel_path.clone(),
            path: asset.path.clone(),
            step: ResolutionStep::NeutralFallback,
            fallback: Some(ExpressionFallback {
                requested: expression,
                substituted: NEUTRAL.to_string(),
            }),
        })
    }
}

const NEUTRAL: &str = "neutral";

/// Split a portrait reference into canonical (character, expression).
///
/// Accepts `alice:happy`, `alice/happy`, `alice_happy`, `Alice Happy` and a
/// bare `alice` (expression `neutral`). A file extension is ignored.
pub fn canonical_portrait(reference: &str) -> Option<(String, String)> {
    let without_ext = match reference.rsplit_once('.') {
        Some((stem, ext)) if !ext.contains('/') && !stem.is_empty() => stem,
        _ => reference,
    };
    // Keep only the last two path segments: `characters/alice/happy` → alice/happy.
    let segments: Vec<&str> = without_ext.split('/').filter(|s| !s.is_empty()).collect();
    let tail = match segments.len() {
        0 => return None,
        1 => segments[0].to_string(),
        n => format!("{}_{}", segments[n - 2], segments[n - 1]),
    };

    let canonical = slugify(&tail.replace(':', "_"));
    if canonical.is_empty() {
        return None;
    }
    match canonical.split_once('_') {
        Some((character, expression)) => Some((character.to_string(), expression.to_string())),
        None => Some((canonical, NEUTRAL.to_string())),
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn file_stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
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
    fn test_normalize_strips_prefixes() {
        let root = Path::new("/project/assets");
        assert_eq!(
            normalize_reference("asset://backgrounds/forest.png", root).as_deref(),
            Some("backgrounds/forest.png")
        );
        assert_eq!(
            normalize_reference("./assets/backgrounds/forest.png", root).as_deref(),
            Some("backgrounds/forest.png")
        );
        assert_eq!(
            normalize_reference(" .\\bg\\forest.png ", root).as_deref(),
            Some("bg/forest.png")
        );
        assert_eq!(normalize_reference("forest", root).as_deref(), Some("forest"));
    }

    #[test]
    fn test_normalize_strips_custom_root_name() {
        let root = Path::new("/project/art");
        assert_eq!(
            normalize_reference("art/bg/forest.png", root).as_deref(),
            Some("bg/forest.png")
        );
    }

    #[test]
    fn test_normalize_rejects_urls_and_traversal() {
        let root = Path::new("/assets");
        assert!(normalize_reference("https://example.com/forest.png", root).is_none());
        assert!(normalize_reference("//cdn/forest.png", root).is_none());
        assert!(normalize_reference("../secret.png", root).is_none());
        assert!(normalize_reference("   ", root).is_none());
    }

    #[test]
    fn test_resolution_steps_in_order() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("assets");
        touch(&root, "backgrounds/Forest.png");
        touch(&root, "backgrounds/castle.png");
        touch(&root, "misc/readme.dat");
        let index = AssetIndex::build(&root).unwrap();
        let resolver = AssetResolver::new(&index);

        let exact = resolver.resolve_background("backgrounds/castle.png").unwrap();
        assert_eq!(exact.step, ResolutionStep::ExactPath);

        let disk = resolver.resolve_background("misc/readme.dat").unwrap();
        assert_eq!(disk.step, ResolutionStep::OnDisk);
        assert_eq!(disk.rel_path, "misc/readme.dat");

        let ci = resolver.resolve_background("forest.PNG").unwrap();
        assert_eq!(ci.step, ResolutionStep::CaseInsensitive);
        assert_eq!(ci.rel_path, "backgrounds/Forest.png");

        let scan = resolver.resolve_background("forest").unwrap();
        assert_eq!(scan.step, ResolutionStep::DirectoryScan);
        assert_eq!(scan.rel_path, "backgrounds/Forest.png");

        assert!(resolver.resolve_background("swamp").is_none());
    }

    #[test]
    fn test_ties_break_on_sorted_order() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("assets");
        touch(&root, "b/forest.png");
        touch(&root, "a/forest.png");
        let index = AssetIndex::build(&root).unwrap();
        let resolver = AssetResolver::new(&index);

        let resolved = resolver.resolve_background("FOREST.png").unwrap();
        assert_eq!(resolved.rel_path, "a/forest.png");
    }

    #[test]
    fn test_portrait_character_expression_and_neutral_fallback() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("assets");
        touch(&root, "characters/alice/happy.png");
        touch(&root, "characters/alice/neutral.png");
        let index = AssetIndex::build(&root).unwrap();
        let resolver = AssetResolver::new(&index);

        let happy = resolver.resolve_portrait("Alice:Happy").unwrap();
        assert_eq!(happy.rel_path, "characters/alice/happy.png");
        assert!(happy.fallback.is_none());

        let angry = resolver.resolve_portrait("alice angry").unwrap();
        assert_eq!(angry.step, ResolutionStep::NeutralFallback);
        assert_eq!(angry.rel_path, "characters/alice/neutral.png");
        assert_eq!(
            angry.fallback,
            Some(ExpressionFallback {
                requested: "angry".into(),
                substituted: "neutral".into()
            })
        );

        assert!(resolver.resolve_portrait("bob:happy").is_none());
    }

    #[test]
    fn test_canonical_portrait_forms() {
        assert_eq!(
            canonical_portrait("alice:happy"),
            Some(("alice".into(), "happy".into()))
        );
        assert_eq!(
            canonical_portrait("characters/alice/happy.png"),
            Some(("alice".into(), "happy".into()))
        );
        assert_eq!(
            canonical_portrait("Alice"),
            Some(("alice".into(), "neutral".into()))
        );
        assert_eq!(canonical_portrait("???"), None);
    }
}
