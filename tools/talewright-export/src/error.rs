//! Fatal errors and non-fatal warnings raised by the export pipeline.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// Kind of document requested from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Project,
    Timeline,
    Scene,
    World,
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocumentKind::Project => "project",
            DocumentKind::Timeline => "timeline",
            DocumentKind::Scene => "scene",
            DocumentKind::World => "world",
        };
        f.write_str(name)
    }
}

/// Fatal pipeline error. Every variant aborts the invocation before any
/// output is written.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// A project, timeline, scene or world document is missing
    #[error("{kind} not found: {id}")]
    NotFound { kind: DocumentKind, id: String },

    /// A document exists but could not be parsed
    #[error("malformed {kind} document '{id}': {source}")]
    Malformed {
        kind: DocumentKind,
        id: String,
        #[source]
        source: serde_json::Error,
    },

    /// The policy gate or rating oracle refused the action
    #[error("export blocked by {oracle}: {payload}")]
    GateBlocked {
        oracle: &'static str,
        payload: serde_json::Value,
    },

    /// Output directory is unusable (not a directory, or non-empty without force)
    #[error("invalid output directory {}: {reason}", path.display())]
    InvalidOutput { path: PathBuf, reason: String },

    /// Packaging could not start or complete
    #[error("packaging failed: {0}")]
    PackagingFailure(String),

    /// Filesystem error while reading inputs or writing outputs
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ExportError {
    pub fn not_found(kind: DocumentKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn invalid_output(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidOutput {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn packaging(msg: impl Into<String>) -> Self {
        Self::PackagingFailure(msg.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Which asset catalog a reference belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Background,
    Portrait,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Background => f.write_str("background"),
            AssetKind::Portrait => f.write_str("portrait"),
        }
    }
}

/// Non-fatal finding collected during an export and surfaced in the result
/// and manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExportWarning {
    /// Asset reference with no matching file; the raw name is used in script text
    UnresolvedAsset {
        asset: AssetKind,
        scene_id: String,
        reference: String,
    },
    /// Node type the renderer does not understand; emitted as a comment
    UnsupportedNode { scene_id: String, node_type: String },
    /// Jump or choice target that names no exported scene
    UnresolvedJump { scene_id: String, target: String },
    /// Portrait expression replaced by the character's neutral expression
    PortraitFallback {
        reference: String,
        requested: String,
        substituted: String,
    },
}

impl fmt::Display for ExportWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportWarning::UnresolvedAsset {
                asset,
                scene_id,
                reference,
            } => write!(f, "unresolved {asset} '{reference}' in scene '{scene_id}'"),
            ExportWarning::UnsupportedNode {
                scene_id,
                node_type,
            } => write!(f, "unsupported node type '{node_type}' in scene '{scene_id}'"),
            ExportWarning::UnresolvedJump { scene_id, target } => {
                write!(f, "unresolved jump target '{target}' in scene '{scene_id}'")
            }
            ExportWarning::PortraitFallback {
                reference,
                requested,
                substituted,
            } => write!(
                f,
                "portrait '{reference}': expression '{requested}' missing, using '{substituted}'"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes_are_stable() {
        assert_eq!(
            ExportError::not_found(DocumentKind::Scene, "intro").to_string(),
            "scene not found: intro"
        );
        assert!(ExportError::packaging("no targets")
            .to_string()
            .starts_with("packaging failed:"));
        assert!(ExportError::invalid_output("/tmp/out", "not empty")
            .to_string()
            .contains("not empty"));
    }

    #[test]
    fn test_gate_blocked_carries_payload() {
        let err = ExportError::GateBlocked {
            oracle: "gate",
            payload: serde_json::json!({"allow": false}),
        };
        assert!(err.to_string().contains("\"allow\":false"));
    }

    #[test]
    fn test_warning_serializes_with_kind_tag() {
        let warning = ExportWarning::UnresolvedAsset {
            asset: AssetKind::Background,
            scene_id: "intro".into(),
            reference: "forest".into(),
        };
        let value = serde_json::to_value(&warning).unwrap();
        assert_eq!(value["kind"], "unresolved_asset");
        assert_eq!(value["asset"], "background");
        assert_eq!(
            warning.to_string(),
            "unresolved background 'forest' in scene 'intro'"
        );
    }
}
