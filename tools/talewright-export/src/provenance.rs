//! Content-hash provenance stamps.
//!
//! A stamp records what an artifact hashes to and which inputs produced it.
//! Stamps carry no timestamps, so re-running with the same inputs gives the
//! same stamp bytes.

use std::path::Path;

use serde::Serialize;
use talewright_shared::{sha256_file, sha256_hex};

use crate::error::{DocumentKind, ExportError};

pub const PROVENANCE_SCHEMA: &str = "talewright.provenance/1";
pub const GENERATOR_NAME: &str = "talewright-export";
pub const GENERATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratorInfo {
    pub name: String,
    pub version: String,
}

impl Default for GeneratorInfo {
    fn default() -> Self {
        Self {
            name: GENERATOR_NAME.to_string(),
            version: GENERATOR_VERSION.to_string(),
        }
    }
}

/// One input that contributed to an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvenanceInput {
    pub kind: String,
    pub id: String,
    pub sha256: String,
}

impl ProvenanceInput {
    /// Input for a loaded document. Hashes the source file when there is one,
    /// otherwise the document's canonical JSON.
    pub fn document<T: Serialize>(
        kind: DocumentKind,
        id: &str,
        source: Option<&Path>,
        document: &T,
    ) -> Result<Self, ExportError> {
        let sha256 = match source {
            Some(path) if path.is_file() => sha256_file(path)?.0,
            _ => {
                let bytes = serde_json::to_vec(document).map_err(anyhow::Error::from)?;
                sha256_hex(&bytes)
            }
        };
        Ok(Self {
            kind: kind.to_string(),
            id: id.to_string(),
            sha256,
        })
    }

    /// Input for an arbitrary artifact (e.g. the manifest an archive embeds).
    pub fn artifact(kind: &str, id: &str, bytes: &[u8]) -> Self {
        Self {
            kind: kind.to_string(),
            id: id.to_string(),
            sha256: sha256_hex(bytes),
        }
    }
}

/// `<artifact>.provenance.json` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvenanceStamp {
    pub schema: String,
    /// Artifact file name or relative path
    pub artifact: String,
    pub sha256: String,
    pub size: u64,
    pub generator: GeneratorInfo,
    pub inputs: Vec<ProvenanceInput>,
}

impl ProvenanceStamp {
    pub fn for_bytes(artifact: impl Into<String>, bytes: &[u8], inputs: Vec<ProvenanceInput>) -> Self {
        Self {
            schema: PROVENANCE_SCHEMA.to_string(),
            artifact: artifact.into(),
            sha256: sha256_hex(bytes),
            size: bytes.len() as u64,
            generator: GeneratorInfo::default(),
            inputs,
        }
    }

    pub fn to_json(&self) -> Result<String, ExportError> {
        to_pretty_json(self)
    }
}

/// Pretty JSON with a trailing newline, the format of every JSON artifact.
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<String, ExportError> {
    let mut json = serde_json::to_string_pretty(value).map_err(anyhow::Error::from)?;
    json.push('\n');
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use talewright_shared::ProjectDocument;
    use tempfile::tempdir;

    #[test]
    fn test_stamp_is_stable() {
        let inputs = vec![ProvenanceInput::artifact("manifest", "export_manifest.json", b"{}")];
        let a = ProvenanceStamp::for_bytes("script.rpy", b"label start:\n", inputs.clone());
        let b = ProvenanceStamp::for_bytes("script.rpy", b"label start:\n", inputs);
        assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
        assert_eq!(a.size, 13);
        assert_eq!(a.schema, PROVENANCE_SCHEMA);
        assert!(a.to_json().unwrap().ends_with("}\n"));
    }

    #[test]
    fn test_document_input_prefers_source_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tale.json");
        std::fs::write(&path, br#"{"id": "tale"}"#).unwrap();
        let doc = ProjectDocument {
            id: "tale".into(),
            ..Default::default()
        };

        let from_file =
            ProvenanceInput::document(DocumentKind::Project, "tale", Some(&path), &doc).unwrap();
        assert_eq!(from_file.sha256, sha256_hex(br#"{"id": "tale"}"#));
        assert_eq!(from_file.kind, "project");

        let from_memory = ProvenanceInput::document(DocumentKind::Project, "tale", None, &doc).unwrap();
        assert_eq!(
            from_memory.sha256,
            sha256_hex(&serde_json::to_vec(&doc).unwrap())
        );
    }
}
