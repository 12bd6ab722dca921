//! EULA, license text and the per-asset license manifest.

use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use talewright_shared::{read_file_with_limit, MAX_DOCUMENT_BYTES, TALEWRIGHT_FORMAT};

use crate::error::ExportError;

/// License/author/source metadata of one packaged asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LicenseEntry {
    pub alias: String,
    pub path: String,
    pub sha256: String,
    pub license: Option<String>,
    pub author: Option<String>,
    pub source: Option<String>,
}

/// `license_manifest.json` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LicenseManifest {
    pub project: String,
    pub version: String,
    /// Entries sorted by output path
    pub assets: Vec<LicenseEntry>,
}

/// Default EULA when the caller supplies none.
pub fn default_eula(title: &str, version: &str, author: &str) -> String {
    format!(
        "END USER LICENSE AGREEMENT\n\
         \n\
         {title} (version {version})\n\
         Copyright (c) {author}. All rights reserved.\n\
         \n\
         You may install and play this game for personal, non-commercial use.\n\
         You may not redistribute, resell or modify the game or its assets\n\
         without written permission from the author.\n\
         \n\
         THE GAME IS PROVIDED \"AS IS\", WITHOUT WARRANTY OF ANY KIND.\n"
    )
}

/// Default license text when the caller supplies none.
pub fn default_license(title: &str, author: &str) -> String {
    format!(
        "{title}\n\
         Copyright (c) {author}. All rights reserved.\n\
         \n\
         Third-party asset licenses are listed in license_manifest.json.\n"
    )
}

/// Caller-supplied text file, or the default.
pub fn text_or_default(path: Option<&Path>, default: impl FnOnce() -> String) -> Result<String, ExportError> {
    match path {
        Some(path) => {
            let bytes = read_file_with_limit(path, MAX_DOCUMENT_BYTES)?;
            String::from_utf8(bytes).map_err(|_| {
                ExportError::packaging(format!("{} is not valid UTF-8", path.display()))
            })
        }
        None => Ok(default()),
    }
}

/// Build the license manifest from the asset records of an export manifest.
pub fn license_manifest(
    export_root: &Path,
    project: &str,
    version: &str,
) -> Result<LicenseManifest, ExportError> {
    let manifest_path = export_root.join(TALEWRIGHT_FORMAT.export_manifest);
    let mut assets = Vec::new();

    if manifest_path.is_file() {
        let bytes = read_file_with_limit(&manifest_path, MAX_DOCUMENT_BYTES)?;
        let manifest: Value = serde_json::from_slice(&bytes).map_err(|e| {
            ExportError::packaging(format!("unreadable {}: {e}", manifest_path.display()))
        })?;

        for kind in ["backgrounds", "portraits"] {
            let records = manifest["assets"][kind].as_array().into_iter().flatten();
            for record in records {
                assets.push(LicenseEntry {
                    alias: string_field(record, "alias").unwrap_or_default(),
                    path: string_field(record, "output_path").unwrap_or_default(),
                    sha256: string_field(record, "sha256").unwrap_or_default(),
                    license: string_field(record, "license"),
                    author: string_field(record, "author"),
                    source: string_field(record, "source"),
                });
            }
        }
    } else {
        tracing::warn!(
            "No {} in {}; license manifest will be empty",
            TALEWRIGHT_FORMAT.export_manifest,
            export_root.display()
        );
    }

    assets.sort_by(|a, b| a.path.cmp(&b.path));
    assets.dedup_by(|a, b| a.path == b.path);

    Ok(LicenseManifest {
        project: project.to_string(),
        version: version.to_string(),
        assets,
    })
}

fn string_field(record: &Value, key: &str) -> Option<String> {
    record.get(key).and_then(Value::as_str).map(str::to_string)
}
