//! Deterministic ZIP archives.
//!
//! Entries are collected into a sorted map and written with a fixed 1980
//! epoch timestamp, fixed permissions and a fixed Deflate level, so equal
//! inputs give byte-identical archives on every platform.

use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::path::Path;

use serde::Serialize;
use talewright_shared::{read_file_with_limit, sha256_hex, MAX_ASSET_BYTES};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::assets::relative_slash_path;
use crate::error::ExportError;

pub const DEFLATE_LEVEL: i64 = 6;
pub const ENTRY_PERMISSIONS: u32 = 0o644;

/// A file added from a directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeFile {
    pub path: String,
    pub sha256: String,
    pub size: u64,
}

/// Sorted path → bytes collection that serializes to a ZIP.
#[derive(Debug, Default)]
pub struct ArchiveBuilder {
    entries: BTreeMap<String, Vec<u8>>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.entries.insert(path.into(), bytes.into());
    }

    /// Add every file under `dir` below `prefix`, returning a record per file
    /// with its path relative to `dir`.
    pub fn add_tree(&mut self, prefix: &str, dir: &Path) -> Result<Vec<TreeFile>, ExportError> {
        let mut added = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
                ExportError::io(path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(rel) = relative_slash_path(dir, entry.path()) else {
                continue;
            };
            let bytes = read_file_with_limit(entry.path(), MAX_ASSET_BYTES)?;
            added.push(TreeFile {
                path: rel.clone(),
                sha256: sha256_hex(&bytes),
                size: bytes.len() as u64,
            });
            self.add(format!("{prefix}/{rel}"), bytes);
        }
        Ok(added)
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.entries.get(path).map(Vec::as_slice)
    }

    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize to ZIP bytes.
    pub fn build(&self) -> Result<Vec<u8>, ExportError> {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(DEFLATE_LEVEL))
            .last_modified_time(zip::DateTime::default())
            .unix_permissions(ENTRY_PERMISSIONS);

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (path, bytes) in &self.entries {
            writer
                .start_file(path.as_str(), options)
                .map_err(|e| ExportError::packaging(format!("zip entry {path}: {e}")))?;
            writer
                .write_all(bytes)
                .map_err(|e| ExportError::packaging(format!("zip entry {path}: {e}")))?;
        }

        let cursor = writer
            .finish()
            .map_err(|e| ExportError::packaging(format!("failed to finish archive: {e}")))?;
        Ok(cursor.into_inner())
    }
}
