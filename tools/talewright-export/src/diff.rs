//! Dry-run diffing and the write/diff artifact sink.
//!
//! Every artifact the pipeline produces goes through [`ArtifactSink`]. In a
//! real run the sink writes it; in a dry run it compares it against what is on
//! disk and records a [`DiffEntry`] instead, touching nothing.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use similar::TextDiff;
use talewright_shared::{read_file_with_limit, sha256_file, sha256_hex, MAX_DOCUMENT_BYTES};
use walkdir::WalkDir;

use crate::error::ExportError;

/// Lines of context around each unified-diff hunk.
pub const DIFF_CONTEXT_LINES: usize = 3;
/// Unified diffs longer than this are cut off.
pub const DIFF_MAX_LINES: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStatus {
    New,
    Unchanged,
    Modified,
    /// Left over from an earlier run; pruned
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiffDetail {
    /// Unified diff body for text artifacts
    Unified { text: String, truncated: bool },
    /// Content hashes for binary artifacts
    Hashes { before: Option<String>, after: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffEntry {
    /// Forward-slash path relative to the sink root
    pub path: String,
    pub status: DiffStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<DiffDetail>,
}

impl DiffEntry {
    pub fn is_unchanged(&self) -> bool {
        self.status == DiffStatus::Unchanged
    }
}

/// Compare text content against `target`.
pub fn diff_text(path: &str, target: &Path, new: &str) -> Result<DiffEntry, ExportError> {
    if !target.is_file() {
        return Ok(DiffEntry {
            path: path.to_string(),
            status: DiffStatus::New,
            detail: None,
        });
    }

    let old_bytes = read_file_with_limit(target, MAX_DOCUMENT_BYTES)?;
    if old_bytes == new.as_bytes() {
        return Ok(DiffEntry {
            path: path.to_string(),
            status: DiffStatus::Unchanged,
            detail: None,
        });
    }

    let detail = match std::str::from_utf8(&old_bytes) {
        Ok(old) => unified_diff(path, old, new),
        Err(_) => DiffDetail::Hashes {
            before: Some(sha256_hex(&old_bytes)),
            after: sha256_hex(new.as_bytes()),
        },
    };
    Ok(DiffEntry {
        path: path.to_string(),
        status: DiffStatus::Modified,
        detail: Some(detail),
    })
}

/// Compare binary content against `target` by SHA-256.
pub fn diff_bytes(path: &str, target: &Path, new: &[u8]) -> Result<DiffEntry, ExportError> {
    diff_hashes(path, target, sha256_hex(new))
}

/// Compare a file that would be copied to `target`, by SHA-256.
pub fn diff_copy(path: &str, target: &Path, source: &Path) -> Result<DiffEntry, ExportError> {
    let (after, _) = sha256_file(source)?;
    diff_hashes(path, target, after)
}

fn diff_hashes(path: &str, target: &Path, after: String) -> Result<DiffEntry, ExportError> {
    if !target.is_file() {
        return Ok(DiffEntry {
            path: path.to_string(),
            status: DiffStatus::New,
            detail: Some(DiffDetail::Hashes {
                before: None,
                after,
            }),
        });
    }

    let (before, _) = sha256_file(target)?;
    let status = if before == after {
        DiffStatus::Unchanged
    } else {
        DiffStatus::Modified
    };
    Ok(DiffEntry {
        path: path.to_string(),
        status,
        detail: (status == DiffStatus::Modified).then(|| DiffDetail::Hashes {
            before: Some(before),
            after,
        }),
    })
}

fn unified_diff(path: &str, old: &str, new: &str) -> DiffDetail {
    let diff = TextDiff::from_lines(old, new);
    let text = diff
        .unified_diff()
        .context_radius(DIFF_CONTEXT_LINES)
        .header(&format!("a/{path}"), &format!("b/{path}"))
        .to_string();

    let total = text.lines().count();
    if total <= DIFF_MAX_LINES {
        return DiffDetail::Unified {
            text,
            truncated: false,
        };
    }

    let mut cut: String = text
        .lines()
        .take(DIFF_MAX_LINES)
        .flat_map(|line| [line, "\n"])
        .collect();
    cut.push_str(&format!("... ({} more lines)\n", total - DIFF_MAX_LINES));
    DiffDetail::Unified {
        text: cut,
        truncated: true,
    }
}

/// Destination for generated artifacts under one root directory.
#[derive(Debug)]
pub struct ArtifactSink {
    root: PathBuf,
    dry_run: bool,
    diffs: Vec<DiffEntry>,
    written: Vec<PathBuf>,
    /// Relative paths produced this run, dry or not
    produced: BTreeSet<String>,
}

impl ArtifactSink {
    pub fn new(root: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            root: root.into(),
            dry_run,
            diffs: Vec::new(),
            written: Vec::new(),
            produced: BTreeSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn write_text(&mut self, rel_path: &str, text: &str) -> Result<PathBuf, ExportError> {
        let target = self.root.join(rel_path);
        self.produced.insert(rel_path.to_string());
        if self.dry_run {
            self.diffs.push(diff_text(rel_path, &target, text)?);
        } else {
            write_with_parent(&target, text.as_bytes())?;
            self.written.push(target.clone());
        }
        Ok(target)
    }

    pub fn write_bytes(&mut self, rel_path: &str, bytes: &[u8]) -> Result<PathBuf, ExportError> {
        let target = self.root.join(rel_path);
        self.produced.insert(rel_path.to_string());
        if self.dry_run {
            self.diffs.push(diff_bytes(rel_path, &target, bytes)?);
        } else {
            write_with_parent(&target, bytes)?;
            self.written.push(target.clone());
        }
        Ok(target)
    }

    pub fn copy_file(&mut self, rel_path: &str, source: &Path) -> Result<PathBuf, ExportError> {
        let target = self.root.join(rel_path);
        self.produced.insert(rel_path.to_string());
        if self.dry_run {
            self.diffs.push(diff_copy(rel_path, &target, source)?);
        } else {
            create_parent(&target)?;
            std::fs::copy(source, &target).map_err(|e| ExportError::io(&target, e))?;
            self.written.push(target.clone());
        }
        Ok(target)
    }

    /// Remove files under `rel_dir` that this run did not produce, then any
    /// directories left empty. A dry run records them as `removed` instead.
    pub fn prune(&mut self, rel_dir: &str) -> Result<usize, ExportError> {
        let dir = self.root.join(rel_dir);
        if !dir.is_dir() {
            return Ok(0);
        }

        let mut stale = Vec::new();
        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry.map_err(|e| ExportError::io(&dir, e.into()))?;
            if entry.file_type().is_dir() {
                continue;
            }
            let rel = match entry.path().strip_prefix(&self.root) {
                Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
                Err(_) => continue,
            };
            if !self.produced.contains(&rel) {
                stale.push((rel, entry.path().to_path_buf()));
            }
        }

        for (rel, path) in &stale {
            if self.dry_run {
                self.diffs.push(DiffEntry {
                    path: rel.clone(),
                    status: DiffStatus::Removed,
                    detail: None,
                });
            } else {
                std::fs::remove_file(path).map_err(|e| ExportError::io(path, e))?;
                tracing::debug!("Removed stale {}", rel);
            }
        }
        if !self.dry_run {
            remove_empty_dirs(&dir)?;
        }
        Ok(stale.len())
    }

    /// Files written so far (empty in a dry run).
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    pub fn diffs(&self) -> &[DiffEntry] {
        &self.diffs
    }

    pub fn into_diffs(self) -> Vec<DiffEntry> {
        self.diffs
    }
}

fn create_parent(target: &Path) -> Result<(), ExportError> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ExportError::io(parent, e))?;
    }
    Ok(())
}

fn remove_empty_dirs(dir: &Path) -> Result<(), ExportError> {
    for entry in WalkDir::new(dir).contents_first(true) {
        let entry = entry.map_err(|e| ExportError::io(dir, e.into()))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let path = entry.path();
        let mut contents = std::fs::read_dir(path).map_err(|e| ExportError::io(path, e))?;
        if contents.next().is_none() {
            std::fs::remove_dir(path).map_err(|e| ExportError::io(path, e))?;
        }
    }
    Ok(())
}

fn write_with_parent(target: &Path, bytes: &[u8]) -> Result<(), ExportError> {
    create_parent(target)?;
    std::fs::write(target, bytes).map_err(|e| ExportError::io(target, e))
}
