//! Filesystem and hashing helpers shared across Talewright tools.

use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Maximum allowed size for a project/timeline/scene/world JSON document.
pub const MAX_DOCUMENT_BYTES: u64 = 16 * 1024 * 1024; // 16 MiB
/// Maximum allowed size for a single asset file (images, icons, licenses).
pub const MAX_ASSET_BYTES: u64 = 256 * 1024 * 1024; // 256 MiB

/// Read a file into memory with a size cap.
pub fn read_file_with_limit(path: &Path, max_bytes: u64) -> Result<Vec<u8>> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to read file metadata: {}", path.display()))?;
    let len = metadata.len();
    if len > max_bytes {
        anyhow::bail!(
            "File too large: {} ({} bytes, max {} bytes)",
            path.display(),
            len,
            max_bytes
        );
    }
    std::fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))
}

/// Hex-encoded SHA-256 of a byte slice (64 characters).
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hex-encoded SHA-256 of a file's contents, plus its size in bytes.
pub fn sha256_file(path: &Path) -> Result<(String, u64)> {
    let bytes = read_file_with_limit(path, MAX_ASSET_BYTES)?;
    Ok((sha256_hex(&bytes), bytes.len() as u64))
}
