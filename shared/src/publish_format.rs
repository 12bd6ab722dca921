//! Output format specification for Talewright exports and publish archives.
//!
//! `PublishFormat` is the single source of truth for the file names the
//! pipeline writes, so the exporter, the packager and the CLI agree on them.
//!
//! # Example
//!
//! ```
//! use talewright_shared::TALEWRIGHT_FORMAT;
//!
//! assert_eq!(TALEWRIGHT_FORMAT.archive_ext, "zip");
//! assert_eq!(TALEWRIGHT_FORMAT.script_file, "script.rpy");
//! ```

/// File naming specification for an export tree and its publish archives.
#[derive(Debug, Clone, Copy)]
pub struct PublishFormat {
    /// Archive extension without dot (e.g., "zip")
    pub archive_ext: &'static str,

    /// Directory holding the playable game tree inside an export
    pub game_dir: &'static str,

    /// Main script file name inside `game_dir`
    pub script_file: &'static str,

    /// Script module extension without dot (e.g., "rpy")
    pub script_ext: &'static str,

    /// Directory under `game_dir` holding per-scene script modules
    pub scenes_dir: &'static str,

    /// Directory under `game_dir` holding copied image assets
    pub images_dir: &'static str,

    /// Directory under the export root holding per-route forks
    pub forks_dir: &'static str,

    /// Export manifest file name
    pub export_manifest: &'static str,

    /// Label manifest file name
    pub label_manifest: &'static str,

    /// Publish manifest file name (inside archives)
    pub publish_manifest: &'static str,

    /// Distribution channel descriptor file name
    pub channels_file: &'static str,

    /// Provenance file name (inside archives)
    pub provenance_file: &'static str,

    /// Suffix appended to an artifact path to name its provenance sidecar
    pub provenance_suffix: &'static str,

    /// Suffix appended to an asset path to name its metadata sidecar
    pub asset_sidecar_suffix: &'static str,
}

/// Talewright output format.
///
/// - Game tree: `game/script.rpy`, `game/scenes/*.rpy`, `game/images/...`
/// - Export manifests: `export_manifest.json`, `label_manifest.json`
/// - Sidecars: `<artifact>.provenance.json`, `<asset>.meta.json`
pub const TALEWRIGHT_FORMAT: PublishFormat = PublishFormat {
    archive_ext: "zip",
    game_dir: "game",
    script_file: "script.rpy",
    script_ext: "rpy",
    scenes_dir: "scenes",
    images_dir: "images",
    forks_dir: "forks",
    export_manifest: "export_manifest.json",
    label_manifest: "label_manifest.json",
    publish_manifest: "publish_manifest.json",
    channels_file: "channels.json",
    provenance_file: "provenance.json",
    provenance_suffix: ".provenance.json",
    asset_sidecar_suffix: ".meta.json",
};

impl PublishFormat {
    /// Relative path of the main script inside an export root.
    pub fn script_path(&self) -> String {
        format!("{}/{}", self.game_dir, self.script_file)
    }

    /// Relative path of a per-scene module inside an export root.
    pub fn scene_module_path(&self, label: &str) -> String {
        format!(
            "{}/{}/{}.{}",
            self.game_dir, self.scenes_dir, label, self.script_ext
        )
    }

    /// Relative path of a copied image inside an export root.
    pub fn image_path(&self, asset_rel_path: &str) -> String {
        format!("{}/{}/{}", self.game_dir, self.images_dir, asset_rel_path)
    }

    /// Sidecar path for a provenance stamp.
    pub fn provenance_sidecar(&self, artifact: &str) -> String {
        format!("{}{}", artifact, self.provenance_suffix)
    }
}
