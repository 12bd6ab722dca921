//! talewright.toml manifest parsing
//!
//! Shared manifest structures used by the export, publish and check commands.
//! Relative paths are resolved against the manifest's directory.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use talewright_export::RouteMode;
use talewright_shared::is_safe_path_component;

/// talewright.toml manifest structure
#[derive(Debug, Deserialize)]
pub struct ProjectManifest {
    pub project: ProjectSection,
    #[serde(default)]
    pub export: ExportSection,
    #[serde(default)]
    pub publish: PublishSection,
}

/// Project metadata section
#[derive(Debug, Deserialize)]
pub struct ProjectSection {
    /// Project document id in the document store
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: String,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

/// Export configuration section
#[derive(Debug, Deserialize)]
pub struct ExportSection {
    /// Document store root (holds projects/, timelines/, scenes/, worlds/)
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Export output directory
    #[serde(default = "default_output")]
    pub output: PathBuf,
    /// Asset root for background/portrait resolution
    #[serde(default = "default_assets")]
    pub assets: PathBuf,
    pub timeline: Option<String>,
    pub world: Option<String>,
    /// disabled, master, forks, both or auto.
    /// Default: auto
    #[serde(default)]
    pub route_mode: RouteMode,
    /// Offer the in-script viewpoint menu when there are several routes.
    /// Default: true
    #[serde(default = "default_true")]
    pub switch_menu: bool,
    /// Render each scene into game/scenes/<label>.rpy.
    /// Default: false
    #[serde(default)]
    pub per_scene_modules: bool,
}

impl Default for ExportSection {
    fn default() -> Self {
        Self {
            root: default_root(),
            output: default_output(),
            assets: default_assets(),
            timeline: None,
            world: None,
            route_mode: RouteMode::default(),
            switch_menu: true,
            per_scene_modules: false,
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_output() -> PathBuf {
    PathBuf::from("build/export")
}

fn default_assets() -> PathBuf {
    PathBuf::from("assets")
}

fn default_true() -> bool {
    true
}

/// Publish configuration section
#[derive(Debug, Deserialize)]
pub struct PublishSection {
    /// Directory receiving archives and their sidecars
    #[serde(default = "default_dist")]
    pub dist: PathBuf,
    pub icon: Option<PathBuf>,
    pub eula: Option<PathBuf>,
    pub license: Option<PathBuf>,
    /// Embed debug/hook_catalog.json in every archive
    #[serde(default)]
    pub debug: bool,
    /// Package fork trees as separate archives.
    /// Default: true
    #[serde(default = "default_true")]
    pub forks: bool,
    #[serde(default)]
    pub targets: Vec<TargetEntry>,
}

impl Default for PublishSection {
    fn default() -> Self {
        Self {
            dist: default_dist(),
            icon: None,
            eula: None,
            license: None,
            debug: false,
            forks: true,
            targets: Vec::new(),
        }
    }
}

fn default_dist() -> PathBuf {
    PathBuf::from("dist")
}

/// Single publish target
#[derive(Debug, Clone, Deserialize)]
pub struct TargetEntry {
    pub name: String,
    #[serde(default)]
    pub platforms: Vec<String>,
}

impl ProjectManifest {
    /// Load manifest from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse manifest from string
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse talewright.toml")
    }

    /// Validate manifest fields
    pub fn validate(&self) -> Result<()> {
        if self.project.id.trim().is_empty() {
            anyhow::bail!("project.id must not be empty in talewright.toml");
        }
        if !is_safe_path_component(&self.project.id) {
            anyhow::bail!(
                "Invalid project.id '{}' in talewright.toml (must be usable as a file name)",
                self.project.id
            );
        }

        let mut seen = Vec::new();
        for target in &self.publish.targets {
            if !is_safe_path_component(&target.name) || target.name.contains(' ') {
                anyhow::bail!(
                    "Invalid publish target name '{}' in talewright.toml",
                    target.name
                );
            }
            if seen.contains(&target.name.as_str()) {
                anyhow::bail!("Duplicate publish target '{}' in talewright.toml", target.name);
            }
            seen.push(target.name.as_str());
        }

        if !self.export.switch_menu && self.export.route_mode == RouteMode::Master {
            eprintln!(
                "Warning: route_mode=master but switch_menu=false. Multi-route exports will get neither a menu nor forks."
            );
        }

        Ok(())
    }

    /// Display title, falling back to the project id
    pub fn title(&self) -> &str {
        self.project
            .title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.project.id)
    }

    /// Slug used for archive names
    pub fn slug(&self) -> String {
        let slug = talewright_shared::slugify(&self.project.id).replace('_', "-");
        if slug.is_empty() {
            "talewright".to_string()
        } else {
            slug
        }
    }
}

/// Directory containing the manifest; relative manifest paths resolve here.
pub fn project_dir(manifest_path: &Path) -> &Path {
    manifest_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Resolve a manifest path against the project directory.
pub fn resolve(project_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_dir.join(path)
    }
}
