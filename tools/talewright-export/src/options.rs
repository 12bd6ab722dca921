//! Per-invocation export configuration.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How multiple viewpoint routes are surfaced in the output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteMode {
    /// Routes are recorded in the manifest only
    Disabled,
    /// One master script with an in-script switch menu
    Master,
    /// One independent fork per route
    Forks,
    /// Master script with switch menu plus forks
    Both,
    /// `both` when there are at least two routes, `disabled` otherwise
    #[default]
    Auto,
}

impl RouteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteMode::Disabled => "disabled",
            RouteMode::Master => "master",
            RouteMode::Forks => "forks",
            RouteMode::Both => "both",
            RouteMode::Auto => "auto",
        }
    }

    /// Whether this mode wants an in-script switch menu once multi-route.
    pub fn wants_menu(&self) -> bool {
        matches!(self, RouteMode::Master | RouteMode::Both | RouteMode::Auto)
    }

    /// Whether this mode wants per-route forks once multi-route.
    pub fn wants_forks(&self) -> bool {
        matches!(self, RouteMode::Forks | RouteMode::Both | RouteMode::Auto)
    }
}

impl fmt::Display for RouteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" | "off" | "none" => Ok(RouteMode::Disabled),
            "master" | "menu" => Ok(RouteMode::Master),
            "forks" | "fork" => Ok(RouteMode::Forks),
            "both" => Ok(RouteMode::Both),
            "auto" => Ok(RouteMode::Auto),
            other => Err(format!(
                "unknown route mode '{other}' (expected disabled, master, forks, both or auto)"
            )),
        }
    }
}

/// Immutable input for one export invocation.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub project_id: String,
    pub timeline_id: Option<String>,
    pub world_id: Option<String>,
    pub output_dir: PathBuf,
    /// Root directory of the physical asset index
    pub asset_root: PathBuf,
    pub force: bool,
    pub dry_run: bool,
    pub per_scene_modules: bool,
    pub route_mode: RouteMode,
    pub switch_menu: bool,
    /// Action name passed to the policy gate and rating oracle
    pub gate_action: String,
    pub rating_acknowledged: bool,
    pub ack_token: Option<String>,
    /// Pins `generated_at` in the manifest for reproducible builds
    pub generated_at: Option<DateTime<Utc>>,
}

impl ExportOptions {
    pub fn new(
        project_id: impl Into<String>,
        output_dir: impl Into<PathBuf>,
        asset_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            timeline_id: None,
            world_id: None,
            output_dir: output_dir.into(),
            asset_root: asset_root.into(),
            force: false,
            dry_run: false,
            per_scene_modules: false,
            route_mode: RouteMode::default(),
            switch_menu: true,
            gate_action: "export".to_string(),
            rating_acknowledged: false,
            ack_token: None,
            generated_at: None,
        }
    }

    pub fn with_timeline(mut self, timeline_id: impl Into<String>) -> Self {
        self.timeline_id = Some(timeline_id.into());
        self
    }

    pub fn with_world(mut self, world_id: impl Into<String>) -> Self {
        self.world_id = Some(world_id.into());
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_per_scene_modules(mut self, per_scene_modules: bool) -> Self {
        self.per_scene_modules = per_scene_modules;
        self
    }

    pub fn with_route_mode(mut self, route_mode: RouteMode) -> Self {
        self.route_mode = route_mode;
        self
    }

    pub fn with_switch_menu(mut self, switch_menu: bool) -> Self {
        self.switch_menu = switch_menu;
        self
    }

    pub fn with_gate_action(mut self, action: impl Into<String>) -> Self {
        self.gate_action = action.into();
        self
    }

    pub fn with_rating_ack(mut self, acknowledged: bool, token: Option<String>) -> Self {
        self.rating_acknowledged = acknowledged;
        self.ack_token = token;
        self
    }

    pub fn with_generated_at(mut self, generated_at: DateTime<Utc>) -> Self {
        self.generated_at = Some(generated_at);
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}
