//! External oracles consulted by the pipeline.
//!
//! The policy gate and rating service decide whether an export may proceed;
//! both are evaluated before anything is rendered. The advisory scanner runs
//! after a completed export and can only report.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use talewright_shared::SceneDocument;

/// Policy gate verdict for an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    pub allow: bool,
    pub requires_ack: bool,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl GateDecision {
    pub fn allowed() -> Self {
        Self {
            allow: true,
            requires_ack: false,
            warnings: Vec::new(),
        }
    }

    pub fn denied(warning: impl Into<String>) -> Self {
        Self {
            allow: false,
            requires_ack: false,
            warnings: vec![warning.into()],
        }
    }
}

/// Yes/no + warnings policy oracle.
pub trait PolicyGate {
    fn evaluate(&self, action: &str) -> GateDecision;
}

/// Gate that allows every action.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllGate;

impl PolicyGate for AllowAllGate {
    fn evaluate(&self, _action: &str) -> GateDecision {
        GateDecision::allowed()
    }
}

/// Input to the rating oracle.
#[derive(Debug, Clone, Serialize)]
pub struct RatingRequest<'a> {
    pub subject: &'a str,
    pub content: &'a str,
    pub mode: &'a str,
    pub acknowledged: bool,
    pub action: &'a str,
    pub ack_token: Option<&'a str>,
}

/// Rating oracle verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingDecision {
    pub allowed: bool,
    pub rating: String,
    pub ack_status: String,
}

pub trait RatingOracle {
    fn evaluate(&self, request: &RatingRequest<'_>) -> RatingDecision;
}

/// Rating oracle that allows everything as "unrated".
#[derive(Debug, Clone, Copy, Default)]
pub struct UnratedOracle;

impl RatingOracle for UnratedOracle {
    fn evaluate(&self, request: &RatingRequest<'_>) -> RatingDecision {
        RatingDecision {
            allowed: true,
            rating: "unrated".to_string(),
            ack_status: if request.acknowledged {
                "acknowledged".to_string()
            } else {
                "not_required".to_string()
            },
        }
    }
}

/// Everything an advisory scanner gets to look at after an export.
#[derive(Debug)]
pub struct BundleContext<'a> {
    pub project_id: &'a str,
    pub output_dir: &'a std::path::Path,
    pub scenes: &'a [SceneDocument],
    pub scene_sources: Vec<Option<PathBuf>>,
    /// (logical reference, resolved relative path) pairs
    pub assets: Vec<(String, String)>,
}

/// Informational finding returned by an advisory scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryFinding {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_id: Option<String>,
}

pub trait AdvisoryScanner {
    fn scan(&self, context: &BundleContext<'_>) -> Vec<AdvisoryFinding>;
}

/// Scanner that reports nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopScanner;

impl AdvisoryScanner for NoopScanner {
    fn scan(&self, _context: &BundleContext<'_>) -> Vec<AdvisoryFinding> {
        Vec::new()
    }
}

/// Bundle of the three oracles handed to the pipeline.
pub struct Oracles<'a> {
    pub gate: &'a dyn PolicyGate,
    pub rating: &'a dyn RatingOracle,
    pub advisory: &'a dyn AdvisoryScanner,
}

impl Default for Oracles<'static> {
    fn default() -> Self {
        Self {
            gate: &AllowAllGate,
            rating: &UnratedOracle,
            advisory: &NoopScanner,
        }
    }
}

/// An externally observable hook of the pipeline.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct HookDescriptor {
    pub name: &'static str,
    pub stage: &'static str,
    pub blocking: bool,
    pub description: &'static str,
}

/// Every hook the pipeline calls out to, in invocation order.
pub const HOOK_CATALOG: &[HookDescriptor] = &[
    HookDescriptor {
        name: "gate.evaluate",
        stage: "pre-render",
        blocking: true,
        description: "Policy gate; allow=false aborts the export",
    },
    HookDescriptor {
        name: "rating.evaluate",
        stage: "pre-render",
        blocking: true,
        description: "Content rating; allowed=false aborts the export",
    },
    HookDescriptor {
        name: "advisory.scan",
        stage: "post-render",
        blocking: false,
        description: "Advisory scan of the written bundle; findings are logged only",
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_oracles_allow() {
        let oracles = Oracles::default();
        assert!(oracles.gate.evaluate("export").allow);

        let request = RatingRequest {
            subject: "tale",
            content: "",
            mode: "export",
            acknowledged: false,
            action: "export",
            ack_token: None,
        };
        let decision = oracles.rating.evaluate(&request);
        assert!(decision.allowed);
        assert_eq!(decision.rating, "unrated");
    }

    #[test]
    fn test_hook_catalog_blocking_hooks_come_first() {
        let first_non_blocking = HOOK_CATALOG.iter().position(|h| !h.blocking).unwrap();
        assert!(HOOK_CATALOG[first_non_blocking..].iter().all(|h| !h.blocking));
    }
}
