//! Integration tests for the export pipeline
//!
//! Tests the full flow: project on disk -> export -> verify script, manifests
//! and routes

mod fixtures;

use std::collections::BTreeSet;

use chrono::{TimeZone, Utc};
use fixtures::{read, snapshot, two_pov_project, ProjectFixture};
use serde_json::{json, Value};
use talewright_export::{
    export, DiffStatus, DirectoryStore, ExportError, ExportOptions, ExportWarning, GateDecision,
    Oracles, PolicyGate, RatingDecision, RatingOracle, RatingRequest, RouteMode,
};
use tempfile::tempdir;

fn options(fixture: &ProjectFixture, out: &std::path::Path) -> ExportOptions {
    ExportOptions::new("tale", out, fixture.assets())
}

/// An unresolved background is reported missing and rendered under its logical name
#[test]
fn test_missing_background_is_reported_and_emitted_as_tag() {
    let dir = tempdir().expect("Failed to create temp dir");
    let fixture = ProjectFixture::new(&dir.path().join("project"));
    fixture
        .project("tale", &["intro"])
        .scene(
            "intro",
            json!({"background": "forest", "dialogue": [{"type": "line", "text": "Dark."}]}),
        );

    let out = dir.path().join("out");
    let store = DirectoryStore::new(&fixture.root);
    let result = export(&store, &options(&fixture, &out), &Oracles::default()).expect("export failed");

    assert_eq!(result.missing_backgrounds, vec!["forest"]);
    assert!(result.backgrounds.is_empty());
    let script = read(&result.script_path);
    assert!(script.contains("    scene forest\n"));
    assert!(!script.contains("image "));
    assert!(result.warnings.iter().any(|w| matches!(
        w,
        ExportWarning::UnresolvedAsset { reference, .. } if reference == "forest"
    )));

    let manifest: Value = serde_json::from_str(&read(&result.manifest_path)).unwrap();
    assert_eq!(manifest["missing_assets"]["backgrounds"], json!(["forest"]));
}

/// Two viewpoints in `both` mode get a switch menu and one fork each
#[test]
fn test_two_viewpoints_with_menu_and_forks() {
    let dir = tempdir().expect("Failed to create temp dir");
    let fixture = two_pov_project(&dir.path().join("project"));
    let out = dir.path().join("out");
    let store = DirectoryStore::new(&fixture.root);

    let opts = options(&fixture, &out)
        .with_timeline("main")
        .with_route_mode(RouteMode::Both)
        .with_switch_menu(true);
    let result = export(&store, &opts, &Oracles::default()).expect("export failed");

    let route_ids: Vec<_> = result.routes.iter().map(|r| r.pov_id.as_str()).collect();
    assert_eq!(route_ids, vec!["alice", "bob"]);
    assert_eq!(result.routes[0].scene_ids, vec!["meet", "forest"]);
    assert_eq!(result.routes[1].scene_ids, vec!["meet", "castle"]);
    assert_eq!(result.routes[1].display_name, "Bob");
    assert!(result.menu_enabled);

    let script = read(&result.script_path);
    assert!(script.contains("label start:\n    jump route_menu\n"));
    assert!(script.contains("label route_menu:\n    menu:\n"));
    assert!(script.contains("            jump pov_alice\n"));
    assert!(script.contains("            jump pov_bob\n"));
    assert!(script.contains("label pov_alice:\n    call meet\n    call forest\n    return\n"));
    assert!(script.contains("label pov_bob:\n    call meet\n    call castle\n    return\n"));

    assert_eq!(result.forks.len(), 2);
    let alice = &result.forks[0];
    assert_eq!(alice.slug, "alice");
    assert!(alice.dir.ends_with("forks/alice"));
    let alice_script = read(&alice.script_path);
    assert!(alice_script.contains("label forest:"));
    assert!(!alice_script.contains("label castle:"));
    assert!(!alice_script.contains("route_menu"));
    assert!(alice.dir.join("game/images/backgrounds/forest.png").is_file());
    assert!(!alice.dir.join("game/images/backgrounds/castle.png").exists());

    let fork_manifest: Value = serde_json::from_str(&read(&alice.manifest_path)).unwrap();
    assert_eq!(fork_manifest["pov"]["active"], json!(["alice"]));
    let fork_backgrounds: Vec<_> = fork_manifest["assets"]["backgrounds"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["alias"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(fork_backgrounds, vec!["bg_forest", "bg_town"]);

    let manifest: Value = serde_json::from_str(&read(&result.manifest_path)).unwrap();
    assert_eq!(manifest["pov"]["mode"], "both");
    assert_eq!(manifest["pov"]["menu_enabled"], true);
    assert_eq!(manifest["pov"]["forks"].as_array().unwrap().len(), 2);
    assert_eq!(manifest["pov"]["forks"][1]["path"], "forks/bob");
}

struct DenyAll;

impl PolicyGate for DenyAll {
    fn evaluate(&self, _action: &str) -> GateDecision {
        GateDecision {
            allow: false,
            requires_ack: true,
            warnings: vec!["publishing disabled".into()],
        }
    }
}

/// A gate denial aborts before any file is touched
#[test]
fn test_gate_denial_touches_nothing() {
    let dir = tempdir().expect("Failed to create temp dir");
    let fixture = two_pov_project(&dir.path().join("project"));
    let out = dir.path().join("out");
    std::fs::create_dir_all(&out).unwrap();
    std::fs::write(out.join("keep.txt"), "untouched").unwrap();
    let before = snapshot(&out);

    let store = DirectoryStore::new(&fixture.root);
    let oracles = Oracles {
        gate: &DenyAll,
        ..Oracles::default()
    };
    let opts = options(&fixture, &out).with_timeline("main").with_force(true);
    let err = export(&store, &opts, &oracles).unwrap_err();

    match err {
        ExportError::GateBlocked { oracle, payload } => {
            assert_eq!(oracle, "gate");
            assert_eq!(payload["allow"], false);
            assert_eq!(payload["warnings"], json!(["publishing disabled"]));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(snapshot(&out), before);
}

#[test]
fn test_export_is_deterministic() {
    let dir = tempdir().expect("Failed to create temp dir");
    let fixture = two_pov_project(&dir.path().join("project"));
    let store = DirectoryStore::new(&fixture.root);
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

    let run = |name: &str| {
        let out = dir.path().join(name);
        let opts = options(&fixture, &out)
            .with_world("realm")
            .with_route_mode(RouteMode::Both)
            .with_generated_at(at);
        export(&store, &opts, &Oracles::default()).expect("export failed");
        snapshot(&out)
    };

    let first = run("out1");
    let second = run("out2");
    assert_eq!(first, second);
    assert!(first.contains_key("game/script.rpy"));
    assert!(first.contains_key("forks/bob/game/script.rpy"));

    let manifest: Value = serde_json::from_slice(&first["export_manifest.json"]).unwrap();
    assert_eq!(manifest["generated_at"], "2024-05-01T12:00:00Z");
    assert_eq!(manifest["pov"]["default"], "bob");
    assert_eq!(manifest["worlds"]["selected"]["id"], "realm");
}

#[test]
fn test_every_reference_is_resolved_or_missing() {
    let dir = tempdir().expect("Failed to create temp dir");
    let fixture = two_pov_project(&dir.path().join("project"));
    fixture.scene(
        "extra",
        json!({"background": "swamp", "portrait": "zed:sad", "dialogue": [
            {"type": "line", "text": "Hm.", "background": "town", "portrait": "alice:happy"}
        ]}),
    );
    fixture.project("tale", &["meet", "forest", "castle", "extra"]);

    let store = DirectoryStore::new(&fixture.root);
    let out = dir.path().join("out");
    let result = export(&store, &options(&fixture, &out), &Oracles::default()).expect("export failed");

    let resolved: BTreeSet<_> = result.backgrounds.iter().map(|u| u.logical_name.as_str()).collect();
    let missing: BTreeSet<_> = result.missing_backgrounds.iter().map(String::as_str).collect();
    assert_eq!(resolved, BTreeSet::from(["castle", "forest", "town"]));
    assert_eq!(missing, BTreeSet::from(["swamp"]));
    assert!(resolved.is_disjoint(&missing));

    let portraits: BTreeSet<_> = result.portraits.iter().map(|u| u.logical_name.as_str()).collect();
    assert_eq!(portraits, BTreeSet::from(["alice:happy", "bob:angry"]));
    assert_eq!(result.missing_portraits, vec!["zed:sad"]);

    let bob = result.portraits.iter().find(|u| u.logical_name == "bob:angry").unwrap();
    assert_eq!(bob.alias, "ch_bob_neutral");
    assert_eq!((bob.width, bob.height), (Some(8), Some(4)));
    assert!(result.warnings.iter().any(|w| matches!(
        w,
        ExportWarning::PortraitFallback { requested, substituted, .. }
            if requested == "angry" && substituted == "neutral"
    )));
}

#[test]
fn test_routes_come_only_from_placed_scenes() {
    let dir = tempdir().expect("Failed to create temp dir");
    let fixture = two_pov_project(&dir.path().join("project"));
    let store = DirectoryStore::new(&fixture.root);
    let out = dir.path().join("out");

    let result = export(
        &store,
        &options(&fixture, &out).with_timeline("main"),
        &Oracles::default(),
    )
    .expect("export failed");

    assert_eq!(result.routes.len(), 2);
    assert!(result.routes.iter().all(|r| r.pov_id != "carol"));
    assert!(!result.labels.contains_key("orphan"));

    let labels: Value = serde_json::from_str(&read(&result.label_manifest_path)).unwrap();
    let meet = &labels[0];
    assert_eq!(meet["scene_id"], "meet");
    assert_eq!(meet["pov_ids"], json!(["alice", "bob"]));
    assert_eq!(labels[2]["pov_names"], json!(["Bob"]));
}

#[test]
fn test_fork_gating() {
    let dir = tempdir().expect("Failed to create temp dir");
    let fixture = two_pov_project(&dir.path().join("project"));
    let store = DirectoryStore::new(&fixture.root);

    let cases = [
        (RouteMode::Disabled, false, false),
        (RouteMode::Master, true, false),
        (RouteMode::Forks, false, true),
        (RouteMode::Both, true, true),
        (RouteMode::Auto, true, true),
    ];
    for (mode, menu, forks) in cases {
        let out = dir.path().join(format!("out-{mode}"));
        let opts = options(&fixture, &out).with_timeline("main").with_route_mode(mode);
        let result = export(&store, &opts, &Oracles::default()).expect("export failed");
        assert_eq!(result.menu_enabled, menu, "menu for {mode}");
        assert_eq!(!result.forks.is_empty(), forks, "forks for {mode}");
        assert_eq!(out.join("forks").exists(), forks, "forks dir for {mode}");
    }

    // A single route never forks, whatever the mode
    fixture.timeline("solo", json!([{"scene_id": "forest", "pov": "alice"}]));
    let out = dir.path().join("out-solo");
    let opts = options(&fixture, &out).with_timeline("solo").with_route_mode(RouteMode::Both);
    let result = export(&store, &opts, &Oracles::default()).expect("export failed");
    assert_eq!(result.routes.len(), 1);
    assert!(result.forks.is_empty());
    assert!(!result.menu_enabled);
}

#[test]
fn test_dry_run_writes_nothing_and_reports_changes() {
    let dir = tempdir().expect("Failed to create temp dir");
    let fixture = two_pov_project(&dir.path().join("project"));
    let store = DirectoryStore::new(&fixture.root);
    let out = dir.path().join("out");

    // Dry run into a fresh directory: everything is new, nothing is created
    let dry = options(&fixture, &out).with_timeline("main").with_dry_run(true);
    let result = export(&store, &dry, &Oracles::default()).expect("dry run failed");
    assert!(!out.exists());
    assert!(!result.diffs.is_empty());
    assert!(result.diffs.iter().all(|d| d.status == DiffStatus::New));
    assert!(result.advisories.is_empty());

    export(&store, &options(&fixture, &out).with_timeline("main"), &Oracles::default())
        .expect("export failed");
    let before = snapshot(&out);

    fixture.scene(
        "castle",
        json!({"background": "castle", "dialogue": [{"type": "line", "speaker": "Bob", "text": "Welcome!"}]}),
    );
    let result = export(&store, &dry, &Oracles::default()).expect("dry run failed");
    assert_eq!(snapshot(&out), before);

    let script = result
        .diffs
        .iter()
        .find(|d| d.path == "game/script.rpy")
        .expect("script diff");
    assert_eq!(script.status, DiffStatus::Modified);
    let detail = serde_json::to_value(&script.detail).unwrap();
    assert!(detail["text"].as_str().unwrap().contains("+    \"Bob\" \"Welcome!\""));
}

#[test]
fn test_rerun_is_idempotent() {
    let dir = tempdir().expect("Failed to create temp dir");
    let fixture = two_pov_project(&dir.path().join("project"));
    let store = DirectoryStore::new(&fixture.root);
    let out = dir.path().join("out");

    let opts = options(&fixture, &out).with_timeline("main").with_force(true);
    export(&store, &opts, &Oracles::default()).expect("first export failed");
    let first = snapshot(&out);
    export(&store, &opts, &Oracles::default()).expect("second export failed");
    assert_eq!(snapshot(&out), first, "re-run keeps generated_at and bytes");

    let result = export(&store, &opts.clone().with_dry_run(true), &Oracles::default())
        .expect("dry run failed");
    assert!(!result.diffs.is_empty());
    assert!(result.diffs.iter().all(|d| d.is_unchanged()));
    assert_eq!(result.changes().count(), 0);
}

#[test]
fn test_unresolved_jump_becomes_pass_with_warning() {
    let dir = tempdir().expect("Failed to create temp dir");
    let fixture = ProjectFixture::new(&dir.path().join("project"));
    fixture.project("tale", &["intro"]).scene(
        "intro",
        json!({"nodes": [
            {"type": "jump", "content": {"target": "nowhere"}},
            {"type": "minigame"}
        ]}),
    );

    let store = DirectoryStore::new(&fixture.root);
    let out = dir.path().join("out");
    let result = export(&store, &options(&fixture, &out), &Oracles::default()).expect("export failed");

    let script = read(&result.script_path);
    assert!(script.contains("    # unresolved jump: nowhere\n    pass\n"));
    assert!(script.contains("    # unsupported node: minigame\n"));
    assert_eq!(
        result.warnings,
        vec![
            ExportWarning::UnresolvedJump {
                scene_id: "intro".into(),
                target: "nowhere".into(),
            },
            ExportWarning::UnsupportedNode {
                scene_id: "intro".into(),
                node_type: "minigame".into(),
            },
        ]
    );
}

#[test]
fn test_forced_reexport_drops_stale_forks() {
    let dir = tempdir().expect("Failed to create temp dir");
    let fixture = two_pov_project(&dir.path().join("project"));
    let store = DirectoryStore::new(&fixture.root);
    let out = dir.path().join("out");

    let both = options(&fixture, &out).with_timeline("main").with_route_mode(RouteMode::Both);
    export(&store, &both, &Oracles::default()).expect("export failed");
    assert!(out.join("forks/alice/game/script.rpy").is_file());

    let disabled = options(&fixture, &out)
        .with_timeline("main")
        .with_route_mode(RouteMode::Disabled)
        .with_force(true);
    let preview = export(&store, &disabled.clone().with_dry_run(true), &Oracles::default())
        .expect("dry run failed");
    assert!(preview
        .diffs
        .iter()
        .any(|d| d.status == DiffStatus::Removed && d.path == "forks/alice/game/script.rpy"));
    assert!(out.join("forks/alice").is_dir());

    let result = export(&store, &disabled, &Oracles::default()).expect("re-export failed");
    assert!(result.forks.is_empty());
    assert!(!out.join("forks").exists());
    let manifest: Value = serde_json::from_str(&read(&result.manifest_path)).unwrap();
    assert_eq!(manifest["pov"]["forks"], json!([]));
}

#[test]
fn test_disabling_scene_modules_removes_old_modules() {
    let dir = tempdir().expect("Failed to create temp dir");
    let fixture = two_pov_project(&dir.path().join("project"));
    let store = DirectoryStore::new(&fixture.root);
    let out = dir.path().join("out");

    let modular = options(&fixture, &out)
        .with_timeline("main")
        .with_route_mode(RouteMode::Disabled)
        .with_per_scene_modules(true);
    let first = export(&store, &modular, &Oracles::default()).expect("export failed");
    assert!(!first.module_paths.is_empty());
    assert!(first.module_paths.iter().all(|p| p.is_file()));

    let single = options(&fixture, &out)
        .with_timeline("main")
        .with_route_mode(RouteMode::Disabled)
        .with_force(true);
    let preview = export(&store, &single.clone().with_dry_run(true), &Oracles::default())
        .expect("dry run failed");
    let removed: BTreeSet<&str> = preview
        .diffs
        .iter()
        .filter(|d| d.status == DiffStatus::Removed)
        .map(|d| d.path.as_str())
        .collect();
    assert!(removed.contains("game/scenes/meet.rpy"), "{removed:?}");
    assert!(first.module_paths.iter().all(|p| p.is_file()));

    let result = export(&store, &single, &Oracles::default()).expect("re-export failed");
    assert!(result.module_paths.is_empty());
    assert!(!out.join("game/scenes").exists());
    let script = read(&result.script_path);
    assert_eq!(script.matches("label meet:").count(), 1);
}

/// Rates by whatever mode it is asked in.
struct ModeRating;

impl RatingOracle for ModeRating {
    fn evaluate(&self, request: &RatingRequest<'_>) -> RatingDecision {
        RatingDecision {
            allowed: true,
            rating: request.mode.to_string(),
            ack_status: "not_required".into(),
        }
    }
}

#[test]
fn test_dry_run_rates_like_the_export() {
    let dir = tempdir().expect("Failed to create temp dir");
    let fixture = two_pov_project(&dir.path().join("project"));
    let store = DirectoryStore::new(&fixture.root);
    let out = dir.path().join("out");
    let oracles = Oracles {
        rating: &ModeRating,
        ..Oracles::default()
    };

    let opts = options(&fixture, &out).with_timeline("main");
    let result = export(&store, &opts, &oracles).expect("export failed");
    let preview = export(&store, &opts.clone().with_dry_run(true), &oracles).expect("dry run failed");

    assert_eq!(preview.rating, result.rating);
    assert_eq!(preview.changes().count(), 0);
}

#[test]
fn test_unresolved_file_name_renders_as_one_tag() {
    let dir = tempdir().expect("Failed to create temp dir");
    let fixture = ProjectFixture::new(&dir.path().join("project"));
    fixture.project("tale", &["intro"]).scene(
        "intro",
        json!({"background": "dark forest.png\nreturn", "dialogue": ["Dark."]}),
    );

    let out = dir.path().join("out");
    let store = DirectoryStore::new(&fixture.root);
    let result = export(&store, &options(&fixture, &out), &Oracles::default()).expect("export failed");

    let script = read(&result.script_path);
    assert!(script.contains("    scene dark_forest_png_return\n"), "{script}");
    assert!(!script.contains("dark forest"));
}
