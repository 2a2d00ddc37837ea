//! Autocouple Headless Scenario Harness
//!
//! Validates linking behaviour against a synthetic scene, with no host
//! simulation and no rendering. Runs entirely in-process.
//!
//! Usage:
//!   cargo run -p autocouple-simtest
//!   cargo run -p autocouple-simtest -- --verbose
//!   cargo run -p autocouple-simtest -- --settings coupling.json

use autocouple_core::events::LinkEventKind;
use autocouple_core::persistence::{self, SavedLinks};
use autocouple_core::prelude::*;
use autocouple_core::systems::{are_tree_adjacent, same_group};
use autocouple_logic::pairing::{self, PairingThresholds, PointPose};
use autocouple_logic::settings::{DEFAULT_CONNECT_ANGLE, DEFAULT_CONNECT_RADIUS};
use hecs::Entity;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::collections::BTreeSet;

// ── Sweep plan ──────────────────────────────────────────────────────────

/// Random sweep parameters; overridable through `--plan <json>`.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct SweepPlan {
    seeds: Vec<u64>,
    children: usize,
    /// Half-width of the cube the tips scatter in
    spread: f32,
}

impl Default for SweepPlan {
    fn default() -> Self {
        Self {
            seeds: vec![1, 2, 3, 5, 8, 13, 21, 34],
            children: 24,
            spread: 0.15,
        }
    }
}

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

fn arg_value(name: &str) -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1).cloned())
}

fn main() {
    let verbose = std::env::args().any(|a| a == "--verbose");
    println!("=== Autocouple Scenario Harness ===\n");

    let settings = match arg_value("--settings") {
        Some(path) => CouplingSettings::from_path(&path),
        None => CouplingSettings::default(),
    };
    let plan = match arg_value("--plan") {
        Some(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
            println!("  (bad --plan: {}; using defaults)", e);
            SweepPlan::default()
        }),
        None => SweepPlan::default(),
    };
    if verbose {
        println!("Settings: {}", settings.to_json());
    }

    let mut results = Vec::new();

    // 1. Settings parsing
    results.extend(validate_settings(verbose));

    // 2. Pairing geometry
    results.extend(validate_pairing_geometry(&settings, verbose));

    // 3. Reconciliation on a live scene
    results.extend(validate_reconciliation(&settings, verbose));

    // 4. Splits, separation devices and re-coupling
    results.extend(validate_structure_changes(&settings, verbose));

    // 5. Docking ports
    results.extend(validate_docking(&settings, verbose));

    // 6. Persistence
    results.extend(validate_persistence(&settings, verbose));

    // 7. Random scene sweeps
    results.extend(validate_random_sweeps(&settings, &plan, verbose));

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!("\n=== RESULT: {}/{} passed, {} failed ===", passed, total, failed);

    if failed > 0 {
        std::process::exit(1);
    }
}

// ── Scene fixtures ──────────────────────────────────────────────────────

fn arm(scene: &mut Scene, name: &str, x: f32, toward: f32, gap: f32, docking: bool) -> Entity {
    let mut spec = SegmentSpec::new(name)
        .at(x, 0.0, 0.0)
        .stack("top", Vec3::new(0.0, 0.5, 0.0), Vec3::Y)
        .stack("tip", Vec3::new(toward * (0.5 - gap / 2.0), 0.0, 0.0), Vec3::new(toward, 0.0, 0.0));
    if docking {
        spec = spec.docking(1);
    }
    scene.spawn_segment(spec)
}

/// Hub, optional in-line segment on the left, and two arms `gap` apart.
struct Rig {
    scene: Scene,
    hub: Entity,
    inline: Option<Entity>,
    left: Entity,
    right: Entity,
}

impl Rig {
    fn build(gap: f32, inline: Option<SegmentSpec>, docking: bool) -> Self {
        let mut scene = Scene::new();
        let hub = scene.spawn_segment(
            SegmentSpec::new("hub")
                .at(0.0, 1.0, 0.0)
                .stack("left", Vec3::new(-0.5, -0.5, 0.0), -Vec3::Y)
                .stack("right", Vec3::new(0.5, -0.5, 0.0), -Vec3::Y),
        );
        let left = arm(&mut scene, "left", -0.5, 1.0, gap, docking);
        let right = arm(&mut scene, "right", 0.5, -1.0, gap, docking);

        let inline = inline.map(|spec| {
            let mid = scene.spawn_segment(spec);
            let _ = scene.attach(PointRef::new(mid, 0), PointRef::new(hub, 0));
            let _ = scene.attach(PointRef::new(left, 0), PointRef::new(mid, 1));
            mid
        });
        if inline.is_none() {
            let _ = scene.attach(PointRef::new(left, 0), PointRef::new(hub, 0));
        }
        let _ = scene.attach(PointRef::new(right, 0), PointRef::new(hub, 1));

        Self {
            scene,
            hub,
            inline,
            left,
            right,
        }
    }

    fn assembly(&self) -> Option<AssemblyId> {
        self.scene.assembly(self.hub)
    }
}

fn inline_spec(name: &str) -> SegmentSpec {
    SegmentSpec::new(name)
        .at(-0.5, 0.75, 0.0)
        .stack("top", Vec3::new(0.0, 0.25, 0.0), Vec3::Y)
        .stack("bottom", Vec3::new(0.0, -0.25, 0.0), -Vec3::Y)
}

fn created(rig: &mut Rig, engine: &mut CouplingEngine) -> usize {
    match rig.assembly() {
        Some(assembly) => engine.on_assembly_created(&mut rig.scene, assembly).formed,
        None => 0,
    }
}

// ── 1. Settings ─────────────────────────────────────────────────────────

fn validate_settings(verbose: bool) -> Vec<TestResult> {
    println!("--- Settings ---");
    let mut results = Vec::new();

    let defaults = CouplingSettings::default();
    results.push(TestResult {
        name: "settings_defaults".into(),
        passed: defaults.connect_radius == DEFAULT_CONNECT_RADIUS
            && defaults.connect_angle == DEFAULT_CONNECT_ANGLE
            && !defaults.allow_robotic_joints
            && !defaults.allow_cable_joints,
        detail: format!("radius={} angle={}", defaults.connect_radius, defaults.connect_angle),
    });

    let partial = CouplingSettings::from_json_str(r#"{"connectRadius": -3, "connectAngle": 45, "bogus": 1}"#);
    results.push(TestResult {
        name: "settings_per_key_fallback".into(),
        passed: partial.connect_radius == DEFAULT_CONNECT_RADIUS && partial.connect_angle == 45.0,
        detail: format!("radius={} angle={}", partial.connect_radius, partial.connect_angle),
    });

    let garbage = CouplingSettings::from_json_str("not json at all");
    results.push(TestResult {
        name: "settings_garbage_is_default".into(),
        passed: garbage == defaults,
        detail: "unparseable document falls back to defaults".into(),
    });

    let round = CouplingSettings::from_json_str(&partial.to_json());
    results.push(TestResult {
        name: "settings_round_trip".into(),
        passed: round == partial,
        detail: "to_json then from_json_str".into(),
    });

    if verbose {
        println!("  {}", partial.to_json().replace('\n', " "));
    }
    results
}

// ── 2. Pairing Geometry ─────────────────────────────────────────────────

fn validate_pairing_geometry(settings: &CouplingSettings, verbose: bool) -> Vec<TestResult> {
    println!("--- Pairing Geometry ---");
    let mut results = Vec::new();
    let thresholds = settings.thresholds();

    let origin = PointPose::new(Vec3::ZERO, Vec3::X);
    let at = |d: f32| PointPose::new(Vec3::new(d, 0.0, 0.0), -Vec3::X);

    let inside = pairing::eligible_distance(&origin, &at(thresholds.max_distance * 0.5), &thresholds);
    let outside = pairing::eligible_distance(&origin, &at(thresholds.max_distance * 2.0), &thresholds);
    results.push(TestResult {
        name: "geometry_radius_boundary".into(),
        passed: inside.is_some() && outside.is_none(),
        detail: format!("inside={:?} outside={:?}", inside, outside),
    });

    // Sweep the facing angle: anything within the limit of opposed pairs
    let mut wrong = Vec::new();
    for degrees in (0..=180).step_by(15) {
        let normal = Quat::from_axis_angle(Vec3::Z, degrees as f32).rotate(-Vec3::X);
        let other = PointPose::new(Vec3::new(0.01, 0.0, 0.0), normal);
        let expected = (degrees as f32) <= thresholds.max_angle_deviation;
        let got = pairing::eligible_distance(&origin, &other, &thresholds).is_some();
        if expected != got && (degrees as f32 - thresholds.max_angle_deviation).abs() > 0.5 {
            wrong.push(degrees);
        }
    }
    results.push(TestResult {
        name: "geometry_angle_sweep".into(),
        passed: wrong.is_empty(),
        detail: if wrong.is_empty() {
            "0°..180° in 15° steps agree with the limit".into()
        } else {
            format!("disagreement at {:?}°", wrong)
        },
    });

    let tight = PairingThresholds {
        max_distance: 1.0,
        max_angle_deviation: 10.0,
    };
    let closest = pairing::find_pairing(&origin, &[at(0.5), at(0.2), at(0.2)], &tight, |_| true);
    results.push(TestResult {
        name: "geometry_closest_first_wins".into(),
        passed: closest == Some(1),
        detail: format!("picked {:?}", closest),
    });

    if verbose {
        println!("  thresholds: {:?}", thresholds);
    }
    results
}

// ── 3. Reconciliation ───────────────────────────────────────────────────

fn validate_reconciliation(settings: &CouplingSettings, verbose: bool) -> Vec<TestResult> {
    println!("--- Reconciliation ---");
    let mut results = Vec::new();

    let gap = settings.connect_radius * 0.5;
    let mut rig = Rig::build(gap, None, false);
    let mut engine = CouplingEngine::new(settings.clone());
    let formed = created(&mut rig, &mut engine);
    let tip_l = PointRef::new(rig.left, 1);
    let tip_r = PointRef::new(rig.right, 1);
    results.push(TestResult {
        name: "reconcile_close_tips_link".into(),
        passed: formed == 1
            && rig.scene.occupant(tip_l) == Some(rig.right)
            && rig.scene.occupant(tip_r) == Some(rig.left),
        detail: format!("{} link(s), tips occupied mutually", formed),
    });
    results.push(TestResult {
        name: "reconcile_shares_resources".into(),
        passed: same_group(&rig.scene.world, rig.left, rig.right),
        detail: "linked arms in one resource group".into(),
    });

    let again = rig
        .assembly()
        .map(|a| engine.on_structure_changed(&mut rig.scene, a))
        .unwrap_or_default();
    engine.step(&mut rig.scene);
    results.push(TestResult {
        name: "reconcile_idempotent".into(),
        passed: !again.changed() && engine.trackers().len() == 1,
        detail: format!("second pass {:?}", again),
    });

    let mut far = Rig::build(settings.connect_radius * 2.0, None, false);
    let mut far_engine = CouplingEngine::new(settings.clone());
    let formed = created(&mut far, &mut far_engine);
    results.push(TestResult {
        name: "reconcile_far_tips_free".into(),
        passed: formed == 0,
        detail: format!("{} link(s) at twice the radius", formed),
    });

    let servo = inline_spec("servo").capability(Capability::RoboticJoint);
    let mut robotic = Rig::build(gap, Some(servo), false);
    let mut robotic_engine = CouplingEngine::new(settings.clone());
    let formed = created(&mut robotic, &mut robotic_engine);
    let expected = usize::from(settings.allow_robotic_joints);
    results.push(TestResult {
        name: "reconcile_robotic_path".into(),
        passed: formed == expected,
        detail: format!(
            "{} link(s) across a servo (allowRoboticJoints={})",
            formed, settings.allow_robotic_joints
        ),
    });

    let winch = inline_spec("winch").capability(Capability::CableJoint);
    let mut cable = Rig::build(gap, Some(winch), false);
    let mut cable_engine = CouplingEngine::new(settings.clone());
    let formed = created(&mut cable, &mut cable_engine);
    let expected = usize::from(settings.allow_cable_joints);
    results.push(TestResult {
        name: "reconcile_cable_path".into(),
        passed: formed == expected,
        detail: format!(
            "{} link(s) across a winch (allowCableJoints={})",
            formed, settings.allow_cable_joints
        ),
    });

    let removed = engine.remove_links(&mut rig.scene, rig.left);
    engine.reset_links(&mut rig.scene);
    results.push(TestResult {
        name: "reconcile_ignore_list".into(),
        passed: removed == 1 && engine.trackers().is_empty(),
        detail: format!("removed {}, {} after reset", removed, engine.trackers().len()),
    });

    if verbose {
        for event in engine.drain_events() {
            println!("  {:?}", event);
        }
    }
    results
}

// ── 4. Structure Changes ────────────────────────────────────────────────

fn validate_structure_changes(settings: &CouplingSettings, verbose: bool) -> Vec<TestResult> {
    println!("--- Structure Changes ---");
    let mut results = Vec::new();
    let gap = settings.connect_radius * 0.5;

    // Separation device on the linked point
    let mut rig = Rig::build(gap, None, false);
    let _ = rig
        .scene
        .world
        .insert_one(rig.left, SeparationDevices::new(vec![SeparationDevice::at_point(1)]));
    let mut engine = CouplingEngine::new(settings.clone());
    created(&mut rig, &mut engine);
    let _ = rig.scene.fire_separation_device(rig.left, 1);
    let destroyed = engine.on_separation_fired(&mut rig.scene, rig.left);
    engine.step(&mut rig.scene);
    let tip_free = rig.scene.occupant(PointRef::new(rig.left, 1)).is_none()
        && rig.scene.occupant(PointRef::new(rig.right, 1)).is_none();
    results.push(TestResult {
        name: "separation_destroys_link".into(),
        passed: destroyed == 1 && tip_free && engine.trackers().is_empty(),
        detail: format!("{} destroyed, tips free={}", destroyed, tip_free),
    });

    // Separation device on the endpoint's official edge: the link holds
    let mut rig = Rig::build(gap, None, false);
    let _ = rig
        .scene
        .world
        .insert_one(rig.left, SeparationDevices::new(vec![SeparationDevice::at_point(0)]));
    let mut engine = CouplingEngine::new(settings.clone());
    created(&mut rig, &mut engine);
    let original = rig.assembly();
    let split = rig.scene.fire_separation_device(rig.left, 0).unwrap_or_default();
    let destroyed = engine.on_separation_fired(&mut rig.scene, rig.left);
    if let (Some(original), Some(&new)) = (original, split.first()) {
        engine.on_assembly_split(&mut rig.scene, original, new);
    }
    engine.step(&mut rig.scene);
    let official = are_tree_adjacent(&rig.scene.world, rig.left, rig.right);
    results.push(TestResult {
        name: "edge_separation_keeps_link".into(),
        passed: destroyed == 0 && official && engine.trackers().is_empty(),
        detail: format!("{} destroyed, official={}", destroyed, official),
    });

    // Device on the linked point fires while the host also splits the
    // endpoint off its parent: the parent edge is restored
    let mut rig = Rig::build(gap, None, false);
    let _ = rig
        .scene
        .world
        .insert_one(rig.left, SeparationDevices::new(vec![SeparationDevice::at_point(1)]));
    let mut engine = CouplingEngine::new(settings.clone());
    created(&mut rig, &mut engine);
    let original = rig.assembly();
    let _ = rig.scene.fire_separation_device(rig.left, 1);
    let split = rig.scene.detach(rig.left).ok();
    engine.on_separation_fired(&mut rig.scene, rig.left);
    if let (Some(original), Some(new)) = (original, split) {
        engine.on_assembly_split(&mut rig.scene, original, new);
    }
    engine.step(&mut rig.scene);
    let reattached = rig.scene.parent(rig.left) == Some(rig.hub);
    results.push(TestResult {
        name: "separation_recouples_parent".into(),
        passed: reattached && rig.scene.assembly(rig.left) == original,
        detail: format!("left parent={:?}", rig.scene.parent(rig.left)),
    });

    // In-line decoupler between hub and an endpoint: the link re-couples
    let decoupler = inline_spec("decoupler").device(SeparationDevice::at_point(0));
    let mut rig = Rig::build(gap, Some(decoupler), false);
    let mut engine = CouplingEngine::new(settings.clone());
    created(&mut rig, &mut engine);
    let original = rig.assembly();
    let Some(mid) = rig.inline else {
        return results;
    };
    let split = rig.scene.fire_separation_device(mid, 0).unwrap_or_default();
    engine.on_separation_fired(&mut rig.scene, mid);
    if let (Some(original), Some(&new)) = (original, split.first()) {
        engine.on_assembly_split(&mut rig.scene, original, new);
    }
    engine.step(&mut rig.scene);
    let together = rig.scene.assembly(rig.left) == rig.scene.assembly(rig.right);
    let official = are_tree_adjacent(&rig.scene.world, rig.left, rig.right);
    results.push(TestResult {
        name: "split_across_link_recouples".into(),
        passed: together && official && engine.trackers().is_empty(),
        detail: format!("together={} official={}", together, official),
    });

    // Split that carries both ends off
    let mut scene = Scene::new();
    let base = scene.spawn_segment(
        SegmentSpec::new("base")
            .at(0.0, 2.0, 0.0)
            .stack("bottom", Vec3::new(0.0, -0.5, 0.0), -Vec3::Y),
    );
    let carrier = scene.spawn_segment(
        SegmentSpec::new("carrier")
            .at(0.0, 1.0, 0.0)
            .stack("top", Vec3::new(0.0, 0.5, 0.0), Vec3::Y)
            .stack("left", Vec3::new(-0.5, -0.5, 0.0), -Vec3::Y)
            .stack("right", Vec3::new(0.5, -0.5, 0.0), -Vec3::Y),
    );
    let left = arm(&mut scene, "left", -0.5, 1.0, gap, false);
    let right = arm(&mut scene, "right", 0.5, -1.0, gap, false);
    let built = scene.attach(PointRef::new(carrier, 0), PointRef::new(base, 0)).is_ok()
        && scene.attach(PointRef::new(left, 0), PointRef::new(carrier, 1)).is_ok()
        && scene.attach(PointRef::new(right, 0), PointRef::new(carrier, 2)).is_ok();

    let mut engine = CouplingEngine::new(settings.clone());
    let mut migrated = false;
    if let (true, Some(original)) = (built, scene.assembly(base)) {
        engine.on_assembly_created(&mut scene, original);
        if let Ok(new) = scene.detach(carrier) {
            engine.on_assembly_split(&mut scene, original, new);
            engine.step(&mut scene);
            migrated = engine.manager(new).is_some_and(|m| m.len() == 1)
                && engine.manager(original).is_some_and(|m| m.is_empty())
                && engine.trackers().len() == 1;
        }
    }
    results.push(TestResult {
        name: "split_hands_link_over".into(),
        passed: migrated,
        detail: "both ends left together; one tracker, in the new manager".into(),
    });

    if verbose {
        println!("  {} assemblies live", scene.assemblies().len());
    }
    results
}

// ── 5. Docking ──────────────────────────────────────────────────────────

fn validate_docking(settings: &CouplingSettings, verbose: bool) -> Vec<TestResult> {
    println!("--- Docking ---");
    let mut results = Vec::new();
    let gap = settings.connect_radius * 0.5;

    let mut rig = Rig::build(gap, None, true);
    let mut engine = CouplingEngine::new(settings.clone());
    created(&mut rig, &mut engine);
    let tracking = engine
        .trackers()
        .iter()
        .any(|t| t.state() == TrackerState::TrackingDocking);
    let untouched = rig.scene.occupant(PointRef::new(rig.left, 1)).is_none();
    results.push(TestResult {
        name: "docking_ports_tracked_only".into(),
        passed: tracking && untouched && engine.hidden_pairs().is_empty(),
        detail: format!("tracking={} occupancy untouched={}", tracking, untouched),
    });

    let visitor = rig.scene.spawn_segment(
        SegmentSpec::new("visitor")
            .at(5.0, 0.0, 0.0)
            .stack("port", Vec3::ZERO, Vec3::X)
            .docking(0),
    );
    let docked = rig.scene.dock(rig.left, visitor).is_ok();
    if let Some(assembly) = rig.assembly() {
        engine.on_structure_changed(&mut rig.scene, assembly);
    }
    results.push(TestResult {
        name: "docking_elsewhere_drops_tracker".into(),
        passed: docked && engine.trackers().is_empty(),
        detail: format!("{} tracker(s) after docking a third port", engine.trackers().len()),
    });

    if verbose {
        println!("  visitor {:?}", visitor);
    }
    results
}

// ── 6. Persistence ──────────────────────────────────────────────────────

fn validate_persistence(settings: &CouplingSettings, verbose: bool) -> Vec<TestResult> {
    println!("--- Persistence ---");
    let mut results = Vec::new();

    let mut rig = Rig::build(settings.connect_radius * 0.5, None, false);
    let mut engine = CouplingEngine::new(settings.clone());
    created(&mut rig, &mut engine);
    let Some(assembly) = rig.assembly() else {
        return results;
    };
    let saved = engine.capture_links(&rig.scene, assembly);

    let mut buffer = Vec::new();
    let loaded = persistence::save_links(&mut buffer, &saved)
        .and_then(|_| persistence::load_links(buffer.as_slice()));
    results.push(TestResult {
        name: "persistence_bincode".into(),
        passed: loaded.as_ref().is_ok_and(|l| *l == saved),
        detail: format!("{} byte(s), {} pair(s)", buffer.len(), saved.pairs.len()),
    });

    let json = persistence::to_json(&saved).and_then(|text| persistence::from_json(&text));
    results.push(TestResult {
        name: "persistence_json".into(),
        passed: json.as_ref().is_ok_and(|l| *l == saved),
        detail: "JSON view matches".into(),
    });

    engine.on_assembly_destroyed(&mut rig.scene, assembly);
    let mut fresh = CouplingEngine::new(settings.clone());
    let restored = fresh.restore_links(&mut rig.scene, assembly, &loaded.unwrap_or_default());
    results.push(TestResult {
        name: "persistence_restore".into(),
        passed: restored == saved.pairs.len() && fresh.hidden_pairs().len() == restored,
        detail: format!("{} of {} link(s) restored", restored, saved.pairs.len()),
    });

    let shifted = saved
        .pairs
        .iter()
        .map(|p| {
            let mut p = *p;
            p.b.segment += 100;
            p
        })
        .collect();
    let stale = SavedLinks {
        pairs: shifted,
        ..SavedLinks::default()
    };
    results.push(TestResult {
        name: "persistence_stale_indices_dropped".into(),
        passed: stale.resolve(&rig.scene, assembly).is_empty(),
        detail: "out-of-range segment indices resolve to nothing".into(),
    });

    if verbose {
        if let Ok(text) = persistence::to_json(&saved) {
            println!("  {}", text.replace('\n', " "));
        }
    }
    results
}

// ── 7. Random Sweeps ────────────────────────────────────────────────────

/// Root with `children` segments whose tips scatter in a cube.
fn scatter(seed: u64, plan: &SweepPlan) -> (Scene, Option<AssemblyId>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut scene = Scene::new();
    let mut spec = SegmentSpec::new("root").at(0.0, 10.0, 0.0);
    for i in 0..plan.children {
        spec = spec.stack(&format!("mount{}", i), Vec3::new(i as f32, -1.0, 0.0), -Vec3::Y);
    }
    let root = scene.spawn_segment(spec);

    let axes = [Vec3::X, -Vec3::X, Vec3::Y, -Vec3::Y, Vec3::Z, -Vec3::Z];
    for i in 0..plan.children {
        let s = plan.spread;
        let tip = Vec3::new(rng.gen_range(-s..s), rng.gen_range(-s..s), rng.gen_range(-s..s));
        let normal = axes[rng.gen_range(0..axes.len())];
        let mut child = SegmentSpec::new(format!("child{}", i))
            .stack("top", Vec3::new(i as f32, 9.0, 0.0), Vec3::Y)
            .stack("tip", tip, normal);
        if rng.gen_bool(0.1) {
            child = child.capability(Capability::RoboticJoint);
        }
        let child = scene.spawn_segment(child);
        let _ = scene.attach(PointRef::new(child, 0), PointRef::new(root, i));
    }
    let assembly = scene.assembly(root);
    (scene, assembly)
}

fn link_fingerprint(engine: &CouplingEngine) -> Vec<(u32, usize, u32, usize)> {
    engine
        .hidden_pairs()
        .into_iter()
        .map(|(a, b)| (a.segment.id(), a.index, b.segment.id(), b.index))
        .collect()
}

fn validate_random_sweeps(settings: &CouplingSettings, plan: &SweepPlan, verbose: bool) -> Vec<TestResult> {
    println!("--- Random Sweeps ---");
    let mut results = Vec::new();
    let mut total_links = 0;
    let mut violations = Vec::new();

    for &seed in &plan.seeds {
        let (mut scene, Some(assembly)) = scatter(seed, plan) else {
            violations.push(format!("seed {}: no assembly", seed));
            continue;
        };
        let mut engine = CouplingEngine::new(settings.clone());
        engine.on_assembly_created(&mut scene, assembly);
        let first = link_fingerprint(&engine);
        total_links += first.len();

        // Each point in at most one link
        let mut used = BTreeSet::new();
        for &(sa, ia, sb, ib) in &first {
            if !used.insert((sa, ia)) || !used.insert((sb, ib)) {
                violations.push(format!("seed {}: point reused", seed));
            }
        }

        // Mutual occupancy, never between parent and child, one link per pair
        let mut pairs = BTreeSet::new();
        for (a, b) in engine.hidden_pairs() {
            if scene.occupant(a) != Some(b.segment) || scene.occupant(b) != Some(a.segment) {
                violations.push(format!("seed {}: occupancy not mutual", seed));
            }
            if are_tree_adjacent(&scene.world, a.segment, b.segment) {
                violations.push(format!("seed {}: link duplicates official edge", seed));
            }
            if !pairs.insert(SegmentPair::new(a.segment, b.segment)) {
                violations.push(format!("seed {}: segment pair linked twice", seed));
            }
            if !same_group(&scene.world, a.segment, b.segment) {
                violations.push(format!("seed {}: link without shared resources", seed));
            }
        }

        // Idempotent and deterministic
        let again = engine.on_structure_changed(&mut scene, assembly);
        engine.step(&mut scene);
        if again.changed() || link_fingerprint(&engine) != first {
            violations.push(format!("seed {}: second pass changed links", seed));
        }
        let (mut twin, twin_assembly) = scatter(seed, plan);
        let mut twin_engine = CouplingEngine::new(settings.clone());
        if let Some(a) = twin_assembly {
            twin_engine.on_assembly_created(&mut twin, a);
        }
        if link_fingerprint(&twin_engine) != first {
            violations.push(format!("seed {}: rerun differs", seed));
        }

        let events = engine.drain_events();
        let formed = events.iter().filter(|e| e.kind == LinkEventKind::Formed).count();
        if formed != first.len() {
            violations.push(format!("seed {}: {} formed events for {} links", seed, formed, first.len()));
        }

        if verbose {
            println!("  seed {:>3}: {} link(s)", seed, first.len());
        }
    }

    results.push(TestResult {
        name: "sweep_invariants".into(),
        passed: violations.is_empty(),
        detail: if violations.is_empty() {
            format!("{} seed(s), {} link(s) total", plan.seeds.len(), total_links)
        } else {
            violations.join("; ")
        },
    });
    results.push(TestResult {
        name: "sweep_finds_links".into(),
        passed: total_links > 0,
        detail: format!("{} link(s) across all seeds", total_links),
    });
    results
}
