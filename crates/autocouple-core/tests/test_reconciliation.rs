//! Integration tests for the coupling engine over a live scene.
//!
//! Exercises: Scene edits → CouplingEngine handlers → step loop
//! → trackers, occupancy, resource groups and persistence.

use autocouple_core::events::LinkEventKind;
use autocouple_core::persistence::{load_links, save_links};
use autocouple_core::prelude::*;
use autocouple_core::systems::same_group;
use hecs::Entity;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;

// ── Helpers ────────────────────────────────────────────────────────────

fn arm(scene: &mut Scene, name: &str, x: f32, tip_toward: f32, gap: f32) -> Entity {
    let tip = Vec3::new(tip_toward * (0.5 - gap / 2.0), 0.0, 0.0);
    scene.spawn_segment(
        SegmentSpec::new(name)
            .at(x, 0.0, 0.0)
            .stack("top", Vec3::new(0.0, 0.5, 0.0), Vec3::Y)
            .stack("tip", tip, Vec3::new(tip_toward, 0.0, 0.0)),
    )
}

fn hub(scene: &mut Scene) -> Entity {
    scene.spawn_segment(
        SegmentSpec::new("hub")
            .at(0.0, 1.0, 0.0)
            .stack("left", Vec3::new(-0.5, -0.5, 0.0), -Vec3::Y)
            .stack("right", Vec3::new(0.5, -0.5, 0.0), -Vec3::Y),
    )
}

/// Hub with two arms hanging off it; the arm tips face each other `gap` apart.
fn two_arms(scene: &mut Scene, gap: f32) -> (Entity, Entity, Entity) {
    let hub = hub(scene);
    let left = arm(scene, "left", -0.5, 1.0, gap);
    let right = arm(scene, "right", 0.5, -1.0, gap);
    scene.attach(PointRef::new(left, 0), PointRef::new(hub, 0)).unwrap();
    scene.attach(PointRef::new(right, 0), PointRef::new(hub, 1)).unwrap();
    (hub, left, right)
}

/// A two-port in-line segment between `parent`'s point and a child arm.
fn inline(scene: &mut Scene, name: &str, x: f32, extra: Option<Capability>, device: bool) -> Entity {
    let mut spec = SegmentSpec::new(name)
        .at(x, 0.75, 0.0)
        .stack("top", Vec3::new(0.0, 0.25, 0.0), Vec3::Y)
        .stack("bottom", Vec3::new(0.0, -0.25, 0.0), -Vec3::Y);
    if let Some(capability) = extra {
        spec = spec.capability(capability);
    }
    if device {
        spec = spec.device(SeparationDevice::at_point(0));
    }
    scene.spawn_segment(spec)
}

/// Hub, a left arm carrying a separation device on `device_point`, and a
/// right arm; the arm tips face each other.
fn arms_with_device(scene: &mut Scene, device_point: usize) -> (Entity, Entity, Entity) {
    let hub = hub(scene);
    let left = scene.spawn_segment(
        SegmentSpec::new("left")
            .at(-0.5, 0.0, 0.0)
            .stack("top", Vec3::new(0.0, 0.5, 0.0), Vec3::Y)
            .stack("tip", Vec3::new(0.475, 0.0, 0.0), Vec3::X)
            .device(SeparationDevice::at_point(device_point)),
    );
    let right = arm(scene, "right", 0.5, -1.0, 0.05);
    scene.attach(PointRef::new(left, 0), PointRef::new(hub, 0)).unwrap();
    scene.attach(PointRef::new(right, 0), PointRef::new(hub, 1)).unwrap();
    (hub, left, right)
}

fn tips(left: Entity, right: Entity) -> (PointRef, PointRef) {
    (PointRef::new(left, 1), PointRef::new(right, 1))
}

fn engine() -> CouplingEngine {
    CouplingEngine::new(CouplingSettings::default())
}

// ── Linking ────────────────────────────────────────────────────────────

#[test]
fn close_points_link_and_share_resources() {
    let mut scene = Scene::new();
    let (hub, left, right) = two_arms(&mut scene, 0.05);
    let assembly = scene.assembly(hub).unwrap();
    let mut engine = engine();

    let report = engine.on_assembly_created(&mut scene, assembly);
    assert_eq!(report.formed, 1);

    let (lt, rt) = tips(left, right);
    assert_eq!(scene.occupant(lt), Some(right));
    assert_eq!(scene.occupant(rt), Some(left));
    assert!(same_group(&scene.world, left, right));
    assert_eq!(engine.trackers()[0].state(), TrackerState::Constrained);

    let events = engine.drain_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, LinkEventKind::Formed);
    assert!(events[0].involves(left) && events[0].involves(right));
}

#[test]
fn distant_points_stay_free() {
    let mut scene = Scene::new();
    let (hub, left, right) = two_arms(&mut scene, 0.2);
    let assembly = scene.assembly(hub).unwrap();
    let mut engine = engine();

    let report = engine.on_assembly_created(&mut scene, assembly);
    assert_eq!(report.formed, 0);
    let (lt, rt) = tips(left, right);
    assert!(scene.occupant(lt).is_none());
    assert!(scene.occupant(rt).is_none());
    assert!(engine.hidden_pairs().is_empty());
}

#[test]
fn robotic_joint_on_path_blocks_link() {
    let build = |scene: &mut Scene| {
        let hub = hub(scene);
        let servo = inline(scene, "servo", -0.5, Some(Capability::RoboticJoint), false);
        let left = arm(scene, "left", -0.5, 1.0, 0.05);
        let right = arm(scene, "right", 0.5, -1.0, 0.05);
        scene.attach(PointRef::new(servo, 0), PointRef::new(hub, 0)).unwrap();
        scene.attach(PointRef::new(left, 0), PointRef::new(servo, 1)).unwrap();
        scene.attach(PointRef::new(right, 0), PointRef::new(hub, 1)).unwrap();
        hub
    };

    let mut scene = Scene::new();
    let hub = build(&mut scene);
    let mut strict = engine();
    let assembly = scene.assembly(hub).unwrap();
    let report = strict.on_assembly_created(&mut scene, assembly);
    assert_eq!(report.formed, 0);

    let mut scene = Scene::new();
    let hub = build(&mut scene);
    let mut lenient = CouplingEngine::new(CouplingSettings {
        allow_robotic_joints: true,
        ..CouplingSettings::default()
    });
    let assembly = scene.assembly(hub).unwrap();
    let report = lenient.on_assembly_created(&mut scene, assembly);
    assert_eq!(report.formed, 1);
}

#[test]
fn reconcile_is_idempotent() {
    let mut scene = Scene::new();
    let (hub, _, _) = two_arms(&mut scene, 0.05);
    let assembly = scene.assembly(hub).unwrap();
    let mut engine = engine();

    engine.on_assembly_created(&mut scene, assembly);
    let before = engine.hidden_pairs();
    let again = engine.on_structure_changed(&mut scene, assembly);
    assert!(!again.changed());
    engine.step(&mut scene);
    engine.step(&mut scene);
    assert_eq!(engine.hidden_pairs(), before);
}

// ── Structural changes ─────────────────────────────────────────────────

#[test]
fn split_hands_link_to_new_assembly() {
    let mut scene = Scene::new();
    let base = scene.spawn_segment(
        SegmentSpec::new("base")
            .at(0.0, 2.0, 0.0)
            .stack("bottom", Vec3::new(0.0, -0.5, 0.0), -Vec3::Y),
    );
    let mid = scene.spawn_segment(
        SegmentSpec::new("mid")
            .at(0.0, 1.0, 0.0)
            .stack("top", Vec3::new(0.0, 0.5, 0.0), Vec3::Y)
            .stack("left", Vec3::new(-0.5, -0.5, 0.0), -Vec3::Y)
            .stack("right", Vec3::new(0.5, -0.5, 0.0), -Vec3::Y),
    );
    let left = arm(&mut scene, "left", -0.5, 1.0, 0.05);
    let right = arm(&mut scene, "right", 0.5, -1.0, 0.05);
    scene.attach(PointRef::new(mid, 0), PointRef::new(base, 0)).unwrap();
    scene.attach(PointRef::new(left, 0), PointRef::new(mid, 1)).unwrap();
    scene.attach(PointRef::new(right, 0), PointRef::new(mid, 2)).unwrap();

    let original = scene.assembly(base).unwrap();
    let mut engine = engine();
    engine.on_assembly_created(&mut scene, original);
    assert_eq!(engine.manager(original).unwrap().len(), 1);

    let created = scene.detach(mid).unwrap();
    engine.on_assembly_split(&mut scene, original, created);
    engine.step(&mut scene);

    assert!(engine.manager(original).unwrap().is_empty());
    assert_eq!(engine.manager(created).unwrap().len(), 1);
    assert_eq!(engine.trackers().len(), 1);
    assert!(same_group(&scene.world, left, right));
    assert!(!same_group(&scene.world, base, left));
}

#[test]
fn fired_device_on_linked_point_destroys_link() {
    let mut scene = Scene::new();
    let (hub, left, right) = arms_with_device(&mut scene, 1);
    let assembly = scene.assembly(hub).unwrap();
    let mut engine = engine();
    engine.on_assembly_created(&mut scene, assembly);
    assert_eq!(engine.trackers().len(), 1);
    engine.drain_events();

    // The tip is an implicit link, so no official edge is severed
    let created = scene.fire_separation_device(left, 1).unwrap();
    assert!(created.is_empty());
    assert_eq!(engine.on_separation_fired(&mut scene, left), 1);

    let (lt, rt) = tips(left, right);
    assert!(scene.occupant(lt).is_none());
    assert!(scene.occupant(rt).is_none());
    assert_eq!(engine.drain_events()[0].kind, LinkEventKind::Broken);

    engine.step(&mut scene);
    assert!(engine.trackers().is_empty());
    assert_eq!(scene.parent(left), Some(hub));
    assert_eq!(scene.assembly(left), scene.assembly(right));
}

#[test]
fn separation_on_official_edge_recouples_link() {
    let mut scene = Scene::new();
    let (hub, left, right) = arms_with_device(&mut scene, 0);
    let original = scene.assembly(hub).unwrap();
    let mut engine = engine();
    engine.on_assembly_created(&mut scene, original);
    assert_eq!(engine.trackers().len(), 1);

    let created = scene.fire_separation_device(left, 0).unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(engine.on_separation_fired(&mut scene, left), 0);
    assert_eq!(engine.trackers().len(), 1);
    engine.on_assembly_split(&mut scene, original, created[0]);
    engine.step(&mut scene);

    // The link holds the left arm on; it becomes its official edge
    assert_eq!(scene.parent(left), Some(right));
    assert_eq!(scene.assembly(left), Some(original));
    assert!(engine.trackers().is_empty());
    assert!(engine.manager(created[0]).is_none());
}

#[test]
fn separation_that_also_split_parent_edge_recouples_to_parent() {
    let mut scene = Scene::new();
    let (hub, left, right) = arms_with_device(&mut scene, 1);
    let original = scene.assembly(hub).unwrap();
    let mut engine = engine();
    engine.on_assembly_created(&mut scene, original);

    // The device sits on the linked tip; the host split takes the hub edge too
    scene.fire_separation_device(left, 1).unwrap();
    let created = scene.detach(left).unwrap();
    assert_eq!(engine.on_separation_fired(&mut scene, left), 1);
    engine.on_assembly_split(&mut scene, original, created);

    engine.step(&mut scene);
    assert_eq!(scene.parent(left), Some(hub));
    assert_eq!(scene.assembly(left), Some(original));
    assert_eq!(scene.occupant(PointRef::new(left, 0)), Some(hub));

    engine.step(&mut scene);
    assert!(engine.manager(created).is_none());
    assert!(engine.trackers().is_empty());
    assert!(scene.occupant(PointRef::new(right, 1)).is_none());
}

#[test]
fn split_across_link_recouples_and_never_double_links() {
    let mut scene = Scene::new();
    let hub = hub(&mut scene);
    let decoupler = inline(&mut scene, "decoupler", 0.5, None, true);
    let left = arm(&mut scene, "left", -0.5, 1.0, 0.05);
    let right = arm(&mut scene, "right", 0.5, -1.0, 0.05);
    scene.attach(PointRef::new(left, 0), PointRef::new(hub, 0)).unwrap();
    scene.attach(PointRef::new(decoupler, 0), PointRef::new(hub, 1)).unwrap();
    scene.attach(PointRef::new(right, 0), PointRef::new(decoupler, 1)).unwrap();

    let original = scene.assembly(hub).unwrap();
    let mut engine = engine();
    engine.on_assembly_created(&mut scene, original);
    assert_eq!(engine.trackers().len(), 1);

    let created = scene.fire_separation_device(decoupler, 0).unwrap();
    assert_eq!(engine.on_separation_fired(&mut scene, decoupler), 0);
    engine.on_assembly_split(&mut scene, original, created[0]);
    engine.step(&mut scene);

    // The implicit link became the official edge holding the pieces together
    assert_eq!(scene.parent(right), Some(left));
    assert_eq!(scene.assembly(decoupler), Some(original));
    assert!(engine.trackers().is_empty());
    assert!(engine.manager(created[0]).is_none());

    let report = engine.on_structure_changed(&mut scene, original);
    assert_eq!(report.formed, 0);
    engine.step(&mut scene);
    let pairs: BTreeSet<SegmentPair> = engine.trackers().iter().map(|t| t.pair()).collect();
    assert!(!pairs.contains(&SegmentPair::new(left, right)));
}

#[test]
fn design_time_detach_drops_links_at_once() {
    let mut scene = Scene::design_time();
    let (hub, left, right) = two_arms(&mut scene, 0.05);
    let assembly = scene.assembly(hub).unwrap();
    let mut engine = engine();
    engine.on_assembly_created(&mut scene, assembly);
    assert_eq!(engine.trackers()[0].state(), TrackerState::Linked);

    scene.detach(right).unwrap();
    engine.on_segment_detached(&mut scene, right, assembly);
    assert!(engine.trackers().is_empty());
    assert!(scene.occupant(PointRef::new(left, 1)).is_none());
    assert!(!engine.deferred_pending());
}

#[test]
fn user_separated_pair_stays_apart() {
    let mut scene = Scene::new();
    let (hub, left, right) = two_arms(&mut scene, 0.05);
    let assembly = scene.assembly(hub).unwrap();
    let mut engine = engine();
    engine.on_assembly_created(&mut scene, assembly);

    assert_eq!(engine.remove_links(&mut scene, right), 1);
    engine.step(&mut scene);
    engine.reset_links(&mut scene);
    assert!(engine.trackers().is_empty());
    assert!(engine.ignore_list().contains(left, right));
}

#[test]
fn packed_assembly_defers_constraint() {
    let mut scene = Scene::new();
    let (hub, _, _) = two_arms(&mut scene, 0.05);
    let assembly = scene.assembly(hub).unwrap();
    scene.pack(assembly);

    let mut engine = engine();
    engine.on_assembly_created(&mut scene, assembly);
    assert!(engine.trackers()[0].constraint_pending());

    scene.unpack(assembly);
    engine.step(&mut scene);
    assert_eq!(engine.trackers()[0].state(), TrackerState::Constrained);
    assert!(engine.trackers()[0].constraint().is_some());
}

// ── Persistence ────────────────────────────────────────────────────────

#[test]
fn saved_links_restore_on_fresh_engine() {
    let mut scene = Scene::design_time();
    let (hub, left, right) = two_arms(&mut scene, 0.05);
    let assembly = scene.assembly(hub).unwrap();

    let mut first = engine();
    first.on_assembly_created(&mut scene, assembly);
    let saved = first.capture_links(&scene, assembly);
    assert_eq!(saved.pairs.len(), 1);

    let mut buffer = Vec::new();
    save_links(&mut buffer, &saved).unwrap();
    let loaded = load_links(buffer.as_slice()).unwrap();

    first.on_assembly_destroyed(&mut scene, assembly);
    assert!(scene.occupant(PointRef::new(left, 1)).is_none());

    let mut second = engine();
    assert_eq!(second.restore_links(&mut scene, assembly, &loaded), 1);
    assert_eq!(second.hidden_pairs(), vec![tips(left, right)]);
}

#[test]
fn loaded_assembly_adopts_existing_links_once() {
    let mut scene = Scene::design_time();
    let (hub, _, _) = two_arms(&mut scene, 0.05);
    let assembly = scene.assembly(hub).unwrap();

    let mut first = engine();
    first.on_assembly_created(&mut scene, assembly);
    let expected = first.hidden_pairs();

    // A new session sees the occupancy left in the data
    let mut second = engine();
    let report = second.on_assembly_loaded(&mut scene, assembly);
    assert_eq!(report.formed, 1);
    assert_eq!(second.trackers().len(), 1);
    assert_eq!(second.hidden_pairs(), expected);
}

// ── Determinism ────────────────────────────────────────────────────────

/// Root with `count` children whose tips scatter around a shared line.
fn scattered(scene: &mut Scene, seed: u64, count: usize) -> AssemblyId {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut root_spec = SegmentSpec::new("root").at(0.0, 2.0, 0.0);
    for i in 0..count {
        root_spec = root_spec.stack(&format!("mount{}", i), Vec3::new(i as f32, -1.0, 0.0), -Vec3::Y);
    }
    let root = scene.spawn_segment(root_spec);

    for i in 0..count {
        let facing = if i % 2 == 0 { 1.0 } else { -1.0 };
        let offset = Vec3::new(
            rng.gen_range(-0.04..0.04),
            rng.gen_range(-0.04..0.04),
            rng.gen_range(-0.04..0.04),
        );
        let child = scene.spawn_segment(
            SegmentSpec::new(format!("child{}", i))
                .at(0.0, 0.0, 0.0)
                .stack("top", Vec3::new(i as f32, 1.0, 0.0), Vec3::Y)
                .stack("tip", offset, Vec3::new(facing, 0.0, 0.0)),
        );
        scene
            .attach(PointRef::new(child, 0), PointRef::new(root, i))
            .unwrap();
    }
    scene.assembly(root).unwrap()
}

#[test]
fn same_seed_gives_same_links() {
    let run = |seed: u64| {
        let mut scene = Scene::new();
        let assembly = scattered(&mut scene, seed, 8);
        let mut engine = engine();
        engine.on_assembly_created(&mut scene, assembly);
        engine
            .hidden_pairs()
            .into_iter()
            .map(|(a, b)| (a.segment.id(), a.index, b.segment.id(), b.index))
            .collect::<Vec<_>>()
    };

    for seed in [1, 7, 42] {
        let first = run(seed);
        assert_eq!(first, run(seed));

        let mut used = BTreeSet::new();
        for &(sa, ia, sb, ib) in &first {
            assert!(used.insert((sa, ia)), "point linked twice");
            assert!(used.insert((sb, ib)), "point linked twice");
        }
        assert!(!first.is_empty());
    }
}
