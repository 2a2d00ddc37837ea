//! TrackingManager - the implicit links of one assembly
//!
//! A reconciliation pass drops trackers that no longer hold (segment gone,
//! link made official, docking port taken), then sweeps the assembly's free
//! attach points for new pairs. The deferred pass runs one step after a
//! structural change and sorts out what the physics step revealed: broken
//! constraints, fired separation devices, links whose segments ended up in
//! different assemblies (re-coupled) or together in another assembly
//! (handed off).

use crate::components::*;
use crate::events::Notifications;
use crate::ignore::IgnoreList;
use crate::scene::Scene;
use crate::systems::*;
use crate::tracker::{JointTracker, ParentLink};
use autocouple_logic::settings::CouplingSettings;
use hecs::Entity;
use std::collections::BTreeSet;

/// A tracker leaving this manager for another assembly's
#[derive(Debug, Clone)]
pub struct Migration {
    pub tracker: JointTracker,
    pub target: AssemblyId,
}

/// What a reconciliation pass changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub formed: usize,
    pub removed: usize,
}

impl ReconcileReport {
    pub fn changed(&self) -> bool {
        self.formed > 0 || self.removed > 0
    }
}

/// Links lost to fired separation devices
#[derive(Debug, Clone, Default)]
pub struct SeparationReport {
    pub destroyed: usize,
    pub parent_links: Vec<ParentLink>,
}

/// Implicit links of one assembly
#[derive(Debug, Clone)]
pub struct TrackingManager {
    assembly: AssemblyId,
    context: LinkContext,
    trackers: Vec<JointTracker>,
}

impl TrackingManager {
    pub fn new(assembly: AssemblyId, context: LinkContext) -> Self {
        Self {
            assembly,
            context,
            trackers: Vec::new(),
        }
    }

    pub fn assembly(&self) -> AssemblyId {
        self.assembly
    }

    pub fn context(&self) -> LinkContext {
        self.context
    }

    pub fn trackers(&self) -> &[JointTracker] {
        &self.trackers
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    /// Segment pairs joined by a live tracker
    pub fn linked_pairs(&self) -> BTreeSet<SegmentPair> {
        self.trackers
            .iter()
            .filter(|t| !t.is_destroyed())
            .map(|t| t.pair())
            .collect()
    }

    /// Points held by a live tracker, docking trackers included
    pub fn claimed_points(&self) -> BTreeSet<PointRef> {
        self.trackers
            .iter()
            .filter(|t| !t.is_destroyed())
            .flat_map(|t| t.points())
            .collect()
    }

    /// Attach-point pairs currently joined by implicit links.
    pub fn hidden_pairs(&self) -> Vec<(PointRef, PointRef)> {
        self.trackers
            .iter()
            .filter(|t| !t.is_destroyed() && !t.is_docking())
            .map(|t| {
                let [a, b] = t.points();
                (a, b)
            })
            .collect()
    }

    fn event_assembly(&self, scene: &Scene) -> Option<AssemblyId> {
        scene.assembly_exists(self.assembly).then_some(self.assembly)
    }

    /// Bring the tracker set in line with the current tree.
    pub fn reconcile(
        &mut self,
        scene: &mut Scene,
        settings: &CouplingSettings,
        ignore: &IgnoreList,
        notes: &mut Notifications,
    ) -> ReconcileReport {
        if !scene.assembly_exists(self.assembly) {
            return ReconcileReport::default();
        }
        let mut report = ReconcileReport {
            removed: self.prune(scene, notes),
            formed: 0,
        };

        for (a, b) in self.find_pairs(scene, settings, ignore) {
            if self.form(scene, a, b, notes) {
                report.formed += 1;
            }
        }

        if report.changed() {
            self.refresh_resource_groups(scene);
            log::info!(
                "{}: {} link(s) formed, {} removed, {} tracked",
                self.assembly,
                report.formed,
                report.removed,
                self.trackers.len()
            );
        }
        report
    }

    /// Drop every tracker and generate afresh.
    ///
    /// With `forbid_adding`, pairs that were not linked before the rebuild
    /// go on the ignore list instead of being linked.
    pub fn rebuild(
        &mut self,
        scene: &mut Scene,
        settings: &CouplingSettings,
        ignore: &mut IgnoreList,
        notes: &mut Notifications,
        forbid_adding: bool,
    ) -> ReconcileReport {
        let previous = self.linked_pairs();
        let removed = self.destroy_all(scene, notes);

        if !forbid_adding {
            let mut report = self.reconcile(scene, settings, ignore, notes);
            report.removed += removed;
            return report;
        }

        let mut formed = 0;
        for (a, b) in self.find_pairs(scene, settings, ignore) {
            if previous.contains(&SegmentPair::new(a.segment, b.segment)) {
                if self.form(scene, a, b, notes) {
                    formed += 1;
                }
            } else {
                log::debug!("Ignoring new pair {:?} <-> {:?} on rebuild", a.segment, b.segment);
                ignore.add(a.segment, b.segment);
            }
        }
        self.refresh_resource_groups(scene);
        ReconcileReport { formed, removed }
    }

    /// Track implicit links already present in the data: mutually occupied
    /// points on segments that are neither parent nor child.
    pub fn adopt_existing_links(&mut self, scene: &mut Scene, notes: &mut Notifications) -> usize {
        let segments = scene.assembly_segments(self.assembly);
        let mut claimed = self.claimed_points();
        let mut found = Vec::new();

        for &segment in &segments {
            let Ok(points) = scene.world.get::<&AttachPoints>(segment) else {
                continue;
            };
            for (index, point) in points.points.iter().enumerate() {
                let Some(other) = point.occupied_by else {
                    continue;
                };
                if other == segment || !segments.contains(&other) || are_tree_adjacent(&scene.world, segment, other) {
                    continue;
                }
                let here = PointRef::new(segment, index);
                let Some(there) = mutual_point(&scene.world, other, segment) else {
                    continue;
                };
                if claimed.contains(&here) || claimed.contains(&there) {
                    continue;
                }
                claimed.insert(here);
                claimed.insert(there);
                found.push((here, there));
            }
        }

        let mut adopted = 0;
        for (a, b) in found {
            if self.form(scene, a, b, notes) {
                adopted += 1;
            }
        }
        if adopted > 0 {
            self.refresh_resource_groups(scene);
            log::info!("{}: adopted {} existing link(s)", self.assembly, adopted);
        }
        adopted
    }

    /// Re-form saved links. Pairs that no longer make sense (point gone or
    /// taken, segments now parent and child) are skipped with a warning.
    pub fn restore_links(&mut self, scene: &mut Scene, pairs: &[(PointRef, PointRef)], notes: &mut Notifications) -> usize {
        let mut restored = 0;
        for &(a, b) in pairs {
            let claimed = self.claimed_points();
            let usable = |p: PointRef, other: Entity| {
                scene.point(p).is_some_and(|point| point.occupied_by.map_or(true, |o| o == other))
            };
            if a.segment == b.segment
                || claimed.contains(&a)
                || claimed.contains(&b)
                || !usable(a, b.segment)
                || !usable(b, a.segment)
                || are_tree_adjacent(&scene.world, a.segment, b.segment)
            {
                log::warn!("{}: skipping saved link {:?} <-> {:?}", self.assembly, a, b);
                continue;
            }
            if self.form(scene, a, b, notes) {
                restored += 1;
            }
        }
        if restored > 0 {
            self.refresh_resource_groups(scene);
        }
        restored
    }

    /// Destroy trackers on `segments` whose constraint did not survive.
    pub fn drop_broken_links(&mut self, scene: &mut Scene, segments: &BTreeSet<Entity>, notes: &mut Notifications) -> usize {
        let assembly = self.event_assembly(scene);
        let mut dropped = 0;
        for tracker in self.trackers.iter_mut() {
            let (a, b) = tracker.segments();
            if tracker.is_destroyed() || !(segments.contains(&a) || segments.contains(&b)) {
                continue;
            }
            if !tracker.is_link_created(&scene.world) {
                log::debug!("Link {:?} broke under load", tracker.segments());
                tracker.destroy(&mut scene.world, notes, assembly);
                dropped += 1;
            }
        }
        self.trackers.retain(|t| !t.is_destroyed());
        if dropped > 0 {
            self.refresh_resource_groups(scene);
        }
        dropped
    }

    /// Create constraints left pending while the assembly was packed.
    pub fn create_pending_constraints(&mut self, scene: &mut Scene) -> usize {
        if scene.is_packed(self.assembly) {
            return 0;
        }
        let mut created = 0;
        for tracker in self.trackers.iter_mut().filter(|t| t.constraint_pending()) {
            tracker.create_constraint(&mut scene.world, false);
            if tracker.constraint().is_some() {
                created += 1;
            }
        }
        created
    }

    /// Destroy trackers with a fired separation device on a tracked point.
    ///
    /// The report carries the official parent edges the destroyed links
    /// recorded, for the post-separation re-couple check.
    pub fn check_separation_devices(&mut self, scene: &mut Scene, notes: &mut Notifications) -> SeparationReport {
        let assembly = self.event_assembly(scene);
        let mut parent_links = Vec::new();
        let mut destroyed = 0;
        for tracker in self.trackers.iter_mut().filter(|t| !t.is_destroyed()) {
            if tracker.fired_device(&scene.world) {
                parent_links.extend_from_slice(tracker.parent_links());
                tracker.destroy(&mut scene.world, notes, assembly);
                destroyed += 1;
            }
        }
        self.trackers.retain(|t| !t.is_destroyed());
        if destroyed > 0 {
            log::debug!("{}: {} link(s) lost to separation", self.assembly, destroyed);
            self.refresh_resource_groups(scene);
        }
        SeparationReport { destroyed, parent_links }
    }

    /// One-step-later checks. Returns the trackers to hand off.
    pub fn deferred_pass(&mut self, scene: &mut Scene, notes: &mut Notifications) -> Vec<Migration> {
        let assembly = self.event_assembly(scene);
        let mut keep = Vec::with_capacity(self.trackers.len());
        let mut migrations = Vec::new();
        let mut changed = false;

        for mut tracker in std::mem::take(&mut self.trackers) {
            if tracker.is_destroyed() {
                changed = true;
                continue;
            }
            if !tracker.segments_alive(&scene.world) {
                log::debug!("Dropping link {:?}: segment gone", tracker.segments());
                tracker.destroy(&mut scene.world, notes, assembly);
                changed = true;
                continue;
            }
            if tracker.is_docking() {
                if tracker.docking_partnered_elsewhere(&scene.world) {
                    tracker.destroy(&mut scene.world, notes, assembly);
                    changed = true;
                } else {
                    keep.push(tracker);
                }
                continue;
            }
            if !tracker.is_link_created(&scene.world) {
                log::debug!("Dropping link {:?}: constraint gone", tracker.segments());
                tracker.destroy(&mut scene.world, notes, assembly);
                changed = true;
                continue;
            }
            if tracker.fired_device(&scene.world) {
                tracker.destroy(&mut scene.world, notes, assembly);
                changed = true;
                continue;
            }

            let (a, b) = tracker.segments();
            if are_tree_adjacent(&scene.world, a, b) {
                tracker.dissolve(&mut scene.world, notes, assembly);
                changed = true;
                continue;
            }

            let (Some(sa), Some(sb)) = (scene.assembly(a), scene.assembly(b)) else {
                tracker.destroy(&mut scene.world, notes, assembly);
                changed = true;
                continue;
            };
            if sa != sb {
                self.recouple(scene, &mut tracker, notes);
                changed = true;
            } else if sa != self.assembly {
                log::debug!("Handing link {:?} from {} to {}", tracker.segments(), self.assembly, sa);
                migrations.push(Migration { tracker, target: sa });
                changed = true;
            } else {
                keep.push(tracker);
            }
        }

        self.trackers = keep;
        if changed {
            self.refresh_resource_groups(scene);
        }
        migrations
    }

    /// The two ends of a holding link were split into different assemblies:
    /// make the link an official edge. The side in this manager's assembly
    /// (else the larger assembly) stays put; the other tree moves.
    fn recouple(&self, scene: &mut Scene, tracker: &mut JointTracker, notes: &mut Notifications) {
        let [p, q] = tracker.points();
        let size = |s: Entity| {
            scene
                .assembly(s)
                .map(|id| scene.assembly_segments(id).len())
                .unwrap_or(0)
        };
        let p_stays = if scene.assembly(p.segment) == Some(self.assembly) {
            true
        } else if scene.assembly(q.segment) == Some(self.assembly) {
            false
        } else {
            size(p.segment) >= size(q.segment)
        };
        let (target, moving) = if p_stays { (p, q) } else { (q, p) };

        match scene.couple(moving, target) {
            Ok(()) => {
                log::info!("Re-coupled {:?} onto {:?}", moving.segment, target.segment);
                let assembly = scene.assembly(target.segment);
                tracker.dissolve(&mut scene.world, notes, assembly);
            }
            Err(e) => {
                log::error!("Re-coupling {:?} failed: {}", tracker.segments(), e);
                let assembly = self.event_assembly(scene);
                tracker.destroy(&mut scene.world, notes, assembly);
            }
        }
    }

    /// Take over a tracker handed off by another manager.
    pub fn adopt_migration(&mut self, tracker: JointTracker) {
        if self.claimed_points().iter().any(|p| tracker.holds_point(*p)) {
            log::warn!("{}: refusing duplicate link {:?}", self.assembly, tracker.segments());
            return;
        }
        self.trackers.push(tracker);
    }

    /// Destroy the trackers touching `segment`. Returns the removed pairs.
    pub fn remove_links_for(&mut self, scene: &mut Scene, segment: Entity, notes: &mut Notifications) -> Vec<SegmentPair> {
        let assembly = self.event_assembly(scene);
        let mut removed = Vec::new();
        for tracker in self.trackers.iter_mut().filter(|t| t.involves(segment)) {
            tracker.destroy(&mut scene.world, notes, assembly);
            removed.push(tracker.pair());
        }
        self.trackers.retain(|t| !t.is_destroyed());
        if !removed.is_empty() {
            self.refresh_resource_groups(scene);
        }
        removed
    }

    /// Destroy every tracker. Returns how many there were.
    pub fn destroy_all(&mut self, scene: &mut Scene, notes: &mut Notifications) -> usize {
        let assembly = self.event_assembly(scene);
        let count = self.trackers.len();
        for tracker in self.trackers.iter_mut() {
            tracker.destroy(&mut scene.world, notes, assembly);
        }
        self.trackers.clear();
        if count > 0 {
            self.refresh_resource_groups(scene);
        }
        count
    }

    /// Recompute resource groups from official edges and live links.
    pub fn refresh_resource_groups(&self, scene: &mut Scene) {
        let segments = scene.assembly_segments(self.assembly);
        if segments.is_empty() {
            return;
        }
        let links: Vec<(Entity, Entity)> = self
            .trackers
            .iter()
            .filter(|t| !t.is_destroyed() && !t.is_docking())
            .map(|t| t.segments())
            .collect();
        rebuild_groups(&mut scene.world, &segments, &links);
    }

    /// Drop trackers that can no longer hold. Returns how many went.
    fn prune(&mut self, scene: &mut Scene, notes: &mut Notifications) -> usize {
        let assembly = self.event_assembly(scene);
        let before = self.trackers.len();
        for tracker in self.trackers.iter_mut() {
            if tracker.is_destroyed() {
                continue;
            }
            if !tracker.segments_alive(&scene.world) {
                log::debug!("Dropping link {:?}: segment gone", tracker.segments());
                tracker.destroy(&mut scene.world, notes, assembly);
            } else if tracker.is_docking() {
                if tracker.docking_partnered_elsewhere(&scene.world) {
                    tracker.destroy(&mut scene.world, notes, assembly);
                }
            } else {
                let (a, b) = tracker.segments();
                if are_tree_adjacent(&scene.world, a, b) {
                    tracker.dissolve(&mut scene.world, notes, assembly);
                }
            }
        }
        self.trackers.retain(|t| !t.is_destroyed());
        before - self.trackers.len()
    }

    fn find_pairs(&self, scene: &mut Scene, settings: &CouplingSettings, ignore: &IgnoreList) -> Vec<(PointRef, PointRef)> {
        let segments = scene.assembly_segments(self.assembly);
        let claimed = self.claimed_points();
        let free: Vec<PointRef> = free_points_in(&mut scene.world, &segments, self.context)
            .into_iter()
            .filter(|p| !claimed.contains(p))
            .collect();

        let linked = self.linked_pairs();
        let rules = PairingRules {
            thresholds: settings.thresholds(),
            allow_robotic: settings.allow_robotic_joints,
            allow_cable: settings.allow_cable_joints,
            ignore,
            linked: &linked,
        };
        eligible_pairs(&scene.world, &free, &rules)
    }

    fn form(&mut self, scene: &mut Scene, a: PointRef, b: PointRef, notes: &mut Notifications) -> bool {
        let mut tracker = JointTracker::new(a, b, self.context);
        if !tracker.link(&mut scene.world, notes, Some(self.assembly)) {
            return false;
        }
        let packed = scene.is_packed(self.assembly);
        tracker.create_constraint(&mut scene.world, packed);
        self.trackers.push(tracker);
        true
    }
}

/// Point of `segment` occupied by `other`.
fn mutual_point(world: &hecs::World, segment: Entity, other: Entity) -> Option<PointRef> {
    let points = world.get::<&AttachPoints>(segment).ok()?;
    points.index_linked_to(other).map(|i| PointRef::new(segment, i))
}
