//! Coupling engine - main entry point for the host
//!
//! The host owns a `CouplingEngine` next to its `Scene`, forwards every
//! structural notification to the matching `on_*` handler, and calls
//! [`CouplingEngine::step`] once per physics step. Work that can only be
//! judged after a step (constraint survival, whether a split was real) is
//! queued as one-shot deferred tasks; repeated requests coalesce.

use crate::components::*;
use crate::events::{ConnectivityRequest, LinkEvent, Notifications};
use crate::ignore::IgnoreList;
use crate::manager::{ReconcileReport, TrackingManager};
use crate::persistence::SavedLinks;
use crate::scene::Scene;
use crate::systems::{are_tree_adjacent, subtree};
use crate::tracker::{JointTracker, ParentLink};
use autocouple_logic::scheduler::Deferred;
use autocouple_logic::settings::CouplingSettings;
use hecs::Entity;
use std::collections::{BTreeMap, BTreeSet};

/// Main coupling engine
pub struct CouplingEngine {
    settings: CouplingSettings,
    /// One manager per tracked assembly
    managers: BTreeMap<AssemblyId, TrackingManager>,
    /// Pairs the user explicitly separated
    ignore: IgnoreList,
    notes: Notifications,
    /// Physics steps seen so far
    step: u64,

    // One-step-later work
    deferred: Deferred,
    break_check: Deferred,
    break_suspects: BTreeSet<Entity>,
    separation_check: Deferred,
    parent_links: Vec<ParentLink>,
}

impl Default for CouplingEngine {
    fn default() -> Self {
        Self::new(CouplingSettings::default())
    }
}

fn manager_entry(
    managers: &mut BTreeMap<AssemblyId, TrackingManager>,
    assembly: AssemblyId,
    context: LinkContext,
) -> &mut TrackingManager {
    managers
        .entry(assembly)
        .or_insert_with(|| TrackingManager::new(assembly, context))
}

impl CouplingEngine {
    pub fn new(settings: CouplingSettings) -> Self {
        Self {
            notes: Notifications::new(settings.connectivity_enabled),
            settings,
            managers: BTreeMap::new(),
            ignore: IgnoreList::new(),
            step: 0,
            deferred: Deferred::new(),
            break_check: Deferred::new(),
            break_suspects: BTreeSet::new(),
            separation_check: Deferred::new(),
            parent_links: Vec::new(),
        }
    }

    pub fn settings(&self) -> &CouplingSettings {
        &self.settings
    }

    /// Replace the settings. Existing links stay until the next rebuild.
    pub fn set_settings(&mut self, settings: CouplingSettings) {
        self.notes.set_connectivity_enabled(settings.connectivity_enabled);
        self.settings = settings;
    }

    pub fn step_count(&self) -> u64 {
        self.step
    }

    pub fn deferred_pending(&self) -> bool {
        self.deferred.is_pending() || self.break_check.is_pending() || self.separation_check.is_pending()
    }

    pub fn manager(&self, assembly: AssemblyId) -> Option<&TrackingManager> {
        self.managers.get(&assembly)
    }

    pub fn managers(&self) -> impl Iterator<Item = &TrackingManager> {
        self.managers.values()
    }

    /// Every live tracker, manager by manager
    pub fn trackers(&self) -> Vec<&JointTracker> {
        self.managers.values().flat_map(|m| m.trackers()).collect()
    }

    /// Attach-point pairs joined by implicit links, for highlighting.
    pub fn hidden_pairs(&self) -> Vec<(PointRef, PointRef)> {
        self.managers.values().flat_map(|m| m.hidden_pairs()).collect()
    }

    pub fn ignore_list(&self) -> &IgnoreList {
        &self.ignore
    }

    /// Never auto-link these two segments.
    pub fn ignore_pair(&mut self, a: Entity, b: Entity) -> bool {
        self.ignore.add(a, b)
    }

    pub fn drain_events(&mut self) -> Vec<LinkEvent> {
        self.notes.drain_events()
    }

    pub fn drain_connectivity(&mut self) -> Vec<ConnectivityRequest> {
        self.notes.drain_connectivity()
    }

    fn schedule_deferred(&mut self) {
        if !self.deferred.schedule(self.step) {
            log::debug!("Deferred pass already pending; {} requests", self.deferred.requests());
        }
    }

    fn reconcile(&mut self, scene: &mut Scene, assembly: AssemblyId) -> ReconcileReport {
        if !scene.assembly_exists(assembly) {
            return ReconcileReport::default();
        }
        let manager = manager_entry(&mut self.managers, assembly, scene.context());
        manager.reconcile(scene, &self.settings, &self.ignore, &mut self.notes)
    }

    fn rebuild(&mut self, scene: &mut Scene, assembly: AssemblyId, forbid_adding: bool) -> ReconcileReport {
        if !scene.assembly_exists(assembly) {
            return ReconcileReport::default();
        }
        let manager = manager_entry(&mut self.managers, assembly, scene.context());
        manager.rebuild(scene, &self.settings, &mut self.ignore, &mut self.notes, forbid_adding)
    }

    // ---- Assembly lifecycle ----

    /// A new assembly appeared: start tracking and link what fits.
    pub fn on_assembly_created(&mut self, scene: &mut Scene, assembly: AssemblyId) -> ReconcileReport {
        self.reconcile(scene, assembly)
    }

    /// An assembly was loaded with existing link data.
    ///
    /// Links present in the data are adopted. At design time the assembly is
    /// then rebuilt without adding links the loaded data did not have.
    pub fn on_assembly_loaded(&mut self, scene: &mut Scene, assembly: AssemblyId) -> ReconcileReport {
        if !scene.assembly_exists(assembly) {
            return ReconcileReport::default();
        }
        let manager = manager_entry(&mut self.managers, assembly, scene.context());
        let adopted = manager.adopt_existing_links(scene, &mut self.notes);
        match scene.context() {
            LinkContext::DesignTime => self.rebuild(scene, assembly, true),
            LinkContext::Simulated => {
                let mut report = self.reconcile(scene, assembly);
                report.formed += adopted;
                report
            }
        }
    }

    /// The assembly is gone; its links go with it.
    pub fn on_assembly_destroyed(&mut self, scene: &mut Scene, assembly: AssemblyId) {
        if let Some(mut manager) = self.managers.remove(&assembly) {
            let count = manager.destroy_all(scene, &mut self.notes);
            log::info!("{} destroyed with {} link(s)", assembly, count);
        }
    }

    /// `original` split and `created` came off it.
    pub fn on_assembly_split(&mut self, scene: &mut Scene, original: AssemblyId, created: AssemblyId) {
        log::debug!("{} split off {}", created, original);
        manager_entry(&mut self.managers, created, scene.context());
        self.schedule_deferred();
    }

    /// `from` was merged into `into`.
    pub fn on_assembly_merged(&mut self, _scene: &mut Scene, from: AssemblyId, into: AssemblyId) {
        log::debug!("{} merged into {}", from, into);
        self.schedule_deferred();
    }

    // ---- Segment events ----

    pub fn on_segment_attached(&mut self, scene: &mut Scene, segment: Entity) -> ReconcileReport {
        match scene.assembly(segment) {
            Some(assembly) => {
                let report = self.reconcile(scene, assembly);
                self.schedule_deferred();
                report
            }
            None => ReconcileReport::default(),
        }
    }

    /// `segment` (and its subtree) was detached from assembly `from`.
    ///
    /// At design time the detached segments lose their links immediately
    /// and leave the ignore list; in simulation the deferred pass decides.
    pub fn on_segment_detached(&mut self, scene: &mut Scene, segment: Entity, from: AssemblyId) {
        let detached = subtree(&scene.world, segment);
        for &s in &detached {
            let pruned = self.ignore.prune(s);
            if pruned > 0 {
                log::debug!("Pruned {} ignored pair(s) of {:?}", pruned, s);
            }
        }

        match scene.context() {
            LinkContext::DesignTime => {
                for manager in self.managers.values_mut() {
                    for &s in &detached {
                        manager.remove_links_for(scene, s, &mut self.notes);
                    }
                }
                self.reconcile(scene, from);
            }
            LinkContext::Simulated => self.schedule_deferred(),
        }
    }

    /// A segment was moved or rotated: links of its assembly are rebuilt.
    pub fn on_segment_moved(&mut self, scene: &mut Scene, segment: Entity) -> ReconcileReport {
        match scene.assembly(segment) {
            Some(assembly) => self.rebuild(scene, assembly, false),
            None => ReconcileReport::default(),
        }
    }

    /// A subtree was copied. Occupancy on the copies that points at
    /// segments outside the copy and outside the tree is cleared.
    pub fn on_segment_copied(&mut self, scene: &mut Scene, copies: &[Entity]) -> usize {
        let mut cleared = 0;
        for &copy in copies {
            let stale: Vec<usize> = match scene.world.get::<&AttachPoints>(copy) {
                Ok(points) => points
                    .points
                    .iter()
                    .enumerate()
                    .filter_map(|(i, p)| {
                        let o = p.occupied_by?;
                        let keep = copies.contains(&o) || are_tree_adjacent(&scene.world, copy, o);
                        (!keep).then_some(i)
                    })
                    .collect(),
                Err(_) => continue,
            };
            if let Ok(mut points) = scene.world.get::<&mut AttachPoints>(copy) {
                for i in stale {
                    if let Some(p) = points.get_mut(i) {
                        p.occupied_by = None;
                        cleared += 1;
                    }
                }
            }
        }
        if cleared > 0 {
            log::debug!("Cleared {} stale point(s) on copied segments", cleared);
        }

        // Links wholly inside the copy carry over
        let assemblies: BTreeSet<AssemblyId> = copies.iter().filter_map(|&c| scene.assembly(c)).collect();
        for assembly in assemblies {
            let manager = manager_entry(&mut self.managers, assembly, scene.context());
            manager.adopt_existing_links(scene, &mut self.notes);
        }
        cleared
    }

    /// A segment is gone. Its links are removed right away; any split it
    /// caused is handled by the deferred pass.
    pub fn on_segment_destroyed(&mut self, scene: &mut Scene, segment: Entity) {
        for manager in self.managers.values_mut() {
            manager.remove_links_for(scene, segment, &mut self.notes);
        }
        self.ignore.prune(segment);
        self.schedule_deferred();
    }

    /// Generic "something in this assembly changed".
    pub fn on_structure_changed(&mut self, scene: &mut Scene, assembly: AssemblyId) -> ReconcileReport {
        let report = self.reconcile(scene, assembly);
        self.schedule_deferred();
        report
    }

    /// A separation device on `segment` fired.
    ///
    /// Links whose tracked point the device covered are destroyed now. The
    /// official parent edges those links recorded are checked one step
    /// later in case the split took more than the device severed.
    pub fn on_separation_fired(&mut self, scene: &mut Scene, segment: Entity) -> usize {
        let mut destroyed = 0;
        for manager in self.managers.values_mut() {
            let report = manager.check_separation_devices(scene, &mut self.notes);
            destroyed += report.destroyed;
            self.parent_links.extend(report.parent_links);
        }
        log::debug!("Separation on {:?}: {} link(s) destroyed", segment, destroyed);
        self.separation_check.schedule(self.step);
        self.schedule_deferred();
        destroyed
    }

    /// The physics host reports a constraint broke on `segment`.
    pub fn on_constraint_broken(&mut self, _scene: &mut Scene, segment: Entity) {
        self.break_suspects.insert(segment);
        self.break_check.schedule(self.step);
    }

    // ---- User operations ----

    /// Tear down and regenerate the links of every tracked assembly.
    pub fn reset_links(&mut self, scene: &mut Scene) -> ReconcileReport {
        let mut total = ReconcileReport::default();
        for assembly in scene.assemblies() {
            let report = self.rebuild(scene, assembly, false);
            total.formed += report.formed;
            total.removed += report.removed;
        }
        total
    }

    /// Remove every link of `segment` and keep those pairs from re-forming.
    pub fn remove_links(&mut self, scene: &mut Scene, segment: Entity) -> usize {
        let mut removed = 0;
        for manager in self.managers.values_mut() {
            for pair in manager.remove_links_for(scene, segment, &mut self.notes) {
                self.ignore.add(pair.first(), pair.second());
                removed += 1;
            }
        }
        removed
    }

    /// Snapshot the links of `assembly` for saving.
    pub fn capture_links(&self, scene: &Scene, assembly: AssemblyId) -> SavedLinks {
        match self.managers.get(&assembly) {
            Some(manager) => SavedLinks::capture(scene, manager),
            None => SavedLinks::default(),
        }
    }

    /// Re-form saved links on `assembly`.
    pub fn restore_links(&mut self, scene: &mut Scene, assembly: AssemblyId, saved: &SavedLinks) -> usize {
        let pairs = saved.resolve(scene, assembly);
        if !scene.assembly_exists(assembly) {
            return 0;
        }
        let manager = manager_entry(&mut self.managers, assembly, scene.context());
        manager.restore_links(scene, &pairs, &mut self.notes)
    }

    // ---- Step loop ----

    /// Advance one physics step.
    pub fn step(&mut self, scene: &mut Scene) {
        self.step += 1;

        for manager in self.managers.values_mut() {
            let created = manager.create_pending_constraints(scene);
            if created > 0 {
                log::debug!("{}: created {} pending constraint(s)", manager.assembly(), created);
            }
        }

        if self.break_check.take_due(self.step) {
            self.run_break_check(scene);
        }
        if self.separation_check.take_due(self.step) {
            self.run_parent_check(scene);
        }
        if self.deferred.take_due(self.step) {
            self.run_deferred_pass(scene);
        }
    }

    fn run_break_check(&mut self, scene: &mut Scene) {
        let suspects = std::mem::take(&mut self.break_suspects);
        let mut dropped = 0;
        for manager in self.managers.values_mut() {
            dropped += manager.drop_broken_links(scene, &suspects, &mut self.notes);
        }
        if dropped > 0 {
            log::info!("{} link(s) broke under load", dropped);
        }
    }

    /// Re-attach segments split from their parent by something other than
    /// a fired separation device on that edge.
    fn run_parent_check(&mut self, scene: &mut Scene) {
        for link in std::mem::take(&mut self.parent_links) {
            let (child, parent) = (link.child.segment, link.parent.segment);
            if !scene.contains(child) || !scene.contains(parent) {
                continue;
            }
            if scene.parent(child) == Some(parent) || scene.assembly(child) == scene.assembly(parent) {
                continue;
            }
            if severed_by_device(scene, link.child) || severed_by_device(scene, link.parent) {
                continue;
            }
            let (from, into) = (scene.assembly(child), scene.assembly(parent));
            match scene.couple(link.child, link.parent) {
                Ok(()) => {
                    log::info!("Re-coupled {:?} to its parent {:?}", child, parent);
                    if let (Some(from), Some(into)) = (from, into) {
                        self.on_assembly_merged(scene, from, into);
                    }
                }
                Err(e) => log::warn!("Could not re-couple {:?} to {:?}: {}", child, parent, e),
            }
        }
    }

    fn run_deferred_pass(&mut self, scene: &mut Scene) {
        let ids: Vec<AssemblyId> = self.managers.keys().rev().copied().collect();
        let mut migrations = Vec::new();
        for id in ids {
            if let Some(manager) = self.managers.get_mut(&id) {
                migrations.extend(manager.deferred_pass(scene, &mut self.notes));
            }
        }

        let mut touched = BTreeSet::new();
        for migration in migrations {
            let target = manager_entry(&mut self.managers, migration.target, scene.context());
            target.adopt_migration(migration.tracker);
            touched.insert(migration.target);
        }
        // Managers whose assembly vanished are cancelled
        let vanished: Vec<AssemblyId> = self
            .managers
            .keys()
            .copied()
            .filter(|id| !scene.assembly_exists(*id))
            .collect();
        for id in vanished {
            if let Some(mut manager) = self.managers.remove(&id) {
                manager.destroy_all(scene, &mut self.notes);
                log::debug!("Cancelled manager of vanished {}", id);
            }
        }

        for assembly in scene.assemblies() {
            self.reconcile(scene, assembly);
        }
        // Splits regroup without implicit links
        for manager in self.managers.values() {
            manager.refresh_resource_groups(scene);
        }
        log::info!(
            "Deferred pass at step {}: {} migration(s), {} assembly(ies) tracked",
            self.step,
            touched.len(),
            self.managers.len()
        );
    }
}

fn severed_by_device(scene: &Scene, point: PointRef) -> bool {
    scene
        .world
        .get::<&SeparationDevices>(point.segment)
        .map(|d| d.fired_covering(point.index))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::LinkEventKind;
    use crate::scene::SegmentSpec;

    /// Root with two stacked side arms whose tips face each other 0.05 apart.
    fn twin_arms(scene: &mut Scene) -> (Entity, Entity, Entity) {
        let root = scene.spawn_segment(
            SegmentSpec::new("root")
                .at(0.0, 1.0, 0.0)
                .stack("left", Vec3::new(-0.5, -0.5, 0.0), -Vec3::Y)
                .stack("right", Vec3::new(0.5, -0.5, 0.0), -Vec3::Y),
        );
        let left = scene.spawn_segment(
            SegmentSpec::new("left")
                .at(-0.5, 0.0, 0.0)
                .stack("top", Vec3::new(0.0, 0.5, 0.0), Vec3::Y)
                .stack("tip", Vec3::new(0.475, 0.0, 0.0), Vec3::X),
        );
        let right = scene.spawn_segment(
            SegmentSpec::new("right")
                .at(0.5, 0.0, 0.0)
                .stack("top", Vec3::new(0.0, 0.5, 0.0), Vec3::Y)
                .stack("tip", Vec3::new(-0.475, 0.0, 0.0), -Vec3::X),
        );
        scene.attach(PointRef::new(left, 0), PointRef::new(root, 0)).unwrap();
        scene.attach(PointRef::new(right, 0), PointRef::new(root, 1)).unwrap();
        (root, left, right)
    }

    #[test]
    fn test_created_assembly_gets_links() {
        let mut scene = Scene::new();
        let (root, _, _) = twin_arms(&mut scene);
        let mut engine = CouplingEngine::default();
        let assembly = scene.assembly(root).unwrap();
        let report = engine.on_assembly_created(&mut scene, assembly);
        assert_eq!(report.formed, 1);
        assert_eq!(engine.trackers().len(), 1);
        assert_eq!(engine.hidden_pairs().len(), 1);
    }

    #[test]
    fn test_deferred_pass_waits_one_step() {
        let mut scene = Scene::new();
        let (root, _, _) = twin_arms(&mut scene);
        let mut engine = CouplingEngine::default();
        let assembly = scene.assembly(root).unwrap();
        engine.on_structure_changed(&mut scene, assembly);
        engine.on_structure_changed(&mut scene, assembly);
        assert!(engine.deferred_pending());
        engine.step(&mut scene);
        assert!(!engine.deferred_pending());
    }

    #[test]
    fn test_remove_links_ignores_pair() {
        let mut scene = Scene::new();
        let (root, left, right) = twin_arms(&mut scene);
        let mut engine = CouplingEngine::default();
        let assembly = scene.assembly(root).unwrap();
        engine.on_assembly_created(&mut scene, assembly);

        assert_eq!(engine.remove_links(&mut scene, left), 1);
        assert!(engine.ignore_list().contains(left, right));
        let report = engine.on_structure_changed(&mut scene, assembly);
        assert_eq!(report.formed, 0);
    }

    #[test]
    fn test_destroyed_segment_drops_links() {
        let mut scene = Scene::new();
        let (root, left, right) = twin_arms(&mut scene);
        let mut engine = CouplingEngine::default();
        let assembly = scene.assembly(root).unwrap();
        engine.on_assembly_created(&mut scene, assembly);
        engine.drain_events();

        scene.destroy_segment(right).unwrap();
        engine.on_segment_destroyed(&mut scene, right);
        assert!(engine.trackers().is_empty());
        assert!(scene.occupant(PointRef::new(left, 1)).is_none());
        let events = engine.drain_events();
        assert_eq!(events[0].kind, LinkEventKind::Broken);
    }

    #[test]
    fn test_broken_link_dropped_after_one_step() {
        let mut scene = Scene::new();
        let (root, left, _) = twin_arms(&mut scene);
        let mut engine = CouplingEngine::default();
        let assembly = scene.assembly(root).unwrap();
        engine.on_assembly_created(&mut scene, assembly);

        let handle = engine.trackers()[0].constraint().unwrap();
        scene.break_constraint(handle).unwrap();
        engine.on_constraint_broken(&mut scene, left);
        assert_eq!(engine.trackers().len(), 1);
        engine.step(&mut scene);
        assert!(engine.trackers().is_empty());
    }

    #[test]
    fn test_vanished_assembly_manager_cancelled() {
        let mut scene = Scene::new();
        let (root, left, right) = twin_arms(&mut scene);
        let mut engine = CouplingEngine::default();
        let assembly = scene.assembly(root).unwrap();
        engine.on_assembly_created(&mut scene, assembly);

        for s in [left, right, root] {
            scene.destroy_segment(s).unwrap();
            engine.on_segment_destroyed(&mut scene, s);
        }
        engine.step(&mut scene);
        assert!(engine.manager(assembly).is_none());
        assert!(engine.trackers().is_empty());
    }

    #[test]
    fn test_copy_clears_stale_occupancy() {
        let mut scene = Scene::new();
        let (root, left, _) = twin_arms(&mut scene);
        let mut engine = CouplingEngine::default();
        let assembly = scene.assembly(root).unwrap();
        engine.on_assembly_created(&mut scene, assembly);

        let copies = scene.copy_subtree(left).unwrap();
        assert_eq!(engine.on_segment_copied(&mut scene, &copies), 1);
        assert!(scene.occupant(PointRef::new(copies[0], 1)).is_none());
        assert!(scene.occupant(PointRef::new(left, 1)).is_some());
    }

    #[test]
    fn test_connectivity_follows_settings() {
        let mut scene = Scene::new();
        let (root, _, _) = twin_arms(&mut scene);
        let settings = CouplingSettings {
            connectivity_enabled: true,
            ..CouplingSettings::default()
        };
        let mut engine = CouplingEngine::new(settings);
        let assembly = scene.assembly(root).unwrap();
        engine.on_assembly_created(&mut scene, assembly);
        assert_eq!(engine.drain_connectivity().len(), 1);
    }
}
