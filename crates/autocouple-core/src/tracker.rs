//! JointTracker - one implicit structural link between two attach points
//!
//! ```text
//! Unlinked --link--> Linked --create_constraint--> Constrained
//!     |                 |                               |
//!     |                 +-----------destroy/dissolve----+--> Destroyed
//!     +--link (both ends docking)--> TrackingDocking ------^
//! ```
//!
//! A design-time tracker stops at `Linked`: there is no physics to join.
//! A simulated tracker whose assembly is packed keeps its constraint
//! pending until the engine's next step finds the bodies simulated.

use crate::components::*;
use crate::events::Notifications;
use crate::systems::{constraint_alive, create_constraint, destroy_constraint, is_segment, parent_of};
use hecs::{Entity, World};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackerState {
    Unlinked,
    /// Points occupied, no physical constraint (yet)
    Linked,
    /// Points occupied and joined by a live constraint
    Constrained,
    /// Both ends are docking interfaces; the docking subsystem owns the link
    TrackingDocking,
    Destroyed,
}

/// Physical side of a simulated link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintSlot {
    None,
    /// Bodies were packed; create on the next simulated step
    Pending,
    Active(Entity),
    /// Creation failed; cleaned up by the next deferred pass
    Failed,
}

/// A separation device relevant to the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceRef {
    pub segment: Entity,
    pub index: usize,
}

/// An official edge of one endpoint, recorded at link time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentLink {
    pub child: PointRef,
    pub parent: PointRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedLink {
    pub constraint: ConstraintSlot,
    /// Computed on first use, kept until destruction
    devices: Option<Vec<DeviceRef>>,
    parent_links: Vec<ParentLink>,
}

/// Context-specific tracker data
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerPayload {
    DesignTime,
    Simulated(SimulatedLink),
}

#[derive(Debug, Clone)]
pub struct JointTracker {
    points: [PointRef; 2],
    /// Occupant of each point before the link claimed it
    prior: [Option<Entity>; 2],
    state: TrackerState,
    payload: TrackerPayload,
}

impl JointTracker {
    pub fn new(a: PointRef, b: PointRef, context: LinkContext) -> Self {
        let payload = match context {
            LinkContext::DesignTime => TrackerPayload::DesignTime,
            LinkContext::Simulated => TrackerPayload::Simulated(SimulatedLink {
                constraint: ConstraintSlot::None,
                devices: None,
                parent_links: Vec::new(),
            }),
        };
        Self {
            points: [a, b],
            prior: [None, None],
            state: TrackerState::Unlinked,
            payload,
        }
    }

    pub fn points(&self) -> [PointRef; 2] {
        self.points
    }

    pub fn segments(&self) -> (Entity, Entity) {
        (self.points[0].segment, self.points[1].segment)
    }

    pub fn pair(&self) -> SegmentPair {
        SegmentPair::new(self.points[0].segment, self.points[1].segment)
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn payload(&self) -> &TrackerPayload {
        &self.payload
    }

    pub fn context(&self) -> LinkContext {
        match self.payload {
            TrackerPayload::DesignTime => LinkContext::DesignTime,
            TrackerPayload::Simulated(_) => LinkContext::Simulated,
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.state == TrackerState::Destroyed
    }

    pub fn is_docking(&self) -> bool {
        self.state == TrackerState::TrackingDocking
    }

    pub fn involves(&self, segment: Entity) -> bool {
        self.points[0].segment == segment || self.points[1].segment == segment
    }

    pub fn holds_point(&self, point: PointRef) -> bool {
        self.points.contains(&point)
    }

    pub fn constraint(&self) -> Option<Entity> {
        match &self.payload {
            TrackerPayload::Simulated(SimulatedLink {
                constraint: ConstraintSlot::Active(handle),
                ..
            }) => Some(*handle),
            _ => None,
        }
    }

    pub fn constraint_pending(&self) -> bool {
        matches!(
            &self.payload,
            TrackerPayload::Simulated(SimulatedLink {
                constraint: ConstraintSlot::Pending,
                ..
            })
        )
    }

    pub fn parent_links(&self) -> &[ParentLink] {
        match &self.payload {
            TrackerPayload::Simulated(link) => &link.parent_links,
            TrackerPayload::DesignTime => &[],
        }
    }

    pub fn segments_alive(&self, world: &World) -> bool {
        is_segment(world, self.points[0].segment) && is_segment(world, self.points[1].segment)
    }

    /// Claim both points and report the new link.
    ///
    /// Two docking-interface reference points are only tracked; the docking
    /// subsystem joins them. Returns false if either segment is gone.
    pub fn link(&mut self, world: &mut World, notes: &mut Notifications, assembly: Option<AssemblyId>) -> bool {
        if self.state != TrackerState::Unlinked {
            return self.state != TrackerState::Destroyed;
        }
        if !self.segments_alive(world) {
            log::debug!("Link {:?} abandoned: segment missing", self.segments());
            self.state = TrackerState::Destroyed;
            return false;
        }
        if is_docking_reference(world, self.points[0]) && is_docking_reference(world, self.points[1]) {
            self.state = TrackerState::TrackingDocking;
            return true;
        }

        let [a, b] = self.points;
        // Mutual occupancy already present (loaded data) is adopted as-is
        self.prior = [
            occupant(world, a).filter(|&o| o != b.segment),
            occupant(world, b).filter(|&o| o != a.segment),
        ];
        set_occupant(world, a, Some(b.segment));
        set_occupant(world, b, Some(a.segment));

        if let TrackerPayload::Simulated(link) = &mut self.payload {
            link.parent_links = [a.segment, b.segment]
                .into_iter()
                .filter_map(|s| official_edge_of(world, s))
                .collect();
        }

        self.state = TrackerState::Linked;
        notes.link_formed(assembly, a.segment, b.segment);
        log::debug!("Linked {:?} <-> {:?}", a, b);
        true
    }

    /// Join the two bodies physically.
    ///
    /// With `packed` the constraint is left pending. A failed creation is
    /// logged and left for the next deferred pass to clean up.
    pub fn create_constraint(&mut self, world: &mut World, packed: bool) {
        if self.state != TrackerState::Linked {
            return;
        }
        let (a, b) = self.segments();
        let TrackerPayload::Simulated(link) = &mut self.payload else {
            return;
        };
        if packed {
            link.constraint = ConstraintSlot::Pending;
            return;
        }
        match create_constraint(world, a, b, ConstraintParams::implicit_link()) {
            Ok(handle) => {
                link.constraint = ConstraintSlot::Active(handle);
                self.state = TrackerState::Constrained;
            }
            Err(e) => {
                log::error!("Constraint between {:?} and {:?} failed: {}", a, b, e);
                link.constraint = ConstraintSlot::Failed;
            }
        }
    }

    /// Does the link still physically hold?
    pub fn is_link_created(&self, world: &World) -> bool {
        match (&self.state, &self.payload) {
            (TrackerState::Destroyed | TrackerState::Unlinked, _) => false,
            (TrackerState::TrackingDocking, _) => true,
            (_, TrackerPayload::DesignTime) => true,
            (_, TrackerPayload::Simulated(link)) => match link.constraint {
                ConstraintSlot::Active(handle) => constraint_alive(world, handle),
                ConstraintSlot::Pending => true,
                ConstraintSlot::None | ConstraintSlot::Failed => false,
            },
        }
    }

    /// Has a separation device covering either tracked point fired since
    /// linking? Devices on other points of the endpoints do not count.
    pub fn fired_device(&mut self, world: &World) -> bool {
        let TrackerPayload::Simulated(link) = &mut self.payload else {
            return false;
        };
        let points = self.points;
        let devices = link.devices.get_or_insert_with(|| collect_devices(world, &points));
        devices.iter().any(|d| {
            world
                .get::<&SeparationDevices>(d.segment)
                .ok()
                .and_then(|devs| devs.devices.get(d.index).map(|dev| dev.fired))
                .unwrap_or(false)
        })
    }

    /// Is either docking interface now paired with a third segment?
    pub fn docking_partnered_elsewhere(&self, world: &World) -> bool {
        let (a, b) = self.segments();
        [(a, b), (b, a)].into_iter().any(|(port, other)| {
            world
                .get::<&DockingInterface>(port)
                .ok()
                .and_then(|d| d.partner)
                .is_some_and(|partner| partner != other)
        })
    }

    /// The link became an official edge: drop the constraint but leave the
    /// occupancy to the tree.
    pub fn dissolve(&mut self, world: &mut World, notes: &mut Notifications, assembly: Option<AssemblyId>) {
        if self.state == TrackerState::Destroyed {
            return;
        }
        let announced = self.announced();
        self.release_constraint(world);
        self.state = TrackerState::Destroyed;
        if announced {
            let (a, b) = self.segments();
            notes.link_broken(assembly, a, b);
        }
        log::debug!("Dissolved {:?} into the official tree", self.segments());
    }

    /// Tear the link down: constraint removed, points restored.
    pub fn destroy(&mut self, world: &mut World, notes: &mut Notifications, assembly: Option<AssemblyId>) {
        if self.state == TrackerState::Destroyed {
            return;
        }
        let announced = self.announced();
        self.release_constraint(world);

        if announced {
            let [a, b] = self.points;
            for (point, other, prior) in [(a, b.segment, self.prior[0]), (b, a.segment, self.prior[1])] {
                if occupant(world, point) == Some(other) {
                    set_occupant(world, point, prior);
                }
            }
        }

        if let TrackerPayload::Simulated(link) = &mut self.payload {
            link.devices = None;
        }
        self.state = TrackerState::Destroyed;
        if announced {
            let (a, b) = self.segments();
            notes.link_broken(assembly, a, b);
        }
        log::debug!("Destroyed link {:?}", self.segments());
    }

    /// Was a formed-link notification sent for this tracker?
    fn announced(&self) -> bool {
        matches!(self.state, TrackerState::Linked | TrackerState::Constrained)
    }

    fn release_constraint(&mut self, world: &mut World) {
        if let TrackerPayload::Simulated(link) = &mut self.payload {
            if let ConstraintSlot::Active(handle) = link.constraint {
                destroy_constraint(world, handle);
            }
            link.constraint = ConstraintSlot::None;
        }
    }
}

fn occupant(world: &World, point: PointRef) -> Option<Entity> {
    world
        .get::<&AttachPoints>(point.segment)
        .ok()
        .and_then(|p| p.get(point.index).and_then(|p| p.occupied_by))
}

fn set_occupant(world: &mut World, point: PointRef, occupant: Option<Entity>) {
    if let Ok(mut points) = world.get::<&mut AttachPoints>(point.segment) {
        if let Some(p) = points.get_mut(point.index) {
            p.occupied_by = occupant;
        }
    }
}

fn is_docking_reference(world: &World, point: PointRef) -> bool {
    world
        .get::<&DockingInterface>(point.segment)
        .map(|d| d.reference_point == Some(point.index))
        .unwrap_or(false)
}

/// The official edge from `segment` to its parent, as a pair of points.
fn official_edge_of(world: &World, segment: Entity) -> Option<ParentLink> {
    let parent = parent_of(world, segment)?;
    let child_index = world.get::<&AttachPoints>(segment).ok()?.index_linked_to(parent)?;
    let parent_index = world.get::<&AttachPoints>(parent).ok()?.index_linked_to(segment)?;
    Some(ParentLink {
        child: PointRef::new(segment, child_index),
        parent: PointRef::new(parent, parent_index),
    })
}

/// Devices that are omni or sit on one of the tracked points.
fn collect_devices(world: &World, points: &[PointRef]) -> Vec<DeviceRef> {
    let mut out = Vec::new();
    for point in points {
        if let Ok(devices) = world.get::<&SeparationDevices>(point.segment) {
            out.extend(
                devices
                    .devices
                    .iter()
                    .enumerate()
                    .filter(|(_, dev)| dev.covers(point.index))
                    .map(|(index, _)| DeviceRef { segment: point.segment, index }),
            );
        }
    }
    out
}
