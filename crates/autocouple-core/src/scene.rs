//! Host scene - the segment trees the coupling engine observes
//!
//! `Scene` plays the part of the host simulation: it owns the `hecs` world,
//! hands out assembly ids, and performs the official tree mutations (attach,
//! detach, couple, destroy, separation, docking). Each mutation keeps
//! attach-point occupancy, assembly membership and resource groups
//! consistent. It never touches implicit links; the host is expected to
//! forward the matching notification to the `CouplingEngine` afterwards.

use crate::components::*;
use crate::systems::*;
use autocouple_logic::pairing::PointPose;
use hecs::{Entity, World};
use std::collections::{BTreeSet, HashMap};

/// Errors from invalid host operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    NoSuchSegment(Entity),
    NoSuchPoint(PointRef),
    PointOccupied(PointRef),
    /// The child already has an official parent
    AlreadyAttached(Entity),
    WouldCreateCycle,
    NotAttached(Entity),
    NoSuchDevice { segment: Entity, index: usize },
    NotDockable(Entity),
    NoSuchConstraint(Entity),
}

impl std::fmt::Display for SceneError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SceneError::NoSuchSegment(e) => write!(f, "no segment {:?}", e),
            SceneError::NoSuchPoint(p) => write!(f, "no attach point {} on {:?}", p.index, p.segment),
            SceneError::PointOccupied(p) => write!(f, "attach point {} on {:?} is occupied", p.index, p.segment),
            SceneError::AlreadyAttached(e) => write!(f, "segment {:?} already has a parent", e),
            SceneError::WouldCreateCycle => write!(f, "attachment would create a cycle"),
            SceneError::NotAttached(e) => write!(f, "segment {:?} has no parent", e),
            SceneError::NoSuchDevice { segment, index } => {
                write!(f, "no separation device {} on {:?}", index, segment)
            }
            SceneError::NotDockable(e) => write!(f, "segment {:?} has no docking interface", e),
            SceneError::NoSuchConstraint(e) => write!(f, "no constraint {:?}", e),
        }
    }
}

impl std::error::Error for SceneError {}

/// Everything needed to spawn one segment
#[derive(Debug, Clone)]
pub struct SegmentSpec {
    pub name: String,
    pub transform: Transform,
    pub points: Vec<AttachPoint>,
    pub capabilities: Capabilities,
    pub devices: Vec<SeparationDevice>,
    pub docking: Option<DockingInterface>,
    pub cargo_bay: Option<CargoBay>,
    pub body: RigidBody,
}

impl SegmentSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Transform::default(),
            points: Vec::new(),
            capabilities: Capabilities::new(),
            devices: Vec::new(),
            docking: None,
            cargo_bay: None,
            body: RigidBody::default(),
        }
    }

    pub fn at(mut self, x: f32, y: f32, z: f32) -> Self {
        self.transform.pose.position = Vec3::new(x, y, z);
        self
    }

    pub fn rotated(mut self, rotation: Quat) -> Self {
        self.transform.pose.rotation = rotation;
        self
    }

    pub fn point(mut self, point: AttachPoint) -> Self {
        self.points.push(point);
        self
    }

    /// Stack point at `offset` facing `normal`
    pub fn stack(self, id: &str, offset: Vec3, normal: Vec3) -> Self {
        self.point(AttachPoint::stack(id, offset, normal))
    }

    pub fn capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn device(mut self, device: SeparationDevice) -> Self {
        self.devices.push(device);
        self.capability(Capability::SeparationDevice)
    }

    /// Docking interface whose reference is point `index`
    pub fn docking(mut self, index: usize) -> Self {
        self.docking = Some(DockingInterface::new(index));
        self.capability(Capability::DockingInterface)
    }

    pub fn cargo_bay(mut self, bay: CargoBay) -> Self {
        self.cargo_bay = Some(bay);
        self.capability(Capability::CargoBay)
    }

    pub fn body(mut self, body: RigidBody) -> Self {
        self.body = body;
        self
    }
}

/// Result of a constraint breaking under load
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrokenConstraint {
    pub connected: Entity,
    pub owner: Entity,
    /// New assembly when the constraint was an official edge
    pub split: Option<AssemblyId>,
}

/// The host world of segments and assemblies
pub struct Scene {
    /// ECS world containing segments and constraints
    pub world: World,
    /// Physics runs in this scene (false for a construction scene)
    simulated: bool,
    next_assembly: u32,
    packed: BTreeSet<AssemblyId>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    /// A live-simulation scene: new segments get rigid bodies.
    pub fn new() -> Self {
        Self {
            world: World::new(),
            simulated: true,
            next_assembly: 1,
            packed: BTreeSet::new(),
        }
    }

    /// A construction scene: no physics, links are bookkeeping only.
    pub fn design_time() -> Self {
        Self {
            simulated: false,
            ..Self::new()
        }
    }

    pub fn context(&self) -> LinkContext {
        if self.simulated {
            LinkContext::Simulated
        } else {
            LinkContext::DesignTime
        }
    }

    fn allocate_assembly(&mut self) -> AssemblyId {
        let id = AssemblyId(self.next_assembly);
        self.next_assembly += 1;
        id
    }

    /// Spawn a segment as the root of a new assembly.
    pub fn spawn_segment(&mut self, spec: SegmentSpec) -> Entity {
        let assembly = self.allocate_assembly();
        let entity = self.world.spawn((
            Segment::new(spec.name, assembly),
            spec.transform,
            AttachPoints::new(spec.points),
            spec.capabilities,
        ));
        self.finish_spawn(entity, spec.devices, spec.docking, spec.cargo_bay, spec.body);
        entity
    }

    fn finish_spawn(
        &mut self,
        entity: Entity,
        devices: Vec<SeparationDevice>,
        docking: Option<DockingInterface>,
        cargo_bay: Option<CargoBay>,
        body: RigidBody,
    ) {
        let _ = self.world.insert_one(entity, ResourceGroup(entity.id()));
        if !devices.is_empty() {
            let _ = self.world.insert_one(entity, SeparationDevices::new(devices));
        }
        if let Some(port) = docking {
            let _ = self.world.insert_one(entity, port);
        }
        if let Some(bay) = cargo_bay {
            let _ = self.world.insert_one(entity, bay);
        }
        if self.simulated {
            let _ = self.world.insert_one(entity, body);
        }
        if let Ok(mut points) = self.world.get::<&mut AttachPoints>(entity) {
            for point in points.points.iter_mut() {
                point.owner = Some(entity);
            }
        }
    }

    pub fn contains(&self, segment: Entity) -> bool {
        is_segment(&self.world, segment)
    }

    pub fn name(&self, segment: Entity) -> Option<String> {
        self.world.get::<&Segment>(segment).ok().map(|s| s.name.clone())
    }

    pub fn parent(&self, segment: Entity) -> Option<Entity> {
        parent_of(&self.world, segment)
    }

    pub fn assembly(&self, segment: Entity) -> Option<AssemblyId> {
        assembly_of(&self.world, segment)
    }

    pub fn assemblies(&self) -> Vec<AssemblyId> {
        live_assemblies(&self.world)
    }

    pub fn assembly_exists(&self, assembly: AssemblyId) -> bool {
        self.world.query::<&Segment>().iter().any(|(_, s)| s.assembly == assembly)
    }

    pub fn assembly_segments(&self, assembly: AssemblyId) -> Vec<Entity> {
        assembly_segments(&self.world, assembly)
    }

    /// Copy of an attach point.
    pub fn point(&self, point: PointRef) -> Option<AttachPoint> {
        let points = self.world.get::<&AttachPoints>(point.segment).ok()?;
        points.get(point.index).cloned()
    }

    pub fn occupant(&self, point: PointRef) -> Option<Entity> {
        self.point(point).and_then(|p| p.occupied_by)
    }

    pub fn point_pose(&self, point: PointRef) -> Option<PointPose> {
        point_pose(&self.world, point)
    }

    pub fn set_transform(&mut self, segment: Entity, transform: Transform) -> Result<(), SceneError> {
        let mut current = self
            .world
            .get::<&mut Transform>(segment)
            .map_err(|_| SceneError::NoSuchSegment(segment))?;
        *current = transform;
        Ok(())
    }

    fn require_point(&self, point: PointRef) -> Result<AttachPoint, SceneError> {
        if !self.contains(point.segment) {
            return Err(SceneError::NoSuchSegment(point.segment));
        }
        self.point(point).ok_or(SceneError::NoSuchPoint(point))
    }

    fn set_occupant(&mut self, point: PointRef, occupant: Option<Entity>) {
        if let Ok(mut points) = self.world.get::<&mut AttachPoints>(point.segment) {
            if let Some(p) = points.get_mut(point.index) {
                p.occupied_by = occupant;
            }
        }
    }

    fn set_parent(&mut self, segment: Entity, parent: Option<Entity>) {
        if let Ok(mut seg) = self.world.get::<&mut Segment>(segment) {
            seg.parent = parent;
        }
    }

    fn move_to_assembly(&mut self, segments: &[Entity], assembly: AssemblyId) {
        let packed = self.packed.contains(&assembly);
        for &segment in segments {
            if let Ok(mut seg) = self.world.get::<&mut Segment>(segment) {
                seg.assembly = assembly;
            }
            self.sync_body(segment, packed);
        }
    }

    fn sync_body(&mut self, segment: Entity, packed: bool) {
        let has_body = self.world.get::<&RigidBody>(segment).is_ok();
        if self.simulated && !packed && !has_body {
            let _ = self.world.insert_one(segment, RigidBody::default());
        } else if (packed || !self.simulated) && has_body {
            let _ = self.world.remove_one::<RigidBody>(segment);
        }
    }

    /// Official attach: `child` (a tree root) hangs off `parent`.
    ///
    /// Both points become occupied by each other's segment. A point already
    /// occupied by the other side (an implicit link being made official) is
    /// accepted.
    pub fn attach(&mut self, child: PointRef, parent: PointRef) -> Result<(), SceneError> {
        let child_point = self.require_point(child)?;
        let parent_point = self.require_point(parent)?;
        if child.segment == parent.segment || root_of(&self.world, parent.segment) == child.segment {
            return Err(SceneError::WouldCreateCycle);
        }
        if self.parent(child.segment).is_some() {
            return Err(SceneError::AlreadyAttached(child.segment));
        }
        if child_point.occupied_by.is_some_and(|o| o != parent.segment) {
            return Err(SceneError::PointOccupied(child));
        }
        if parent_point.occupied_by.is_some_and(|o| o != child.segment) {
            return Err(SceneError::PointOccupied(parent));
        }

        let old_assembly = self.assembly(child.segment);
        let target = self.assembly(parent.segment).ok_or(SceneError::NoSuchSegment(parent.segment))?;

        self.set_parent(child.segment, Some(parent.segment));
        self.set_occupant(child, Some(parent.segment));
        self.set_occupant(parent, Some(child.segment));
        let moved = subtree(&self.world, child.segment);
        self.move_to_assembly(&moved, target);
        if let Some(old) = old_assembly {
            self.packed.remove(&old);
        }

        let bodies = (
            self.world.get::<&RigidBody>(parent.segment).ok().map(|b| *b),
            self.world.get::<&RigidBody>(child.segment).ok().map(|b| *b),
        );
        if let (Some(pb), Some(cb)) = bodies {
            let params = ConstraintParams::official_link(&pb, &cb);
            if let Err(e) = create_constraint(&mut self.world, parent.segment, child.segment, params) {
                log::error!("Official joint {:?} -> {:?} failed: {}", child.segment, parent.segment, e);
            }
        }

        unify(&mut self.world, parent.segment, child.segment);
        Ok(())
    }

    /// Sever `child` from its parent. The child's subtree becomes a new
    /// assembly, which is returned.
    pub fn detach(&mut self, child: Entity) -> Result<AssemblyId, SceneError> {
        let parent = self.parent(child).ok_or(SceneError::NotAttached(child))?;
        let old_assembly = self.assembly(child).ok_or(SceneError::NoSuchSegment(child))?;

        if let Some(index) = self.linked_index(child, parent) {
            self.set_occupant(PointRef::new(child, index), None);
        }
        if let Some(index) = self.linked_index(parent, child) {
            self.set_occupant(PointRef::new(parent, index), None);
        }
        if let Some(handle) = official_constraint_between(&self.world, parent, child) {
            destroy_constraint(&mut self.world, handle);
        }
        self.set_parent(child, None);

        let new_assembly = self.allocate_assembly();
        if self.packed.contains(&old_assembly) {
            self.packed.insert(new_assembly);
        }
        let moved = subtree(&self.world, child);
        self.move_to_assembly(&moved, new_assembly);

        for assembly in [old_assembly, new_assembly] {
            let segments = self.assembly_segments(assembly);
            rebuild_groups(&mut self.world, &segments, &[]);
        }
        Ok(new_assembly)
    }

    fn linked_index(&self, segment: Entity, other: Entity) -> Option<usize> {
        self.world
            .get::<&AttachPoints>(segment)
            .ok()
            .and_then(|p| p.index_linked_to(other))
    }

    /// Make `new_root` the root of its tree by reversing the edges above it.
    pub fn reroot(&mut self, new_root: Entity) {
        let mut chain = vec![new_root];
        let mut current = new_root;
        while let Some(parent) = self.parent(current) {
            if chain.contains(&parent) {
                log::error!("Cycle while re-rooting at {:?}", new_root);
                break;
            }
            chain.push(parent);
            current = parent;
        }
        for pair in chain.windows(2) {
            self.set_parent(pair[1], Some(pair[0]));
        }
        self.set_parent(new_root, None);
    }

    /// Join two assemblies: re-root the moving tree at `moving` and attach
    /// it to `target`.
    pub fn couple(&mut self, moving: PointRef, target: PointRef) -> Result<(), SceneError> {
        self.require_point(moving)?;
        self.require_point(target)?;
        if self.assembly(moving.segment) == self.assembly(target.segment) {
            return Err(SceneError::WouldCreateCycle);
        }
        self.reroot(moving.segment);
        self.attach(moving, target)
    }

    /// Remove a segment. Each child becomes the root of a new assembly;
    /// the new assemblies are returned.
    pub fn destroy_segment(&mut self, segment: Entity) -> Result<Vec<AssemblyId>, SceneError> {
        if !self.contains(segment) {
            return Err(SceneError::NoSuchSegment(segment));
        }
        let mut created = Vec::new();
        for child in children_of(&self.world, segment) {
            created.push(self.detach(child)?);
        }
        if self.parent(segment).is_some() {
            self.detach(segment)?;
        }

        for (_, points) in self.world.query_mut::<&mut AttachPoints>() {
            for point in points.points.iter_mut() {
                if point.occupied_by == Some(segment) {
                    point.occupied_by = None;
                }
            }
        }
        for handle in constraints_binding(&self.world, segment) {
            destroy_constraint(&mut self.world, handle);
        }
        let _ = self.world.despawn(segment);
        Ok(created)
    }

    /// Fire separation device `index` on `segment`.
    ///
    /// Severs the official edge at the device's point, or every official
    /// edge of the segment for an omni device. Returns new assemblies.
    pub fn fire_separation_device(&mut self, segment: Entity, index: usize) -> Result<Vec<AssemblyId>, SceneError> {
        let device = {
            let mut devices = self
                .world
                .get::<&mut SeparationDevices>(segment)
                .map_err(|_| SceneError::NoSuchDevice { segment, index })?;
            let device = devices
                .devices
                .get_mut(index)
                .ok_or(SceneError::NoSuchDevice { segment, index })?;
            device.fired = true;
            *device
        };

        let mut severed = Vec::new();
        if device.omni {
            if self.parent(segment).is_some() {
                severed.push(self.detach(segment)?);
            }
            for child in children_of(&self.world, segment) {
                severed.push(self.detach(child)?);
            }
        } else if let Some(point) = device.point {
            if let Some(other) = self.occupant(PointRef::new(segment, point)) {
                if self.parent(segment) == Some(other) {
                    severed.push(self.detach(segment)?);
                } else if self.parent(other) == Some(segment) {
                    severed.push(self.detach(other)?);
                }
            }
        }
        Ok(severed)
    }

    pub fn is_packed(&self, assembly: AssemblyId) -> bool {
        self.packed.contains(&assembly)
    }

    /// Stop simulating an assembly: its segments lose their rigid bodies.
    pub fn pack(&mut self, assembly: AssemblyId) {
        self.packed.insert(assembly);
        for segment in self.assembly_segments(assembly) {
            self.sync_body(segment, true);
        }
    }

    pub fn unpack(&mut self, assembly: AssemblyId) {
        self.packed.remove(&assembly);
        for segment in self.assembly_segments(assembly) {
            self.sync_body(segment, false);
        }
    }

    /// The physics host reports a constraint exceeding its limits.
    ///
    /// A broken official edge detaches the child side.
    pub fn break_constraint(&mut self, handle: Entity) -> Result<BrokenConstraint, SceneError> {
        let constraint = constraint_of(&self.world, handle).ok_or(SceneError::NoSuchConstraint(handle))?;
        destroy_constraint(&mut self.world, handle);

        let (a, b) = (constraint.connected, constraint.owner);
        let child = if self.parent(b) == Some(a) {
            Some(b)
        } else if self.parent(a) == Some(b) {
            Some(a)
        } else {
            None
        };
        let split = match child {
            Some(child) if !constraint.params.is_unbreakable() => Some(self.detach(child)?),
            _ => None,
        };
        Ok(BrokenConstraint {
            connected: a,
            owner: b,
            split,
        })
    }

    /// Pair two docking interfaces.
    pub fn dock(&mut self, a: Entity, b: Entity) -> Result<(), SceneError> {
        for port in [a, b] {
            if self.world.get::<&DockingInterface>(port).is_err() {
                return Err(SceneError::NotDockable(port));
            }
        }
        for (port, partner) in [(a, b), (b, a)] {
            if let Ok(mut iface) = self.world.get::<&mut DockingInterface>(port) {
                iface.partner = Some(partner);
            }
        }
        Ok(())
    }

    /// Release a docking interface and its partner.
    pub fn undock(&mut self, port: Entity) -> Result<(), SceneError> {
        let partner = {
            let mut iface = self
                .world
                .get::<&mut DockingInterface>(port)
                .map_err(|_| SceneError::NotDockable(port))?;
            iface.partner.take()
        };
        if let Some(partner) = partner {
            if let Ok(mut other) = self.world.get::<&mut DockingInterface>(partner) {
                if other.partner == Some(port) {
                    other.partner = None;
                }
            }
        }
        Ok(())
    }

    /// Duplicate the subtree under `root` as a new assembly.
    ///
    /// Edges and occupancy inside the subtree are remapped to the copies and
    /// the copied root's edge to the original parent is dropped. Any other
    /// occupancy pointing outside the subtree is copied unchanged, leaving
    /// stale references for the engine's copy handling to clear.
    pub fn copy_subtree(&mut self, root: Entity) -> Result<Vec<Entity>, SceneError> {
        let originals = subtree(&self.world, root);
        if originals.is_empty() {
            return Err(SceneError::NoSuchSegment(root));
        }
        let assembly = self.allocate_assembly();

        let mut mapping: HashMap<Entity, Entity> = HashMap::new();
        let mut copies = Vec::with_capacity(originals.len());
        for &original in &originals {
            let spec = self.spec_of(original)?;
            let body = spec.body;
            let mut segment = Segment::new(spec.name, assembly);
            segment.parent = self.parent(original);
            let copy = self.world.spawn((
                segment,
                spec.transform,
                AttachPoints::new(spec.points),
                spec.capabilities,
            ));
            self.finish_spawn(copy, spec.devices, spec.docking, spec.cargo_bay, body);
            mapping.insert(original, copy);
            copies.push(copy);
        }

        for &copy in &copies {
            if let Ok(mut seg) = self.world.get::<&mut Segment>(copy) {
                seg.parent = if copy == mapping[&root] {
                    None
                } else {
                    seg.parent.map(|p| mapping.get(&p).copied().unwrap_or(p))
                };
            }
            if let Ok(mut points) = self.world.get::<&mut AttachPoints>(copy) {
                for point in points.points.iter_mut() {
                    if let Some(occupant) = point.occupied_by {
                        if let Some(&mapped) = mapping.get(&occupant) {
                            point.occupied_by = Some(mapped);
                        }
                    }
                }
            }
        }
        // The copy's root point toward the original parent is not an edge
        if let Some(parent) = self.parent(root) {
            if let Some(index) = self.linked_index(mapping[&root], parent) {
                self.set_occupant(PointRef::new(mapping[&root], index), None);
            }
        }

        rebuild_groups(&mut self.world, &copies, &[]);
        Ok(copies)
    }

    fn spec_of(&self, segment: Entity) -> Result<SegmentSpec, SceneError> {
        let seg = self
            .world
            .get::<&Segment>(segment)
            .map_err(|_| SceneError::NoSuchSegment(segment))?;
        let mut spec = SegmentSpec::new(seg.name.clone());
        drop(seg);
        if let Ok(t) = self.world.get::<&Transform>(segment) {
            spec.transform = *t;
        }
        if let Ok(points) = self.world.get::<&AttachPoints>(segment) {
            spec.points = points.points.clone();
        }
        if let Ok(caps) = self.world.get::<&Capabilities>(segment) {
            spec.capabilities = (*caps).clone();
        }
        if let Ok(devices) = self.world.get::<&SeparationDevices>(segment) {
            spec.devices = devices.devices.clone();
        }
        if let Ok(port) = self.world.get::<&DockingInterface>(segment) {
            spec.docking = Some(DockingInterface {
                reference_point: port.reference_point,
                partner: None,
            });
        }
        if let Ok(bay) = self.world.get::<&CargoBay>(segment) {
            spec.cargo_bay = Some((*bay).clone());
        }
        if let Ok(body) = self.world.get::<&RigidBody>(segment) {
            spec.body = *body;
        }
        Ok(spec)
    }
}
