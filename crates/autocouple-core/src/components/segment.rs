//! Segment structure components: Segment, AttachPoint, PointRef.

use super::common::AssemblyId;
use autocouple_logic::geometry::Vec3;
use hecs::Entity;
use serde::{Deserialize, Serialize};

/// Segment component - a rigid body in an assembly tree
#[derive(Debug, Clone)]
pub struct Segment {
    pub name: String,
    /// Official tree edge; `None` for the root
    pub parent: Option<Entity>,
    /// Assembly this segment currently belongs to
    pub assembly: AssemblyId,
}

impl Segment {
    pub fn new(name: impl Into<String>, assembly: AssemblyId) -> Self {
        Self {
            name: name.into(),
            parent: None,
            assembly,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// End-to-end stacking point
    Stack,
    /// Surface mount; never auto-linked
    Surface,
    /// Host-specific point (docking reference, etc.)
    Special,
}

/// Points whose id starts with this are internal to a staging shroud.
pub const INTERSTAGE_PREFIX: &str = "interstage";

/// A connection point on a segment
#[derive(Debug, Clone)]
pub struct AttachPoint {
    pub id: String,
    /// Offset in the owning segment's frame
    pub position: Vec3,
    /// Outward normal in the owning segment's frame
    pub orientation: Vec3,
    pub kind: NodeKind,
    /// Segment this point is linked to, officially or implicitly
    pub occupied_by: Option<Entity>,
    /// Back-reference to the owning segment
    pub owner: Option<Entity>,
}

impl AttachPoint {
    pub fn new(id: impl Into<String>, position: Vec3, orientation: Vec3, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            position,
            orientation,
            kind,
            occupied_by: None,
            owner: None,
        }
    }

    pub fn stack(id: impl Into<String>, position: Vec3, orientation: Vec3) -> Self {
        Self::new(id, position, orientation, NodeKind::Stack)
    }

    pub fn surface(id: impl Into<String>, position: Vec3, orientation: Vec3) -> Self {
        Self::new(id, position, orientation, NodeKind::Surface)
    }

    pub fn is_free(&self) -> bool {
        self.occupied_by.is_none()
    }

    pub fn is_interstage(&self) -> bool {
        self.id.starts_with(INTERSTAGE_PREFIX)
    }
}

/// All attach points of a segment, in declaration order
#[derive(Debug, Clone, Default)]
pub struct AttachPoints {
    pub points: Vec<AttachPoint>,
}

impl AttachPoints {
    pub fn new(points: Vec<AttachPoint>) -> Self {
        Self { points }
    }

    pub fn get(&self, index: usize) -> Option<&AttachPoint> {
        self.points.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut AttachPoint> {
        self.points.get_mut(index)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.points.iter().position(|p| p.id == id)
    }

    /// Index of the first point occupied by `other`.
    pub fn index_linked_to(&self, other: Entity) -> Option<usize> {
        self.points.iter().position(|p| p.occupied_by == Some(other))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Stable address of one attach point: owning segment + index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PointRef {
    pub segment: Entity,
    pub index: usize,
}

impl PointRef {
    pub fn new(segment: Entity, index: usize) -> Self {
        Self { segment, index }
    }
}

/// Unordered pair of segments, stored smallest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentPair(Entity, Entity);

impl SegmentPair {
    pub fn new(a: Entity, b: Entity) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    pub fn first(&self) -> Entity {
        self.0
    }

    pub fn second(&self) -> Entity {
        self.1
    }

    pub fn contains(&self, segment: Entity) -> bool {
        self.0 == segment || self.1 == segment
    }

    /// The member that is not `segment`, if `segment` is a member.
    pub fn other(&self, segment: Entity) -> Option<Entity> {
        if self.0 == segment {
            Some(self.1)
        } else if self.1 == segment {
            Some(self.0)
        } else {
            None
        }
    }
}
