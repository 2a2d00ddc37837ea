//! Common components used across segment and constraint entities.

use autocouple_logic::geometry::{Pose, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Identity of an assembly (a connected tree of segments).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssemblyId(pub u32);

impl std::fmt::Display for AssemblyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "assembly#{}", self.0)
    }
}

/// World-space placement of a segment.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Transform {
    pub pose: Pose,
}

impl Transform {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self {
            pose: Pose::new(position, rotation),
        }
    }

    pub fn at(x: f32, y: f32, z: f32) -> Self {
        Self {
            pose: Pose::at(Vec3::new(x, y, z)),
        }
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.pose.rotation = rotation;
        self
    }
}

/// Which simulation is hosting the links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkContext {
    /// Construction/editor scene: no physics, links are bookkeeping only
    DesignTime,
    /// Live simulation: links carry a physical constraint
    Simulated,
}

/// Membership in a resource-sharing set, labelled by a segment id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceGroup(pub u32);
