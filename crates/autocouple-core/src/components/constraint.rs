//! Physical constraint components.
//!
//! A constraint is its own entity holding the two bodies it binds. The
//! physics host removes the entity when the constraint breaks.

use super::devices::RigidBody;
use hecs::Entity;
use serde::{Deserialize, Serialize};

/// Spring drive for one set of axes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointDrive {
    pub spring: f32,
    pub damper: f32,
    pub max_force: f32,
}

/// 6-DOF joint configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstraintParams {
    /// Drive on the three translation axes
    pub linear: JointDrive,
    /// Drive on the three rotation axes
    pub angular: JointDrive,
    /// Soft angular limit in degrees, applied on every rotation axis
    pub angular_limit: f32,
    pub break_force: f32,
    pub break_torque: f32,
    pub enable_collision: bool,
}

impl ConstraintParams {
    /// Near-rigid joint for an implicit link. Never breaks under load.
    ///
    /// The angular limit stops short of 180° to keep the solver off its
    /// singular configuration.
    pub fn implicit_link() -> Self {
        Self {
            linear: JointDrive {
                spring: 1e20,
                damper: 0.0,
                max_force: 1e20,
            },
            angular: JointDrive {
                spring: 60_000.0,
                damper: 0.0,
                max_force: 1e20,
            },
            angular_limit: 177.0,
            break_force: f32::INFINITY,
            break_torque: f32::INFINITY,
            enable_collision: false,
        }
    }

    /// Joint for an official tree edge: breaks at the weaker body's limits.
    pub fn official_link(a: &RigidBody, b: &RigidBody) -> Self {
        Self {
            break_force: a.break_force.min(b.break_force),
            break_torque: a.break_torque.min(b.break_torque),
            ..Self::implicit_link()
        }
    }

    pub fn is_unbreakable(&self) -> bool {
        self.break_force.is_infinite() && self.break_torque.is_infinite()
    }
}

/// Constraint entity component
#[derive(Debug, Clone, Copy)]
pub struct PhysicalConstraint {
    /// Body the joint is attached to (the link's first segment)
    pub connected: Entity,
    /// Body carrying the joint (the link's second segment)
    pub owner: Entity,
    pub params: ConstraintParams,
}

impl PhysicalConstraint {
    pub fn binds(&self, segment: Entity) -> bool {
        self.connected == segment || self.owner == segment
    }
}
