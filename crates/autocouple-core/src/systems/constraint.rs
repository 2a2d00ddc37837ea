//! Physical constraint primitive
//!
//! Constraints are entities carrying a [`PhysicalConstraint`]. Creating one
//! requires both segments to exist and be simulated (carry a [`RigidBody`]).

use crate::components::{ConstraintParams, PhysicalConstraint, RigidBody, Segment};
use hecs::{Entity, World};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintError {
    /// Endpoint is not a live segment
    MissingSegment(Entity),
    /// Endpoint is not physically simulated
    MissingBody(Entity),
}

impl std::fmt::Display for ConstraintError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstraintError::MissingSegment(e) => write!(f, "segment {:?} does not exist", e),
            ConstraintError::MissingBody(e) => write!(f, "segment {:?} has no rigid body", e),
        }
    }
}

impl std::error::Error for ConstraintError {}

/// Join `owner` to `connected` with a new constraint entity.
pub fn create_constraint(
    world: &mut World,
    connected: Entity,
    owner: Entity,
    params: ConstraintParams,
) -> Result<Entity, ConstraintError> {
    for segment in [connected, owner] {
        if world.get::<&Segment>(segment).is_err() {
            return Err(ConstraintError::MissingSegment(segment));
        }
        if world.get::<&RigidBody>(segment).is_err() {
            return Err(ConstraintError::MissingBody(segment));
        }
    }
    Ok(world.spawn((PhysicalConstraint {
        connected,
        owner,
        params,
    },)))
}

/// Returns false if the constraint was already gone.
pub fn destroy_constraint(world: &mut World, handle: Entity) -> bool {
    if !constraint_alive(world, handle) {
        return false;
    }
    world.despawn(handle).is_ok()
}

pub fn constraint_alive(world: &World, handle: Entity) -> bool {
    world.get::<&PhysicalConstraint>(handle).is_ok()
}

pub fn constraint_of(world: &World, handle: Entity) -> Option<PhysicalConstraint> {
    world.get::<&PhysicalConstraint>(handle).ok().map(|c| *c)
}

/// Every constraint with `segment` at either end.
pub fn constraints_binding(world: &World, segment: Entity) -> Vec<Entity> {
    let mut handles: Vec<Entity> = world
        .query::<&PhysicalConstraint>()
        .iter()
        .filter(|(_, c)| c.binds(segment))
        .map(|(e, _)| e)
        .collect();
    handles.sort_by_key(|e| e.id());
    handles
}

/// A breakable constraint joining exactly `a` and `b`.
pub fn official_constraint_between(world: &World, a: Entity, b: Entity) -> Option<Entity> {
    world
        .query::<&PhysicalConstraint>()
        .iter()
        .find(|(_, c)| c.binds(a) && c.binds(b) && !c.params.is_unbreakable())
        .map(|(e, _)| e)
}
