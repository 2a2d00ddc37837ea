//! Free attach point catalog
//!
//! Lists the attach points of a segment that may take part in a new
//! implicit link. A point is never offered when it is:
//!
//! | Rule | Context |
//! |------|---------|
//! | a surface mount | always |
//! | already occupied | always |
//! | internal to a staging shroud (`interstage*`) | always |
//! | a cargo-bay inner boundary | always |
//! | severed by a fired separation device (omni: the whole segment) | simulated |
//! | the reference point of a paired docking interface | simulated |
//! | on a robotic joint segment | simulated |
//!
//! Points with a missing owner back-reference are repaired in place.

use crate::components::*;
use crate::systems::tree::subtree;
use hecs::{Entity, World};

/// Free points of `segment`, and of every descendant when `recursive`.
pub fn free_points(world: &mut World, segment: Entity, context: LinkContext, recursive: bool) -> Vec<PointRef> {
    if recursive {
        let segments = subtree(world, segment);
        free_points_in(world, &segments, context)
    } else {
        segment_free_points(world, segment, context)
    }
}

/// Free points of each listed segment, in list order.
pub fn free_points_in(world: &mut World, segments: &[Entity], context: LinkContext) -> Vec<PointRef> {
    segments
        .iter()
        .flat_map(|&s| segment_free_points(world, s, context))
        .collect()
}

fn segment_free_points(world: &mut World, segment: Entity, context: LinkContext) -> Vec<PointRef> {
    let simulated = context == LinkContext::Simulated;

    let devices = world.get::<&SeparationDevices>(segment).ok().map(|d| (*d).clone());
    let docking = world.get::<&DockingInterface>(segment).ok().map(|d| *d);
    let bay = world.get::<&CargoBay>(segment).ok().map(|b| (*b).clone());
    let robotic = world
        .get::<&Capabilities>(segment)
        .map(|c| c.contains(Capability::RoboticJoint))
        .unwrap_or(false);

    if simulated && robotic {
        return Vec::new();
    }
    if simulated && devices.as_ref().is_some_and(|d| d.any_fired_omni()) {
        return Vec::new();
    }

    let Ok(mut points) = world.get::<&mut AttachPoints>(segment) else {
        return Vec::new();
    };

    let mut free = Vec::new();
    for (index, point) in points.points.iter_mut().enumerate() {
        if point.owner != Some(segment) {
            log::debug!("Repairing owner of point '{}' on {:?}", point.id, segment);
            point.owner = Some(segment);
        }

        if point.kind == NodeKind::Surface || !point.is_free() || point.is_interstage() {
            continue;
        }
        if bay.as_ref().is_some_and(|b| b.is_inner(&point.id)) {
            continue;
        }
        if simulated {
            if devices.as_ref().is_some_and(|d| d.fired_covering(index)) {
                continue;
            }
            if docking.is_some_and(|d| d.reference_point == Some(index) && d.is_paired()) {
                continue;
            }
        }
        free.push(PointRef::new(segment, index));
    }
    free
}
