//! Tree queries over the official segment hierarchy

use crate::components::{AssemblyId, Segment};
use hecs::{Entity, World};
use std::collections::HashMap;

pub fn parent_of(world: &World, segment: Entity) -> Option<Entity> {
    world.get::<&Segment>(segment).ok().and_then(|s| s.parent)
}

pub fn assembly_of(world: &World, segment: Entity) -> Option<AssemblyId> {
    world.get::<&Segment>(segment).ok().map(|s| s.assembly)
}

pub fn is_segment(world: &World, segment: Entity) -> bool {
    world.get::<&Segment>(segment).is_ok()
}

/// Are the two segments joined by an official parent-child edge?
pub fn are_tree_adjacent(world: &World, a: Entity, b: Entity) -> bool {
    parent_of(world, a) == Some(b) || parent_of(world, b) == Some(a)
}

/// Map of parent -> children, children in entity order
pub fn child_map(world: &World) -> HashMap<Entity, Vec<Entity>> {
    let mut map: HashMap<Entity, Vec<Entity>> = HashMap::new();
    for (entity, segment) in world.query::<&Segment>().iter() {
        if let Some(parent) = segment.parent {
            map.entry(parent).or_default().push(entity);
        }
    }
    for children in map.values_mut() {
        children.sort_by_key(|e| e.id());
    }
    map
}

pub fn children_of(world: &World, segment: Entity) -> Vec<Entity> {
    child_map(world).remove(&segment).unwrap_or_default()
}

/// `root` and every segment below it, depth first.
pub fn subtree(world: &World, root: Entity) -> Vec<Entity> {
    if !is_segment(world, root) {
        return Vec::new();
    }
    let map = child_map(world);
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(current) = stack.pop() {
        // Guards against a corrupt tree looping forever
        if out.contains(&current) {
            continue;
        }
        out.push(current);
        if let Some(children) = map.get(&current) {
            stack.extend(children.iter().rev().copied());
        }
    }
    out
}

/// Topmost ancestor of `segment`. Stops at a cycle.
pub fn root_of(world: &World, segment: Entity) -> Entity {
    let mut current = segment;
    let mut seen = vec![segment];
    while let Some(parent) = parent_of(world, current) {
        if seen.contains(&parent) {
            log::error!("Cycle in segment tree above {:?}", segment);
            break;
        }
        seen.push(parent);
        current = parent;
    }
    current
}

/// Segments of an assembly in deterministic (entity) order.
pub fn assembly_segments(world: &World, assembly: AssemblyId) -> Vec<Entity> {
    let mut segments: Vec<Entity> = world
        .query::<&Segment>()
        .iter()
        .filter(|(_, s)| s.assembly == assembly)
        .map(|(e, _)| e)
        .collect();
    segments.sort_by_key(|e| e.id());
    segments
}

/// Every assembly that still has at least one segment.
pub fn live_assemblies(world: &World) -> Vec<AssemblyId> {
    let mut ids: Vec<AssemblyId> = world.query::<&Segment>().iter().map(|(_, s)| s.assembly).collect();
    ids.sort();
    ids.dedup();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(world: &mut World, len: usize) -> Vec<Entity> {
        let mut out: Vec<Entity> = Vec::new();
        for i in 0..len {
            let mut seg = Segment::new(format!("s{}", i), AssemblyId(1));
            seg.parent = out.last().copied();
            out.push(world.spawn((seg,)));
        }
        out
    }

    #[test]
    fn test_root_and_subtree() {
        let mut world = World::new();
        let c = chain(&mut world, 4);
        assert_eq!(root_of(&world, c[3]), c[0]);
        assert_eq!(subtree(&world, c[1]), vec![c[1], c[2], c[3]]);
        assert_eq!(children_of(&world, c[0]), vec![c[1]]);
    }

    #[test]
    fn test_adjacency() {
        let mut world = World::new();
        let c = chain(&mut world, 3);
        assert!(are_tree_adjacent(&world, c[0], c[1]));
        assert!(are_tree_adjacent(&world, c[2], c[1]));
        assert!(!are_tree_adjacent(&world, c[0], c[2]));
    }

    #[test]
    fn test_assembly_listing() {
        let mut world = World::new();
        let c = chain(&mut world, 3);
        let other = world.spawn((Segment::new("lone", AssemblyId(2)),));
        assert_eq!(assembly_segments(&world, AssemblyId(1)), c);
        assert_eq!(assembly_segments(&world, AssemblyId(2)), vec![other]);
        assert_eq!(live_assemblies(&world), vec![AssemblyId(1), AssemblyId(2)]);
    }
}
