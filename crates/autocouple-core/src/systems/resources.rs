//! Resource-sharing groups
//!
//! Every segment carries a [`ResourceGroup`] label. Segments with the same
//! label are connected for flow and crew-transfer purposes. Joining is a
//! relabel; splitting is always a full recompute from the surviving edges.

use crate::components::{ResourceGroup, Segment};
use autocouple_logic::resources::connected_groups;
use hecs::{Entity, World};

pub fn group_of(world: &World, segment: Entity) -> Option<u32> {
    world.get::<&ResourceGroup>(segment).ok().map(|g| g.0)
}

pub fn same_group(world: &World, a: Entity, b: Entity) -> bool {
    match (group_of(world, a), group_of(world, b)) {
        (Some(ga), Some(gb)) => ga == gb,
        _ => false,
    }
}

/// Merge the groups of `a` and `b`. Returns false if they already shared one.
pub fn unify(world: &mut World, a: Entity, b: Entity) -> bool {
    let (Some(ga), Some(gb)) = (group_of(world, a), group_of(world, b)) else {
        log::debug!("Cannot unify {:?} and {:?}: missing resource group", a, b);
        return false;
    };
    if ga == gb {
        return false;
    }
    let (keep, replace) = if ga < gb { (ga, gb) } else { (gb, ga) };
    for (_, group) in world.query_mut::<&mut ResourceGroup>() {
        if group.0 == replace {
            group.0 = keep;
        }
    }
    true
}

/// Official parent-child edges among `segments`.
pub fn official_edges(world: &World, segments: &[Entity]) -> Vec<(Entity, Entity)> {
    segments
        .iter()
        .filter_map(|&s| {
            let parent = world.get::<&Segment>(s).ok()?.parent?;
            segments.contains(&parent).then_some((parent, s))
        })
        .collect()
}

/// Recompute the groups of `segments` from their official edges plus
/// `implicit_links`. Each group is labelled by its smallest entity id.
pub fn rebuild_groups(world: &mut World, segments: &[Entity], implicit_links: &[(Entity, Entity)]) {
    let ids: Vec<u32> = segments.iter().map(|e| e.id()).collect();
    let mut links: Vec<(u32, u32)> = official_edges(world, segments)
        .into_iter()
        .map(|(a, b)| (a.id(), b.id()))
        .collect();
    links.extend(
        implicit_links
            .iter()
            .filter(|(a, b)| segments.contains(a) && segments.contains(b))
            .map(|(a, b)| (a.id(), b.id())),
    );

    let labels = connected_groups(&ids, &links);
    for &segment in segments {
        if let Some(&label) = labels.get(&segment.id()) {
            if world.insert_one(segment, ResourceGroup(label)).is_err() {
                log::debug!("Segment {:?} vanished during group rebuild", segment);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::AssemblyId;

    fn spawn(world: &mut World, parent: Option<Entity>) -> Entity {
        let mut seg = Segment::new("s", AssemblyId(1));
        seg.parent = parent;
        let e = world.spawn((seg,));
        world.insert_one(e, ResourceGroup(e.id())).unwrap();
        e
    }

    #[test]
    fn test_unify_is_idempotent() {
        let mut world = World::new();
        let a = spawn(&mut world, None);
        let b = spawn(&mut world, None);
        assert!(unify(&mut world, a, b));
        assert!(same_group(&world, a, b));
        assert!(!unify(&mut world, a, b));
        assert_eq!(group_of(&world, b), Some(a.id().min(b.id())));
    }

    #[test]
    fn test_rebuild_splits_stale_union() {
        let mut world = World::new();
        let root = spawn(&mut world, None);
        let child = spawn(&mut world, Some(root));
        let loose = spawn(&mut world, None);
        unify(&mut world, root, child);
        unify(&mut world, child, loose);
        assert!(same_group(&world, root, loose));

        rebuild_groups(&mut world, &[root, child, loose], &[]);
        assert!(same_group(&world, root, child));
        assert!(!same_group(&world, root, loose));
    }

    #[test]
    fn test_rebuild_keeps_implicit_links() {
        let mut world = World::new();
        let a = spawn(&mut world, None);
        let b = spawn(&mut world, None);
        rebuild_groups(&mut world, &[a, b], &[(a, b)]);
        assert!(same_group(&world, a, b));
    }
}
