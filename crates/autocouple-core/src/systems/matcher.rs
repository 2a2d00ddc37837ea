//! Pairing matcher over world data
//!
//! Wraps the geometric sweep with the structural rules: two points pair only
//! if they belong to different segments that are not parent and child, are
//! not on the ignore list, are not already linked, and have a rigid tree
//! path between them.

use crate::components::{AttachPoints, PointRef, SegmentPair, Transform};
use crate::ignore::IgnoreList;
use crate::systems::path::has_invalid_path;
use crate::systems::tree::are_tree_adjacent;
use autocouple_logic::pairing::{self, PairingThresholds, PointPose};
use hecs::{Entity, World};
use std::collections::BTreeSet;

/// Everything a pairing decision depends on besides geometry.
#[derive(Debug, Clone, Copy)]
pub struct PairingRules<'a> {
    pub thresholds: PairingThresholds,
    pub allow_robotic: bool,
    pub allow_cable: bool,
    pub ignore: &'a IgnoreList,
    /// Segment pairs already joined by a tracker
    pub linked: &'a BTreeSet<SegmentPair>,
}

impl<'a> PairingRules<'a> {
    /// Structural admissibility of a link between two segments.
    pub fn admits(&self, world: &World, a: Entity, b: Entity) -> bool {
        if a == b {
            return false;
        }
        if are_tree_adjacent(world, a, b) {
            return false;
        }
        if self.ignore.contains(a, b) {
            return false;
        }
        if self.linked.contains(&SegmentPair::new(a, b)) {
            return false;
        }
        !has_invalid_path(world, a, b, self.allow_robotic, self.allow_cable)
    }
}

/// World-space position and outward normal of an attach point.
pub fn point_pose(world: &World, point: PointRef) -> Option<PointPose> {
    let points = world.get::<&AttachPoints>(point.segment).ok()?;
    let local = points.get(point.index)?;
    let transform = world
        .get::<&Transform>(point.segment)
        .map(|t| *t)
        .unwrap_or_default();
    Some(PointPose::new(
        transform.pose.transform_point(local.position),
        transform.pose.transform_direction(local.orientation),
    ))
}

/// Closest admissible partner for `point` among `candidates`.
pub fn find_pairing(
    world: &World,
    point: PointRef,
    candidates: &[PointRef],
    rules: &PairingRules,
) -> Option<PointRef> {
    let pose = point_pose(world, point)?;
    let (refs, poses) = resolve_poses(world, candidates);
    let found = pairing::find_pairing(&pose, &poses, &rules.thresholds, |i| {
        rules.admits(world, point.segment, refs[i].segment)
    })?;
    Some(refs[found])
}

/// First-fit sweep over `points` in order.
///
/// Returns `(earlier, later)` pairs; each point is used at most once and no
/// two pairs join the same two segments.
pub fn eligible_pairs(world: &World, points: &[PointRef], rules: &PairingRules) -> Vec<(PointRef, PointRef)> {
    let (refs, poses) = resolve_poses(world, points);
    let pairs = pairing::sweep_pairs(&poses, &rules.thresholds, |j, i, formed| {
        let wanted = SegmentPair::new(refs[j].segment, refs[i].segment);
        if formed
            .iter()
            .any(|&(x, y)| SegmentPair::new(refs[x].segment, refs[y].segment) == wanted)
        {
            return false;
        }
        rules.admits(world, refs[j].segment, refs[i].segment)
    });
    pairs.into_iter().map(|(j, i)| (refs[j], refs[i])).collect()
}

fn resolve_poses(world: &World, points: &[PointRef]) -> (Vec<PointRef>, Vec<PointPose>) {
    let mut refs = Vec::with_capacity(points.len());
    let mut poses = Vec::with_capacity(points.len());
    for &p in points {
        match point_pose(world, p) {
            Some(pose) => {
                refs.push(p);
                poses.push(pose);
            }
            None => log::debug!("Skipping unresolvable point {:?}", p),
        }
    }
    (refs, poses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::*;

    struct Fixture {
        world: World,
        ignore: IgnoreList,
        linked: BTreeSet<SegmentPair>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                world: World::new(),
                ignore: IgnoreList::new(),
                linked: BTreeSet::new(),
            }
        }

        fn rules(&self) -> PairingRules<'_> {
            PairingRules {
                thresholds: PairingThresholds::default(),
                allow_robotic: false,
                allow_cable: false,
                ignore: &self.ignore,
                linked: &self.linked,
            }
        }

        /// Segment at `x` with one point facing `normal`.
        fn segment(&mut self, x: f32, normal: Vec3, parent: Option<Entity>) -> Entity {
            let mut seg = Segment::new("s", AssemblyId(1));
            seg.parent = parent;
            self.world.spawn((
                seg,
                Transform::at(x, 0.0, 0.0),
                AttachPoints::new(vec![AttachPoint::stack("p", Vec3::ZERO, normal)]),
            ))
        }
    }

    #[test]
    fn test_pose_applies_transform() {
        let mut f = Fixture::new();
        let s = f.segment(2.0, Vec3::Y, None);
        let pose = point_pose(&f.world, PointRef::new(s, 0)).unwrap();
        assert!(pose.position.distance(&Vec3::new(2.0, 0.0, 0.0)) < 1e-6);
        assert!(point_pose(&f.world, PointRef::new(s, 3)).is_none());
    }

    #[test]
    fn test_pairs_siblings_not_parent_child() {
        let mut f = Fixture::new();
        let root = f.segment(5.0, Vec3::X, None);
        let a = f.segment(0.0, Vec3::Y, Some(root));
        let b = f.segment(0.05, -Vec3::Y, Some(root));
        let c = f.segment(0.03, -Vec3::Y, Some(a));

        let pa = PointRef::new(a, 0);
        // c is closer but is a's child
        let found = find_pairing(&f.world, pa, &[PointRef::new(c, 0), PointRef::new(b, 0)], &f.rules());
        assert_eq!(found, Some(PointRef::new(b, 0)));
    }

    #[test]
    fn test_ignore_and_linked_sets_block() {
        let mut f = Fixture::new();
        let root = f.segment(5.0, Vec3::X, None);
        let a = f.segment(0.0, Vec3::Y, Some(root));
        let b = f.segment(0.05, -Vec3::Y, Some(root));
        let points = [PointRef::new(a, 0), PointRef::new(b, 0)];

        assert_eq!(eligible_pairs(&f.world, &points, &f.rules()).len(), 1);

        f.ignore.add(b, a);
        assert!(eligible_pairs(&f.world, &points, &f.rules()).is_empty());

        f.ignore.clear();
        f.linked.insert(SegmentPair::new(a, b));
        assert!(eligible_pairs(&f.world, &points, &f.rules()).is_empty());
    }

    #[test]
    fn test_one_link_per_segment_pair() {
        let mut f = Fixture::new();
        let root = f.segment(5.0, Vec3::X, None);
        let a = f.segment(0.0, Vec3::Y, Some(root));
        let b = f.segment(0.05, -Vec3::Y, Some(root));
        // Give both segments a second facing pair of points
        for (seg, normal) in [(a, Vec3::Z), (b, -Vec3::Z)] {
            f.world
                .get::<&mut AttachPoints>(seg)
                .unwrap()
                .points
                .push(AttachPoint::stack("q", Vec3::ZERO, normal));
        }
        let points = [
            PointRef::new(a, 0),
            PointRef::new(a, 1),
            PointRef::new(b, 0),
            PointRef::new(b, 1),
        ];
        let pairs = eligible_pairs(&f.world, &points, &f.rules());
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn test_distance_limit() {
        let mut f = Fixture::new();
        let root = f.segment(5.0, Vec3::X, None);
        let a = f.segment(0.0, Vec3::Y, Some(root));
        let b = f.segment(0.2, -Vec3::Y, Some(root));
        let points = [PointRef::new(a, 0), PointRef::new(b, 0)];
        assert!(eligible_pairs(&f.world, &points, &f.rules()).is_empty());
    }
}
