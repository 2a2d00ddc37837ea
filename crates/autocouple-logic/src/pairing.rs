//! Geometric pairing of free attach points.
//!
//! Two points are eligible when they sit within `max_distance` of each other
//! and face each other: the angle between their world-space normals must be
//! within `max_angle_deviation` of 180°. Among eligible candidates the
//! closest wins; on equal distance the first one encountered wins.
//!
//! The sweep is a plain O(n²) scan. Callers supply an admissibility callback
//! for the non-geometric rules (same segment, tree adjacency, ignore list,
//! existing links, path validity). It is only consulted for a candidate that
//! would become the new best, so expensive checks run as rarely as possible.

use serde::{Deserialize, Serialize};

use crate::geometry::Vec3;

/// Distance/orientation limits for a pairing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairingThresholds {
    pub max_distance: f32,
    /// Maximum deviation from perfectly opposed normals, in degrees
    pub max_angle_deviation: f32,
}

impl Default for PairingThresholds {
    fn default() -> Self {
        Self {
            max_distance: 0.1,
            max_angle_deviation: 91.0,
        }
    }
}

/// World-space placement of an attach point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointPose {
    pub position: Vec3,
    pub normal: Vec3,
}

impl PointPose {
    pub fn new(position: Vec3, normal: Vec3) -> Self {
        Self { position, normal }
    }
}

/// How far two normals are from facing each other, in degrees.
pub fn facing_deviation(a: &PointPose, b: &PointPose) -> f32 {
    (a.normal.angle_between(&b.normal) - 180.0).abs()
}

/// Distance between the points if the pair is geometrically eligible.
pub fn eligible_distance(a: &PointPose, b: &PointPose, thresholds: &PairingThresholds) -> Option<f32> {
    let dist = a.position.distance(&b.position);
    if dist > thresholds.max_distance {
        return None;
    }
    if facing_deviation(a, b) > thresholds.max_angle_deviation {
        return None;
    }
    Some(dist)
}

/// Find the closest eligible candidate for `point`.
///
/// Returns the index into `candidates`. `admissible(i)` is asked only for a
/// geometrically eligible candidate strictly closer than the current best.
pub fn find_pairing<F>(
    point: &PointPose,
    candidates: &[PointPose],
    thresholds: &PairingThresholds,
    mut admissible: F,
) -> Option<usize>
where
    F: FnMut(usize) -> bool,
{
    let mut best: Option<(usize, f32)> = None;

    for (i, candidate) in candidates.iter().enumerate() {
        let Some(dist) = eligible_distance(point, candidate, thresholds) else {
            continue;
        };
        if let Some((_, best_dist)) = best {
            if dist >= best_dist {
                continue;
            }
        }
        if admissible(i) {
            best = Some((i, dist));
        }
    }

    best.map(|(i, _)| i)
}

/// First-fit sweep over `points` in order.
///
/// Each point is matched against the points before it that are still open;
/// a matched candidate leaves the open set, an unmatched point joins it.
/// Returns `(earlier, later)` index pairs. Every index appears at most once.
/// `admissible(earlier, later, formed)` also sees the pairs formed so far,
/// so callers can refuse a second link between the same two owners.
pub fn sweep_pairs<F>(
    points: &[PointPose],
    thresholds: &PairingThresholds,
    mut admissible: F,
) -> Vec<(usize, usize)>
where
    F: FnMut(usize, usize, &[(usize, usize)]) -> bool,
{
    let mut open: Vec<usize> = Vec::new();
    let mut pairs = Vec::new();

    for (i, point) in points.iter().enumerate() {
        let open_poses: Vec<PointPose> = open.iter().map(|&j| points[j]).collect();
        let found = find_pairing(point, &open_poses, thresholds, |k| {
            admissible(open[k], i, &pairs)
        });
        match found {
            Some(k) => {
                let j = open.remove(k);
                pairs.push((j, i));
            }
            None => open.push(i),
        }
    }

    pairs
}
