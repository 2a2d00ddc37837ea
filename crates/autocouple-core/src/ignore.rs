//! Segment pairs the user explicitly separated
//!
//! A pair on this list is never auto-linked again until one of its segments
//! leaves the assembly.

use crate::components::SegmentPair;
use hecs::Entity;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default)]
pub struct IgnoreList {
    pairs: BTreeSet<SegmentPair>,
}

impl IgnoreList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the pair was already ignored.
    pub fn add(&mut self, a: Entity, b: Entity) -> bool {
        self.pairs.insert(SegmentPair::new(a, b))
    }

    pub fn contains(&self, a: Entity, b: Entity) -> bool {
        self.pairs.contains(&SegmentPair::new(a, b))
    }

    /// Forget every pair involving `segment`. Returns how many were dropped.
    pub fn prune(&mut self, segment: Entity) -> usize {
        let before = self.pairs.len();
        self.pairs.retain(|p| !p.contains(segment));
        before - self.pairs.len()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &SegmentPair> {
        self.pairs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hecs::World;

    #[test]
    fn test_add_is_unordered() {
        let mut world = World::new();
        let a = world.spawn(());
        let b = world.spawn(());
        let mut list = IgnoreList::new();
        assert!(list.add(a, b));
        assert!(!list.add(b, a));
        assert!(list.contains(b, a));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_prune_drops_pairs_of_segment() {
        let mut world = World::new();
        let a = world.spawn(());
        let b = world.spawn(());
        let c = world.spawn(());
        let mut list = IgnoreList::new();
        list.add(a, b);
        list.add(a, c);
        list.add(b, c);
        assert_eq!(list.prune(a), 2);
        assert!(list.contains(b, c));
        assert!(!list.contains(a, b));
    }
}
