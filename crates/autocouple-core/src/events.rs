//! Link notifications for the host and the connectivity subsystem
//!
//! Trackers queue a `LinkEvent` whenever an implicit link forms or breaks.
//! When connectivity reporting is enabled, a matching `ConnectivityRequest`
//! is queued as well so a crew/flow subsystem can add or remove the edge.
//! The host drains both queues after each call into the engine.

use crate::components::AssemblyId;
use hecs::Entity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkEventKind {
    Formed,
    Broken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkEvent {
    pub kind: LinkEventKind,
    /// Assembly owning the link, if it could still be resolved
    pub assembly: Option<AssemblyId>,
    pub segments: (Entity, Entity),
}

impl LinkEvent {
    pub fn involves(&self, segment: Entity) -> bool {
        self.segments.0 == segment || self.segments.1 == segment
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityRequest {
    Add(Entity, Entity),
    Remove(Entity, Entity),
}

/// Outgoing notification queues
#[derive(Debug, Clone, Default)]
pub struct Notifications {
    events: Vec<LinkEvent>,
    connectivity: Vec<ConnectivityRequest>,
    connectivity_enabled: bool,
}

impl Notifications {
    pub fn new(connectivity_enabled: bool) -> Self {
        Self {
            connectivity_enabled,
            ..Self::default()
        }
    }

    pub fn set_connectivity_enabled(&mut self, enabled: bool) {
        self.connectivity_enabled = enabled;
    }

    pub fn link_formed(&mut self, assembly: Option<AssemblyId>, a: Entity, b: Entity) {
        self.events.push(LinkEvent {
            kind: LinkEventKind::Formed,
            assembly,
            segments: (a, b),
        });
        if self.connectivity_enabled {
            self.connectivity.push(ConnectivityRequest::Add(a, b));
        }
    }

    pub fn link_broken(&mut self, assembly: Option<AssemblyId>, a: Entity, b: Entity) {
        self.events.push(LinkEvent {
            kind: LinkEventKind::Broken,
            assembly,
            segments: (a, b),
        });
        if self.connectivity_enabled {
            self.connectivity.push(ConnectivityRequest::Remove(a, b));
        }
    }

    pub fn events(&self) -> &[LinkEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<LinkEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn drain_connectivity(&mut self) -> Vec<ConnectivityRequest> {
        std::mem::take(&mut self.connectivity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hecs::World;

    #[test]
    fn test_connectivity_only_when_enabled() {
        let mut world = World::new();
        let a = world.spawn(());
        let b = world.spawn(());

        let mut quiet = Notifications::new(false);
        quiet.link_formed(Some(AssemblyId(1)), a, b);
        assert_eq!(quiet.events().len(), 1);
        assert!(quiet.drain_connectivity().is_empty());

        let mut loud = Notifications::new(true);
        loud.link_formed(Some(AssemblyId(1)), a, b);
        loud.link_broken(None, a, b);
        assert_eq!(
            loud.drain_connectivity(),
            vec![ConnectivityRequest::Add(a, b), ConnectivityRequest::Remove(a, b)]
        );
    }

    #[test]
    fn test_drain_empties_queue() {
        let mut world = World::new();
        let a = world.spawn(());
        let b = world.spawn(());
        let mut n = Notifications::new(false);
        n.link_broken(None, a, b);
        let drained = n.drain_events();
        assert_eq!(drained[0].kind, LinkEventKind::Broken);
        assert!(drained[0].involves(b));
        assert!(n.drain_events().is_empty());
    }
}
