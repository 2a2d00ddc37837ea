//! Per-segment capability tags.
//!
//! A segment advertises which joint/device roles it hosts. Path validation
//! and the attach-point catalog query these tags instead of inspecting
//! segment internals.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A joint or device role a segment can host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Servo / hinge / rotor that can move at runtime
    RoboticJoint,
    /// Winch, cable or tow-bar link
    CableJoint,
    /// Anything exposing a lockable joint (grapples, generic hinges)
    JointLock,
    /// Decoupler or separator
    SeparationDevice,
    /// Docking port
    DockingInterface,
    /// Cargo bay with inner attach points
    CargoBay,
}

/// Ordered set of capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    roles: BTreeSet<Capability>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.roles.insert(capability);
        self
    }

    pub fn insert(&mut self, capability: Capability) -> bool {
        self.roles.insert(capability)
    }

    pub fn remove(&mut self, capability: Capability) -> bool {
        self.roles.remove(&capability)
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.roles.contains(&capability)
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.roles.iter().copied()
    }

    /// Would a rigid implicit link across this segment be invalid?
    ///
    /// Cable joints are judged only by `allow_cable`; their joint-lock
    /// interface does not make them robotic.
    pub fn blocks_rigid_path(&self, allow_robotic: bool, allow_cable: bool) -> bool {
        let cable = self.contains(Capability::CableJoint);
        if !allow_robotic && self.contains(Capability::RoboticJoint) {
            return true;
        }
        if !allow_cable && cable {
            return true;
        }
        !allow_robotic && !cable && self.contains(Capability::JointLock)
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self {
            roles: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_never_blocks() {
        let caps = Capabilities::new();
        assert!(!caps.blocks_rigid_path(false, false));
    }

    #[test]
    fn test_robotic_blocks_unless_allowed() {
        let caps = Capabilities::new().with(Capability::RoboticJoint);
        assert!(caps.blocks_rigid_path(false, false));
        assert!(!caps.blocks_rigid_path(true, false));
    }

    #[test]
    fn test_cable_blocks_unless_allowed() {
        let caps = Capabilities::new()
            .with(Capability::CableJoint)
            .with(Capability::JointLock);
        assert!(caps.blocks_rigid_path(true, false));
        // A cable joint's lock interface is not treated as robotic
        assert!(!caps.blocks_rigid_path(false, true));
    }

    #[test]
    fn test_joint_lock_counts_as_robotic() {
        let caps = Capabilities::new().with(Capability::JointLock);
        assert!(caps.blocks_rigid_path(false, true));
        assert!(!caps.blocks_rigid_path(true, false));
    }

    #[test]
    fn test_devices_do_not_block() {
        let caps: Capabilities = [
            Capability::SeparationDevice,
            Capability::DockingInterface,
            Capability::CargoBay,
        ]
        .into_iter()
        .collect();
        assert!(!caps.blocks_rigid_path(false, false));
        assert_eq!(caps.iter().count(), 3);
    }
}
