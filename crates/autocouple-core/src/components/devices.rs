//! Device components: separation devices, docking interfaces, cargo bays,
//! and the rigid body marker of a simulated segment.

use hecs::Entity;
use serde::{Deserialize, Serialize};

/// A decoupler/separator on a segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeparationDevice {
    /// Attach point index severed when fired; `None` with `omni`
    pub point: Option<usize>,
    /// Severs every official edge of the segment
    pub omni: bool,
    pub fired: bool,
}

impl SeparationDevice {
    pub fn at_point(point: usize) -> Self {
        Self {
            point: Some(point),
            omni: false,
            fired: false,
        }
    }

    pub fn omni() -> Self {
        Self {
            point: None,
            omni: true,
            fired: false,
        }
    }

    /// Does this device act on attach point `index`?
    pub fn covers(&self, index: usize) -> bool {
        self.omni || self.point == Some(index)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeparationDevices {
    pub devices: Vec<SeparationDevice>,
}

impl SeparationDevices {
    pub fn new(devices: Vec<SeparationDevice>) -> Self {
        Self { devices }
    }

    /// Fired device that severs `index` (directly or as omni).
    pub fn fired_covering(&self, index: usize) -> bool {
        self.devices.iter().any(|d| d.fired && d.covers(index))
    }

    pub fn any_fired_omni(&self) -> bool {
        self.devices.iter().any(|d| d.fired && d.omni)
    }
}

/// A docking port; links through it are owned by the docking subsystem
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DockingInterface {
    /// Attach point the port docks through
    pub reference_point: Option<usize>,
    /// Docking interface (segment) this port is paired with
    pub partner: Option<Entity>,
}

impl DockingInterface {
    pub fn new(reference_point: usize) -> Self {
        Self {
            reference_point: Some(reference_point),
            partner: None,
        }
    }

    pub fn is_paired(&self) -> bool {
        self.partner.is_some()
    }
}

/// Cargo bay whose inner boundary points must stay unlinked
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CargoBay {
    /// Ids of the inner fore/aft boundary points
    pub inner_points: Vec<String>,
}

impl CargoBay {
    pub fn new(inner_points: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            inner_points: inner_points.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_inner(&self, point_id: &str) -> bool {
        self.inner_points.iter().any(|p| p == point_id)
    }
}

/// Present while a segment is physically simulated (unpacked)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidBody {
    pub break_force: f32,
    pub break_torque: f32,
}

impl Default for RigidBody {
    fn default() -> Self {
        Self {
            break_force: 22.0,
            break_torque: 22.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_coverage() {
        let d = SeparationDevice::at_point(1);
        assert!(d.covers(1));
        assert!(!d.covers(0));
        assert!(SeparationDevice::omni().covers(5));
    }

    #[test]
    fn test_fired_covering() {
        let mut devices = SeparationDevices::new(vec![SeparationDevice::at_point(0)]);
        assert!(!devices.fired_covering(0));
        devices.devices[0].fired = true;
        assert!(devices.fired_covering(0));
        assert!(!devices.fired_covering(1));
        assert!(!devices.any_fired_omni());
    }

    #[test]
    fn test_cargo_bay_inner_points() {
        let bay = CargoBay::new(["bay_fore", "bay_aft"]);
        assert!(bay.is_inner("bay_aft"));
        assert!(!bay.is_inner("top"));
    }
}
