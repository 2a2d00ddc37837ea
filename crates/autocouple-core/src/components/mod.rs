//! Component definitions for the assembly scene.
//!
//! Components are pure data attached to segment entities (and to constraint
//! entities). They have no behavior - that lives in systems and the scene.

mod common;
mod constraint;
mod devices;
mod segment;

pub use common::*;
pub use constraint::*;
pub use devices::*;
pub use segment::*;

pub use autocouple_logic::capability::{Capabilities, Capability};
pub use autocouple_logic::geometry::{Pose, Quat, Vec3};
