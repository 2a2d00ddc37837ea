//! Pure auto-coupling logic.
//!
//! This crate holds the parts of the implicit-joint engine that need no
//! scene, no ECS and no host: geometry, pairing thresholds and the
//! first-fit sweep, tree path walks, connectivity grouping, the deferred
//! step scheduler and settings parsing. Functions take plain data and return
//! results, so they are unit-testable on their own.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`capability`] | Joint/device role tags per segment, rigid-path blocking rule |
//! | [`geometry`] | `Vec3`, `Quat`, `Pose` and angle helpers |
//! | [`pairing`] | Distance/facing eligibility, closest-candidate search, first-fit sweep |
//! | [`path`] | Common ancestor and in-between nodes over parent links |
//! | [`resources`] | Connected-group labelling for resource-sharing sets |
//! | [`scheduler`] | Coalescing one-step-later continuation |
//! | [`settings`] | `CouplingSettings` with lenient JSON loading |

pub mod capability;
pub mod geometry;
pub mod pairing;
pub mod path;
pub mod resources;
pub mod scheduler;
pub mod settings;
