//! Autocouple Core - implicit joint tracking for assembled structures
//!
//! Segments of an assembly form a tree through official parent/child edges.
//! Attach points that end up touching without being parent and child are
//! joined by *implicit links*: the engine finds them by proximity, marks both
//! points occupied, adds a rigid constraint during simulation, shares the
//! resource group of the two segments, and keeps the link consistent while
//! the assembly splits, merges, docks or loses parts.
//!
//! # Architecture
//!
//! The host scene lives in a `hecs` world:
//! - **Entities**: segments and physical constraints
//! - **Components**: `Segment`, `AttachPoints`, `Capabilities`, devices, bodies
//! - **Systems**: free functions over the world (catalog, matcher, path, ...)
//!
//! On top of that sit the stateful pieces:
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`scene`] | Host model: tree edits, separation devices, docking, packing |
//! | [`tracker`] | `JointTracker` - one implicit link and its state machine |
//! | [`manager`] | `TrackingManager` - reconciliation for one assembly |
//! | [`engine`] | `CouplingEngine` - event handlers and the deferred step loop |
//! | [`events`] | Link formed/broken events and connectivity requests |
//! | [`ignore`] | Pairs the user separated and that must not re-link |
//! | [`persistence`] | Save/load of per-assembly link data |
//!
//! # Example
//!
//! ```rust,no_run
//! use autocouple_core::prelude::*;
//!
//! let mut scene = Scene::new();
//! let mut engine = CouplingEngine::new(CouplingSettings::default());
//!
//! let root = scene.spawn_segment(SegmentSpec::new("core").stack("top", Vec3::Y, Vec3::Y));
//! let assembly = scene.assembly(root).unwrap();
//! engine.on_assembly_created(&mut scene, assembly);
//!
//! loop {
//!     engine.step(&mut scene);
//!     for event in engine.drain_events() {
//!         println!("{:?}", event);
//!     }
//! }
//! ```

pub mod components;
pub mod systems;
pub mod events;
pub mod ignore;
pub mod scene;
pub mod tracker;
pub mod manager;
pub mod engine;
pub mod persistence;

/// Commonly used types for convenient importing
pub mod prelude {
    pub use crate::components::*;
    pub use crate::engine::CouplingEngine;
    pub use crate::events::{ConnectivityRequest, LinkEvent, LinkEventKind};
    pub use crate::scene::{Scene, SceneError, SegmentSpec};
    pub use crate::tracker::{JointTracker, TrackerState};
    pub use autocouple_logic::settings::CouplingSettings;
}
