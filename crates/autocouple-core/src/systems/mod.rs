//! Systems - logic that reads and updates segment components

mod catalog;
mod constraint;
mod matcher;
mod path;
mod resources;
mod tree;

pub use catalog::*;
pub use constraint::*;
pub use matcher::*;
pub use path::*;
pub use resources::*;
pub use tree::*;
