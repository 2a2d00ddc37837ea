//! Path validation between two segments of one tree

use crate::components::{Capabilities, Segment};
use autocouple_logic::path::path_between;
use hecs::{Entity, World};

/// Would a rigid link between `a` and `b` cross a segment that can pivot or
/// detach on its own?
///
/// Segments strictly between each endpoint and the common ancestor are
/// checked. Segments in different trees (or a corrupt tree) count as invalid.
pub fn has_invalid_path(world: &World, a: Entity, b: Entity, allow_robotic: bool, allow_cable: bool) -> bool {
    let parent_of = |e: Entity| world.get::<&Segment>(e).ok().and_then(|s| s.parent);

    let between = match path_between(a, b, parent_of) {
        Ok(between) => between,
        Err(e) => {
            log::error!("No tree path between {:?} and {:?}: {}", a, b, e);
            return true;
        }
    };

    between.into_iter().any(|segment| {
        world
            .get::<&Capabilities>(segment)
            .map(|caps| caps.blocks_rigid_path(allow_robotic, allow_cable))
            .unwrap_or(false)
    })
}
