//! Landblock streaming: decides which landblocks should be resident, prepares them on a worker
//! thread and hands the results to the render thread, which finalizes them within a frame budget.
//!
//! Interior cells are streamed as two separately policed populations: the cells of buildings, that
//! travel with the general placed objects of a landblock, and the cells that can only be seen from
//! the inside (dungeons), which cluster a lot and use a tighter radius.
pub mod context;
pub mod policy;
pub mod scheduler;
pub mod streamer;
pub mod worker;

use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Population {
    /// Placed static objects and building interiors.
    Objects,
    /// Cells that are never seen from outdoors.
    Dungeons,
}

impl Population {
    pub const ALL: [Population; 2] = [Population::Objects, Population::Dungeons];
}

impl Display for Population {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Population::Objects => write!(f, "objects"),
            Population::Dungeons => write!(f, "dungeons"),
        }
    }
}
