pub mod coord;
pub mod error;
pub mod state;
pub mod world;

pub use error::AggregateError;
pub use error::EditError;
pub use error::EditResult;

pub use coord::{ChunkPos, RegionPos};
pub use state::{State, StateGroup, StateTracker, HEADER_SIZE_BYTES};
pub use world::{Completion, WorldEvent, WorldLock, WorldState};
