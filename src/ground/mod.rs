pub mod snapshot;
pub mod tracker;

pub use snapshot::GroundSnapshot;
pub use tracker::{GroundEngineTracker, LoadedSsb};
