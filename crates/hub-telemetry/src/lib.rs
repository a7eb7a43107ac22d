pub mod cycle;
pub mod tracker;

pub use cycle::Cycle;
pub use tracker::CycleTracker;
