//! Incremental run state

pub mod tracker;

pub use tracker::ChangeTracker;
