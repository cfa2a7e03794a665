//! Core pipeline logic
//!
//! This module contains the mapping engine, bundle assembly, incremental
//! state tracking and the run coordinator.

pub mod bundle;
pub mod mapping;
pub mod pipeline;
pub mod state;
