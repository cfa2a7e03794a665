//! ODM to FHIR mapping
//!
//! The mapping core: deterministic identity derivation, terminology token
//! resolution, per-form mapping rules and the engine that drives them over
//! one subject at a time.

pub mod engine;
pub mod identity;
pub mod rules;
pub mod terminology;

pub use engine::MappingEngine;
pub use identity::IdentityRegistry;
pub use rules::{FormRule, FormScope, MappingContext};
