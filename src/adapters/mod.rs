//! External system adapters

pub mod odm;
pub mod sink;
