//! Result type alias for Studylift

use super::errors::StudyliftError;

/// Result type alias for Studylift operations
///
/// This is a convenience type alias that uses `StudyliftError` as the error
/// type. Use this throughout the codebase for fallible operations.
pub type Result<T> = std::result::Result<T, StudyliftError>;
