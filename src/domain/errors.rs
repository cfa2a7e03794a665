//! Domain error types
//!
//! This module defines the error hierarchy for Studylift. All errors are
//! domain-specific and don't expose third-party types.

use thiserror::Error;

/// Main Studylift error type
///
/// This is the primary error type used throughout the application.
/// It wraps specific error types and provides context for error handling.
#[derive(Debug, Error)]
pub enum StudyliftError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// ODM source acquisition errors (file, REDCap, DIS)
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// ODM document parse errors (fatal for the whole run)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Mapping errors (fatal for one subject)
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Bundle delivery errors
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Change-tracker state errors
    #[error("State management error: {0}")]
    State(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

/// ODM source-specific errors
///
/// Errors that occur when acquiring ODM documents. These errors don't
/// expose third-party HTTP client types.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Failed to connect to the source endpoint
    #[error("Failed to connect to ODM source: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Server error (5xx)
    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    /// Client error (4xx)
    #[error("Client error: {status} - {message}")]
    ClientError { status: u16, message: String },

    /// Source file missing or unreadable
    #[error("Source file not readable: {0}")]
    FileNotReadable(String),

    /// Response was not valid ODM
    #[error("Invalid ODM response: {0}")]
    InvalidResponse(String),
}

/// Delivery-sink-specific errors
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Failed to write a bundle file
    #[error("Failed to write bundle file: {0}")]
    WriteFailed(String),

    /// Failed to publish a bundle message
    #[error("Failed to publish bundle: {0}")]
    PublishFailed(String),

    /// Transaction rejected by the FHIR server
    #[error("Server rejected transaction: {status} - {message}")]
    TransactionRejected { status: u16, message: String },

    /// All retry attempts exhausted
    #[error("Transaction failed after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: usize, message: String },

    /// Connection failure
    #[error("Failed to connect to delivery target: {0}")]
    ConnectionFailed(String),
}

// Conversion from std::io::Error
impl From<std::io::Error> for StudyliftError {
    fn from(err: std::io::Error) -> Self {
        StudyliftError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for StudyliftError {
    fn from(err: serde_json::Error) -> Self {
        StudyliftError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for StudyliftError {
    fn from(err: toml::de::Error) -> Self {
        StudyliftError::Configuration(format!("TOML parse error: {err}"))
    }
}
