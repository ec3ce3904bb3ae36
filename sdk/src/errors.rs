//! Error types and handling
//!
//! This module provides the error types used throughout the Kotoba engine.
//! All errors implement the `KotobaErrorExt` trait which provides
//! user-friendly hints and indicates whether errors are recoverable.
//!
//! The taxonomy is deliberately small:
//!
//! - **NotFound**: a referenced session or user does not exist
//! - **Persistence**: connectivity or constraint failure during a write
//! - **InsufficientHistory**: a rewind was refused because fewer than two
//!   turns exist (a normal refusal, not a fault)
//! - **Classification**: the intent classifier produced unusable output

use thiserror::Error;

/// Trait for Kotoba error extensions
///
/// Provides additional context for errors: a user-friendly hint that is safe
/// to show to end users, and recoverability information.
pub trait KotobaErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint never contains connection strings, SQL text, or other
    /// internal detail.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried by the caller. Non-recoverable
    /// errors require the caller to change the request.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// Write-path failures must surface as `Persistence` — they are never
/// silently absorbed. Read paths may degrade to empty results at the service
/// layer, but the repository always reports the underlying failure through
/// this type first so it can be logged.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A referenced entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Connectivity or constraint failure against the relational store
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Rewind refused: fewer than two messages exist in the session
    #[error("Not enough history to rewind")]
    InsufficientHistory,

    /// The intent classifier returned an out-of-vocabulary label
    #[error("Classification error: {0}")]
    Classification(String),
}

impl KotobaErrorExt for CoreError {
    fn user_hint(&self) -> &str {
        match self {
            Self::NotFound(_) => "The session or user you referenced does not exist",
            Self::Persistence(_) => "Storage operation failed. Please try again",
            Self::InsufficientHistory => {
                "There is no previous message pair to edit in this session"
            }
            Self::Classification(_) => "Could not understand the request category",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Retrying the same request cannot make the entity exist or the
            // history longer.
            Self::NotFound(_) | Self::InsufficientHistory => false,

            // Transient storage or classifier trouble may clear on retry.
            Self::Persistence(_) | Self::Classification(_) => true,
        }
    }
}
