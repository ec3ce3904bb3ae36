//! Kotoba SDK
//!
//! Shared library providing the error taxonomy and domain types used by the
//! Kotoba engine. This crate is deliberately small: everything here is part
//! of the public contract between the persistence layer, the dispatcher, and
//! the API surface.

/// Error types and handling
pub mod errors;

/// Conversation and session domain types
pub mod types;

// Re-export commonly used types
pub use errors::{CoreError, KotobaErrorExt};
pub use types::{Intent, SessionData, SessionSummary, Turn};
