//! Utility functions and helpers.

pub mod sql_identifier;

// Re-export commonly used types
pub use sql_identifier::SqlIdentifier;
