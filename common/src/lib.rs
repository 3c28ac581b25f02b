//! Shared building blocks for the database catalog services.
//!
//! Holds configuration loading, the request-level error type, the API
//! response envelope, request-id middleware and the catalog data models.

pub mod config;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod response;
pub mod utils;
