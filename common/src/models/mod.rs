//! Shared data models for the catalog services.

pub mod catalog;
pub mod server;

// Re-export commonly used types
pub use catalog::{
    AggregationSummary, CacheRefreshResult, CacheStatus, CatalogCacheEntry, CatalogListing,
    DatabaseDescriptor, ProbeOutcome, ServerIdsRequest, VERSION_UNAVAILABLE,
};
pub use server::{Server, ServerType};
