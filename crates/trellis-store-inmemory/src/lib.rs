//! In-memory store implementation for the Trellis platform
//!
//! This crate provides [`MapStore`], an ordered in-memory backend that
//! validates and aggregates elements on ingest and answers seeded and full
//! scans, and [`InMemoryCacheService`], a process-local cache service. Both
//! are useful for development, testing and small deployments where
//! persistence is not required.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Store options
pub mod properties;

/// Ordered element keys
pub mod key;

/// The map store
pub mod store;

/// Backend handlers for ingest and retrieval
pub mod handlers;

/// Process-local cache service
pub mod cache;

pub use cache::InMemoryCacheService;
pub use properties::MapStoreProperties;
pub use store::{MapStore, MAP_STORE_TYPE};
