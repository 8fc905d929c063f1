//! Common types module for the inventory order workflow.
//!
//! This module defines the core data types shared by every crate in the
//! workspace: catalog items, orders and their items, workflow events, storage
//! namespaces and the configuration validation framework used by pluggable
//! backends.

/// API types for HTTP endpoints and request/response structures.
pub mod api;
/// Catalog types for orderable stock products and unique equipment.
pub mod catalog;
/// Event types for inter-service communication.
pub mod events;
/// Order types including statuses, items and summaries.
pub mod order;
/// Registry trait for self-registering backend implementations.
pub mod registry;
/// Storage namespaces for persisted collections.
pub mod storage;
/// Utility functions for identifiers and timestamps.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

// Re-export all types for convenient access
pub use api::*;
pub use catalog::*;
pub use events::*;
pub use order::*;
pub use registry::ImplementationRegistry;
pub use storage::*;
pub use utils::{current_timestamp, truncate_id};
pub use validation::*;
