//! Selector Core - Selection algorithms and server metadata
//!
//! Pure, synchronous pieces of the client-side selector. Nothing here blocks
//! or performs I/O; the runtime in the `selector` crate composes them.
//!
//! # Contents
//!
//! - **SelectMode**: the tagged set of selection strategies
//! - **ServerRecord / ServerMetadata**: parsed registry entries
//! - **Weight Engine**: `latency_to_weight`, `WeightedRing`
//! - **Consistent Hash Function**: `jump_hash`, `hash_args`
//! - **Geo Distance Function**: `great_circle_distance`, `closest_servers`
//!
//! # Example
//!
//! ```rust,ignore
//! use selector_core::{hash_args, jump_hash};
//!
//! let key = hash_args(&["Arith.Mul".to_string(), "42".to_string()]);
//! let index = jump_hash(key, servers.len())?;
//! ```

mod error;
mod metadata;
mod types;

pub mod strategy;

// Re-exports: Error types
pub use error::{Result, SelectorError};

// Re-exports: Core types
pub use types::{
    SelectMode, ServerAddress, ServerRecord,
    ADDRESS_SEPARATOR, DEFAULT_WEIGHT,
};

// Re-exports: Metadata parsing
pub use metadata::{
    ServerMetadata, ACTIVE_STATE,
    GROUP_KEY, LATITUDE_KEY, LONGITUDE_KEY, STATE_KEY, WEIGHT_KEY,
};

// Re-exports: Algorithms
pub use strategy::{
    closest_servers, great_circle_distance, hash_args, jump_hash, latency_to_weight,
    next_weighted, ArgsHasher, WeightedRing, EARTH_RADIUS_KM, MAX_LATENCY_WEIGHT,
};
