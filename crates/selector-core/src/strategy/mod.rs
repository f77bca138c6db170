//! Selection Algorithms
//!
//! This module contains the pure building blocks behind each selection mode:
//!
//! - `consistent_hash`: jump consistent hash over hashed call arguments
//! - `weighted`: latency to weight transform and smooth weighted round-robin
//! - `geo`: great-circle distance and nearest-server ranking
//!
//! # Mode Mapping
//!
//! ```text
//! SelectMode
//!     │
//!     ├── Random / RoundRobin      ──► index draw (selector)
//!     ├── ConsistentHash           ──► jump_hash(hash_args(args), len)
//!     ├── WeightedRoundRobin/Icmp  ──► WeightedRing::next
//!     └── Closest                  ──► closest_servers, then random tie break
//! ```

mod consistent_hash;
mod geo;
mod weighted;

pub use consistent_hash::{hash_args, jump_hash, ArgsHasher};
pub use geo::{closest_servers, great_circle_distance, EARTH_RADIUS_KM};
pub use weighted::{latency_to_weight, next_weighted, WeightedRing, MAX_LATENCY_WEIGHT};
