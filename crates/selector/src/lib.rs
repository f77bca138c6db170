//! Selector - Registry-backed service discovery and load balancing
//!
//! Watches a key-value registry for the live instances of one service and
//! picks an instance for every outbound RPC call, reusing connections across
//! calls.
//!
//! # Architecture
//!
//! ```text
//!  Registry ──watch──► RegistrySynchronizer ──swap──► Arc<ServerSet>
//!                              │                           │
//!                              │ evict removed             │ snapshot
//!                              ▼                           ▼
//!                       ConnectionCache ◄──get──────── Selector::select
//!                              │
//!                              ▼
//!                           Dialer
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use selector::{MemoryRegistry, Selector, SelectorConfig, TcpDialer};
//! use selector_core::SelectMode;
//!
//! let config = SelectorConfig::new("/rpc/Arith").with_mode(SelectMode::RoundRobin);
//! let selector = Selector::builder(registry, Arc::new(TcpDialer))
//!     .config(config)
//!     .build()
//!     .await?;
//!
//! let client = selector.select(&["Arith.Mul".to_string()]).await?;
//! // call failed on this connection
//! selector.handle_failed_client(&client);
//! ```

// Core modules
mod cache;
mod client;
mod config;
mod cursor;
mod ping;
mod tcp;

// Registry collaborator and synchronization
pub mod registry;
mod sync;

// Top level selector
mod selector;

// Re-exports: Connections
pub use cache::ConnectionCache;
pub use client::{Client, ClientHandle, Connection, DialError, Dialer};
pub use tcp::{TcpConnection, TcpDialer};

// Re-exports: Configuration
pub use config::SelectorConfig;

// Re-exports: Latency probing
pub use ping::{PingError, Pinger};

// Re-exports: Registry
pub use registry::{
    GetOptions, MemoryRegistry, Registry, RegistryError, RegistryNode, WatchAction, WatchEvent,
    WatchOptions, WatchStream,
};

// Re-exports: Synchronization
pub use cursor::SelectionCursor;
pub use sync::{RegistrySynchronizer, ServerSet};

// Re-exports: Selector
pub use selector::{Selector, SelectorBuilder};

// Re-exports: Core types commonly needed alongside the selector
pub use selector_core::{ArgsHasher, SelectMode, SelectorError};
