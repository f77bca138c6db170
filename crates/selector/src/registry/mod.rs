//! Registry collaborator
//!
//! The selector reads and watches a distributed key-value registry through
//! the [`Registry`] trait. Every instance of a service is a child node of the
//! service's base path; its key ends in `network@host:port` and its value is
//! a metadata query string.

mod memory;

pub use memory::MemoryRegistry;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;
use thiserror::Error;

/// Registry error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Registry could not be reached or refused the request
    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    /// Requested path does not exist
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Watch stream was closed by the registry
    #[error("Watch stream closed")]
    WatchClosed,
}

/// A node returned by a registry listing or carried by a watch event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryNode {
    /// Full registry key
    pub key: String,
    /// Raw value
    pub value: String,
    /// Whether the node is a directory
    pub dir: bool,
}

impl RegistryNode {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            dir: false,
        }
    }

    pub fn dir(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: String::new(),
            dir: true,
        }
    }
}

/// Kind of change reported by a watch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchAction {
    Create,
    Set,
    Update,
    Delete,
    Expire,
}

impl fmt::Display for WatchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchAction::Create => write!(f, "create"),
            WatchAction::Set => write!(f, "set"),
            WatchAction::Update => write!(f, "update"),
            WatchAction::Delete => write!(f, "delete"),
            WatchAction::Expire => write!(f, "expire"),
        }
    }
}

/// One change notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub action: WatchAction,
    pub node: RegistryNode,
}

/// Listing options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetOptions {
    pub recursive: bool,
    pub sorted: bool,
}

/// Watch options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    pub recursive: bool,
}

/// Stream of change notifications. An `Err` item or the end of the stream
/// means the watch is over.
pub type WatchStream = BoxStream<'static, Result<WatchEvent, RegistryError>>;

/// Service registry consumed by the selector
#[async_trait]
pub trait Registry: Send + Sync {
    /// List the nodes under `path`
    async fn get(&self, path: &str, options: GetOptions) -> Result<Vec<RegistryNode>, RegistryError>;

    /// Subscribe to changes under `path`
    async fn watch(&self, path: &str, options: WatchOptions) -> Result<WatchStream, RegistryError>;
}
