//! Client handles and the dialing collaborator
//!
//! The RPC transport itself lives outside this crate. The selector only needs
//! to open a connection to `network@host:port` and to close it again, which
//! is all [`Dialer`] and [`Connection`] expose.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Dial error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DialError {
    /// Connect did not finish within the dial timeout
    #[error("Dial timed out after {0:?}")]
    Timeout(Duration),

    /// The dialer does not speak this network
    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),

    /// Connect failed
    #[error("Connect failed: {0}")]
    Connect(String),
}

/// An established connection to one server
pub trait Connection: Send + Sync + fmt::Debug {
    /// Close the connection. Must be idempotent.
    fn close(&self);

    /// Whether `close` has been called
    fn is_closed(&self) -> bool;
}

/// Opens connections to servers
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Dial `address` (`host:port`) over `network`
    async fn dial(
        &self,
        network: &str,
        address: &str,
        timeout: Duration,
    ) -> Result<Arc<dyn Connection>, DialError>;
}

/// A connection handed out by the selector, tagged with the server it
/// belongs to and a unique id
#[derive(Debug)]
pub struct Client {
    id: Uuid,
    server: String,
    connection: Arc<dyn Connection>,
}

/// Shared client handle
pub type ClientHandle = Arc<Client>;

impl Client {
    /// Wrap a freshly dialed connection
    pub fn new(server: impl Into<String>, connection: Arc<dyn Connection>) -> Self {
        Self {
            id: Uuid::new_v4(),
            server: server.into(),
            connection,
        }
    }

    /// Unique id of this handle
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Server key, `network@host:port`
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Underlying transport connection
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    pub fn close(&self) {
        self.connection.close();
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }
}

impl PartialEq for Client {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Client {}
