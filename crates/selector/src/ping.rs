//! Latency probing collaborator
//!
//! Used only by the latency-weighted mode. ICMP itself is out of scope; any
//! round-trip measurement can be plugged in.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Probe failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Ping {host} failed: {reason}")]
pub struct PingError {
    pub host: String,
    pub reason: String,
}

/// Measures round-trip time to a host
#[async_trait]
pub trait Pinger: Send + Sync {
    async fn ping(&self, host: &str) -> Result<Duration, PingError>;
}
