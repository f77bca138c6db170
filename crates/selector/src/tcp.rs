//! TCP dialer

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

use crate::client::{Connection, DialError, Dialer};

/// Dials `tcp`, `tcp4` and `tcp6` servers
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

/// A plain TCP connection; closing drops the stream
#[derive(Debug)]
pub struct TcpConnection {
    peer: String,
    stream: Mutex<Option<TcpStream>>,
}

impl Connection for TcpConnection {
    fn close(&self) {
        if self.stream.lock().take().is_some() {
            debug!(peer = %self.peer, "Closed TCP connection");
        }
    }

    fn is_closed(&self) -> bool {
        self.stream.lock().is_none()
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(
        &self,
        network: &str,
        address: &str,
        timeout: Duration,
    ) -> Result<Arc<dyn Connection>, DialError> {
        if !matches!(network, "tcp" | "tcp4" | "tcp6") {
            return Err(DialError::UnsupportedNetwork(network.to_string()));
        }

        let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
            .await
            .map_err(|_| DialError::Timeout(timeout))?
            .map_err(|e| DialError::Connect(e.to_string()))?;

        debug!(network = %network, address = %address, "Dialed TCP connection");

        Ok(Arc::new(TcpConnection {
            peer: address.to_string(),
            stream: Mutex::new(Some(stream)),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_dial_and_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let conn = TcpDialer
            .dial("tcp", &address, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(!conn.is_closed());

        conn.close();
        assert!(conn.is_closed());
        conn.close();
    }

    #[tokio::test]
    async fn test_unsupported_network() {
        let result = TcpDialer
            .dial("unix", "/tmp/rpc.sock", Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(DialError::UnsupportedNetwork(_))));
    }
}
