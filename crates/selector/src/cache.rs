//! Connection Cache
//!
//! Maps server keys to established client handles. Lookups take a read lock,
//! inserts and evictions a short write lock, and dialing never happens while
//! the lock is held.
//!
//! A failed dial is remembered for `retry_cooldown` so callers hammering a
//! dead server get the cached failure instead of a fresh connect attempt.
//!
//! Reconciliation records the active server set. A dial that completes for a
//! server outside the latest recorded set is closed rather than cached.

use futures::future::join_all;
use parking_lot::RwLock;
use selector_core::{Result, SelectorError, ServerAddress};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::client::{Client, ClientHandle, Dialer};

#[derive(Debug)]
enum CacheEntry {
    Ready(ClientHandle),
    Failed { at: Instant, reason: String },
}

impl CacheEntry {
    fn close(self) {
        if let CacheEntry::Ready(client) = self {
            client.close();
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Servers recorded by the latest `retain` or `clear`; `None` before the first
    active: Option<HashSet<String>>,
}

impl CacheState {
    fn admits(&self, server: &str) -> bool {
        self.active
            .as_ref()
            .map_or(true, |active| active.contains(server))
    }
}

/// Thread-safe cache of client connections keyed by server
pub struct ConnectionCache {
    dialer: Arc<dyn Dialer>,
    dial_timeout: Duration,
    retry_cooldown: Duration,
    state: RwLock<CacheState>,
}

impl ConnectionCache {
    pub fn new(dialer: Arc<dyn Dialer>, dial_timeout: Duration, retry_cooldown: Duration) -> Self {
        Self {
            dialer,
            dial_timeout,
            retry_cooldown,
            state: RwLock::new(CacheState::default()),
        }
    }

    /// Return the cached client for `server`, dialing one on a miss.
    ///
    /// Dial failures are cached too; within the cooldown the cached failure
    /// is returned without dialing again. A server removed by reconciliation
    /// while the dial was in flight yields `NoAvailableService`.
    pub async fn get(&self, server: &str) -> Result<ClientHandle> {
        {
            let state = self.state.read();
            match state.entries.get(server) {
                Some(CacheEntry::Ready(client)) => return Ok(client.clone()),
                Some(CacheEntry::Failed { at, reason }) if at.elapsed() < self.retry_cooldown => {
                    return Err(SelectorError::DialFailure {
                        address: server.to_string(),
                        reason: reason.clone(),
                    });
                }
                _ => {}
            }
        }

        let dialed = self.dial(server).await;

        let mut state = self.state.write();
        let admitted = state.admits(server);
        match dialed {
            Ok(client) if !admitted => {
                drop(state);
                debug!(server = %server, "Server removed while dialing, discarding client");
                client.close();
                Err(SelectorError::NoAvailableService)
            }
            Ok(client) => {
                let existing = match state.entries.get(server) {
                    Some(CacheEntry::Ready(existing)) => Some(existing.clone()),
                    _ => None,
                };
                if let Some(existing) = existing {
                    // Lost a dial race; keep one connection per server
                    drop(state);
                    client.close();
                    return Ok(existing);
                }
                state
                    .entries
                    .insert(server.to_string(), CacheEntry::Ready(client.clone()));
                Ok(client)
            }
            Err(SelectorError::DialFailure { address, reason }) => {
                if admitted {
                    state.entries.insert(
                        server.to_string(),
                        CacheEntry::Failed {
                            at: Instant::now(),
                            reason: reason.clone(),
                        },
                    );
                }
                Err(SelectorError::DialFailure { address, reason })
            }
            Err(err) => Err(err),
        }
    }

    /// Dial a fresh, uncached client
    pub async fn dial(&self, server: &str) -> Result<ClientHandle> {
        let address = ServerAddress::parse(server)?;

        match self
            .dialer
            .dial(address.network, address.address, self.dial_timeout)
            .await
        {
            Ok(connection) => {
                debug!(server = %server, "Connected to server");
                Ok(Arc::new(Client::new(server, connection)))
            }
            Err(err) => {
                warn!(server = %server, error = %err, "Failed to connect to server");
                Err(SelectorError::DialFailure {
                    address: server.to_string(),
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Remove and close the entry for `server`
    pub fn evict(&self, server: &str) -> bool {
        let removed = self.state.write().entries.remove(server);
        match removed {
            Some(entry) => {
                debug!(server = %server, "Evicted cached client");
                entry.close();
                true
            }
            None => false,
        }
    }

    /// Evict the entry owning `client` and close the client.
    ///
    /// Only the first matching entry is processed.
    pub fn evict_client(&self, client: &ClientHandle) -> bool {
        let owner = {
            let state = self.state.read();
            state.entries.iter().find_map(|(server, entry)| match entry {
                CacheEntry::Ready(cached) if cached.id() == client.id() => Some(server.clone()),
                _ => None,
            })
        };

        let removed = owner.map_or(false, |server| {
            let mut state = self.state.write();
            match state.entries.get(&server) {
                Some(CacheEntry::Ready(cached)) if cached.id() == client.id() => {
                    state.entries.remove(&server);
                    true
                }
                _ => false,
            }
        });

        if removed {
            info!(server = %client.server(), "Evicted failed client");
        }
        client.close();
        removed
    }

    /// Record `active` as the server set and evict every entry outside it
    pub fn retain(&self, active: &HashSet<&str>) -> usize {
        let removed: Vec<(String, CacheEntry)> = {
            let mut state = self.state.write();
            state.active = Some(active.iter().map(|server| server.to_string()).collect());
            let stale: Vec<String> = state
                .entries
                .keys()
                .filter(|server| !active.contains(server.as_str()))
                .cloned()
                .collect();
            stale
                .into_iter()
                .filter_map(|server| state.entries.remove(&server).map(|entry| (server, entry)))
                .collect()
        };

        let count = removed.len();
        for (server, entry) in removed {
            info!(server = %server, "Closing client to removed server");
            entry.close();
        }
        count
    }

    /// Evict and close everything; no server is active afterwards
    pub fn clear(&self) {
        let drained: Vec<CacheEntry> = {
            let mut state = self.state.write();
            state.active = Some(HashSet::new());
            state.entries.drain().map(|(_, e)| e).collect()
        };
        if !drained.is_empty() {
            info!(count = drained.len(), "Cleared connection cache");
        }
        for entry in drained {
            entry.close();
        }
    }

    /// Dial every server concurrently, skipping the ones that fail
    pub async fn all_clients(&self, servers: &[String]) -> Vec<ClientHandle> {
        let results = join_all(servers.iter().map(|server| self.dial(server))).await;

        results
            .into_iter()
            .filter_map(|result| match result {
                Ok(client) => Some(client),
                Err(err) => {
                    error!(error = %err, "RPC client connect server failed");
                    None
                }
            })
            .collect()
    }

    /// Live cached clients
    pub fn clients(&self) -> Vec<ClientHandle> {
        self.state
            .read()
            .entries
            .values()
            .filter_map(|entry| match entry {
                CacheEntry::Ready(client) => Some(client.clone()),
                CacheEntry::Failed { .. } => None,
            })
            .collect()
    }

    /// Whether `server` has any entry, live or failed
    pub fn contains(&self, server: &str) -> bool {
        self.state.read().entries.contains_key(server)
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Connection, DialError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct TestConnection {
        closed: AtomicBool,
    }

    impl Connection for TestConnection {
        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct TestDialer {
        dials: AtomicUsize,
        refuse: AtomicBool,
    }

    #[async_trait]
    impl Dialer for TestDialer {
        async fn dial(
            &self,
            _network: &str,
            address: &str,
            _timeout: Duration,
        ) -> std::result::Result<Arc<dyn Connection>, DialError> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            if self.refuse.load(Ordering::SeqCst) {
                return Err(DialError::Connect(format!("{} refused", address)));
            }
            Ok(Arc::new(TestConnection::default()))
        }
    }

    /// Dialer that parks every dial until `gate` is notified
    #[derive(Default)]
    struct GatedDialer {
        gate: tokio::sync::Notify,
        started: AtomicUsize,
        connections: parking_lot::Mutex<Vec<Arc<TestConnection>>>,
    }

    #[async_trait]
    impl Dialer for GatedDialer {
        async fn dial(
            &self,
            _network: &str,
            _address: &str,
            _timeout: Duration,
        ) -> std::result::Result<Arc<dyn Connection>, DialError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            let connection = Arc::new(TestConnection::default());
            self.connections.lock().push(connection.clone());
            Ok(connection)
        }
    }

    async fn wait_for_dial(dialer: &GatedDialer) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while dialer.started.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    fn cache(dialer: Arc<TestDialer>, cooldown: Duration) -> ConnectionCache {
        ConnectionCache::new(dialer, Duration::from_secs(1), cooldown)
    }

    #[tokio::test]
    async fn test_hit_reuses_client() {
        let dialer = Arc::new(TestDialer::default());
        let cache = cache(dialer.clone(), Duration::from_secs(5));

        let first = cache.get("tcp@127.0.0.1:8972").await.unwrap();
        let second = cache.get("tcp@127.0.0.1:8972").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(dialer.dials.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_key_fails_fast() {
        let dialer = Arc::new(TestDialer::default());
        let cache = cache(dialer.clone(), Duration::from_secs(5));

        let result = cache.get("127.0.0.1:8972").await;
        assert!(matches!(result, Err(SelectorError::InvalidAddress(_))));
        assert_eq!(dialer.dials.load(Ordering::SeqCst), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_failed_dial_cached_within_cooldown() {
        let dialer = Arc::new(TestDialer::default());
        dialer.refuse.store(true, Ordering::SeqCst);
        let cache = cache(dialer.clone(), Duration::from_secs(60));

        for _ in 0..5 {
            let result = cache.get("tcp@10.0.0.1:80").await;
            assert!(matches!(result, Err(SelectorError::DialFailure { .. })));
        }

        assert_eq!(dialer.dials.load(Ordering::SeqCst), 1);
        assert!(cache.contains("tcp@10.0.0.1:80"));
        assert!(cache.clients().is_empty());
    }

    #[tokio::test]
    async fn test_failed_dial_retried_after_cooldown() {
        let dialer = Arc::new(TestDialer::default());
        dialer.refuse.store(true, Ordering::SeqCst);
        let cache = cache(dialer.clone(), Duration::ZERO);

        assert!(cache.get("tcp@10.0.0.1:80").await.is_err());
        dialer.refuse.store(false, Ordering::SeqCst);
        assert!(cache.get("tcp@10.0.0.1:80").await.is_ok());
        assert_eq!(dialer.dials.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_evict_closes_connection() {
        let dialer = Arc::new(TestDialer::default());
        let cache = cache(dialer, Duration::from_secs(5));

        let client = cache.get("tcp@10.0.0.1:80").await.unwrap();
        assert!(cache.evict("tcp@10.0.0.1:80"));
        assert!(client.is_closed());
        assert!(!cache.evict("tcp@10.0.0.1:80"));
    }

    #[tokio::test]
    async fn test_evict_client_by_handle() {
        let dialer = Arc::new(TestDialer::default());
        let cache = cache(dialer.clone(), Duration::from_secs(5));

        let a = cache.get("tcp@10.0.0.1:80").await.unwrap();
        let b = cache.get("tcp@10.0.0.2:80").await.unwrap();

        assert!(cache.evict_client(&a));
        assert!(a.is_closed());
        assert!(!b.is_closed());
        assert!(!cache.contains("tcp@10.0.0.1:80"));
        assert!(cache.contains("tcp@10.0.0.2:80"));

        let fresh = cache.get("tcp@10.0.0.1:80").await.unwrap();
        assert_ne!(fresh, a);
        assert_eq!(dialer.dials.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retain_and_clear() {
        let dialer = Arc::new(TestDialer::default());
        let cache = cache(dialer, Duration::from_secs(5));

        let a = cache.get("tcp@10.0.0.1:80").await.unwrap();
        let b = cache.get("tcp@10.0.0.2:80").await.unwrap();

        let active: HashSet<&str> = ["tcp@10.0.0.2:80"].into_iter().collect();
        assert_eq!(cache.retain(&active), 1);
        assert!(a.is_closed());
        assert!(!b.is_closed());

        cache.clear();
        assert!(cache.is_empty());
        assert!(b.is_closed());
    }

    #[tokio::test]
    async fn test_all_clients_skips_failures() {
        let dialer = Arc::new(TestDialer::default());
        let cache = cache(dialer, Duration::from_secs(5));

        let servers = vec![
            "tcp@10.0.0.1:80".to_string(),
            "broken".to_string(),
            "tcp@10.0.0.2:80".to_string(),
        ];
        let clients = cache.all_clients(&servers).await;

        assert_eq!(clients.len(), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_dial_in_flight_during_removal_is_discarded() {
        let dialer = Arc::new(GatedDialer::default());
        let cache = Arc::new(ConnectionCache::new(
            dialer.clone(),
            Duration::from_secs(1),
            Duration::from_secs(5),
        ));
        let active: HashSet<&str> = ["tcp@10.0.0.1:80"].into_iter().collect();
        cache.retain(&active);

        let pending = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get("tcp@10.0.0.1:80").await })
        };
        wait_for_dial(&dialer).await;

        cache.clear();
        dialer.gate.notify_one();

        let result = pending.await.unwrap();
        assert_eq!(result.unwrap_err(), SelectorError::NoAvailableService);
        assert!(cache.is_empty());
        let connections = dialer.connections.lock();
        assert_eq!(connections.len(), 1);
        assert!(connections[0].is_closed());
    }

    #[tokio::test]
    async fn test_dial_in_flight_survives_unrelated_reconcile() {
        let dialer = Arc::new(GatedDialer::default());
        let cache = Arc::new(ConnectionCache::new(
            dialer.clone(),
            Duration::from_secs(1),
            Duration::from_secs(5),
        ));

        let pending = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get("tcp@10.0.0.1:80").await })
        };
        wait_for_dial(&dialer).await;

        let active: HashSet<&str> = ["tcp@10.0.0.1:80", "tcp@10.0.0.2:80"].into_iter().collect();
        cache.retain(&active);
        dialer.gate.notify_one();

        let client = pending.await.unwrap().unwrap();
        assert!(!client.is_closed());
        assert!(cache.contains("tcp@10.0.0.1:80"));
    }
}
