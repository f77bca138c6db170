//! Registry Synchronizer
//!
//! Owns the local view of the service's servers. The view is rebuilt from a
//! full registry listing on start and on every change notification, and is
//! published as one `Arc<ServerSet>` so readers never see addresses and
//! weights from different pulls.
//!
//! ```text
//! registry ──get──► parse metadata ──► drop inactive ──► (probe latency)
//!                                                           │
//!                          evict removed servers from cache ◄┘
//!                                        │
//!                     readers ◄── swap Arc<ServerSet>
//! ```

use futures::future::join_all;
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use selector_core::{
    latency_to_weight, Result, SelectMode, SelectorError, ServerAddress, ServerMetadata,
    ServerRecord, WeightedRing,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use crate::cache::ConnectionCache;
use crate::cursor::SelectionCursor;
use crate::ping::Pinger;
use crate::registry::{
    GetOptions, Registry, RegistryNode, WatchAction, WatchEvent, WatchOptions, WatchStream,
};

/// One consistent view of the eligible servers
#[derive(Debug, Default)]
pub struct ServerSet {
    /// Server keys in registry order
    servers: Vec<String>,
    /// Weighted records, same length and order as `servers`
    weighted: Mutex<WeightedRing>,
    /// Raw metadata by server key
    metadata: HashMap<String, String>,
}

impl ServerSet {
    pub fn new(servers: Vec<String>, records: Vec<ServerRecord>, metadata: HashMap<String, String>) -> Self {
        debug_assert_eq!(servers.len(), records.len());
        Self {
            servers,
            weighted: Mutex::new(WeightedRing::new(records)),
            metadata,
        }
    }

    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    /// Copy of the weighted records
    pub fn records(&self) -> Vec<ServerRecord> {
        self.weighted.lock().records().to_vec()
    }

    /// Step the smooth weighted round-robin and return the chosen server
    pub fn next_weighted(&self) -> Option<String> {
        self.weighted.lock().pick().map(|record| record.key.clone())
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

/// Keeps the local server view in step with the registry
pub struct RegistrySynchronizer {
    registry: Arc<dyn Registry>,
    base_path: String,
    group: String,
    mode: Arc<RwLock<SelectMode>>,
    pinger: Option<Arc<dyn Pinger>>,
    view: RwLock<Arc<ServerSet>>,
    cache: Arc<ConnectionCache>,
    cursor: Arc<SelectionCursor>,
}

impl RegistrySynchronizer {
    pub fn new(
        registry: Arc<dyn Registry>,
        base_path: impl Into<String>,
        group: impl Into<String>,
        mode: Arc<RwLock<SelectMode>>,
        pinger: Option<Arc<dyn Pinger>>,
        cache: Arc<ConnectionCache>,
        cursor: Arc<SelectionCursor>,
    ) -> Self {
        let base_path = base_path.into();
        Self {
            registry,
            base_path: base_path.trim_end_matches('/').to_string(),
            group: group.into(),
            mode,
            pinger,
            view: RwLock::new(Arc::new(ServerSet::default())),
            cache,
            cursor,
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Current view; stays valid while a newer pull replaces it
    pub fn snapshot(&self) -> Arc<ServerSet> {
        self.view.read().clone()
    }

    /// Rebuild the view from a full registry listing.
    ///
    /// Returns the number of eligible servers. On a registry error the
    /// previous view is kept.
    pub async fn pull_servers(&self) -> Result<usize> {
        let options = GetOptions {
            recursive: true,
            sorted: true,
        };
        let nodes = match self.registry.get(&self.base_path, options).await {
            Ok(nodes) => nodes,
            Err(err) => {
                warn!(base_path = %self.base_path, error = %err, "Failed to pull servers, keeping previous view");
                return Err(SelectorError::RegistryUnavailable(err.to_string()));
            }
        };

        let nodes: Vec<RegistryNode> = nodes.into_iter().filter(|node| !node.dir).collect();
        if nodes.is_empty() {
            self.cache.clear();
            *self.view.write() = Arc::new(ServerSet::default());
            self.cursor.clamp(0);
            info!(base_path = %self.base_path, "No servers registered");
            return Ok(0);
        }

        let mut servers = Vec::with_capacity(nodes.len());
        let mut records = Vec::with_capacity(nodes.len());
        let mut metadata = HashMap::with_capacity(nodes.len());

        for node in nodes {
            let server = self.server_key(&node.key).to_string();
            let meta = ServerMetadata::parse(&node.value);
            if !meta.is_eligible(&self.group) {
                debug!(
                    server = %server,
                    state = %meta.state,
                    group = %meta.group,
                    "Skipping inactive server"
                );
                continue;
            }

            records.push(meta.to_record(&server, &node.value));
            metadata.insert(server.clone(), node.value);
            servers.push(server);
        }

        let mode = *self.mode.read();
        if mode == SelectMode::WeightedIcmp {
            self.apply_latency_weights(&mut records).await;
        }

        let count = servers.len();
        let set = Arc::new(ServerSet::new(servers, records, metadata));

        // The cache learns the new set before selection can see it
        let evicted = {
            let active: HashSet<&str> = set.servers().iter().map(String::as_str).collect();
            self.cache.retain(&active)
        };
        *self.view.write() = set;
        self.cursor.clamp(count);

        info!(base_path = %self.base_path, servers = count, evicted, "Pulled servers");
        Ok(count)
    }

    /// Overwrite weights with values derived from probed latency
    async fn apply_latency_weights(&self, records: &mut [ServerRecord]) {
        let Some(pinger) = self.pinger.as_ref() else {
            warn!("Latency weighted mode without a pinger, keeping declared weights");
            return;
        };

        let probes = records.iter().map(|record| {
            let pinger = pinger.clone();
            let key = record.key.clone();
            async move {
                let host = match ServerAddress::parse(&key) {
                    Ok(address) => address.host().to_string(),
                    Err(err) => {
                        warn!(error = %err, "Cannot probe malformed server key");
                        return None;
                    }
                };
                match pinger.ping(&host).await {
                    Ok(rtt) => Some(rtt),
                    Err(err) => {
                        debug!(error = %err, "Latency probe failed");
                        None
                    }
                }
            }
        });

        let rtts = join_all(probes).await;
        for (record, rtt) in records.iter_mut().zip(rtts) {
            let weight = latency_to_weight(rtt);
            trace!(server = %record.key, ?rtt, weight, "Latency weight");
            record.set_weight(weight);
        }
    }

    /// Open the registry watch. Opened before the initial pull so no change
    /// between the pull and the watch is missed.
    pub async fn subscribe(&self) -> Option<WatchStream> {
        let options = WatchOptions { recursive: true };
        match self.registry.watch(&self.base_path, options).await {
            Ok(stream) => Some(stream),
            Err(err) => {
                error!(base_path = %self.base_path, error = %err, "Failed to watch registry");
                None
            }
        }
    }

    /// Re-pull on every change until the stream ends or shutdown is signalled
    pub async fn watch(self: Arc<Self>, mut stream: WatchStream, mut shutdown: watch::Receiver<bool>) {
        info!(base_path = %self.base_path, "Watching registry");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(base_path = %self.base_path, "Registry watch stopped");
                        break;
                    }
                }
                next = stream.next() => match next {
                    Some(Ok(event)) => self.handle_event(event).await,
                    Some(Err(err)) => {
                        warn!(
                            base_path = %self.base_path,
                            error = %err,
                            "Registry watch terminated, serving last known servers"
                        );
                        break;
                    }
                    None => {
                        warn!(
                            base_path = %self.base_path,
                            "Registry watch stream ended, serving last known servers"
                        );
                        break;
                    }
                },
            }
        }
    }

    async fn handle_event(&self, event: WatchEvent) {
        debug!(action = %event.action, key = %event.node.key, "Registry changed");

        if event.action == WatchAction::Expire && !event.node.dir {
            let server = self.server_key(&event.node.key).to_string();
            self.cache.evict(&server);
        }

        // Failures are logged by pull_servers; the previous view stays
        let _ = self.pull_servers().await;
    }

    fn server_key<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(&self.base_path)
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(key)
    }
}
