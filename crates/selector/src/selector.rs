//! Selector
//!
//! Composes the registry synchronizer, the selection algorithms and the
//! connection cache behind `select` / `handle_failed_client`.
//!
//! # Dispatch
//!
//! ```text
//! select(args)
//!     │
//!     ├── snapshot ServerSet (empty → NoAvailableService)
//!     │
//!     ├── Random              uniform index
//!     ├── RoundRobin          cursor + 1 mod len
//!     ├── ConsistentHash      jump_hash(hasher(args), len)
//!     ├── Weighted*           smooth weighted round-robin
//!     └── Closest             nearest servers, uniform among ties
//!     │
//!     ▼
//! ConnectionCache::get(server)
//! ```

use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use selector_core::{
    closest_servers, hash_args, jump_hash, ArgsHasher, Result, SelectMode, SelectorError,
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, trace, warn};

use crate::cache::ConnectionCache;
use crate::client::{ClientHandle, Dialer};
use crate::config::SelectorConfig;
use crate::cursor::SelectionCursor;
use crate::ping::Pinger;
use crate::registry::Registry;
use crate::sync::RegistrySynchronizer;

/// Builder for [`Selector`]
pub struct SelectorBuilder {
    registry: Arc<dyn Registry>,
    dialer: Arc<dyn Dialer>,
    config: SelectorConfig,
    pinger: Option<Arc<dyn Pinger>>,
    hasher: Option<ArgsHasher>,
    seed: Option<u64>,
}

impl SelectorBuilder {
    pub fn config(mut self, config: SelectorConfig) -> Self {
        self.config = config;
        self
    }

    /// Latency probe used by `SelectMode::WeightedIcmp`
    pub fn pinger(mut self, pinger: Arc<dyn Pinger>) -> Self {
        self.pinger = Some(pinger);
        self
    }

    /// Hash of call arguments used by `SelectMode::ConsistentHash`
    pub fn args_hasher(mut self, hasher: ArgsHasher) -> Self {
        self.hasher = Some(hasher);
        self
    }

    /// Seed the random source for reproducible selection
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Pull the initial server list and start watching the registry.
    ///
    /// A failed initial pull is logged and leaves the selector empty; the
    /// watch fills it in on the next change.
    pub async fn build(self) -> Result<Selector> {
        let base_path = self.config.base_path.trim_end_matches('/');
        if base_path.is_empty() {
            return Err(SelectorError::InvalidConfig(
                "base_path must not be empty".to_string(),
            ));
        }

        let mode = Arc::new(RwLock::new(self.config.select_mode));
        let cursor = Arc::new(SelectionCursor::new());
        let cache = Arc::new(ConnectionCache::new(
            self.dialer,
            self.config.dial_timeout(),
            self.config.dial_retry_cooldown(),
        ));
        let sync = Arc::new(RegistrySynchronizer::new(
            self.registry,
            base_path,
            self.config.group.clone(),
            mode.clone(),
            self.pinger,
            cache.clone(),
            cursor.clone(),
        ));

        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let stream = sync.subscribe().await;

        // Errors are logged inside; an empty view is a valid start
        let _ = sync.pull_servers().await;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let watch_task = stream.map(|stream| tokio::spawn(sync.clone().watch(stream, shutdown_rx)));

        info!(
            base_path = %sync.base_path(),
            mode = %self.config.select_mode,
            servers = sync.snapshot().len(),
            "Selector started"
        );

        Ok(Selector {
            config: self.config,
            mode,
            hasher: RwLock::new(self.hasher.unwrap_or_else(|| Arc::new(hash_args))),
            rng: Mutex::new(rng),
            cursor,
            cache,
            sync,
            shutdown,
            watch_task: Mutex::new(watch_task),
        })
    }
}

/// Client-side service selector
pub struct Selector {
    config: SelectorConfig,
    mode: Arc<RwLock<SelectMode>>,
    hasher: RwLock<ArgsHasher>,
    rng: Mutex<StdRng>,
    cursor: Arc<SelectionCursor>,
    cache: Arc<ConnectionCache>,
    sync: Arc<RegistrySynchronizer>,
    shutdown: watch::Sender<bool>,
    watch_task: Mutex<Option<JoinHandle<()>>>,
}

impl Selector {
    /// Start building a selector over `registry`, dialing with `dialer`
    pub fn builder(registry: Arc<dyn Registry>, dialer: Arc<dyn Dialer>) -> SelectorBuilder {
        SelectorBuilder {
            registry,
            dialer,
            config: SelectorConfig::default(),
            pinger: None,
            hasher: None,
            seed: None,
        }
    }

    /// Pick a server for this call and return a connection to it.
    ///
    /// `args` identify the call (service method and arguments); only
    /// consistent hashing looks at them.
    pub async fn select(&self, args: &[String]) -> Result<ClientHandle> {
        let server = self.select_server(args)?;
        self.cache.get(&server).await
    }

    /// Pick a server key without connecting
    pub fn select_server(&self, args: &[String]) -> Result<String> {
        let mode = self.select_mode();
        let set = self.sync.snapshot();
        let len = set.len();
        if len == 0 {
            return Err(SelectorError::NoAvailableService);
        }

        let server = match mode {
            SelectMode::Random => {
                let index = self.rng.lock().gen_range(0..len);
                self.cursor.set(index);
                set.servers()[index].clone()
            }
            SelectMode::RoundRobin => {
                let index = self.cursor.advance(len);
                set.servers()[index].clone()
            }
            SelectMode::ConsistentHash => {
                let hasher = self.hasher.read().clone();
                let index = jump_hash(hasher(args), len)?;
                self.cursor.set(index);
                set.servers()[index].clone()
            }
            SelectMode::WeightedRoundRobin | SelectMode::WeightedIcmp => {
                set.next_weighted().ok_or(SelectorError::NoAvailableService)?
            }
            SelectMode::Closest => {
                let closest =
                    closest_servers(self.config.latitude, self.config.longitude, set.metadata());
                if closest.is_empty() {
                    return Err(SelectorError::NoAvailableService);
                }
                let index = self.rng.lock().gen_range(0..closest.len());
                closest[index].clone()
            }
        };

        trace!(mode = %mode, server = %server, "Selected server");
        Ok(server)
    }

    /// Report a connection that failed during a call; it is evicted and closed
    pub fn handle_failed_client(&self, client: &ClientHandle) {
        self.cache.evict_client(client);
    }

    /// Fresh connections to every known server, skipping unreachable ones
    pub async fn all_clients(&self) -> Vec<ClientHandle> {
        let servers = self.servers();
        self.cache.all_clients(&servers).await
    }

    pub fn select_mode(&self) -> SelectMode {
        *self.mode.read()
    }

    /// Switch the selection strategy.
    ///
    /// Entering or leaving `WeightedIcmp` re-pulls the registry so the
    /// weights match the new mode right away.
    pub async fn set_select_mode(&self, mode: SelectMode) {
        let previous = std::mem::replace(&mut *self.mode.write(), mode);
        info!(from = %previous, mode = %mode, "Selection mode changed");

        let latency_changed =
            (previous == SelectMode::WeightedIcmp) != (mode == SelectMode::WeightedIcmp);
        if latency_changed {
            if let Err(err) = self.sync.pull_servers().await {
                warn!(mode = %mode, error = %err, "Re-pull after mode change failed, weights update on the next event");
            }
        }
    }

    /// Replace the argument hasher used by consistent hashing
    pub fn set_args_hasher(&self, hasher: ArgsHasher) {
        *self.hasher.write() = hasher;
    }

    /// Snapshot of the eligible server keys
    pub fn servers(&self) -> Vec<String> {
        self.sync.snapshot().servers().to_vec()
    }

    pub fn server_count(&self) -> usize {
        self.sync.snapshot().len()
    }

    /// Current round-robin position
    pub fn cursor(&self) -> usize {
        self.cursor.current()
    }

    /// Live cached clients
    pub fn cached_clients(&self) -> Vec<ClientHandle> {
        self.cache.clients()
    }

    /// Reconcile with the registry now instead of waiting for a change
    pub async fn pull_servers(&self) -> Result<usize> {
        self.sync.pull_servers().await
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Whether the background watch is still running
    pub fn is_watching(&self) -> bool {
        self.watch_task
            .lock()
            .as_ref()
            .map_or(false, |task| !task.is_finished())
    }

    /// Stop the background watch and wait for it to exit. Cached
    /// connections keep serving the last known view.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let task = self.watch_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for Selector {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}
