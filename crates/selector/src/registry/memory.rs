//! In-memory registry
//!
//! A process-local [`Registry`] used by tests and the probe binary. Writes are
//! broadcast to every open watch stream.

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info};

use super::{
    GetOptions, Registry, RegistryError, RegistryNode, WatchAction, WatchEvent, WatchOptions,
    WatchStream,
};

const EVENT_CAPACITY: usize = 256;

/// In-memory key-value registry with watch support
#[derive(Debug)]
pub struct MemoryRegistry {
    /// Key to value, kept sorted
    entries: RwLock<BTreeMap<String, String>>,

    /// Broadcast side of all watch streams, `None` once closed
    events: Mutex<Option<broadcast::Sender<WatchEvent>>>,

    /// When false, listings and new watches fail
    available: AtomicBool,
}

impl MemoryRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entries: RwLock::new(BTreeMap::new()),
            events: Mutex::new(Some(tx)),
            available: AtomicBool::new(true),
        }
    }

    /// Create or overwrite a key
    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        let previous = self.entries.write().insert(key.clone(), value.clone());
        let action = if previous.is_some() {
            WatchAction::Set
        } else {
            WatchAction::Create
        };
        self.publish(action, RegistryNode::new(key, value));
    }

    /// Update an existing key. Returns false if the key is absent.
    pub fn update(&self, key: &str, value: impl Into<String>) -> bool {
        let value = value.into();
        {
            let mut entries = self.entries.write();
            match entries.get_mut(key) {
                Some(existing) => *existing = value.clone(),
                None => return false,
            }
        }
        self.publish(WatchAction::Update, RegistryNode::new(key, value));
        true
    }

    /// Delete a key. Returns false if the key is absent.
    pub fn remove(&self, key: &str) -> bool {
        match self.entries.write().remove(key) {
            Some(_) => {
                self.publish(WatchAction::Delete, RegistryNode::new(key, ""));
                true
            }
            None => false,
        }
    }

    /// Expire a key, as a lapsed TTL would. Returns false if the key is absent.
    pub fn expire(&self, key: &str) -> bool {
        match self.entries.write().remove(key) {
            Some(_) => {
                self.publish(WatchAction::Expire, RegistryNode::new(key, ""));
                true
            }
            None => false,
        }
    }

    /// Simulate an outage (`false`) or recovery (`true`)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Terminate every open watch stream. Later watches fail.
    pub fn close(&self) {
        if self.events.lock().take().is_some() {
            info!("Memory registry closed");
        }
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn publish(&self, action: WatchAction, node: RegistryNode) {
        debug!(action = %action, key = %node.key, "Registry change");
        if let Some(tx) = self.events.lock().as_ref() {
            // No subscribers is fine
            let _ = tx.send(WatchEvent { action, node });
        }
    }

    fn check_available(&self) -> Result<(), RegistryError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RegistryError::Unavailable("memory registry is offline".to_string()))
        }
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `key` lives under `path`
fn is_under(path: &str, key: &str, recursive: bool) -> bool {
    let prefix = format!("{}/", path.trim_end_matches('/'));
    match key.strip_prefix(&prefix) {
        Some(rest) => !rest.is_empty() && (recursive || !rest.contains('/')),
        None => false,
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn get(&self, path: &str, options: GetOptions) -> Result<Vec<RegistryNode>, RegistryError> {
        self.check_available()?;

        // BTreeMap iteration is already sorted by key
        let nodes: Vec<RegistryNode> = self
            .entries
            .read()
            .iter()
            .filter(|(key, _)| is_under(path, key, options.recursive))
            .map(|(key, value)| RegistryNode::new(key.clone(), value.clone()))
            .collect();

        Ok(nodes)
    }

    async fn watch(&self, path: &str, options: WatchOptions) -> Result<WatchStream, RegistryError> {
        self.check_available()?;

        let rx = match self.events.lock().as_ref() {
            Some(tx) => tx.subscribe(),
            None => return Err(RegistryError::WatchClosed),
        };

        let path = path.trim_end_matches('/').to_string();
        let stream = futures::stream::unfold(Some(rx), move |state| {
            let path = path.clone();
            async move {
                let mut rx = state?;
                loop {
                    match rx.recv().await {
                        Ok(event) if is_under(&path, &event.node.key, options.recursive) => {
                            return Some((Ok(event), Some(rx)));
                        }
                        Ok(_) => continue,
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(skipped, "Watch lagged, reporting directory change");
                            let event = WatchEvent {
                                action: WatchAction::Set,
                                node: RegistryNode::dir(path.clone()),
                            };
                            return Some((Ok(event), Some(rx)));
                        }
                        Err(RecvError::Closed) => {
                            return Some((Err(RegistryError::WatchClosed), None));
                        }
                    }
                }
            }
        });

        Ok(stream.boxed())
    }
}
