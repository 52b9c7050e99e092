//! Persistence bridge between the delivery queue and a key-value store.
//!
//! Writes are debounced: bursts of queue changes inside the window collapse
//! into one store write. Store failures are logged and never surface.

use crate::queue::DeliveryQueue;
use crate::SharedConfig;
use fanos_config_and_utils::diag;
use fanos_storage::KeyValueStore;
use fanos_transport::Request;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

/// Most requests written to the store.
pub const MAX_PERSISTED: usize = 100;

/// Default debounce window.
pub const PERSIST_DEBOUNCE: Duration = Duration::from_millis(500);

/// What a write did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// `n` requests were written.
    Written(usize),
    /// Persistence is disabled or the queue is empty.
    Skipped,
    /// The store rejected the write.
    Failed,
}

struct Shared {
    store: Arc<dyn KeyValueStore>,
    queue: Arc<DeliveryQueue>,
    config: SharedConfig,
}

impl Shared {
    fn write(&self) -> PersistOutcome {
        let (store_failed, store_key, debug) = {
            let config = self.config.read();
            (config.store_failed, config.store_key.clone(), config.debug)
        };

        if !store_failed || self.queue.is_empty() {
            diag!(debug, "Skipping persistence: queue is empty or storeFailed is off");
            return PersistOutcome::Skipped;
        }

        let requests = self.queue.first(MAX_PERSISTED);
        self.write_requests(&store_key, &requests, debug)
    }

    fn write_requests(&self, key: &str, requests: &[Request], debug: bool) -> PersistOutcome {
        let serialized = match serde_json::to_string(requests) {
            Ok(serialized) => serialized,
            Err(e) => {
                warn!(error = %e, "Failed to serialize queue");
                return PersistOutcome::Failed;
            }
        };

        match self.store.set(key, &serialized) {
            Ok(()) => {
                diag!(debug, key = %key, count = requests.len(), "Persisted queue");
                PersistOutcome::Written(requests.len())
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to persist queue");
                PersistOutcome::Failed
            }
        }
    }
}

/// Serializes the queue to the store and restores it on start-up.
pub struct PersistenceBridge {
    shared: Arc<Shared>,
    window: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl PersistenceBridge {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        queue: Arc<DeliveryQueue>,
        config: SharedConfig,
        window: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                queue,
                config,
            }),
            window,
            pending: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.shared.store
    }

    /// Replace the in-memory queue with the stored one.
    ///
    /// A stored value that is not a JSON array is ignored. A read failure,
    /// unparsable JSON, or entries that do not decode as requests clear the
    /// queue instead of propagating. Returns the queue length afterwards.
    pub fn load(&self) -> usize {
        let (key, debug) = {
            let config = self.shared.config.read();
            (config.store_key.clone(), config.debug)
        };
        let queue = &self.shared.queue;

        let stored = match self.shared.store.get(&key) {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                diag!(debug, key = %key, "No stored queue");
                return queue.len();
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read stored queue, clearing");
                queue.clear();
                return 0;
            }
        };

        let value: serde_json::Value = match serde_json::from_str(&stored) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Stored queue is not valid JSON, clearing");
                queue.clear();
                return 0;
            }
        };

        if !value.is_array() {
            diag!(debug, key = %key, "Stored queue is not an array, ignoring");
            return queue.len();
        }

        match serde_json::from_value::<Vec<Request>>(value) {
            Ok(requests) => {
                queue.replace(requests);
                let len = queue.len();
                diag!(debug, key = %key, count = len, "Loaded queue from storage");
                len
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Stored queue entries are malformed, clearing");
                queue.clear();
                0
            }
        }
    }

    /// Debounced write. Restarts the window if a write is already pending.
    ///
    /// Outside a tokio runtime the write happens immediately.
    pub fn schedule(&self) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                self.cancel_pending();
                self.shared.write();
                return;
            }
        };

        let shared = self.shared.clone();
        let window = self.window;
        let handle = runtime.spawn(async move {
            tokio::time::sleep(window).await;
            shared.write();
        });

        if let Some(previous) = self.pending.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Drop a pending debounced write, if any.
    pub fn cancel_pending(&self) -> bool {
        match self.pending.lock().take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Write now, under the same rules as the debounced write.
    pub fn write_now(&self) -> PersistOutcome {
        self.cancel_pending();
        self.shared.write()
    }

    /// Unconditionally store an empty queue.
    pub fn write_empty(&self) -> PersistOutcome {
        self.cancel_pending();
        let (key, debug) = {
            let config = self.shared.config.read();
            (config.store_key.clone(), config.debug)
        };
        self.shared.write_requests(&key, &[], debug)
    }
}

impl Drop for PersistenceBridge {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.get_mut().take() {
            handle.abort();
        }
    }
}
