//! The delivery controller.
//!
//! `Fanos` owns the queue, the retry scheduler and the persistence bridge,
//! and exposes `send` / `flush` / `configure` / `destroy`. The first `send`
//! (or an explicit [`Fanos::initialize`]) loads the stored queue, attaches
//! the lifecycle listeners and arms the retry scheduler.

use crate::persistence::{PersistOutcome, PersistenceBridge, PERSIST_DEBOUNCE};
use crate::queue::DeliveryQueue;
use crate::scheduler::{RetryPolicy, RetryScheduler, SchedulerState};
use crate::{OutboxError, OutboxResult, SharedConfig};
use fanos_config_and_utils::{diag, ConfigOverrides, FanosConfig};
use fanos_lifecycle::{Handler, LifecycleEvent, LifecycleNotifier, SubscriptionSet};
use fanos_storage::{KeyValueStore, MemoryStore};
use fanos_transport::{
    BeaconSender, HttpBeaconSender, Payload, ReliableSender, ReqwestSender, Request, SendOptions,
    TransportAdapter,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info};

/// Outcome of one flush pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Requests a send was attempted for.
    pub attempted: usize,
    /// Requests delivered and removed.
    pub delivered: usize,
    /// Requests removed because their attempt budget was already spent.
    pub exhausted: usize,
    /// Requests still queued after the pass.
    pub remaining: usize,
}

struct Inner {
    config: SharedConfig,
    queue: Arc<DeliveryQueue>,
    adapter: TransportAdapter,
    notifier: Option<Arc<dyn LifecycleNotifier>>,
    persistence: PersistenceBridge,
    scheduler: RetryScheduler,
    initialized: Mutex<bool>,
    subscriptions: Mutex<SubscriptionSet>,
    /// Serializes flush passes so one request is never in two passes.
    flush_lock: tokio::sync::Mutex<()>,
}

/// Best-effort beacon delivery queue.
///
/// Cheap to clone; clones share one queue.
#[derive(Clone)]
pub struct Fanos {
    inner: Arc<Inner>,
}

impl Fanos {
    pub fn builder() -> FanosBuilder {
        FanosBuilder::new()
    }

    /// Deliver `data` now.
    ///
    /// On failure the request is queued for retry (when `store_failed` is on)
    /// with one attempt recorded, and `DeliveryFailed` is returned.
    pub async fn send(
        &self,
        data: impl Into<Payload>,
        options: SendOptions,
    ) -> OutboxResult<()> {
        self.initialize();

        let config = self.config();
        let request = Request::new(data.into(), &options, &config);
        diag!(
            config.debug,
            request_id = %request.id,
            url = ?request.url,
            kind = request.data.kind(),
            "Sending request"
        );

        if self.inner.adapter.send_request(&request, &config).await {
            self.inner.queue.remove(&request.id);
            return Ok(());
        }

        Err(self.handle_failure(request, &config))
    }

    fn handle_failure(&self, mut request: Request, config: &FanosConfig) -> OutboxError {
        request.attempts += 1;
        diag!(
            config.debug,
            request_id = %request.id,
            attempts = request.attempts,
            "Request failed"
        );

        let request_id = request.id.clone();
        if config.store_failed {
            self.inner.queue.add(request);
            self.inner.persistence.schedule();
        }

        OutboxError::DeliveryFailed { request_id }
    }

    /// Run one pass over the queue.
    ///
    /// Requests whose attempt budget is spent are dropped without a send.
    /// Failures during the pass leave the request queued and do not count
    /// against its attempts.
    pub async fn flush(&self) -> FlushReport {
        let _pass = self.inner.flush_lock.lock().await;
        let config = self.config();
        let queue = &self.inner.queue;

        if queue.is_empty() {
            diag!(config.debug, "Queue is empty, skipping flush");
            return FlushReport::default();
        }

        let max_attempts = config.max_attempts_per_request;
        let pending = queue.snapshot();
        diag!(config.debug, count = pending.len(), "Flushing queue");

        let mut report = FlushReport::default();
        let mut delivered: HashSet<String> = HashSet::new();
        for request in pending.iter().filter(|r| r.attempts < max_attempts) {
            report.attempted += 1;
            if self.inner.adapter.send_request(request, &config).await {
                delivered.insert(request.id.clone());
            } else {
                diag!(
                    config.debug,
                    request_id = %request.id,
                    attempts = request.attempts,
                    "Flush send failed"
                );
            }
        }

        let mut exhausted = 0;
        queue.remove_where(|r| {
            if delivered.contains(&r.id) {
                true
            } else if r.attempts >= max_attempts {
                exhausted += 1;
                true
            } else {
                false
            }
        });

        report.delivered = delivered.len();
        report.exhausted = exhausted;
        report.remaining = queue.len();

        if report.remaining > 0 {
            self.inner.persistence.schedule();
        } else {
            diag!(config.debug, "Queue is empty, skipping persistence");
        }

        debug!(
            attempted = report.attempted,
            delivered = report.delivered,
            exhausted = report.exhausted,
            remaining = report.remaining,
            "Flush pass complete"
        );
        report
    }

    /// Merge `overrides` into the live configuration.
    pub fn configure(&self, overrides: &ConfigOverrides) -> Self {
        self.inner.config.write().apply(overrides);
        self.clone()
    }

    /// Detach listeners, stop retries, clear the queue and store the empty
    /// queue. The next `send` initializes again from scratch.
    pub fn destroy(&self) {
        let debug = self.inner.config.read().debug;
        diag!(debug, "Destroying instance");

        self.inner.subscriptions.lock().cancel_all();
        self.inner.scheduler.cancel();
        self.inner.queue.clear();
        self.inner.persistence.write_empty();
        *self.inner.initialized.lock() = false;
    }

    /// Load the stored queue, attach lifecycle listeners and arm the retry
    /// scheduler. Does nothing if already initialized.
    pub fn initialize(&self) {
        {
            let mut initialized = self.inner.initialized.lock();
            if *initialized {
                return;
            }
            *initialized = true;
        }

        let config = self.config();
        diag!(config.debug, "Initializing");

        let loaded = self.inner.persistence.load();
        self.attach_listeners(&config);
        self.start_retries();

        info!(queued = loaded, "Fanos initialized");
    }

    fn attach_listeners(&self, config: &FanosConfig) {
        let mut subscriptions = self.inner.subscriptions.lock();
        subscriptions.cancel_all();

        if !config.auto_flush {
            return;
        }
        let Some(notifier) = self.inner.notifier.as_ref() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No async runtime, lifecycle flushes disabled");
            return;
        };

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let handler: Handler = Arc::new(move |event: LifecycleEvent| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let fanos = Fanos { inner };
            let debug = fanos.inner.config.read().debug;
            if fanos.inner.queue.is_empty() {
                diag!(debug, event = %event, "Queue is empty, skipping auto-flush");
                return;
            }
            diag!(debug, event = %event, "Auto-flushing queue");
            runtime.spawn(async move {
                fanos.flush().await;
            });
        });

        *subscriptions = SubscriptionSet::attach_all(notifier.as_ref(), handler);
    }

    /// Arm the scheduler. The policy is rebuilt from the live config each
    /// cycle, so `configure` takes effect on the running schedule.
    fn start_retries(&self) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let config = self.inner.config.clone();
        self.inner.scheduler.start(
            move || RetryPolicy::from_config(&config.read()),
            move || {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(inner) => Fanos { inner }.flush().await.remaining,
                        None => 0,
                    }
                }
            },
        );
    }

    /// Write the queue to the store now instead of waiting for the debounce.
    pub fn persist_now(&self) -> PersistOutcome {
        self.inner.persistence.write_now()
    }

    pub fn is_initialized(&self) -> bool {
        *self.inner.initialized.lock()
    }

    /// Snapshot of the live configuration.
    pub fn config(&self) -> FanosConfig {
        self.inner.config.read().clone()
    }

    pub fn queue_len(&self) -> usize {
        self.inner.queue.len()
    }

    /// Snapshot of the queued requests, oldest first.
    pub fn pending_requests(&self) -> Vec<Request> {
        self.inner.queue.snapshot()
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.inner.scheduler.state()
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        self.inner.persistence.store()
    }
}

impl std::fmt::Debug for Fanos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fanos")
            .field("queue_len", &self.queue_len())
            .field("scheduler", &self.scheduler_state())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

/// Builder for [`Fanos`].
pub struct FanosBuilder {
    config: FanosConfig,
    beacon: Option<Arc<dyn BeaconSender>>,
    reliable: Option<Arc<dyn ReliableSender>>,
    store: Option<Arc<dyn KeyValueStore>>,
    notifier: Option<Arc<dyn LifecycleNotifier>>,
    persist_debounce: Duration,
}

impl Default for FanosBuilder {
    fn default() -> Self {
        Self {
            config: FanosConfig::default(),
            beacon: None,
            reliable: None,
            store: None,
            notifier: None,
            persist_debounce: PERSIST_DEBOUNCE,
        }
    }
}

impl FanosBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: FanosConfig) -> Self {
        self.config = config;
        self
    }

    pub fn overrides(mut self, overrides: &ConfigOverrides) -> Self {
        self.config.apply(overrides);
        self
    }

    pub fn beacon(mut self, beacon: Arc<dyn BeaconSender>) -> Self {
        self.beacon = Some(beacon);
        self
    }

    pub fn reliable(mut self, reliable: Arc<dyn ReliableSender>) -> Self {
        self.reliable = Some(reliable);
        self
    }

    /// Use the reqwest-backed beacon and reliable senders. Spawns the beacon
    /// drain task, so this must run inside a tokio runtime.
    pub fn http_transports(self) -> OutboxResult<Self> {
        let reliable = ReqwestSender::new()?;
        let (beacon, _drain) = HttpBeaconSender::spawn(reliable.client().clone());
        Ok(self.beacon(Arc::new(beacon)).reliable(Arc::new(reliable)))
    }

    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn LifecycleNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn persist_debounce(mut self, window: Duration) -> Self {
        self.persist_debounce = window;
        self
    }

    pub fn build(self) -> OutboxResult<Fanos> {
        let beacon = self
            .beacon
            .ok_or_else(|| OutboxError::Config("a beacon sender is required".to_string()))?;

        let mut adapter = TransportAdapter::new(beacon);
        if let Some(reliable) = self.reliable {
            adapter = adapter.with_reliable(reliable);
        }

        let store: Arc<dyn KeyValueStore> = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryStore::new()),
        };
        let config: SharedConfig = Arc::new(RwLock::new(self.config));
        let queue = Arc::new(DeliveryQueue::new());
        let persistence =
            PersistenceBridge::new(store, queue.clone(), config.clone(), self.persist_debounce);

        Ok(Fanos {
            inner: Arc::new(Inner {
                config,
                queue,
                adapter,
                notifier: self.notifier,
                persistence,
                scheduler: RetryScheduler::new(),
                initialized: Mutex::new(false),
                subscriptions: Mutex::new(SubscriptionSet::new()),
                flush_lock: tokio::sync::Mutex::new(()),
            }),
        })
    }
}
