//! Lifecycle notifications for Fanos.
//!
//! Embedders report host lifecycle transitions (the page is hidden, the
//! process is about to unload, visibility changed) to a [`LifecycleBus`].
//! Subscribers register per event and get back a [`Subscription`] handle;
//! a [`SubscriptionSet`] releases a group of handles together.

use parking_lot::Mutex;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tracing::{debug, trace};

/// Errors from lifecycle management.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Unknown lifecycle event: {0}")]
    UnknownEvent(String),
}

/// Host lifecycle transitions that should trigger a final flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    PageHide,
    BeforeUnload,
    VisibilityChange,
}

impl LifecycleEvent {
    /// Every event, in subscription order.
    pub const ALL: [LifecycleEvent; 3] = [
        LifecycleEvent::PageHide,
        LifecycleEvent::BeforeUnload,
        LifecycleEvent::VisibilityChange,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PageHide => "pagehide",
            Self::BeforeUnload => "beforeunload",
            Self::VisibilityChange => "visibilitychange",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleEvent {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pagehide" | "page-hide" => Ok(Self::PageHide),
            "beforeunload" | "before-unload" | "unload" => Ok(Self::BeforeUnload),
            "visibilitychange" | "visibility-change" => Ok(Self::VisibilityChange),
            _ => Err(LifecycleError::UnknownEvent(s.to_string())),
        }
    }
}

/// Callback invoked with the event that fired.
pub type Handler = Arc<dyn Fn(LifecycleEvent) + Send + Sync>;

/// Source of lifecycle notifications.
pub trait LifecycleNotifier: Send + Sync {
    /// Register `handler` for `event`. Dropping or cancelling the returned
    /// handle detaches it.
    fn subscribe(&self, event: LifecycleEvent, handler: Handler) -> Subscription;
}

/// Handle to one registered handler.
///
/// Detaches on [`cancel`](Subscription::cancel) or drop.
#[must_use = "dropping a Subscription detaches its handler"]
pub struct Subscription {
    event: LifecycleEvent,
    canceller: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Build a handle whose `canceller` runs exactly once on cancel or drop.
    pub fn new(event: LifecycleEvent, canceller: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            event,
            canceller: Some(Box::new(canceller)),
        }
    }

    pub fn event(&self) -> LifecycleEvent {
        self.event
    }

    pub fn is_active(&self) -> bool {
        self.canceller.is_some()
    }

    pub fn cancel(&mut self) {
        if let Some(canceller) = self.canceller.take() {
            canceller();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Handles collected at attach time and released together.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe one shared handler to every lifecycle event.
    pub fn attach_all(notifier: &dyn LifecycleNotifier, handler: Handler) -> Self {
        let subscriptions = LifecycleEvent::ALL
            .iter()
            .map(|event| notifier.subscribe(*event, handler.clone()))
            .collect();
        Self { subscriptions }
    }

    pub fn push(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Detach every handle in the set.
    pub fn cancel_all(&mut self) {
        let count = self.subscriptions.len();
        for mut subscription in self.subscriptions.drain(..) {
            subscription.cancel();
        }
        if count > 0 {
            debug!(count, "Lifecycle subscriptions cancelled");
        }
    }
}

impl Drop for SubscriptionSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

struct Registration {
    id: u64,
    event: LifecycleEvent,
    handler: Handler,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    registrations: Mutex<Vec<Registration>>,
}

impl BusInner {
    /// The removed registration is handed back so its handler is dropped
    /// after the lock is released.
    fn remove(&self, id: u64) -> Option<Registration> {
        let mut registrations = self.registrations.lock();
        let index = registrations.iter().position(|r| r.id == id)?;
        Some(registrations.remove(index))
    }
}

/// In-process lifecycle notifier.
///
/// Cloning shares the same registrations.
#[derive(Clone, Default)]
pub struct LifecycleBus {
    inner: Arc<BusInner>,
}

impl LifecycleBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to its current subscribers. Returns how many handlers
    /// ran.
    ///
    /// Handlers run outside the registration lock, so they may subscribe or
    /// cancel freely.
    pub fn emit(&self, event: LifecycleEvent) -> usize {
        let handlers: Vec<Handler> = self
            .inner
            .registrations
            .lock()
            .iter()
            .filter(|r| r.event == event)
            .map(|r| r.handler.clone())
            .collect();

        trace!(event = %event, handlers = handlers.len(), "Emitting lifecycle event");
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    /// Subscribers currently attached to `event`.
    pub fn subscriber_count(&self, event: LifecycleEvent) -> usize {
        self.inner
            .registrations
            .lock()
            .iter()
            .filter(|r| r.event == event)
            .count()
    }
}

impl LifecycleNotifier for LifecycleBus {
    fn subscribe(&self, event: LifecycleEvent, handler: Handler) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.registrations.lock().push(Registration { id, event, handler });

        let weak: Weak<BusInner> = Arc::downgrade(&self.inner);
        Subscription::new(event, move || {
            if let Some(inner) = weak.upgrade() {
                drop(inner.remove(id));
            }
        })
    }
}

impl fmt::Debug for LifecycleBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleBus")
            .field("registrations", &self.inner.registrations.lock().len())
            .finish()
    }
}
