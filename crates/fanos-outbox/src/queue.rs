//! Pending-request queue.

use fanos_transport::Request;
use parking_lot::Mutex;

/// Requests that failed at least once and still have attempts left.
///
/// Membership is by request id. Iteration follows insertion order, so every
/// member is visited exactly once per pass and the persisted prefix is the
/// oldest entries. The lock is never held across an await point.
#[derive(Debug, Default)]
pub struct DeliveryQueue {
    requests: Mutex<Vec<Request>>,
}

impl DeliveryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `request`. If its id is already queued the stored entry is
    /// replaced in place and `false` is returned.
    pub fn add(&self, request: Request) -> bool {
        let mut requests = self.requests.lock();
        match requests.iter_mut().find(|r| r.id == request.id) {
            Some(existing) => {
                *existing = request;
                false
            }
            None => {
                requests.push(request);
                true
            }
        }
    }

    pub fn remove(&self, id: &str) -> Option<Request> {
        let mut requests = self.requests.lock();
        let index = requests.iter().position(|r| r.id == id)?;
        Some(requests.remove(index))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.requests.lock().iter().any(|r| r.id == id)
    }

    pub fn get(&self, id: &str) -> Option<Request> {
        self.requests.lock().iter().find(|r| r.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.lock().is_empty()
    }

    pub fn clear(&self) {
        self.requests.lock().clear();
    }

    /// Copy of every queued request.
    pub fn snapshot(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }

    /// Copy of the oldest `limit` requests.
    pub fn first(&self, limit: usize) -> Vec<Request> {
        self.requests.lock().iter().take(limit).cloned().collect()
    }

    /// Replace the contents wholesale. Later duplicates of an id are dropped.
    pub fn replace(&self, requests: Vec<Request>) {
        let mut deduped: Vec<Request> = Vec::with_capacity(requests.len());
        for request in requests {
            if !deduped.iter().any(|r| r.id == request.id) {
                deduped.push(request);
            }
        }
        *self.requests.lock() = deduped;
    }

    /// Drop every request for which `remove` returns true. Returns how many
    /// were dropped.
    pub fn remove_where(&self, mut remove: impl FnMut(&Request) -> bool) -> usize {
        let mut requests = self.requests.lock();
        let before = requests.len();
        requests.retain(|r| !remove(r));
        before - requests.len()
    }
}
