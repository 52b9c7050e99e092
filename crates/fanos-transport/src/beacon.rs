//! Native beacon sender.
//!
//! Accepted payloads go onto a bounded queue that a background task drains
//! with plain POSTs. The caller only learns whether the payload was accepted;
//! the outcome of the POST is logged and otherwise dropped.

use crate::http::apply_body;
use crate::payload::{payload_size, Headers, Payload};
use crate::sender::BeaconSender;
use reqwest::Client;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Largest payload a single beacon accepts.
pub const MAX_BEACON_BYTES: usize = 64 * 1024;

/// Default number of beacons that may wait for the drain task.
pub const DEFAULT_BEACON_CAPACITY: usize = 256;

struct BeaconJob {
    url: String,
    payload: Payload,
}

/// Beacon sender backed by a bounded channel and a reqwest drain task.
#[derive(Clone)]
pub struct HttpBeaconSender {
    tx: mpsc::Sender<BeaconJob>,
    max_bytes: usize,
}

impl HttpBeaconSender {
    /// Start the drain task on the current runtime.
    pub fn spawn(client: Client) -> (Self, JoinHandle<()>) {
        Self::spawn_with_capacity(client, DEFAULT_BEACON_CAPACITY)
    }

    pub fn spawn_with_capacity(client: Client, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(drain(client, rx));
        (
            Self {
                tx,
                max_bytes: MAX_BEACON_BYTES,
            },
            handle,
        )
    }

    /// Beacons still waiting for the drain task.
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

impl BeaconSender for HttpBeaconSender {
    fn try_send(&self, url: &str, payload: &Payload) -> bool {
        if url.is_empty() {
            return false;
        }

        let size = payload_size(payload);
        if size > self.max_bytes {
            debug!(url = %url, size, max = self.max_bytes, "Beacon payload over quota");
            return false;
        }

        let job = BeaconJob {
            url: url.to_string(),
            payload: payload.clone(),
        };
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(url = %url, "Beacon queue full");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(url = %url, "Beacon queue closed");
                false
            }
        }
    }
}

async fn drain(client: Client, mut rx: mpsc::Receiver<BeaconJob>) {
    while let Some(job) = rx.recv().await {
        let builder = apply_body(client.post(&job.url), &Headers::new(), job.payload);
        match builder.send().await {
            Ok(response) if response.status().is_success() => {
                debug!(url = %job.url, status = response.status().as_u16(), "Beacon delivered");
            }
            Ok(response) => {
                warn!(url = %job.url, status = response.status().as_u16(), "Beacon rejected");
            }
            Err(e) => {
                warn!(url = %job.url, error = %e, "Beacon failed");
            }
        }
    }
    debug!("Beacon drain task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_empty_url() {
        let (beacon, _handle) = HttpBeaconSender::spawn(Client::new());
        assert!(!beacon.try_send("", &Payload::binary(b"x".to_vec(), None)));
    }

    #[tokio::test]
    async fn test_rejects_over_quota() {
        let (beacon, _handle) = HttpBeaconSender::spawn(Client::new());
        let big = Payload::binary(vec![b'x'; MAX_BEACON_BYTES + 1], None);
        assert!(!beacon.try_send("http://127.0.0.1:9/collect", &big));
    }

    #[tokio::test]
    async fn test_closed_queue_rejects() {
        let (beacon, handle) = HttpBeaconSender::spawn_with_capacity(Client::new(), 1);
        handle.abort();
        let _ = handle.await;

        let payload = Payload::binary(b"x".to_vec(), None);
        assert!(!beacon.try_send("http://127.0.0.1:9/collect", &payload));
    }

    #[tokio::test(start_paused = true)]
    async fn test_accepts_until_capacity() {
        let (beacon, _handle) = HttpBeaconSender::spawn_with_capacity(Client::new(), 2);
        let payload = Payload::binary(b"x".to_vec(), None);

        // The drain task has not been polled yet on this single-threaded runtime.
        assert!(beacon.try_send("http://127.0.0.1:9/collect", &payload));
        assert!(beacon.try_send("http://127.0.0.1:9/collect", &payload));
        assert!(!beacon.try_send("http://127.0.0.1:9/collect", &payload));
        assert_eq!(beacon.pending(), 2);
    }
}
