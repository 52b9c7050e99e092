//! Delivery of one request over the available transports.
//!
//! Order of attempts:
//! 1. Oversized payloads are split into chunks, each sent as its own beacon.
//! 2. Everything else goes out as a single beacon.
//! 3. If the beacon is refused and `fallback_to_fetch` is on, the reliable
//!    sender gets one try.
//!
//! The adapter reports delivered / not delivered. Queue bookkeeping belongs
//! to the caller.

use crate::payload::{chunk_text, content_type, normalize_payload, payload_size, payload_text};
use crate::payload::{Blob, Payload};
use crate::request::Request;
use crate::sender::{BeaconSender, HttpRequest, ReliableSender};
use fanos_config_and_utils::{diag, FanosConfig};
use std::sync::Arc;
use tracing::warn;

/// Characters held back from every chunk for framing overhead.
pub const CHUNK_MARGIN: usize = 1000;

/// Routes requests to the beacon and reliable senders.
#[derive(Clone)]
pub struct TransportAdapter {
    beacon: Arc<dyn BeaconSender>,
    reliable: Option<Arc<dyn ReliableSender>>,
}

impl TransportAdapter {
    pub fn new(beacon: Arc<dyn BeaconSender>) -> Self {
        Self {
            beacon,
            reliable: None,
        }
    }

    /// Attach the sender used when `fallback_to_fetch` is enabled.
    pub fn with_reliable(mut self, reliable: Arc<dyn ReliableSender>) -> Self {
        self.reliable = Some(reliable);
        self
    }

    pub fn has_reliable(&self) -> bool {
        self.reliable.is_some()
    }

    /// Try to deliver `request`. Returns `true` when it went out.
    pub async fn send_request(&self, request: &Request, config: &FanosConfig) -> bool {
        let Some(url) = request.url.as_deref().filter(|u| !u.is_empty()) else {
            warn!(request_id = %request.id, "No destination url for request");
            return false;
        };

        let payload = normalize_payload(&request.data, &request.headers);
        let size = payload_size(&payload);

        if size > config.max_payload_size {
            diag!(
                config.debug,
                request_id = %request.id,
                size,
                max = config.max_payload_size,
                "Payload too large, splitting"
            );
            return self.split_and_send(request, config);
        }

        if self.beacon.try_send(url, &payload) {
            diag!(config.debug, request_id = %request.id, size, "Beacon accepted");
            return true;
        }

        diag!(config.debug, request_id = %request.id, "Beacon refused");

        if config.fallback_to_fetch {
            return self.fetch_fallback(request, config).await;
        }

        false
    }

    /// Send the textual form of an oversized payload as consecutive chunks.
    ///
    /// Every chunk is attempted; the request counts as delivered only when
    /// all of them were accepted. Chunks carry no sequence metadata.
    pub fn split_and_send(&self, request: &Request, config: &FanosConfig) -> bool {
        let Some(url) = request.url.as_deref().filter(|u| !u.is_empty()) else {
            warn!(request_id = %request.id, "No destination url for request");
            return false;
        };

        let normalized = normalize_payload(&request.data, &request.headers);
        let text = payload_text(&normalized);
        let chunk_size = config.max_payload_size.saturating_sub(CHUNK_MARGIN);
        let chunks = chunk_text(&text, chunk_size);
        let ct = content_type(&request.headers);

        let total = chunks.len();
        let mut all_sent = true;
        for (index, chunk) in chunks.into_iter().enumerate() {
            let payload = Payload::Binary(Blob::new(chunk, ct));
            if !self.beacon.try_send(url, &payload) {
                diag!(
                    config.debug,
                    request_id = %request.id,
                    chunk = index,
                    total,
                    "Chunk refused"
                );
                all_sent = false;
            }
        }

        diag!(config.debug, request_id = %request.id, total, all_sent, "Split send finished");
        all_sent
    }

    /// One try over the reliable sender. Non-2xx statuses and transport
    /// errors both count as failure.
    pub async fn fetch_fallback(&self, request: &Request, config: &FanosConfig) -> bool {
        let Some(url) = request.url.as_deref().filter(|u| !u.is_empty()) else {
            warn!(request_id = %request.id, "No destination url for request");
            return false;
        };
        let Some(reliable) = self.reliable.as_ref() else {
            warn!(request_id = %request.id, "Fallback enabled but no reliable sender attached");
            return false;
        };

        let body = normalize_payload(&request.data, &request.headers).into_owned();
        let http = HttpRequest::post(request.headers.clone(), body);

        match reliable.request(url, http).await {
            Ok(response) if response.is_success() => {
                diag!(
                    config.debug,
                    request_id = %request.id,
                    status = response.status,
                    "Fallback delivered"
                );
                true
            }
            Ok(response) => {
                warn!(
                    request_id = %request.id,
                    status = response.status,
                    body = %response.body,
                    "Fallback rejected by endpoint"
                );
                false
            }
            Err(e) => {
                warn!(request_id = %request.id, error = %e, "Fallback transport error");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Headers;
    use crate::sender::HttpResponse;
    use crate::{TransportError, TransportResult};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;

    /// Beacon that records every payload and answers from a script
    /// (defaulting to `accept` once the script runs out).
    struct ScriptedBeacon {
        sent: Mutex<Vec<(String, Payload)>>,
        script: Mutex<VecDeque<bool>>,
        accept: bool,
    }

    impl ScriptedBeacon {
        fn new(accept: bool) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                script: Mutex::new(VecDeque::new()),
                accept,
            }
        }

        fn scripted(answers: &[bool], then: bool) -> Self {
            let beacon = Self::new(then);
            beacon.script.lock().extend(answers.iter().copied());
            beacon
        }

        fn sent(&self) -> Vec<(String, Payload)> {
            self.sent.lock().clone()
        }
    }

    impl BeaconSender for ScriptedBeacon {
        fn try_send(&self, url: &str, payload: &Payload) -> bool {
            self.sent.lock().push((url.to_string(), payload.clone()));
            self.script.lock().pop_front().unwrap_or(self.accept)
        }
    }

    struct FixedReliable {
        answer: TransportResult<HttpResponse>,
        calls: Mutex<Vec<(String, HttpRequest)>>,
    }

    impl FixedReliable {
        fn new(answer: TransportResult<HttpResponse>) -> Self {
            Self {
                answer,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ReliableSender for FixedReliable {
        async fn request(&self, url: &str, request: HttpRequest) -> TransportResult<HttpResponse> {
            self.calls.lock().push((url.to_string(), request));
            self.answer.clone()
        }
    }

    fn request(data: Payload) -> Request {
        let mut headers = Headers::new();
        headers.insert("Content-Type".into(), "application/json".into());
        Request {
            id: "req-1".into(),
            url: Some("https://collect.example/beacon".into()),
            headers,
            data,
            attempts: 0,
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn test_small_payload_goes_out_as_one_beacon() {
        let beacon = Arc::new(ScriptedBeacon::new(true));
        let adapter = TransportAdapter::new(beacon.clone());

        let delivered = adapter
            .send_request(&request(Payload::json(json!({"a": 1}))), &FanosConfig::default())
            .await;

        assert!(delivered);
        let sent = beacon.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "https://collect.example/beacon");
        match &sent[0].1 {
            Payload::Binary(blob) => {
                assert_eq!(blob.text(), r#"{"a":1}"#);
                assert_eq!(blob.content_type.as_deref(), Some("application/json"));
            }
            other => panic!("expected binary beacon, got {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn test_refused_beacon_without_fallback_fails() {
        let beacon = Arc::new(ScriptedBeacon::new(false));
        let reliable = Arc::new(FixedReliable::new(Ok(HttpResponse::new(200, "ok"))));
        let adapter = TransportAdapter::new(beacon).with_reliable(reliable.clone());

        let delivered = adapter
            .send_request(&request(Payload::json(json!(1))), &FanosConfig::default())
            .await;

        assert!(!delivered);
        assert!(reliable.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_fallback_success() {
        let beacon = Arc::new(ScriptedBeacon::new(false));
        let reliable = Arc::new(FixedReliable::new(Ok(HttpResponse::new(204, ""))));
        let adapter = TransportAdapter::new(beacon).with_reliable(reliable.clone());
        let config = FanosConfig {
            fallback_to_fetch: true,
            ..FanosConfig::default()
        };

        assert!(adapter.send_request(&request(Payload::json(json!(1))), &config).await);

        let calls = reliable.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1.method, "POST");
        assert!(calls[0].1.keepalive);
        assert!(matches!(calls[0].1.body, Payload::Binary(_)));
    }

    #[tokio::test]
    async fn test_fallback_http_error_and_network_error_both_fail() {
        let config = FanosConfig {
            fallback_to_fetch: true,
            ..FanosConfig::default()
        };

        let http_error = TransportAdapter::new(Arc::new(ScriptedBeacon::new(false)))
            .with_reliable(Arc::new(FixedReliable::new(Ok(HttpResponse::new(503, "busy")))));
        assert!(!http_error.send_request(&request(Payload::json(json!(1))), &config).await);

        let network_error = TransportAdapter::new(Arc::new(ScriptedBeacon::new(false)))
            .with_reliable(Arc::new(FixedReliable::new(Err(TransportError::Network(
                "connection refused".into(),
            )))));
        assert!(!network_error.send_request(&request(Payload::json(json!(1))), &config).await);
    }

    #[tokio::test]
    async fn test_fallback_without_reliable_sender_fails() {
        let adapter = TransportAdapter::new(Arc::new(ScriptedBeacon::new(false)));
        let config = FanosConfig {
            fallback_to_fetch: true,
            ..FanosConfig::default()
        };
        assert!(!adapter.has_reliable());
        assert!(!adapter.send_request(&request(Payload::json(json!(1))), &config).await);
    }

    #[tokio::test]
    async fn test_missing_url_fails_everywhere() {
        let beacon = Arc::new(ScriptedBeacon::new(true));
        let reliable = Arc::new(FixedReliable::new(Ok(HttpResponse::new(200, ""))));
        let adapter = TransportAdapter::new(beacon.clone()).with_reliable(reliable.clone());
        let config = FanosConfig {
            fallback_to_fetch: true,
            ..FanosConfig::default()
        };
        let mut req = request(Payload::json(json!(1)));
        req.url = None;

        assert!(!adapter.send_request(&req, &config).await);
        assert!(beacon.sent().is_empty());
        assert!(reliable.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_payload_is_split() {
        let beacon = Arc::new(ScriptedBeacon::new(true));
        let adapter = TransportAdapter::new(beacon.clone());
        let blob = Payload::binary(vec![b'x'; 70_000], Some("text/plain"));

        assert!(adapter.send_request(&request(blob), &FanosConfig::default()).await);

        let sent = beacon.sent();
        assert_eq!(sent.len(), 2);
        let sizes: Vec<usize> = sent.iter().map(|(_, p)| payload_size(p)).collect();
        assert_eq!(sizes, vec![63_000, 7_000]);
        for (_, payload) in &sent {
            match payload {
                Payload::Binary(blob) => {
                    assert_eq!(blob.content_type.as_deref(), Some("application/json"))
                }
                other => panic!("expected binary chunk, got {}", other.kind()),
            }
        }
    }

    #[tokio::test]
    async fn test_partial_split_failure_sends_every_chunk() {
        let beacon = Arc::new(ScriptedBeacon::scripted(&[true, false], true));
        let adapter = TransportAdapter::new(beacon.clone());
        let config = FanosConfig {
            max_payload_size: 2_000,
            ..FanosConfig::default()
        };
        // 3_500 chars at 1_000 per chunk: four chunks, the second refused.
        let data = Payload::binary(vec![b'y'; 3_500], None);

        assert!(!adapter.send_request(&request(data), &config).await);
        assert_eq!(beacon.sent().len(), 4);
    }

    #[tokio::test]
    async fn test_split_structured_payload_uses_json_text() {
        let beacon = Arc::new(ScriptedBeacon::new(true));
        let adapter = TransportAdapter::new(beacon.clone());
        let config = FanosConfig {
            max_payload_size: 1_010,
            ..FanosConfig::default()
        };
        let data = Payload::json(json!({"k": "v".repeat(40)}));

        assert!(adapter.split_and_send(&request(data.clone()), &config));

        let joined: String = beacon
            .sent()
            .iter()
            .map(|(_, p)| match p {
                Payload::Binary(blob) => blob.text(),
                other => panic!("expected binary chunk, got {}", other.kind()),
            })
            .collect();
        assert_eq!(joined, payload_text(&data));
    }
}
