//! reqwest-backed request/response sender.

use crate::payload::{content_type, FormData, FormValue, Headers, Payload};
use crate::sender::{HttpRequest, HttpResponse, ReliableSender};
use crate::{TransportError, TransportResult};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder};
use std::time::Duration;
use tracing::debug;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Reliable sender issuing real HTTP requests.
#[derive(Debug, Clone)]
pub struct ReqwestSender {
    client: Client,
}

impl ReqwestSender {
    /// Create a sender with the default timeout.
    pub fn new() -> TransportResult<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> TransportResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    /// Reuse an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl ReliableSender for ReqwestSender {
    async fn request(&self, url: &str, request: HttpRequest) -> TransportResult<HttpResponse> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| TransportError::Client(e.to_string()))?;

        debug!(url = %url, method = %method, kind = request.body.kind(), "Sending request");

        let builder = self.client.request(method, url);
        let builder = apply_body(builder, &request.headers, request.body);

        if !request.keepalive {
            return exchange(builder).await;
        }

        // A keepalive request runs on its own task so it completes even when
        // the caller is dropped.
        tokio::spawn(exchange(builder))
            .await
            .map_err(|e| TransportError::Network(format!("request task failed: {e}")))?
    }
}

async fn exchange(builder: RequestBuilder) -> TransportResult<HttpResponse> {
    let response = builder
        .send()
        .await
        .map_err(|e| TransportError::Network(e.to_string()))?;

    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Ok(HttpResponse { status, body })
}

/// Attach headers and the payload in the encoding its kind calls for.
///
/// Multipart bodies set their own boundary content type, so a configured
/// `Content-Type` header is dropped for form data.
pub(crate) fn apply_body(
    mut builder: RequestBuilder,
    headers: &Headers,
    body: Payload,
) -> RequestBuilder {
    let multipart = matches!(body, Payload::FormData(_));
    for (name, value) in headers {
        if multipart && name.eq_ignore_ascii_case("content-type") {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_str());
    }

    match body {
        Payload::Binary(blob) => {
            if content_type(headers).is_none() {
                if let Some(ct) = blob.content_type.as_deref() {
                    builder = builder.header(reqwest::header::CONTENT_TYPE, ct);
                }
            }
            builder.body(blob.bytes)
        }
        Payload::UrlEncoded(form) => {
            if content_type(headers).is_none() {
                builder = builder.header(
                    reqwest::header::CONTENT_TYPE,
                    "application/x-www-form-urlencoded",
                );
            }
            builder.body(form.to_query_string())
        }
        Payload::FormData(form) => builder.multipart(multipart_form(form)),
        Payload::Structured(value) => {
            if content_type(headers).is_none() {
                builder = builder.header(reqwest::header::CONTENT_TYPE, "application/json");
            }
            builder.body(value.to_string())
        }
    }
}

fn multipart_form(form: FormData) -> Form {
    form.entries
        .into_iter()
        .fold(Form::new(), |acc, (key, value)| match value {
            FormValue::Text { value } => acc.text(key, value),
            FormValue::File {
                filename,
                bytes,
                content_type,
            } => {
                let part = Part::bytes(bytes).file_name(filename);
                let part = match content_type {
                    Some(ct) => match part.mime_str(&ct) {
                        Ok(typed) => typed,
                        Err(e) => {
                            debug!(key = %key, content_type = %ct, error = %e, "Dropping form part with invalid content type");
                            return acc;
                        }
                    },
                    None => part,
                };
                acc.part(key, part)
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{Blob, UrlEncoded};
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    fn built(builder: RequestBuilder) -> reqwest::Request {
        builder.build().unwrap()
    }

    #[test]
    fn test_binary_body_uses_blob_content_type() {
        let client = Client::new();
        let builder = client.post("http://localhost/collect");
        let request = built(apply_body(
            builder,
            &Headers::new(),
            Payload::Binary(Blob::new(b"abc".to_vec(), Some("text/plain"))),
        ));

        assert_eq!(request.headers()["content-type"], "text/plain");
        assert_eq!(request.body().and_then(|b| b.as_bytes()), Some(&b"abc"[..]));
    }

    #[test]
    fn test_configured_content_type_wins() {
        let client = Client::new();
        let mut headers = Headers::new();
        headers.insert("Content-Type".into(), "application/json".into());
        let request = built(apply_body(
            client.post("http://localhost/collect"),
            &headers,
            Payload::Binary(Blob::new(b"{}".to_vec(), Some("text/plain"))),
        ));

        let values: Vec<_> = request.headers().get_all("content-type").iter().collect();
        assert_eq!(values, vec!["application/json"]);
    }

    #[test]
    fn test_url_encoded_body() {
        let client = Client::new();
        let request = built(apply_body(
            client.post("http://localhost/collect"),
            &Headers::new(),
            UrlEncoded::new().append("a", "1").append("b", "x y").into(),
        ));

        assert_eq!(
            request.headers()["content-type"],
            "application/x-www-form-urlencoded"
        );
        assert_eq!(
            request.body().and_then(|b| b.as_bytes()),
            Some(&b"a=1&b=x+y"[..])
        );
    }

    #[test]
    fn test_multipart_drops_configured_content_type() {
        let client = Client::new();
        let mut headers = Headers::new();
        headers.insert("content-type".into(), "application/json".into());
        let form = FormData::new()
            .text("event", "click")
            .file("trace", "trace.bin", vec![1, 2, 3], Some("application/octet-stream"));
        let request = built(apply_body(
            client.post("http://localhost/collect"),
            &headers,
            form.into(),
        ));

        let ct = request.headers()["content-type"].to_str().unwrap();
        assert!(ct.starts_with("multipart/form-data; boundary="));
    }

    #[test]
    fn test_new_sender_builds_client() {
        assert!(ReqwestSender::new().is_ok());
    }

    /// Accept one connection, read until `marker` shows up, answer 200 and
    /// report what arrived.
    async fn one_shot_server(marker: &'static str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/collect", listener.local_addr().unwrap());
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 1024];
            while !String::from_utf8_lossy(&received).contains(marker) {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
            }
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n")
                .await;
            let _ = tx.send(String::from_utf8_lossy(&received).into_owned());
        });

        (url, rx)
    }

    #[tokio::test]
    async fn test_request_returns_status() {
        let (url, received) = one_shot_server("\"ping\"").await;
        let sender = ReqwestSender::new().unwrap();

        let response = sender
            .request(&url, HttpRequest::post(Headers::new(), Payload::json(json!("ping"))))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert!(received.await.unwrap().starts_with("POST /collect"));
    }

    #[tokio::test]
    async fn test_keepalive_request_outlives_caller() {
        let (url, received) = one_shot_server("page-hidden").await;
        let sender = ReqwestSender::new().unwrap();

        let caller = tokio::spawn(async move {
            sender
                .request(&url, HttpRequest::post(Headers::new(), Payload::json(json!("page-hidden"))))
                .await
        });
        // Let the caller start the request, then drop it mid-flight.
        tokio::task::yield_now().await;
        caller.abort();

        let body = tokio::time::timeout(Duration::from_secs(5), received)
            .await
            .expect("request never reached the server")
            .unwrap();
        assert!(body.contains("page-hidden"));
    }
}
