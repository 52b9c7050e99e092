//! Payload kinds and normalization.
//!
//! A payload is either already transport-ready (binary blob, multipart form,
//! url-encoded form) or arbitrary structured data that gets serialized to a
//! JSON blob tagged with the request's `Content-Type`.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Header map carried by a request. Keys keep the caller's casing.
pub type Headers = BTreeMap<String, String>;

/// Data handed to `send`, tagged by kind.
///
/// Serialized as `{"kind": ..., "value": ...}`. Any JSON that is not in that
/// form decodes as `Structured`, so queues stored as bare data still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
#[serde(from = "StoredPayload")]
pub enum Payload {
    Binary(Blob),
    FormData(FormData),
    UrlEncoded(UrlEncoded),
    Structured(serde_json::Value),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredPayload {
    Tagged(TaggedPayload),
    Bare(serde_json::Value),
}

#[derive(Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
enum TaggedPayload {
    Binary(Blob),
    FormData(FormData),
    UrlEncoded(UrlEncoded),
    Structured(serde_json::Value),
}

impl From<StoredPayload> for Payload {
    fn from(stored: StoredPayload) -> Self {
        match stored {
            StoredPayload::Tagged(TaggedPayload::Binary(blob)) => Self::Binary(blob),
            StoredPayload::Tagged(TaggedPayload::FormData(form)) => Self::FormData(form),
            StoredPayload::Tagged(TaggedPayload::UrlEncoded(form)) => Self::UrlEncoded(form),
            StoredPayload::Tagged(TaggedPayload::Structured(value)) => Self::Structured(value),
            StoredPayload::Bare(value) => Self::Structured(value),
        }
    }
}

impl Payload {
    /// Structured payload from any JSON value.
    pub fn json(value: serde_json::Value) -> Self {
        Self::Structured(value)
    }

    /// Raw bytes with an optional content type.
    pub fn binary(bytes: impl Into<Vec<u8>>, content_type: Option<&str>) -> Self {
        Self::Binary(Blob::new(bytes, content_type))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Binary(_) => "binary",
            Self::FormData(_) => "formData",
            Self::UrlEncoded(_) => "urlEncoded",
            Self::Structured(_) => "structured",
        }
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Self::Structured(value)
    }
}

impl From<Blob> for Payload {
    fn from(blob: Blob) -> Self {
        Self::Binary(blob)
    }
}

impl From<FormData> for Payload {
    fn from(form: FormData) -> Self {
        Self::FormData(form)
    }
}

impl From<UrlEncoded> for Payload {
    fn from(form: UrlEncoded) -> Self {
        Self::UrlEncoded(form)
    }
}

/// Opaque bytes plus the content type they should be sent with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl Blob {
    pub fn new(bytes: impl Into<Vec<u8>>, content_type: Option<&str>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.map(str::to_string),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lossy UTF-8 view of the bytes.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// One entry of a multipart form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FormValue {
    Text {
        value: String,
    },
    #[serde(rename_all = "camelCase")]
    File {
        filename: String,
        #[serde(with = "base64_bytes")]
        bytes: Vec<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_type: Option<String>,
    },
}

/// Ordered multipart form entries. Keys may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormData {
    pub entries: Vec<(String, FormValue)>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.push((
            key.into(),
            FormValue::Text {
                value: value.into(),
            },
        ));
        self
    }

    pub fn file(
        mut self,
        key: impl Into<String>,
        filename: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
        content_type: Option<&str>,
    ) -> Self {
        self.entries.push((
            key.into(),
            FormValue::File {
                filename: filename.into(),
                bytes: bytes.into(),
                content_type: content_type.map(str::to_string),
            },
        ));
        self
    }

    /// Approximate size: key lengths plus the lengths of text values.
    /// File entries only contribute their key.
    pub fn approximate_size(&self) -> usize {
        self.entries
            .iter()
            .map(|(key, value)| {
                let value_len = match value {
                    FormValue::Text { value } => value.chars().count(),
                    FormValue::File { .. } => 0,
                };
                key.chars().count() + value_len
            })
            .sum()
    }

    /// JSON object of the text entries. Later duplicates win.
    pub fn text_entries_json(&self) -> String {
        let map: serde_json::Map<String, serde_json::Value> = self
            .entries
            .iter()
            .filter_map(|(key, value)| match value {
                FormValue::Text { value } => {
                    Some((key.clone(), serde_json::Value::String(value.clone())))
                }
                FormValue::File { .. } => None,
            })
            .collect();
        serde_json::Value::Object(map).to_string()
    }
}

/// Ordered `application/x-www-form-urlencoded` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlEncoded {
    pub pairs: Vec<(String, String)>,
}

impl UrlEncoded {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.push((key.into(), value.into()));
        self
    }

    /// Serialized query string, e.g. `a=1&b=two+words`.
    pub fn to_query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs.iter())
            .finish()
    }
}

/// Case-insensitive `Content-Type` lookup.
pub fn content_type(headers: &Headers) -> Option<&str> {
    headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        .map(|(_, value)| value.as_str())
}

/// Convert `data` into a transport-ready payload.
///
/// Pre-formatted kinds pass through untouched; structured data becomes a
/// JSON blob tagged with the headers' content type.
pub fn normalize_payload<'a>(data: &'a Payload, headers: &Headers) -> Cow<'a, Payload> {
    match data {
        Payload::Binary(_) | Payload::FormData(_) | Payload::UrlEncoded(_) => Cow::Borrowed(data),
        Payload::Structured(value) => Cow::Owned(Payload::Binary(Blob::new(
            value.to_string(),
            content_type(headers),
        ))),
    }
}

/// Size used for the oversized-payload check.
///
/// This is a heuristic, not a byte-exact wire size: form data only counts
/// its keys and text values.
pub fn payload_size(payload: &Payload) -> usize {
    match payload {
        Payload::Binary(blob) => blob.len(),
        Payload::FormData(form) => form.approximate_size(),
        Payload::UrlEncoded(form) => form.to_query_string().len(),
        Payload::Structured(value) => value.to_string().len(),
    }
}

/// Text that gets chunked when a payload is too large for one beacon.
pub fn payload_text(payload: &Payload) -> String {
    match payload {
        Payload::Binary(blob) => blob.text(),
        Payload::FormData(form) => form.text_entries_json(),
        Payload::UrlEncoded(form) => form.to_query_string(),
        Payload::Structured(value) => value.to_string(),
    }
}

/// Split `text` into contiguous pieces of at most `chunk_size` characters.
pub fn chunk_text(text: &str, chunk_size: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_size)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
