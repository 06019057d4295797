//! Request and response handles.
//!
//! A [`Request`] is an immutable value cloned into each dispatch. A
//! [`Response`] is a shared handle: the transport keeps one clone, the
//! dispatch writes through another, and once [`Response::end`] is called every
//! further write is ignored.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http::header::{self, HeaderName, HeaderValue, IntoHeaderName};
use http::{HeaderMap, Method, StatusCode, Uri};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;

use crate::envelope::{JSON_CONTENT_TYPE, JsonEnvelope};
use crate::error::ProtocolError;

// ─────────────────────────────────────────────────────────────────────────────
// Request
// ─────────────────────────────────────────────────────────────────────────────

/// An incoming request.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
}

impl Request {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn from_parts(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            uri,
            headers,
            body,
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of `name`, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Value of the cookie `name` across all `Cookie` headers.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|line| line.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }

    /// Raw (not percent-decoded) query parameter.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.uri
            .query()?
            .split('&')
            .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Decode the body as XML. External entities are never resolved.
    pub fn xml<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        Ok(quick_xml::de::from_reader(&self.body[..])?)
    }

    /// Same request re-targeted at `path`, used when following a forward path.
    pub fn forwarded_to(&self, path: &str) -> Result<Self, ProtocolError> {
        if !path.starts_with('/') {
            return Err(ProtocolError::InvalidForwardPath(path.to_string()));
        }
        let uri = path
            .parse::<Uri>()
            .map_err(|_| ProtocolError::InvalidForwardPath(path.to_string()))?;
        Ok(Self {
            method: self.method.clone(),
            uri,
            headers: self.headers.clone(),
            body: self.body.clone(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Response
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct ResponseState {
    status: StatusCode,
    headers: HeaderMap,
    body: BytesMut,
    ended: bool,
}

impl Default for ResponseState {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: BytesMut::new(),
            ended: false,
        }
    }
}

/// Shared, cheaply cloneable response handle.
#[derive(Debug, Clone, Default)]
pub struct Response {
    inner: Arc<Mutex<ResponseState>>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the body. Returns `false` if the response has already ended.
    pub fn write(&self, chunk: impl AsRef<[u8]>) -> bool {
        let mut state = self.inner.lock();
        if state.ended {
            return false;
        }
        state.body.extend_from_slice(chunk.as_ref());
        true
    }

    /// Set (replace) a header. Ignored once the response has ended.
    pub fn with_header<K: IntoHeaderName>(&self, name: K, value: HeaderValue) -> &Self {
        let mut state = self.inner.lock();
        if !state.ended {
            state.headers.insert(name, value);
        }
        self
    }

    /// Add a header without replacing existing values (e.g. `Set-Cookie`).
    pub fn append_header<K: IntoHeaderName>(&self, name: K, value: HeaderValue) -> &Self {
        let mut state = self.inner.lock();
        if !state.ended {
            state.headers.append(name, value);
        }
        self
    }

    /// Set the status. Ignored once the response has ended.
    pub fn with_status(&self, status: StatusCode) -> &Self {
        let mut state = self.inner.lock();
        if !state.ended {
            state.status = status;
        }
        self
    }

    pub fn is_end_response(&self) -> bool {
        self.inner.lock().ended
    }

    /// Finalize the response. Idempotent.
    pub fn end(&self) {
        self.inner.lock().ended = true;
    }

    /// Write `envelope` as the body with a JSON content type and the envelope's
    /// code as status. Returns `false` without touching anything if the
    /// response has already ended.
    pub fn write_json(&self, envelope: &JsonEnvelope) -> bool {
        let body = envelope.to_json();
        let mut state = self.inner.lock();
        if state.ended {
            return false;
        }
        state.body.extend_from_slice(body.as_bytes());
        state
            .headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        if let Ok(status) = StatusCode::from_u16(envelope.code) {
            state.status = status;
        }
        true
    }

    pub fn status(&self) -> StatusCode {
        self.inner.lock().status
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.inner
            .lock()
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    pub fn body(&self) -> Bytes {
        Bytes::copy_from_slice(&self.inner.lock().body)
    }

    /// Snapshot of status, headers and body for the transport.
    pub fn to_parts(&self) -> (StatusCode, HeaderMap, Bytes) {
        let state = self.inner.lock();
        (
            state.status,
            state.headers.clone(),
            Bytes::copy_from_slice(&state.body),
        )
    }
}
