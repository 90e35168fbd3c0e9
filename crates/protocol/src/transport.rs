//! Port definition for the network exchange.
//!
//! The dispatcher never talks to the network itself. It hands a
//! [`TransportRequest`] to a [`Transport`] and classifies the
//! [`TransportReply`] it gets back. The `transport` crate supplies the HTTP
//! implementation; tests supply in-process stubs.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// Basic-auth credential pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    email: String,
    api_key: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            api_key: api_key.into(),
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Everything a transport needs to perform one POST.
#[derive(Debug, Clone, Copy)]
pub struct TransportRequest<'a> {
    pub url: &'a str,
    pub credentials: &'a Credentials,
    pub headers: &'a [(&'a str, &'a str)],
    pub body: &'a str,
    pub timeout: Duration,
}

/// Raw outcome of a POST that produced an HTTP reply (any status).
///
/// Headers are kept on [`crate::ProtocolError::TransportFailure`] when the
/// reply is classified as a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportReply {
    pub status: u16,
    /// Reason phrase. Adapters may report the canonical phrase for `status`
    /// rather than the one the server sent.
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl TransportReply {
    pub fn new(status: u16, reason: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            reason: reason.into(),
            headers: Vec::new(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Attempts to decode the body as JSON.
    pub fn json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The POST did not produce an HTTP reply.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("transport error: {0}")]
    Other(String),
}

/// Performs a single blocking POST.
///
/// Implementations must be thread-safe; one client may be shared across
/// threads and every call goes through the same transport.
pub trait Transport: Send + Sync {
    fn post(&self, request: &TransportRequest<'_>) -> Result<TransportReply, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn post(&self, request: &TransportRequest<'_>) -> Result<TransportReply, TransportError> {
        (**self).post(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn post(&self, request: &TransportRequest<'_>) -> Result<TransportReply, TransportError> {
        (**self).post(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_the_api_key() {
        let credentials = Credentials::new("fastbill@example.com", "secret-key");
        let printed = format!("{credentials:?}");
        assert!(printed.contains("fastbill@example.com"));
        assert!(!printed.contains("secret-key"));
    }

    #[test]
    fn reply_decodes_json_bodies() {
        let reply = TransportReply::new(200, "OK", br#"{"RESPONSE": {}}"#.to_vec());
        assert!(reply.is_success());
        assert_eq!(reply.json().unwrap(), serde_json::json!({"RESPONSE": {}}));

        let html = TransportReply::new(502, "Bad Gateway", "<html>oops</html>");
        assert!(!html.is_success());
        assert!(html.json().is_err());
    }

    #[test]
    fn header_lookup_ignores_case() {
        let reply = TransportReply::new(429, "Too Many Requests", "{}")
            .with_header("retry-after", "30");
        assert_eq!(reply.header("Retry-After"), Some("30"));
        assert_eq!(reply.header("Content-Type"), None);
    }
}
