//! Fastbill HTTP transport adapter.
//!
//! Implements the [`protocol::Transport`] trait over HTTP with a blocking
//! [`reqwest`] client: one POST per call, basic authentication, a per-request
//! timeout and rustls for TLS.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Connection pooling, TLS and HTTP framing live here. The
//! [`protocol`] crate sees only [`protocol::Transport`] and the
//! [`protocol::TransportReply`] it returns.
//!
//! ## Error mapping
//!
//! | `reqwest` failure | [`protocol::TransportError`] |
//! |-------------------|------------------------------|
//! | `is_timeout()` | `Timeout` |
//! | `is_connect()` | `Connection` |
//! | anything else | `Other` |
//!
//! Any HTTP reply, whatever its status, is returned as a
//! [`protocol::TransportReply`]; classifying it is the dispatcher's job.
//!
//! The reply's `reason` is the canonical phrase for its status code. `reqwest`
//! does not expose the phrase the server sent, so `200 Everything Fine` is
//! reported as `OK`. Header values that are not valid UTF-8 are decoded
//! lossily.

use protocol::{
    ClientBuilder, ClientConfig, Transport, TransportError, TransportReply, TransportRequest,
};
use reqwest::blocking::Client;
use thiserror::Error;
use tracing::trace;

/// The HTTP client could not be constructed.
#[derive(Debug, Error)]
pub enum HttpTransportError {
    #[error("could not build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Blocking HTTP implementation of [`Transport`].
///
/// Cloning shares the underlying connection pool.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, HttpTransportError> {
        let client = Client::builder().build()?;
        Ok(Self { client })
    }

    /// Uses a preconfigured client (proxies, custom roots, ...).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Starts a [`ClientBuilder`] that already uses an HTTP transport.
    pub fn client_builder(config: ClientConfig) -> Result<ClientBuilder, HttpTransportError> {
        Ok(ClientBuilder::new(config).transport(Self::new()?))
    }
}

impl Transport for HttpTransport {
    fn post(&self, request: &TransportRequest<'_>) -> Result<TransportReply, TransportError> {
        let mut builder = self
            .client
            .post(request.url)
            .basic_auth(request.credentials.email(), Some(request.credentials.api_key()))
            .timeout(request.timeout)
            .body(request.body.to_string());
        for (name, value) in request.headers {
            builder = builder.header(*name, *value);
        }

        let response = builder.send().map_err(transport_error)?;
        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().map_err(transport_error)?.to_vec();
        trace!(status = status.as_u16(), bytes = body.len(), "Received reply");

        Ok(TransportReply {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}

fn transport_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connection(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}
