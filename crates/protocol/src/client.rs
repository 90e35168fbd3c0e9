//! The request dispatcher.
//!
//! A [`Client`] can call any service by name. There is no registry: the name
//! is only checked by the remote side.
//!
//! ```text
//! call("customer_get", args)
//!   -> RequestEnvelope {service: "customer.get", ...}   (pre-call hook)
//!   -> Transport::post                                  (post-call hook)
//!   -> classify reply
//!   -> Response wrapping RESPONSE
//! ```
//!
//! Classification order, first match wins:
//!
//! | Reply | Outcome |
//! |-------|---------|
//! | no HTTP reply | [`ProtocolError::Timeout`] or [`ProtocolError::TransportFailure`] |
//! | body is not JSON | [`ProtocolError::TransportFailure`] |
//! | `REQUEST.SERVICE` differs from the invoked service | [`ProtocolError::RoutingMismatch`] |
//! | non-empty `RESPONSE.ERRORS` (any status) | [`ProtocolError::RemoteRejection`] |
//! | non-2xx status | [`ProtocolError::TransportFailure`] |
//! | `RESPONSE` missing or not an object | [`ProtocolError::TransportFailure`] |
//! | otherwise | [`Response`] |

use std::sync::{Arc, Weak};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::encoding::to_wire_string;
use crate::envelope::ReplyEnvelope;
use crate::{
    CallArgs, ClientConfig, ConfigError, Credentials, CurrencyTable, InstanceName, ProtocolError,
    RemoteRejection, RequestEnvelope, Response, ServiceName, Transport, TransportError,
    TransportReply, TransportRequest,
};

/// Headers sent with every call.
pub const JSON_HEADERS: [(&str, &str); 1] = [("Content-Type", "application/json")];

/// Observes the envelope right before it is sent.
pub type PreCallHook = Arc<dyn Fn(&ServiceName, &RequestEnvelope) + Send + Sync>;

/// Observes the envelope and the raw reply right after the exchange.
pub type PostCallHook = Arc<dyn Fn(&ServiceName, &RequestEnvelope, &TransportReply) + Send + Sync>;

/// Anything that can run a named service call.
///
/// [`Client`] is the real implementation. [`Response`] holds a `Weak<dyn
/// Dispatch>` to fetch related entities, so stubs implementing this trait are
/// enough to exercise the response graph.
pub trait Dispatch: Send + Sync {
    fn invoke(&self, service: &ServiceName, args: CallArgs) -> Result<Response, ProtocolError>;
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles a [`Client`] from configuration and code-level collaborators.
pub struct ClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    pre_call: Option<PreCallHook>,
    post_call: Option<PostCallHook>,
    currencies: Option<CurrencyTable>,
}

impl ClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            pre_call: None,
            post_call: None,
            currencies: None,
        }
    }

    #[must_use]
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    #[must_use]
    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn pre_call<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ServiceName, &RequestEnvelope) + Send + Sync + 'static,
    {
        self.pre_call = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn post_call<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ServiceName, &RequestEnvelope, &TransportReply) + Send + Sync + 'static,
    {
        self.post_call = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn currencies(mut self, table: CurrencyTable) -> Self {
        self.currencies = Some(table);
        self
    }

    pub fn build(self) -> Result<Client, ConfigError> {
        let name = self.config.validate()?;
        let transport = self
            .transport
            .ok_or_else(|| ConfigError::new("no transport configured"))?;

        debug!(endpoint = %self.config.endpoint, instance = ?name, "Using endpoint");

        let timeout = self.config.timeout();
        let credentials = self.config.credentials();
        let currencies = Arc::new(self.currencies.unwrap_or_default());
        let ClientConfig { endpoint, .. } = self.config;
        let pre_call = self.pre_call;
        let post_call = self.post_call;

        let inner = Arc::new_cyclic(|this| Dispatcher {
            endpoint,
            credentials,
            name,
            timeout,
            transport,
            pre_call,
            post_call,
            currencies,
            this: this.clone(),
        });
        Ok(Client { inner })
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Generic service client.
///
/// Cheap to clone; clones share one immutable dispatcher. Safe to use from
/// several threads at once.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Dispatcher>,
}

impl Client {
    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// Calls the service addressed by a caller identifier (`customer_get`).
    pub fn call(&self, identifier: &str, args: CallArgs) -> Result<Response, ProtocolError> {
        let service = service_for(identifier)?;
        self.inner.invoke(&service, args)
    }

    /// Calls a service with loosely typed keyword arguments.
    ///
    /// Unknown keywords fail before anything is sent.
    pub fn call_with_keywords(
        &self,
        identifier: &str,
        keywords: Value,
    ) -> Result<Response, ProtocolError> {
        let service = service_for(identifier)?;
        let args = CallArgs::from_json(keywords)?;
        self.inner.invoke(&service, args)
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    pub fn name(&self) -> Option<&InstanceName> {
        self.inner.name.as_ref()
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// The currency table shared with every response of this client.
    ///
    /// Pass it to [`Response::with_currencies`] to restore currency lookups on
    /// a deserialized response.
    pub fn currencies(&self) -> &Arc<CurrencyTable> {
        &self.inner.currencies
    }
}

impl Dispatch for Client {
    fn invoke(&self, service: &ServiceName, args: CallArgs) -> Result<Response, ProtocolError> {
        self.inner.invoke(service, args)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.inner.endpoint)
            .field("name", &self.inner.name)
            .field("timeout", &self.inner.timeout)
            .finish_non_exhaustive()
    }
}

fn service_for(identifier: &str) -> Result<ServiceName, ProtocolError> {
    ServiceName::from_identifier(identifier).ok_or_else(|| ProtocolError::RequestConstruction {
        message: "service name must not be empty".to_string(),
    })
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

struct Dispatcher {
    endpoint: String,
    credentials: Credentials,
    name: Option<InstanceName>,
    timeout: Duration,
    transport: Arc<dyn Transport>,
    pre_call: Option<PreCallHook>,
    post_call: Option<PostCallHook>,
    currencies: Arc<CurrencyTable>,
    this: Weak<Dispatcher>,
}

impl Dispatch for Dispatcher {
    #[tracing::instrument(
        skip_all,
        fields(service = %service, instance = self.name.as_ref().map(InstanceName::as_str))
    )]
    fn invoke(&self, service: &ServiceName, args: CallArgs) -> Result<Response, ProtocolError> {
        let envelope = RequestEnvelope::new(service.clone(), args);
        let body = to_wire_string(&envelope)?;
        debug!(%body, "Sending request");

        if let Some(hook) = &self.pre_call {
            hook(service, &envelope);
        }

        let request = TransportRequest {
            url: &self.endpoint,
            credentials: &self.credentials,
            headers: &JSON_HEADERS,
            body: &body,
            timeout: self.timeout,
        };
        let reply = self
            .transport
            .post(&request)
            .map_err(|err| self.no_reply(service, err))?;

        if let Some(hook) = &self.post_call {
            hook(service, &envelope, &reply);
        }

        self.classify(service, reply)
    }
}

impl Dispatcher {
    fn no_reply(&self, service: &ServiceName, err: TransportError) -> ProtocolError {
        warn!(error = %err, "No reply from endpoint");
        match err {
            TransportError::Timeout => ProtocolError::Timeout {
                service: service.clone(),
                after: self.timeout,
            },
            TransportError::Connection(reason) | TransportError::Other(reason) => {
                ProtocolError::TransportFailure {
                    service: service.clone(),
                    status: None,
                    reason,
                    body: Vec::new(),
                    headers: Vec::new(),
                }
            }
        }
    }

    fn classify(&self, service: &ServiceName, reply: TransportReply) -> Result<Response, ProtocolError> {
        let body = match reply.json() {
            Ok(body) => body,
            Err(err) => {
                debug!(
                    status = reply.status,
                    error = %err,
                    body = %String::from_utf8_lossy(&reply.body),
                    "Reply body is not JSON"
                );
                return Err(http_failure(service, reply));
            }
        };
        debug!(%body, "Got reply");

        let envelope = ReplyEnvelope::new(&body);
        if let Some(received) = envelope.echoed_service() {
            if received != service.as_str() {
                warn!(%received, "Reply belongs to a different service");
                return Err(ProtocolError::RoutingMismatch {
                    expected: service.clone(),
                    received,
                });
            }
        }

        let errors = envelope.errors();
        if !errors.is_empty() {
            return Err(RemoteRejection {
                service: service.clone(),
                errors,
                response: body,
            }
            .into());
        }

        if !reply.is_success() {
            return Err(http_failure(service, reply));
        }

        let fields = match body {
            Value::Object(mut sections) => match sections.remove("RESPONSE") {
                Some(Value::Object(fields)) => fields,
                _ => return Err(http_failure(service, reply)),
            },
            _ => return Err(http_failure(service, reply)),
        };

        let dispatcher: Weak<dyn Dispatch> = self.this.clone();
        Ok(Response::attached(
            fields,
            dispatcher,
            Arc::clone(&self.currencies),
        ))
    }
}

fn http_failure(service: &ServiceName, reply: TransportReply) -> ProtocolError {
    ProtocolError::TransportFailure {
        service: service.clone(),
        status: Some(reply.status),
        reason: reply.reason,
        body: reply.body,
        headers: reply.headers,
    }
}
