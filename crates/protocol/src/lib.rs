//! Generic dispatch and response-modeling core for the Fastbill API.
//!
//! The remote service exposes many named operations ("services") behind one
//! HTTP endpoint. This crate calls any of them by name, classifies the reply,
//! and wraps successful payloads in a navigable [`Response`] graph.
//!
//! ## Architectural Layer
//!
//! **Core + port definitions.** This crate performs no network I/O. The
//! [`Transport`] trait is the only way out; the `transport` crate implements it
//! over HTTP and tests implement it in-process.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | `ServiceName`, `InstanceName`, `EmptyIdentifier` |
//! | [`encoding`] | `Param` and the canonical decimal/date/date-time forms |
//! | [`envelope`] | `CallArgs`, `RequestEnvelope`, `ReplyEnvelope` |
//! | [`errors`] | `ProtocolError`, `RemoteRejection`, `FieldError`, `RetryPolicy` |
//! | [`transport`] | The `Transport` port and its request/reply types |
//! | [`config`] | `ClientConfig` and its defaults |
//! | [`client`] | `Client`, `ClientBuilder`, the `Dispatch` trait |
//! | [`response`] | `Response`, `Field`, known sections |
//! | [`currency`] | `CurrencyTable` |
//!
//! ## Example
//!
//! ```no_run
//! use protocol::{CallArgs, Client, ClientConfig, Param};
//! # fn transport() -> impl protocol::Transport {
//! #     struct Never;
//! #     impl protocol::Transport for Never {
//! #         fn post(&self, _: &protocol::TransportRequest<'_>)
//! #             -> Result<protocol::TransportReply, protocol::TransportError> {
//! #             Err(protocol::TransportError::Other("offline".into()))
//! #         }
//! #     }
//! #     Never
//! # }
//!
//! let client = Client::builder(ClientConfig::new("fastbill@example.com", "api-key"))
//!     .transport(transport())
//!     .build()?;
//!
//! let reply = client.call(
//!     "customer_get",
//!     CallArgs::new().filter(Param::map([("COUNTRY_CODE", "de")])),
//! )?;
//! for customer in &reply {
//!     println!("{}", customer["NAME"]);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod client;
pub mod config;
pub mod currency;
pub mod encoding;
pub mod envelope;
pub mod errors;
pub mod identifiers;
pub mod response;
pub mod transport;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use client::{Client, ClientBuilder, Dispatch, PostCallHook, PreCallHook};
pub use config::{ClientConfig, ConfigError, DEFAULT_ENDPOINT, DEFAULT_TIMEOUT_SECS};
pub use currency::CurrencyTable;
pub use encoding::Param;
pub use envelope::{CallArgs, ReplyEnvelope, RequestEnvelope};
pub use errors::{FieldError, ProtocolError, RemoteRejection, RetryPolicy};
pub use identifiers::{EmptyIdentifier, InstanceName, ServiceName};
pub use response::{Field, Response, Sections, KNOWN_SECTIONS};
pub use transport::{Credentials, Transport, TransportError, TransportReply, TransportRequest};
