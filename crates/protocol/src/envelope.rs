//! Request and reply envelopes.
//!
//! Every call sends the same five-key object:
//!
//! ```json
//! {"service": "customer.get", "limit": null, "offset": null, "filter": {...}, "data": null}
//! ```
//!
//! Keys the caller did not supply are sent as `null`, never omitted. Replies are
//! read through [`ReplyEnvelope`], which only knows where the `REQUEST` echo,
//! the `RESPONSE` section and its `ERRORS` live.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::{Param, ProtocolError, ServiceName};

/// Keyword arguments accepted by every service call, in wire order.
pub const ARGUMENT_KEYS: [&str; 4] = ["limit", "offset", "filter", "data"];

// ---------------------------------------------------------------------------
// Call arguments
// ---------------------------------------------------------------------------

/// Optional arguments of a service call.
///
/// Built either with the typed setters or from loosely typed keywords via
/// [`CallArgs::from_keywords`], which rejects anything outside
/// [`ARGUMENT_KEYS`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub filter: Option<Param>,
    pub data: Option<Param>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: impl Into<Param>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    #[must_use]
    pub fn data(mut self, data: impl Into<Param>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Builds arguments from keyword/value pairs.
    ///
    /// A `null` value counts as not supplied. Every key outside
    /// [`ARGUMENT_KEYS`] is collected and reported in a single
    /// [`ProtocolError::RequestConstruction`].
    pub fn from_keywords<I, K>(keywords: I) -> Result<Self, ProtocolError>
    where
        I: IntoIterator<Item = (K, Param)>,
        K: Into<String>,
    {
        let mut args = Self::default();
        let mut unknown = Vec::new();

        for (key, value) in keywords {
            let key = key.into();
            match key.as_str() {
                "limit" => args.limit = count_argument(&key, value)?,
                "offset" => args.offset = count_argument(&key, value)?,
                "filter" => args.filter = non_null(value),
                "data" => args.data = non_null(value),
                _ => unknown.push(key),
            }
        }

        if unknown.is_empty() {
            Ok(args)
        } else {
            Err(ProtocolError::unknown_arguments(unknown))
        }
    }

    /// Builds arguments from a JSON object of keywords (or `null` for none).
    pub fn from_json(keywords: Value) -> Result<Self, ProtocolError> {
        match keywords {
            Value::Null => Ok(Self::default()),
            Value::Object(entries) => {
                Self::from_keywords(entries.into_iter().map(|(k, v)| (k, Param::from(v))))
            }
            other => Err(ProtocolError::RequestConstruction {
                message: format!("keyword arguments must be a JSON object, got {other}"),
            }),
        }
    }
}

fn non_null(value: Param) -> Option<Param> {
    if value.is_null() {
        None
    } else {
        Some(value)
    }
}

fn count_argument(key: &str, value: Param) -> Result<Option<u64>, ProtocolError> {
    match value {
        Param::Null => Ok(None),
        Param::Int(n) => u64::try_from(n).map(Some).map_err(|_| invalid_count(key)),
        Param::UInt(n) => Ok(Some(n)),
        _ => Err(invalid_count(key)),
    }
}

fn invalid_count(key: &str) -> ProtocolError {
    ProtocolError::RequestConstruction {
        message: format!("{key} must be a non-negative integer"),
    }
}

// ---------------------------------------------------------------------------
// Request envelope
// ---------------------------------------------------------------------------

/// The object sent for one call. Always serializes to exactly five keys.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestEnvelope {
    pub service: ServiceName,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub filter: Option<Param>,
    pub data: Option<Param>,
}

impl RequestEnvelope {
    pub fn new(service: ServiceName, args: CallArgs) -> Self {
        let CallArgs {
            limit,
            offset,
            filter,
            data,
        } = args;
        Self {
            service,
            limit,
            offset,
            filter,
            data,
        }
    }
}

// ---------------------------------------------------------------------------
// Reply envelope
// ---------------------------------------------------------------------------

/// Read-only view over a decoded reply body.
#[derive(Debug, Clone, Copy)]
pub struct ReplyEnvelope<'a> {
    body: &'a Value,
}

impl<'a> ReplyEnvelope<'a> {
    pub fn new(body: &'a Value) -> Self {
        Self { body }
    }

    /// The service name echoed in `REQUEST.SERVICE`, if the reply carries one.
    ///
    /// Non-string values are rendered as JSON so they never match a real
    /// service name.
    pub fn echoed_service(&self) -> Option<String> {
        let echoed = self.body.get("REQUEST")?.get("SERVICE")?;
        Some(match echoed {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// The `RESPONSE` section, if present and an object.
    pub fn response(&self) -> Option<&'a Map<String, Value>> {
        self.body.get("RESPONSE")?.as_object()
    }

    /// The error strings in `RESPONSE.ERRORS`; empty when there are none.
    pub fn errors(&self) -> Vec<String> {
        let Some(errors) = self.body.get("RESPONSE").and_then(|r| r.get("ERRORS")) else {
            return Vec::new();
        };
        match errors {
            Value::Null | Value::Bool(false) => Vec::new(),
            Value::Array(items) => items.iter().map(error_text).collect(),
            Value::String(s) if s.is_empty() => Vec::new(),
            Value::Object(entries) if entries.is_empty() => Vec::new(),
            other => vec![error_text(other)],
        }
    }
}

fn error_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
