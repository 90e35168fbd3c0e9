//! Error and retry-policy types for the dispatch pipeline and the response graph.
//!
//! [`ProtocolError`] covers every failure between building a request envelope
//! and wrapping the reply. [`FieldError`] is returned by response-graph field
//! access only; a missing field is a data-shape condition, not a protocol one.
//!
//! [`RetryPolicy`] is advice for the surrounding application. Nothing in this
//! crate retries on its own.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::ServiceName;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// ## Rules
///
/// - `Retryable`: timeouts, connection failures, 5xx / 429 replies, replies
///   routed to the wrong request. A 429 or 503 reply carrying `Retry-After`
///   sets `after`.
/// - `NonRetryable`: malformed requests, encoding failures, errors reported by
///   the remote service itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// Retrying the same request will fail the same way.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Dispatch errors
// ---------------------------------------------------------------------------

/// Any failure in the dispatch pipeline.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The caller supplied arguments that cannot form a request envelope.
    ///
    /// Produced before the transport is touched.
    #[error("Invalid request: {message}")]
    RequestConstruction {
        /// What was wrong with the arguments.
        message: String,
    },

    /// The request envelope could not be encoded as JSON.
    #[error("Could not encode request: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The HTTP exchange failed or the reply could not be decoded.
    ///
    /// `status` is `None` when no reply was received at all (e.g. connection
    /// refused).
    #[error("POST {service} failed: {} {reason}", display_status(.status))]
    TransportFailure {
        /// Service that was invoked.
        service: ServiceName,
        /// HTTP status code of the reply, if one arrived.
        status: Option<u16>,
        /// HTTP reason phrase or transport error description.
        reason: String,
        /// Raw reply body, empty when no reply arrived.
        body: Vec<u8>,
        /// Reply headers, empty when no reply arrived.
        headers: Vec<(String, String)>,
    },

    /// The transport gave up waiting for the reply.
    #[error("POST {service} timed out after {after:?}")]
    Timeout {
        /// Service that was invoked.
        service: ServiceName,
        /// Configured timeout that elapsed.
        after: Duration,
    },

    /// The remote service reported errors in `RESPONSE.ERRORS`.
    #[error(transparent)]
    RemoteRejection(#[from] RemoteRejection),

    /// The reply echoes a different service than the one invoked.
    ///
    /// The reply does not belong to this request.
    #[error("Got response from wrong service: expected {expected}, got {received}")]
    RoutingMismatch {
        /// Service that was invoked.
        expected: ServiceName,
        /// Service name found in `REQUEST.SERVICE`.
        received: String,
    },
}

fn display_status(status: &Option<u16>) -> String {
    status.map_or_else(|| "-".to_string(), |s| s.to_string())
}

impl ProtocolError {
    /// Builds a [`ProtocolError::RequestConstruction`] naming every unknown key.
    pub fn unknown_arguments<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keys: Vec<String> = keys.into_iter().map(|k| k.as_ref().to_string()).collect();
        keys.sort();
        Self::RequestConstruction {
            message: format!("Unknown arguments: {}", keys.join(", ")),
        }
    }

    /// Returns whether the surrounding application may retry this call.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::Timeout { .. } | Self::RoutingMismatch { .. } => {
                RetryPolicy::Retryable { after: None }
            }
            Self::TransportFailure { status: None, .. } => RetryPolicy::Retryable { after: None },
            Self::TransportFailure {
                status: Some(429 | 503),
                headers,
                ..
            } => RetryPolicy::Retryable {
                after: retry_after(headers, Utc::now()),
            },
            Self::TransportFailure {
                status: Some(status),
                ..
            } if *status >= 500 => RetryPolicy::Retryable { after: None },
            _ => RetryPolicy::NonRetryable,
        }
    }

    /// Returns the raw reply body of a transport failure as lossy UTF-8.
    pub fn body_text(&self) -> Option<String> {
        match self {
            Self::TransportFailure { body, .. } => Some(String::from_utf8_lossy(body).into_owned()),
            _ => None,
        }
    }
}

/// Header a throttling or unavailable server uses to ask for a back-off.
pub const RETRY_AFTER: &str = "Retry-After";

/// Reads `Retry-After` as delta-seconds or as an HTTP date relative to `now`.
///
/// Dates already in the past yield a zero delay.
fn retry_after(headers: &[(String, String)], now: DateTime<Utc>) -> Option<Duration> {
    let value = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(RETRY_AFTER))
        .map(|(_, value)| value.trim())?;

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

// ---------------------------------------------------------------------------

/// Errors reported by the remote service inside an otherwise decodable reply.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Error in {service}: {}", .errors.join("; "))]
pub struct RemoteRejection {
    /// Service that was invoked.
    pub service: ServiceName,
    /// The `RESPONSE.ERRORS` strings, in reply order.
    pub errors: Vec<String>,
    /// The full decoded reply.
    pub response: Value,
}

/// Delimiter between the message and the offending field in an error string.
pub const FIELD_DELIMITER: &str = ": ";

impl RemoteRejection {
    /// Extracts the field portion of each error string.
    ///
    /// The field is whatever follows the last `": "`; an error without the
    /// delimiter is returned whole.
    pub fn broken_fields(&self) -> Vec<&str> {
        self.errors
            .iter()
            .map(|error| error.rsplit(FIELD_DELIMITER).next().unwrap_or(error.as_str()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Response graph errors
// ---------------------------------------------------------------------------

/// Failure to resolve a field on a [`crate::Response`].
#[derive(Debug, Error)]
pub enum FieldError {
    /// Neither the field nor a usable relation to it exists.
    #[error("{field} not found")]
    NotFound {
        /// Normalized (upper-case) field name.
        field: String,
    },

    /// The field was resolved through a related-entity call and that call failed.
    #[error("Could not fetch related {field}: {source}")]
    Relation {
        /// Normalized (upper-case) field name.
        field: String,
        /// The unmodified failure of the sub-call.
        #[source]
        source: ProtocolError,
    },
}

impl FieldError {
    pub(crate) fn not_found(field: impl Into<String>) -> Self {
        Self::NotFound {
            field: field.into(),
        }
    }

    /// Returns `true` if the field simply does not resolve.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
