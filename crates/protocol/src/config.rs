//! Client configuration.
//!
//! [`ClientConfig`] is the serializable part of a client's setup. Hooks, the
//! transport and the currency table are code, not data, and are set on
//! [`crate::ClientBuilder`] instead.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Credentials, InstanceName};

/// Endpoint used when the configuration does not override it.
pub const DEFAULT_ENDPOINT: &str = "https://automatic.fastbill.com/api/1.0/api.php";

/// Request timeout used when the configuration does not override it.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// The client configuration is unusable.
///
/// Produced at build time; a client never exists with an invalid config.
#[derive(Debug, Error)]
#[error("Configuration error: {message}")]
pub struct ConfigError {
    pub message: String,
}

impl ConfigError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Connection settings for one account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Service endpoint URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Account user, usually an email address.
    pub email: String,
    /// Account API key.
    pub api_key: String,
    /// Optional tag identifying this client among several accounts.
    #[serde(default)]
    pub name: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ClientConfig {
    pub fn new(email: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: default_endpoint(),
            email: email.into(),
            api_key: api_key.into(),
            name: None,
            timeout_secs: default_timeout_secs(),
        }
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.email, &self.api_key)
    }

    /// Checks the settings and returns the validated instance name.
    pub fn validate(&self) -> Result<Option<InstanceName>, ConfigError> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(ConfigError::new(format!(
                "endpoint must be an http(s) URL, got {:?}",
                self.endpoint
            )));
        }
        if self.email.is_empty() {
            return Err(ConfigError::new("email must not be empty"));
        }
        if self.api_key.is_empty() {
            return Err(ConfigError::new("api_key must not be empty"));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::new("timeout_secs must be positive"));
        }
        match &self.name {
            None => Ok(None),
            Some(name) => InstanceName::new(name.clone())
                .map(Some)
                .ok_or_else(|| ConfigError::new("name must not be empty when set")),
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoint", &self.endpoint)
            .field("email", &self.email)
            .field("api_key", &"<redacted>")
            .field("name", &self.name)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
