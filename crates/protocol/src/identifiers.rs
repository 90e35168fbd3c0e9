//! Newtype identifiers for remote services and client instances.
//!
//! Service names and instance tags are both plain strings on the wire. Wrapping
//! them keeps a caller from passing, say, an instance tag where a service name
//! is expected.

use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// An identifier was empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("identifier must not be empty")]
pub struct EmptyIdentifier;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display, and
// serde impls that reject empty strings on the way in.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
        #[serde(try_from = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = EmptyIdentifier;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value).ok_or(EmptyIdentifier)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.0)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

/// Separator used in caller identifiers in place of the dot of a service name.
pub const IDENTIFIER_SEPARATOR: char = '_';

string_id! {
    /// A dot-separated remote operation name (e.g. `"customer.get"`).
    ///
    /// There is no registry of valid services. Any non-empty name is accepted
    /// here; the remote side decides whether it exists.
    ServiceName
}

impl ServiceName {
    /// Derives a service name from a caller identifier by replacing every
    /// `_` with `.`.
    ///
    /// ```
    /// use protocol::ServiceName;
    ///
    /// let service = ServiceName::from_identifier("customer_get").unwrap();
    /// assert_eq!(service.as_str(), "customer.get");
    /// ```
    pub fn from_identifier(identifier: &str) -> Option<Self> {
        Self::new(identifier.replace(IDENTIFIER_SEPARATOR, "."))
    }
}

string_id! {
    /// Caller-chosen tag for a client instance.
    ///
    /// Useful when one process talks to several accounts; the tag is attached
    /// to every log span emitted by that client.
    InstanceName
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_separators_become_dots() {
        let service = ServiceName::from_identifier("subscription_setusagedata").unwrap();
        assert_eq!(service, "subscription.setusagedata");

        let nested = ServiceName::from_identifier("invoice_item_get").unwrap();
        assert_eq!(nested.as_str(), "invoice.item.get");
    }

    #[test]
    fn identifier_without_separator_is_kept() {
        let service = ServiceName::from_identifier("getnewargs").unwrap();
        assert_eq!(service.to_string(), "getnewargs");
    }

    #[test]
    fn empty_names_are_rejected() {
        assert!(ServiceName::from_identifier("").is_none());
        assert!(InstanceName::new("").is_none());
    }

    #[test]
    fn names_serialize_as_plain_strings() {
        let service = ServiceName::new("customer.get").unwrap();
        assert_eq!(
            serde_json::to_value(&service).unwrap(),
            serde_json::json!("customer.get")
        );
        let back: ServiceName = serde_json::from_str(r#""customer.get""#).unwrap();
        assert_eq!(back, service);
    }

    #[test]
    fn empty_names_fail_to_deserialize() {
        assert!(serde_json::from_str::<ServiceName>(r#""""#).is_err());
        assert!(serde_json::from_str::<InstanceName>(r#""""#).is_err());
        assert_eq!(
            ServiceName::try_from(String::new()).unwrap_err().to_string(),
            "identifier must not be empty"
        );
    }
}
