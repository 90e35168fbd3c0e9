//! Navigable wrapper around the `RESPONSE` section of a reply.
//!
//! A [`Response`] is a read-only JSON object plus an optional, non-owning
//! reference to the [`Dispatch`] that produced it. Field access upper-cases
//! the key, re-wraps nested objects, and falls back to fetching a related
//! entity when only its `*_ID` is present:
//!
//! ```text
//! {"CUSTOMER_ID": "296526"}  --get_field("customer")-->  customer.get(filter = {"CUSTOMER_ID": "296526"})
//! ```
//!
//! Iteration walks the first [`KNOWN_SECTIONS`] entry present, so a
//! `customer.get` reply iterates over its customers rather than its keys.

use std::sync::{Arc, Weak};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::debug;

use crate::{CallArgs, CurrencyTable, Dispatch, FieldError, Param, ServiceName};

/// Top-level keys holding the entities a caller asked for, in priority order.
///
/// Version 1 of the section list.
pub const KNOWN_SECTIONS: [&str; 7] = [
    "ARTICLES",
    "CUSTOMERS",
    "INVOICES",
    "ITEMS",
    "SUBSCRIPTIONS",
    "TEMPLATES",
    "EXPENSES",
];

/// Suffix marking the identifier of a related entity (`CUSTOMER_ID`).
pub const ID_SUFFIX: &str = "_ID";

/// Field holding the numeric currency code.
pub const CURRENCY_CODE_FIELD: &str = "CURRENCY_CODE";

/// Name reported when the derived currency cannot be resolved.
pub const CURRENCY_FIELD: &str = "CURRENCY";

// ---------------------------------------------------------------------------
// Field values
// ---------------------------------------------------------------------------

/// The result of resolving one field.
#[derive(Debug, Clone)]
pub enum Field {
    /// A scalar (string, number, bool or null), returned as-is.
    Value(Value),
    /// A nested object, or a related entity fetched on demand.
    Node(Response),
    /// A sequence; objects inside it are wrapped individually.
    List(Vec<Field>),
}

impl Field {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Value(Value::Null))
    }

    pub fn as_node(&self) -> Option<&Response> {
        match self {
            Self::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn into_node(self) -> Option<Response> {
        match self {
            Self::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Field]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn into_list(self) -> Option<Vec<Field>> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Converts back into plain JSON, dropping any dispatcher reference.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Value(value) => value.clone(),
            Self::Node(node) => Value::Object(node.to_map()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_value).collect()),
        }
    }
}

impl PartialEq<Value> for Field {
    fn eq(&self, other: &Value) -> bool {
        self.to_value() == *other
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// A node of the response graph.
///
/// Cloning is cheap apart from the field map. Nested access re-wraps the
/// sub-object every time; nothing is memoized and nothing is shared mutably
/// between siblings.
#[derive(Clone)]
pub struct Response {
    fields: Map<String, Value>,
    dispatcher: Option<Weak<dyn Dispatch>>,
    currencies: Arc<CurrencyTable>,
}

impl Response {
    /// Wraps fields without a dispatcher; related entities never resolve.
    ///
    /// Currency codes resolve through [`CurrencyTable::standard`].
    pub fn detached(fields: Map<String, Value>) -> Self {
        Self::detached_with(fields, Arc::new(CurrencyTable::standard()))
    }

    /// Wraps fields without a dispatcher, resolving currency codes through
    /// `currencies`.
    pub fn detached_with(fields: Map<String, Value>, currencies: Arc<CurrencyTable>) -> Self {
        Self {
            fields,
            dispatcher: None,
            currencies,
        }
    }

    /// Wraps fields produced by `dispatcher`.
    pub fn attached(
        fields: Map<String, Value>,
        dispatcher: Weak<dyn Dispatch>,
        currencies: Arc<CurrencyTable>,
    ) -> Self {
        Self {
            fields,
            dispatcher: Some(dispatcher),
            currencies,
        }
    }

    /// Wraps fields with a reference to a shared dispatcher.
    pub fn attached_to<D: Dispatch + 'static>(fields: Map<String, Value>, dispatcher: &Arc<D>) -> Self {
        let dispatcher: Arc<dyn Dispatch> = dispatcher.clone();
        Self::attached(
            fields,
            Arc::downgrade(&dispatcher),
            Arc::new(CurrencyTable::standard()),
        )
    }

    /// Returns a copy that keeps the fields and currency table but no
    /// dispatcher.
    #[must_use]
    pub fn detach(&self) -> Self {
        Self {
            fields: self.fields.clone(),
            dispatcher: None,
            currencies: Arc::clone(&self.currencies),
        }
    }

    /// Replaces the currency table, e.g. after deserializing a node that was
    /// produced by a client with a custom table.
    ///
    /// ```
    /// use std::sync::Arc;
    /// use protocol::{CurrencyTable, Response};
    ///
    /// let table = Arc::new(CurrencyTable::from_pairs([(99, "JPY")]));
    /// let node: Response = serde_json::from_str(r#"{"CURRENCY_CODE": 99}"#).unwrap();
    /// assert_eq!(node.with_currencies(table).currency().unwrap(), "JPY");
    /// ```
    #[must_use]
    pub fn with_currencies(mut self, currencies: Arc<CurrencyTable>) -> Self {
        self.currencies = currencies;
        self
    }

    /// The table this node resolves currency codes through.
    pub fn currencies(&self) -> &Arc<CurrencyTable> {
        &self.currencies
    }

    /// `true` if a live dispatcher is available for related-entity fetches.
    pub fn is_attached(&self) -> bool {
        self.dispatcher
            .as_ref()
            .is_some_and(|dispatcher| dispatcher.strong_count() > 0)
    }

    // -- mapping access ------------------------------------------------------

    /// Raw lookup by exact key, without normalization or wrapping.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn to_map(&self) -> Map<String, Value> {
        self.fields.clone()
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.fields
    }

    // -- graph access --------------------------------------------------------

    /// Resolves a field by name, case-insensitively by convention.
    ///
    /// A present key always wins, even when its value is `null`. When the key
    /// is absent but `<KEY>_ID` is present and a dispatcher is attached, the
    /// related entity is fetched with `<key>.get` filtered by that identifier.
    /// Every such access issues a new call.
    pub fn get_field(&self, key: &str) -> Result<Field, FieldError> {
        let key = key.to_uppercase();
        if let Some(value) = self.fields.get(&key) {
            return Ok(self.wrap(value));
        }

        let id_key = format!("{key}{ID_SUFFIX}");
        let Some(id) = self.fields.get(&id_key) else {
            return Err(FieldError::not_found(key));
        };
        let Some(dispatcher) = self.dispatcher.as_ref().and_then(Weak::upgrade) else {
            debug!(field = %key, "No dispatcher attached; related entity unavailable");
            return Err(FieldError::not_found(key));
        };
        let Some(service) = relation_service(&key) else {
            return Err(FieldError::not_found(key));
        };

        debug!(field = %key, %service, "Fetching related entity");
        let args = CallArgs::new().filter(Param::map([(id_key, Param::from(id.clone()))]));
        match dispatcher.invoke(&service, args) {
            Ok(related) => Ok(Field::Node(related)),
            Err(source) => Err(FieldError::Relation { field: key, source }),
        }
    }

    /// The ISO 4217 code for this node's `CURRENCY_CODE`.
    ///
    /// Absent, non-numeric and unknown codes all fail as a missing field.
    pub fn currency(&self) -> Result<&str, FieldError> {
        self.fields
            .get(CURRENCY_CODE_FIELD)
            .and_then(currency_code)
            .and_then(|code| self.currencies.iso_code(code))
            .ok_or_else(|| FieldError::not_found(CURRENCY_FIELD))
    }

    /// Name of the known section that [`Response::iter`] walks, if any.
    pub fn section(&self) -> Option<&'static str> {
        KNOWN_SECTIONS
            .iter()
            .copied()
            .find(|name| self.fields.contains_key(*name))
    }

    /// Iterates over the elements of the first known section present.
    ///
    /// Elements are yielded as-is. Without a known section, or when that
    /// section is not an array, nothing is yielded.
    pub fn iter(&self) -> Sections<'_> {
        let items = self
            .section()
            .and_then(|name| self.fields.get(name))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        Sections {
            inner: items.iter(),
        }
    }

    fn wrap(&self, value: &Value) -> Field {
        match value {
            Value::Object(fields) => Field::Node(self.child(fields.clone())),
            Value::Array(items) => Field::List(items.iter().map(|item| self.wrap(item)).collect()),
            scalar => Field::Value(scalar.clone()),
        }
    }

    fn child(&self, fields: Map<String, Value>) -> Self {
        Self {
            fields,
            dispatcher: self.dispatcher.clone(),
            currencies: Arc::clone(&self.currencies),
        }
    }
}

fn relation_service(field: &str) -> Option<ServiceName> {
    ServiceName::from_identifier(&format!("{}_get", field.to_lowercase()))
}

fn currency_code(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("fields", &self.fields)
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl PartialEq for Response {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl PartialEq<Value> for Response {
    fn eq(&self, other: &Value) -> bool {
        other.as_object() == Some(&self.fields)
    }
}

// Serialization carries the plain mapping only; deserializing yields a
// detached node on the standard currency table. `with_currencies` restores a
// custom one.
impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Response {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Map::deserialize(deserializer).map(Self::detached)
    }
}

impl From<Map<String, Value>> for Response {
    fn from(fields: Map<String, Value>) -> Self {
        Self::detached(fields)
    }
}

// ---------------------------------------------------------------------------
// Iteration
// ---------------------------------------------------------------------------

/// Iterator over the elements of a response's known section.
#[derive(Debug, Clone)]
pub struct Sections<'a> {
    inner: std::slice::Iter<'a, Value>,
}

impl<'a> Iterator for Sections<'a> {
    type Item = &'a Value;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Sections<'_> {}

impl<'a> IntoIterator for &'a Response {
    type Item = &'a Value;
    type IntoIter = Sections<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::ProtocolError;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(fields) => fields,
            other => panic!("expected an object, got {other}"),
        }
    }

    fn subscriptions() -> Value {
        json!({
            "SUBSCRIPTIONS": [
                {
                    "SUBSCRIPTION": {
                        "SUBSCRIPTION_ID": "1101",
                        "CUSTOMER_ID": "296526",
                        "START": "2013-05-24 13:50:33",
                        "STATUS": "canceled",
                        "ARTICLE_NUMBER": "1",
                    }
                }
            ]
        })
    }

    /// Answers every call with a fixed reply and records what was asked.
    struct Recorder {
        reply: Value,
        calls: Mutex<Vec<(String, CallArgs)>>,
    }

    impl Recorder {
        fn new(reply: Value) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    impl Dispatch for Recorder {
        fn invoke(&self, service: &ServiceName, args: CallArgs) -> Result<Response, ProtocolError> {
            self.calls
                .lock()
                .unwrap()
                .push((service.to_string(), args));
            Ok(Response::detached(object(self.reply.clone())))
        }
    }

    #[test]
    fn field_names_are_upper_cased() {
        let response = Response::detached(object(json!({"NAME": "Hans"})));
        assert_eq!(response.get_field("name").unwrap(), json!("Hans"));
        assert_eq!(response.get_field("Name").unwrap().as_str(), Some("Hans"));
    }

    #[test]
    fn nested_objects_and_lists_are_rewrapped() {
        let response = Response::detached(object(subscriptions()));

        let list = response.get_field("subscriptions").unwrap().into_list().unwrap();
        assert_eq!(list.len(), 1);

        let subscription = list[0]
            .as_node()
            .unwrap()
            .get_field("subscription")
            .unwrap()
            .into_node()
            .unwrap();
        assert_eq!(subscription.get_field("article_number").unwrap(), json!("1"));
        assert_eq!(subscription.get("STATUS"), Some(&json!("canceled")));
    }

    #[test]
    fn missing_field_without_identifier_is_not_found() {
        let response = Response::detached(object(subscriptions()));
        let err = response.get_field("blah").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "BLAH not found");
    }

    #[test]
    fn related_entity_is_fetched_by_identifier() {
        let recorder = Recorder::new(json!({"CUSTOMERS": [{"CUSTOMER_ID": "296526"}]}));
        let response = Response::attached_to(object(json!({"CUSTOMER_ID": "296526"})), &recorder);

        let customer = response.get_field("customer").unwrap().into_node().unwrap();
        assert_eq!(customer, json!({"CUSTOMERS": [{"CUSTOMER_ID": "296526"}]}));

        let calls = recorder.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "customer.get");
        assert_eq!(
            calls[0].1,
            CallArgs::new().filter(Param::map([("CUSTOMER_ID", "296526")]))
        );
    }

    #[test]
    fn related_entity_is_fetched_again_on_every_access() {
        let recorder = Recorder::new(json!({}));
        let response = Response::attached_to(object(json!({"INVOICE_ID": 7})), &recorder);

        response.get_field("invoice").unwrap();
        response.get_field("INVOICE").unwrap();

        let calls = recorder.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].1.filter, Some(Param::map([("INVOICE_ID", 7)])));
    }

    #[test]
    fn large_numeric_identifiers_are_sent_unchanged() {
        let recorder = Recorder::new(json!({}));
        let response =
            Response::attached_to(object(json!({"CUSTOMER_ID": u64::MAX})), &recorder);

        response.get_field("customer").unwrap();

        let calls = recorder.calls.lock().unwrap();
        let filter = calls[0].1.filter.as_ref().unwrap();
        assert_eq!(
            crate::encoding::to_wire(filter).unwrap(),
            json!({"CUSTOMER_ID": u64::MAX})
        );
    }

    #[test]
    fn nested_nodes_keep_the_dispatcher() {
        let recorder = Recorder::new(json!({"SUBSCRIPTION": {"STATUS": "active"}}));
        let response = Response::attached_to(object(subscriptions()), &recorder);

        let subscription = response.get_field("subscriptions").unwrap().into_list().unwrap()[0]
            .as_node()
            .unwrap()
            .get_field("subscription")
            .unwrap()
            .into_node()
            .unwrap();

        // SUBSCRIPTION is absent inside the entity; SUBSCRIPTION_ID is not.
        let fetched = subscription.get_field("subscription").unwrap().into_node().unwrap();
        assert_eq!(fetched, json!({"SUBSCRIPTION": {"STATUS": "active"}}));
        assert_eq!(recorder.calls.lock().unwrap()[0].0, "subscription.get");
    }

    #[test]
    fn present_null_key_wins_over_relation() {
        let recorder = Recorder::new(json!({}));
        let response = Response::attached_to(
            object(json!({"CUSTOMER": null, "CUSTOMER_ID": "1"})),
            &recorder,
        );

        assert!(response.get_field("customer").unwrap().is_null());
        assert!(recorder.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn dropped_dispatcher_makes_relations_unavailable() {
        let recorder = Recorder::new(json!({}));
        let response = Response::attached_to(object(json!({"CUSTOMER_ID": "1"})), &recorder);
        assert!(response.is_attached());

        drop(recorder);
        assert!(!response.is_attached());
        assert!(response.get_field("customer").unwrap_err().is_not_found());
    }

    #[test]
    fn detached_copy_keeps_fields_but_not_relations() {
        let recorder = Recorder::new(json!({}));
        let response = Response::attached_to(object(json!({"CUSTOMER_ID": "1"})), &recorder);

        let copy: Response = serde_json::from_value(serde_json::to_value(&response).unwrap()).unwrap();
        assert_eq!(copy, response);
        assert_eq!(copy.get_field("customer_id").unwrap(), json!("1"));
        assert!(copy.get_field("customer").unwrap_err().is_not_found());

        assert!(response.detach().get_field("customer").unwrap_err().is_not_found());
        assert!(recorder.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn currency_is_derived_from_the_code() {
        let numeric = Response::detached(object(json!({"CURRENCY_CODE": 4})));
        assert_eq!(numeric.currency().unwrap(), "USD");

        let textual = Response::detached(object(json!({"CURRENCY_CODE": "1"})));
        assert_eq!(textual.currency().unwrap(), "EUR");
    }

    #[test]
    fn unresolvable_currency_is_a_missing_field() {
        for fields in [
            json!({"CURRENCY_CODE": 19}),
            json!({"CURRENCY_CODE": "EUR"}),
            json!({}),
        ] {
            let err = Response::detached(object(fields)).currency().unwrap_err();
            assert!(err.is_not_found());
            assert_eq!(err.to_string(), "CURRENCY not found");
        }
    }

    #[test]
    fn iteration_walks_the_known_section() {
        let response = Response::detached(object(json!({
            "SUBSCRIPTIONS": [{"A": 1}, {"B": 2}],
            "ERRORS": [],
        })));

        let items: Vec<&Value> = response.iter().collect();
        assert_eq!(items, vec![&json!({"A": 1}), &json!({"B": 2})]);
        assert_eq!(response.section(), Some("SUBSCRIPTIONS"));
    }

    #[test]
    fn iteration_follows_section_priority() {
        let response = Response::detached(object(json!({
            "SUBSCRIPTIONS": [{"S": 1}],
            "CUSTOMERS": [{"C": 1}],
        })));

        let items: Vec<&Value> = (&response).into_iter().collect();
        assert_eq!(items, vec![&json!({"C": 1})]);
    }

    #[test]
    fn iteration_without_known_section_is_empty() {
        let response = Response::detached(object(json!({"STATUS": "success"})));
        assert_eq!(response.iter().count(), 0);

        let not_a_list = Response::detached(object(json!({"CUSTOMERS": {"CUSTOMER": {}}})));
        assert_eq!(not_a_list.iter().count(), 0);
    }
}
