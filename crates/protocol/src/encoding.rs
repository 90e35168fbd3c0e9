//! Value encoding for outgoing requests.
//!
//! The remote service expects decimals, dates and date-times as strings in one
//! canonical shape each:
//!
//! | Rust type | Wire form |
//! |-----------|-----------|
//! | [`rust_decimal::Decimal`] | exact base-10 string, e.g. `"17.23"` |
//! | [`chrono::NaiveDate`] | `"YYYY-MM-DD"` |
//! | [`chrono::NaiveDateTime`] | `"YYYY-MM-DD HH:MM:SS"` |
//!
//! Everything else is plain JSON. Dynamic filter and data payloads are built
//! from [`Param`]; typed caller structs can opt into the same forms with the
//! [`date`], [`datetime`] and [`decimal`] `#[serde(with = ...)]` modules.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::ser::Error as _;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::ProtocolError;

/// `strftime` pattern for calendar dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// `strftime` pattern for date-times. No timezone, no fractional seconds.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Encodes any serializable value into its wire representation.
pub fn to_wire<T: Serialize + ?Sized>(value: &T) -> Result<Value, ProtocolError> {
    Ok(serde_json::to_value(value)?)
}

/// Encodes any serializable value straight into a request body.
pub fn to_wire_string<T: Serialize + ?Sized>(value: &T) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(value)?)
}

// ---------------------------------------------------------------------------
// Dynamic values
// ---------------------------------------------------------------------------

/// A dynamically shaped request value.
///
/// Used for `filter` and `data`, whose shape depends on the service being
/// called.
///
/// ```
/// use chrono::NaiveDate;
/// use protocol::Param;
///
/// let filter = Param::map([
///     ("CUSTOMER_ID", Param::from("296526")),
///     ("START_DATE", NaiveDate::from_ymd_opt(2016, 6, 2).unwrap().into()),
/// ]);
/// let wire = protocol::encoding::to_wire(&filter).unwrap();
/// assert_eq!(wire["START_DATE"], "2016-06-02");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Null,
    Bool(bool),
    Int(i64),
    /// Unsigned integers above `i64::MAX`; smaller values use [`Param::Int`].
    UInt(u64),
    Float(f64),
    Str(String),
    Decimal(Decimal),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    List(Vec<Param>),
    Map(BTreeMap<String, Param>),
}

impl Param {
    /// Builds a [`Param::Map`] from key/value pairs.
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Param>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Returns `true` for [`Param::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl Serialize for Param {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::UInt(u) => serializer.serialize_u64(*u),
            Self::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Self::Float(f) => Err(S::Error::custom(format!(
                "{f} cannot be represented in JSON"
            ))),
            Self::Str(s) => serializer.serialize_str(s),
            Self::Decimal(d) => serializer.collect_str(d),
            Self::Date(d) => serializer.collect_str(&d.format(DATE_FORMAT)),
            Self::DateTime(dt) => serializer.collect_str(&dt.format(DATETIME_FORMAT)),
            Self::List(items) => serializer.collect_seq(items),
            Self::Map(entries) => serializer.collect_map(entries),
        }
    }
}

macro_rules! param_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Param {
                fn from(value: $ty) -> Self {
                    Self::$variant(value.into())
                }
            }
        )*
    };
}

param_from! {
    bool => Bool,
    i32 => Int,
    i64 => Int,
    u32 => Int,
    f64 => Float,
    String => Str,
    &str => Str,
    Decimal => Decimal,
    NaiveDate => Date,
    NaiveDateTime => DateTime,
    BTreeMap<String, Param> => Map,
}

impl From<u64> for Param {
    fn from(value: u64) -> Self {
        i64::try_from(value).map_or(Self::UInt(value), Self::Int)
    }
}

impl<T: Into<Param>> From<Vec<T>> for Param {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl From<Value> for Param {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Self::UInt(u)
                } else {
                    Self::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => Self::Str(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Object(entries) => {
                Self::Map(entries.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl<K: Into<String>, V: Into<Param>> FromIterator<(K, V)> for Param {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::map(iter)
    }
}

// ---------------------------------------------------------------------------
// serde `with` helpers for typed structs
// ---------------------------------------------------------------------------

/// `#[serde(with = "protocol::encoding::date")]` for [`NaiveDate`] fields.
pub mod date {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer, Serializer};

    use super::DATE_FORMAT;

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&date.format(DATE_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(de::Error::custom)
    }
}

/// `#[serde(with = "protocol::encoding::datetime")]` for [`NaiveDateTime`] fields.
pub mod datetime {
    use chrono::NaiveDateTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    use super::DATETIME_FORMAT;

    pub fn serialize<S: Serializer>(
        datetime: &NaiveDateTime,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&datetime.format(DATETIME_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, DATETIME_FORMAT).map_err(de::Error::custom)
    }
}

/// `#[serde(with = "protocol::encoding::decimal")]` for [`Decimal`] fields.
pub mod decimal {
    use std::str::FromStr;

    use rust_decimal::Decimal;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Decimal::from_str(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn special_scalars_use_canonical_strings() {
        let payload = Param::map([
            ("date", Param::from(date(2016, 6, 2))),
            (
                "datetime",
                date(2015, 5, 1).and_hms_opt(14, 42, 17).unwrap().into(),
            ),
            ("money", Decimal::from_str("17.23").unwrap().into()),
        ]);

        assert_eq!(
            to_wire(&payload).unwrap(),
            json!({
                "date": "2016-06-02",
                "datetime": "2015-05-01 14:42:17",
                "money": "17.23",
            })
        );
    }

    #[test]
    fn decimals_keep_their_exact_scale() {
        let trailing = Param::from(Decimal::from_str("17.230").unwrap());
        assert_eq!(to_wire(&trailing).unwrap(), json!("17.230"));

        let large = Param::from(Decimal::from_str("12345678901234567890.0001").unwrap());
        assert_eq!(to_wire(&large).unwrap(), json!("12345678901234567890.0001"));
    }

    #[test]
    fn fractional_seconds_are_dropped() {
        let dt = date(2015, 5, 1).and_hms_milli_opt(14, 42, 17, 250).unwrap();
        assert_eq!(to_wire(&Param::from(dt)).unwrap(), json!("2015-05-01 14:42:17"));
    }

    #[test]
    fn nested_structures_are_encoded_throughout() {
        let payload = Param::map([
            ("ITEMS", Param::from(vec![
                Param::map([("PRICE", Decimal::new(995, 2))]),
                Param::map([("PRICE", Decimal::new(1, 0))]),
            ])),
            ("NOTE", Param::from(None::<String>)),
            ("COUNT", Param::from(3)),
        ]);

        assert_eq!(
            to_wire(&payload).unwrap(),
            json!({
                "ITEMS": [{"PRICE": "9.95"}, {"PRICE": "1"}],
                "NOTE": null,
                "COUNT": 3,
            })
        );
    }

    #[test]
    fn non_finite_floats_fail_to_encode() {
        let err = to_wire(&Param::map([("RATE", f64::INFINITY)])).unwrap_err();
        assert!(matches!(err, ProtocolError::Serialization(_)));
    }

    #[test]
    fn unencodable_map_keys_fail_to_encode() {
        let mut odd = std::collections::HashMap::new();
        odd.insert((1, 2), "pair key");
        let err = to_wire(&odd).unwrap_err();
        assert!(matches!(err, ProtocolError::Serialization(_)));
    }

    #[test]
    fn json_values_convert_into_params() {
        let param = Param::from(json!({"A": [1, 2.5, "x", null, true]}));
        assert_eq!(to_wire(&param).unwrap(), json!({"A": [1, 2.5, "x", null, true]}));
    }

    #[test]
    fn large_unsigned_integers_survive_conversion() {
        let param = Param::from(json!({"CUSTOMER_ID": u64::MAX}));
        assert_eq!(
            param,
            Param::map([("CUSTOMER_ID", Param::UInt(u64::MAX))])
        );
        assert_eq!(
            to_wire_string(&param).unwrap(),
            r#"{"CUSTOMER_ID":18446744073709551615}"#
        );

        assert_eq!(Param::from(7_u64), Param::Int(7));
        assert_eq!(Param::from(u64::MAX), Param::UInt(u64::MAX));
    }

    #[test]
    fn typed_structs_use_the_with_modules() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Usage {
            #[serde(with = "crate::encoding::datetime")]
            usage_date: NaiveDateTime,
            #[serde(with = "crate::encoding::decimal")]
            unit_price: Decimal,
            #[serde(with = "crate::encoding::date")]
            booked: NaiveDate,
        }

        let usage = Usage {
            usage_date: date(2015, 5, 1).and_hms_opt(0, 0, 0).unwrap(),
            unit_price: Decimal::from_str("17.23").unwrap(),
            booked: date(2016, 6, 2),
        };
        let wire = to_wire(&usage).unwrap();
        assert_eq!(
            wire,
            json!({
                "usage_date": "2015-05-01 00:00:00",
                "unit_price": "17.23",
                "booked": "2016-06-02",
            })
        );
        let back: Usage = serde_json::from_value(wire).unwrap();
        assert_eq!(back, usage);
    }
}
