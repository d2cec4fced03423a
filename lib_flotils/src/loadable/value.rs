//! # Setting Values
//!
//! The dynamic value model behind settings files. It mirrors the JSON/YAML
//! data model and adds [`Temporal`] values, which serialize as tagged strings
//! and are restored on deserialization.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use super::temporal::{decode_legacy, decode_string, escape, Temporal};

/// A settings mapping, ordered by key.
pub type Settings = BTreeMap<String, SettingValue>;

/// # Setting Value
///
/// One value of a settings tree.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    /// `null` / `~`
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// An unsigned integer above `i64::MAX`.
    UInt(u64),
    /// A floating point number.
    Float(f64),
    /// A plain string.
    String(String),
    /// A sequence.
    List(Vec<SettingValue>),
    /// A nested mapping.
    Map(Settings),
    /// A date, time, datetime or duration.
    Temporal(Temporal),
}

impl SettingValue {
    /// The string, if this is a plain string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// The integer, if this is an integer that fits `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SettingValue::Int(i) => Some(*i),
            SettingValue::UInt(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    /// The number as float, for integers and floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SettingValue::Int(i) => Some(*i as f64),
            SettingValue::UInt(u) => Some(*u as f64),
            SettingValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// The boolean, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The nested mapping, if this is one.
    pub fn as_map(&self) -> Option<&Settings> {
        match self {
            SettingValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// The list, if this is one.
    pub fn as_list(&self) -> Option<&[SettingValue]> {
        match self {
            SettingValue::List(list) => Some(list),
            _ => None,
        }
    }

    /// The temporal value, if this is one.
    pub fn as_temporal(&self) -> Option<&Temporal> {
        match self {
            SettingValue::Temporal(t) => Some(t),
            _ => None,
        }
    }

    /// Whether this is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, SettingValue::Null)
    }
}

macro_rules! impl_from {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for SettingValue {
                fn from(value: $source) -> Self {
                    SettingValue::$variant(value.into())
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i32 => Int,
    i64 => Int,
    u32 => Int,
    f64 => Float,
    String => String,
    &str => String,
    Vec<SettingValue> => List,
    Settings => Map,
    Temporal => Temporal,
}

impl From<u64> for SettingValue {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(i) => SettingValue::Int(i),
            Err(_) => SettingValue::UInt(value),
        }
    }
}

impl From<NaiveDate> for SettingValue {
    fn from(value: NaiveDate) -> Self {
        SettingValue::Temporal(Temporal::Date(value))
    }
}

impl From<NaiveTime> for SettingValue {
    fn from(value: NaiveTime) -> Self {
        SettingValue::Temporal(Temporal::Time(value))
    }
}

impl From<DateTime<Utc>> for SettingValue {
    fn from(value: DateTime<Utc>) -> Self {
        SettingValue::Temporal(Temporal::DateTime(value))
    }
}

impl From<TimeDelta> for SettingValue {
    fn from(value: TimeDelta) -> Self {
        SettingValue::Temporal(Temporal::Duration(value))
    }
}

impl<T: Into<SettingValue>> From<Option<T>> for SettingValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SettingValue::Null, Into::into)
    }
}

impl Serialize for SettingValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SettingValue::Null => serializer.serialize_unit(),
            SettingValue::Bool(b) => serializer.serialize_bool(*b),
            SettingValue::Int(i) => serializer.serialize_i64(*i),
            SettingValue::UInt(u) => serializer.serialize_u64(*u),
            SettingValue::Float(f) => serializer.serialize_f64(*f),
            SettingValue::String(s) => serializer.serialize_str(&escape(s)),
            SettingValue::Temporal(t) => serializer.serialize_str(&t.encode()),
            SettingValue::List(list) => {
                let mut seq = serializer.serialize_seq(Some(list.len()))?;
                for item in list {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            SettingValue::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
        }
    }
}

struct SettingValueVisitor;

impl<'de> Visitor<'de> for SettingValueVisitor {
    type Value = SettingValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON/YAML value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(SettingValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(SettingValue::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(SettingValue::from(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(SettingValue::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(decode_string(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(decode_string(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(SettingValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(SettingValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        SettingValue::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut list = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            list.push(item);
        }
        Ok(SettingValue::List(list))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = Settings::new();
        while let Some((MapKey(key), value)) = access.next_entry::<MapKey, SettingValue>()? {
            map.insert(key, value);
        }
        match decode_legacy(&map) {
            Some(temporal) => Ok(SettingValue::Temporal(temporal)),
            None => Ok(SettingValue::Map(map)),
        }
    }
}

impl<'de> Deserialize<'de> for SettingValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(SettingValueVisitor)
    }
}

/// Mapping key. YAML allows scalar keys of any type; they are stringified.
struct MapKey(String);

struct MapKeyVisitor;

impl Visitor<'_> for MapKeyVisitor {
    type Value = MapKey;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a scalar mapping key")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(MapKey(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(MapKey(v))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(MapKey(v.to_string()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(MapKey(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(MapKey(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(MapKey(v.to_string()))
    }
}

impl<'de> Deserialize<'de> for MapKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MapKeyVisitor)
    }
}
