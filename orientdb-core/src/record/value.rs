//! The closed set of values a record field can hold.

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{OrientError, Result};
use crate::record::{DataType, Document, Link, LinkBag, Rid};

/// A record field value.
///
/// There is exactly one variant per storable [`DataType`]; `Any`,
/// `Transient`, `Custom` and `Decimal` have no value representation.
/// Collection items and map values are `Option`s because the format can
/// store null elements.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// BOOLEAN
    Boolean(bool),
    /// INTEGER
    Integer(i32),
    /// SHORT
    Short(i16),
    /// LONG
    Long(i64),
    /// FLOAT
    Float(f32),
    /// DOUBLE
    Double(f64),
    /// DATETIME, millisecond precision.
    DateTime(DateTime<Utc>),
    /// STRING
    String(String),
    /// BINARY
    Binary(Vec<u8>),
    /// EMBEDDED
    Embedded(Box<Document>),
    /// EMBEDDEDLIST
    EmbeddedList(Vec<Option<Value>>),
    /// EMBEDDEDSET; kept in encounter order.
    EmbeddedSet(Vec<Option<Value>>),
    /// EMBEDDEDMAP with string keys, in insertion order.
    EmbeddedMap(Vec<(String, Option<Value>)>),
    /// LINK
    Link(Link),
    /// LINKLIST
    LinkList(Vec<Link>),
    /// LINKSET
    LinkSet(Vec<Link>),
    /// LINKMAP with string keys, in insertion order.
    LinkMap(Vec<(String, Link)>),
    /// BYTE
    Byte(i8),
    /// DATE
    Date(NaiveDate),
    /// LINKBAG
    LinkBag(LinkBag),
}

impl Value {
    /// Returns the data type this value is naturally stored as.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Boolean(_) => DataType::Boolean,
            Value::Integer(_) => DataType::Integer,
            Value::Short(_) => DataType::Short,
            Value::Long(_) => DataType::Long,
            Value::Float(_) => DataType::Float,
            Value::Double(_) => DataType::Double,
            Value::DateTime(_) => DataType::DateTime,
            Value::String(_) => DataType::String,
            Value::Binary(_) => DataType::Binary,
            Value::Embedded(_) => DataType::Embedded,
            Value::EmbeddedList(_) => DataType::EmbeddedList,
            Value::EmbeddedSet(_) => DataType::EmbeddedSet,
            Value::EmbeddedMap(_) => DataType::EmbeddedMap,
            Value::Link(_) => DataType::Link,
            Value::LinkList(_) => DataType::LinkList,
            Value::LinkSet(_) => DataType::LinkSet,
            Value::LinkMap(_) => DataType::LinkMap,
            Value::Byte(_) => DataType::Byte,
            Value::Date(_) => DataType::Date,
            Value::LinkBag(_) => DataType::LinkBag,
        }
    }

    /// Returns the value as an `i64` if it is any integer variant.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Byte(v) => Some(i64::from(*v)),
            Value::Short(v) => Some(i64::from(*v)),
            Value::Integer(v) => Some(i64::from(*v)),
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the embedded document.
    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Embedded(doc) => Some(doc),
            _ => None,
        }
    }

    /// Returns the items of an embedded list or set.
    pub fn as_items(&self) -> Option<&[Option<Value>]> {
        match self {
            Value::EmbeddedList(items) | Value::EmbeddedSet(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the single link.
    pub fn as_link(&self) -> Option<&Link> {
        match self {
            Value::Link(link) => Some(link),
            _ => None,
        }
    }
}

macro_rules! impl_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    bool => Boolean,
    i32 => Integer,
    i16 => Short,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    DateTime<Utc> => DateTime,
    String => String,
    Vec<u8> => Binary,
    Link => Link,
    i8 => Byte,
    NaiveDate => Date,
    LinkBag => LinkBag,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Document> for Value {
    fn from(v: Document) -> Self {
        Value::Embedded(Box::new(v))
    }
}

impl From<Rid> for Value {
    fn from(v: Rid) -> Self {
        Value::Link(Link::new(v))
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = OrientError;

    /// Converts a JSON value.
    ///
    /// Integers become `Integer` when they fit, `Long` otherwise; other
    /// numbers become `Double`. Arrays become embedded lists and objects
    /// embedded maps. A top-level `null` has no representation.
    fn try_from(json: serde_json::Value) -> Result<Self> {
        use serde_json::Value as Json;

        match json {
            Json::Null => Err(OrientError::Serialization(
                "null has no value representation".to_string(),
            )),
            Json::Bool(b) => Ok(Value::Boolean(b)),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(i32::try_from(i).map_or(Value::Long(i), Value::Integer))
                } else if n.is_u64() {
                    Err(OrientError::Serialization(format!(
                        "integer {} out of range",
                        n
                    )))
                } else {
                    n.as_f64().map(Value::Double).ok_or_else(|| {
                        OrientError::Serialization(format!("unrepresentable number {}", n))
                    })
                }
            }
            Json::String(s) => Ok(Value::String(s)),
            Json::Array(items) => items
                .into_iter()
                .map(nullable)
                .collect::<Result<Vec<_>>>()
                .map(Value::EmbeddedList),
            Json::Object(map) => map
                .into_iter()
                .map(|(k, v)| nullable(v).map(|v| (k, v)))
                .collect::<Result<Vec<_>>>()
                .map(Value::EmbeddedMap),
        }
    }
}

fn nullable(json: serde_json::Value) -> Result<Option<Value>> {
    if json.is_null() {
        Ok(None)
    } else {
        Value::try_from(json).map(Some)
    }
}
