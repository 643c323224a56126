//! Record field data types and their wire identifiers.

use std::fmt;
use std::str::FromStr;

use crate::error::{OrientError, Result};

/// Data type of a record field, as identified on the wire by one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    /// `BOOLEAN`
    Boolean = 0,
    /// `INTEGER`
    Integer = 1,
    /// `SHORT`
    Short = 2,
    /// `LONG`
    Long = 3,
    /// `FLOAT`
    Float = 4,
    /// `DOUBLE`
    Double = 5,
    /// `DATETIME`
    DateTime = 6,
    /// `STRING`
    String = 7,
    /// `BINARY`
    Binary = 8,
    /// `EMBEDDED`
    Embedded = 9,
    /// `EMBEDDEDLIST`
    EmbeddedList = 10,
    /// `EMBEDDEDSET`
    EmbeddedSet = 11,
    /// `EMBEDDEDMAP`
    EmbeddedMap = 12,
    /// `LINK`
    Link = 13,
    /// `LINKLIST`
    LinkList = 14,
    /// `LINKSET`
    LinkSet = 15,
    /// `LINKMAP`
    LinkMap = 16,
    /// `BYTE`
    Byte = 17,
    /// `TRANSIENT`
    Transient = 18,
    /// `DATE`
    Date = 19,
    /// `CUSTOM`
    Custom = 20,
    /// `DECIMAL`
    Decimal = 21,
    /// `LINKBAG`
    LinkBag = 22,
    /// `ANY`
    Any = 23,
}

impl DataType {
    /// Creates a DataType from its wire representation.
    pub fn from_id(id: u8) -> Result<Self> {
        Ok(match id {
            0 => Self::Boolean,
            1 => Self::Integer,
            2 => Self::Short,
            3 => Self::Long,
            4 => Self::Float,
            5 => Self::Double,
            6 => Self::DateTime,
            7 => Self::String,
            8 => Self::Binary,
            9 => Self::Embedded,
            10 => Self::EmbeddedList,
            11 => Self::EmbeddedSet,
            12 => Self::EmbeddedMap,
            13 => Self::Link,
            14 => Self::LinkList,
            15 => Self::LinkSet,
            16 => Self::LinkMap,
            17 => Self::Byte,
            18 => Self::Transient,
            19 => Self::Date,
            20 => Self::Custom,
            21 => Self::Decimal,
            22 => Self::LinkBag,
            23 => Self::Any,
            other => return Err(OrientError::UnknownDataType(other)),
        })
    }

    /// Returns the wire identifier of this type.
    pub fn id(&self) -> u8 {
        *self as u8
    }

    /// Returns the schema name of this type, e.g. `EMBEDDEDLIST`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Boolean => "BOOLEAN",
            Self::Integer => "INTEGER",
            Self::Short => "SHORT",
            Self::Long => "LONG",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::DateTime => "DATETIME",
            Self::String => "STRING",
            Self::Binary => "BINARY",
            Self::Embedded => "EMBEDDED",
            Self::EmbeddedList => "EMBEDDEDLIST",
            Self::EmbeddedSet => "EMBEDDEDSET",
            Self::EmbeddedMap => "EMBEDDEDMAP",
            Self::Link => "LINK",
            Self::LinkList => "LINKLIST",
            Self::LinkSet => "LINKSET",
            Self::LinkMap => "LINKMAP",
            Self::Byte => "BYTE",
            Self::Transient => "TRANSIENT",
            Self::Date => "DATE",
            Self::Custom => "CUSTOM",
            Self::Decimal => "DECIMAL",
            Self::LinkBag => "LINKBAG",
            Self::Any => "ANY",
        }
    }

    /// Returns true for types whose values are links to other records.
    pub fn is_link(&self) -> bool {
        matches!(
            self,
            Self::Link | Self::LinkList | Self::LinkSet | Self::LinkMap | Self::LinkBag
        )
    }

    /// Returns true for embedded collection types.
    pub fn is_embedded_collection(&self) -> bool {
        matches!(
            self,
            Self::EmbeddedList | Self::EmbeddedSet | Self::EmbeddedMap
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = OrientError;

    /// Parses a schema type name (case-insensitive), as stored in the
    /// schema record's global property list.
    fn from_str(s: &str) -> Result<Self> {
        (0u8..=23)
            .filter_map(|id| Self::from_id(id).ok())
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| OrientError::Serialization(format!("unknown type name: {}", s)))
    }
}
