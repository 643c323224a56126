//! Binary record format, version 0.
//!
//! A document is laid out as
//!
//! ```text
//! class name      varint-length string ("" when the document has no class)
//! header entries  name:varint-string ptr:i32 type:byte
//!               | -(property id + 1):varint ptr:i32
//! terminator      varint 0
//! values          addressed by the header pointers
//! ```
//!
//! Pointers are offsets into the complete record, counting the leading
//! version byte, so a value stored at pointer `p` is found at `p - 1` once
//! that byte has been stripped. Embedded documents and maps are written into
//! the same buffer as their parent, which makes their pointers absolute too.
//! Pointer `0` means the field is null.

use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};

use crate::error::{OrientError, Result};
use crate::protocol::BINARY_SERIALIZER_NAME;
use crate::record::format::RecordFormat;
use crate::record::{DataType, Document, Link, LinkBag, PropertyResolver, Rid, Value};
use crate::serialization::{
    DataInput, DataOutput, ObjectDataInput, ObjectDataOutput, VarIntInput, VarIntOutput,
};

/// Version byte identifying this format.
pub const FORMAT_VERSION: u8 = 0;

/// Deepest nesting of embedded values accepted while decoding.
const MAX_DEPTH: usize = 64;

const SECONDS_PER_DAY: i64 = 86_400;

/// Encodes a global property id for a header entry.
pub fn encode_field_id(id: i32) -> i64 {
    -(i64::from(id) + 1)
}

/// Decodes a negative header length back into a global property id.
pub fn decode_field_id(encoded: i64) -> Result<i32> {
    i32::try_from(-encoded - 1)
        .map_err(|_| OrientError::CorruptStream(format!("invalid property id {}", encoded)))
}

/// The `ORecordSerializerBinary` format, version 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryFormatV0;

impl RecordFormat for BinaryFormatV0 {
    fn name(&self) -> &'static str {
        BINARY_SERIALIZER_NAME
    }

    fn version(&self) -> u8 {
        FORMAT_VERSION
    }

    fn write_document(&self, out: &mut ObjectDataOutput, doc: &Document) -> Result<()> {
        write_document(out, doc)
    }

    fn read_document(&self, data: &[u8], properties: &dyn PropertyResolver) -> Result<Document> {
        Decoder::new(data, properties).read_document()
    }
}

fn write_document(out: &mut ObjectDataOutput, doc: &Document) -> Result<()> {
    out.write_varint_string(doc.class_name().unwrap_or(""))?;

    let mut slots = Vec::with_capacity(doc.len());
    for field in doc.fields() {
        if field.name().is_empty() {
            return Err(OrientError::Serialization(
                "field names must not be empty".to_string(),
            ));
        }
        out.write_varint_string(field.name())?;
        let slot = out.alloc(4);
        out.write_byte(field.data_type().id() as i8)?;
        slots.push((slot, field));
    }
    out.write_varint(0)?;

    for (slot, field) in slots {
        if let Some(value) = field.value() {
            let position = out.len();
            write_value(out, field.data_type(), value)?;
            out.patch_int(slot, pointer(position)?)?;
        }
    }
    Ok(())
}

fn write_value(out: &mut ObjectDataOutput, declared: DataType, value: &Value) -> Result<()> {
    match (declared, value) {
        (DataType::Boolean, Value::Boolean(v)) => out.write_bool(*v),
        (DataType::Byte, _) => out.write_byte(integer_in_range(declared, value)?),
        (DataType::Short, _) => out.write_varint(i64::from(
            integer_in_range::<i16>(declared, value)?,
        )),
        (DataType::Integer, _) => out.write_varint(i64::from(
            integer_in_range::<i32>(declared, value)?,
        )),
        (DataType::Long, _) => out.write_varint(integer_in_range::<i64>(declared, value)?),
        (DataType::Float, Value::Float(v)) => out.write_float(*v),
        (DataType::Double, Value::Double(v)) => out.write_double(*v),
        (DataType::Double, Value::Float(v)) => out.write_double(f64::from(*v)),
        (DataType::DateTime, Value::DateTime(v)) => out.write_varint(v.timestamp_millis()),
        (DataType::DateTime, _) => match value.as_i64() {
            Some(millis) => out.write_varint(millis),
            None => Err(mismatch(declared, value)),
        },
        (DataType::Date, Value::Date(v)) => out.write_varint(days_since_epoch(*v)),
        (DataType::Date, Value::DateTime(v)) => out.write_varint(days_since_epoch(v.date_naive())),
        (DataType::String, Value::String(v)) => out.write_varint_string(v),
        (DataType::Binary, Value::Binary(v)) => out.write_varint_bytes(v),
        (DataType::Embedded, Value::Embedded(doc)) => write_document(out, doc),
        (
            DataType::EmbeddedList | DataType::EmbeddedSet,
            Value::EmbeddedList(items) | Value::EmbeddedSet(items),
        ) => write_embedded_collection(out, items),
        (DataType::EmbeddedMap, Value::EmbeddedMap(entries)) => write_embedded_map(out, entries),
        (DataType::Link, Value::Link(link)) => write_link(out, link),
        (
            DataType::LinkList | DataType::LinkSet,
            Value::LinkList(links) | Value::LinkSet(links),
        ) => {
            out.write_varint(links.len() as i64)?;
            links.iter().try_for_each(|link| write_link(out, link))
        }
        (DataType::LinkMap, Value::LinkMap(entries)) => {
            out.write_varint(entries.len() as i64)?;
            for (key, link) in entries {
                out.write_byte(DataType::String.id() as i8)?;
                out.write_varint_string(key)?;
                write_link(out, link)?;
            }
            Ok(())
        }
        (DataType::LinkBag, Value::LinkBag(bag)) => bag.write(out),
        (DataType::Any | DataType::Transient, _) => Ok(()),
        (DataType::Decimal | DataType::Custom, _) => Err(OrientError::NotImplemented(format!(
            "{} serialization",
            declared
        ))),
        _ => Err(mismatch(declared, value)),
    }
}

fn write_embedded_collection(out: &mut ObjectDataOutput, items: &[Option<Value>]) -> Result<()> {
    out.write_varint(items.len() as i64)?;
    out.write_byte(DataType::Any.id() as i8)?;
    for item in items {
        match item {
            Some(value) => {
                let item_type = value.data_type();
                out.write_byte(item_type.id() as i8)?;
                write_value(out, item_type, value)?;
            }
            None => out.write_byte(DataType::Any.id() as i8)?,
        }
    }
    Ok(())
}

fn write_embedded_map(
    out: &mut ObjectDataOutput,
    entries: &[(String, Option<Value>)],
) -> Result<()> {
    out.write_varint(entries.len() as i64)?;

    let mut slots = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        out.write_byte(DataType::String.id() as i8)?;
        out.write_varint_string(key)?;
        let slot = out.alloc(4);
        let value_type = value.as_ref().map_or(DataType::Any, Value::data_type);
        out.write_byte(value_type.id() as i8)?;
        slots.push((slot, value_type, value));
    }

    for (slot, value_type, value) in slots {
        if let Some(value) = value {
            let position = out.len();
            write_value(out, value_type, value)?;
            out.patch_int(slot, pointer(position)?)?;
        }
    }
    Ok(())
}

fn write_link(out: &mut ObjectDataOutput, link: &Link) -> Result<()> {
    let rid = link.rid();
    out.write_varint(i64::from(rid.cluster_id))?;
    out.write_varint(rid.cluster_position)
}

fn pointer(position: usize) -> Result<i32> {
    i32::try_from(position)
        .map_err(|_| OrientError::Serialization(format!("record exceeds {} bytes", i32::MAX)))
}

fn integer_in_range<T: TryFrom<i64>>(declared: DataType, value: &Value) -> Result<T> {
    value
        .as_i64()
        .and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| mismatch(declared, value))
}

fn mismatch(expected: DataType, value: &Value) -> OrientError {
    OrientError::DataTypeMismatch {
        expected,
        actual: value.data_type(),
    }
}

fn days_since_epoch(date: NaiveDate) -> i64 {
    // NaiveDate::default() is 1970-01-01.
    date.signed_duration_since(NaiveDate::default()).num_seconds() / SECONDS_PER_DAY
}

/// Reads one document, seeking to each value through its header pointer.
pub(crate) struct Decoder<'a> {
    input: ObjectDataInput<'a>,
    properties: &'a dyn PropertyResolver,
    depth: usize,
    /// Values left to decode. Every value owns at least one byte of a well
    /// formed record, so aliased pointers cannot decode more than `data.len()`.
    budget: usize,
}

impl<'a> Decoder<'a> {
    /// `data` is the record with its version byte already removed.
    pub(crate) fn new(data: &'a [u8], properties: &'a dyn PropertyResolver) -> Self {
        Self {
            input: ObjectDataInput::new(data),
            properties,
            depth: 0,
            budget: data.len(),
        }
    }

    pub(crate) fn read_document(&mut self) -> Result<Document> {
        self.enter()?;
        let class_name = self.input.read_varint_string()?;
        let mut doc = Document::with_class(class_name);

        let mut entries = Vec::new();
        loop {
            let len = self.input.read_varint()?;
            if len == 0 {
                break;
            }
            if len > 0 {
                let name = String::from_utf8(self.input.read_raw(len as usize)?).map_err(|e| {
                    OrientError::Serialization(format!("invalid field name: {}", e))
                })?;
                let ptr = self.input.read_int()?;
                let data_type = DataType::from_id(self.input.read_byte()? as u8)?;
                entries.push((name, ptr, data_type));
            } else {
                let id = decode_field_id(len)?;
                let property = self
                    .properties
                    .property(id)
                    .ok_or(OrientError::UnknownGlobalProperty(id))?;
                let ptr = self.input.read_int()?;
                entries.push((property.name, ptr, property.data_type));
            }
        }

        let mut end = self.input.position();
        for (name, ptr, data_type) in entries {
            let value = if ptr == 0 {
                None
            } else {
                self.seek_pointer(ptr)?;
                let value = self.read_value(data_type)?;
                end = end.max(self.input.position());
                value
            };
            doc.set_typed(name, data_type, value);
        }
        self.input.seek(end)?;
        self.depth -= 1;
        Ok(doc)
    }

    /// Decodes one value at the current position. Types without a value
    /// representation decode to `None`.
    pub(crate) fn read_value(&mut self, data_type: DataType) -> Result<Option<Value>> {
        self.budget = self.budget.checked_sub(1).ok_or_else(|| {
            OrientError::CorruptStream("record holds more values than bytes".to_string())
        })?;
        let value = match data_type {
            DataType::Boolean => Value::Boolean(self.input.read_bool()?),
            DataType::Byte => Value::Byte(self.input.read_byte()?),
            DataType::Short => Value::Short(self.read_varint_as(data_type)?),
            DataType::Integer => Value::Integer(self.input.read_varint_i32()?),
            DataType::Long => Value::Long(self.input.read_varint()?),
            DataType::Float => Value::Float(self.input.read_float()?),
            DataType::Double => Value::Double(self.input.read_double()?),
            DataType::DateTime => {
                let millis = self.input.read_varint()?;
                let dt: DateTime<Utc> = Utc.timestamp_millis_opt(millis).single().ok_or_else(
                    || OrientError::CorruptStream(format!("datetime out of range: {}", millis)),
                )?;
                Value::DateTime(dt)
            }
            DataType::Date => Value::Date(self.read_date()?),
            DataType::String => Value::String(self.input.read_varint_string()?),
            DataType::Binary => Value::Binary(self.input.read_varint_bytes()?),
            DataType::Embedded => Value::Embedded(Box::new(self.read_document()?)),
            DataType::EmbeddedList => Value::EmbeddedList(self.read_embedded_collection()?),
            DataType::EmbeddedSet => Value::EmbeddedSet(self.read_embedded_collection()?),
            DataType::EmbeddedMap => Value::EmbeddedMap(self.read_embedded_map()?),
            DataType::Link => Value::Link(self.read_link()?),
            DataType::LinkList => Value::LinkList(self.read_links()?),
            DataType::LinkSet => Value::LinkSet(self.read_links()?),
            DataType::LinkMap => Value::LinkMap(self.read_link_map()?),
            DataType::LinkBag => Value::LinkBag(LinkBag::read(&mut self.input)?),
            DataType::Any | DataType::Transient => return Ok(None),
            DataType::Decimal | DataType::Custom => {
                return Err(OrientError::NotImplemented(format!(
                    "{} deserialization",
                    data_type
                )))
            }
        };
        Ok(Some(value))
    }

    fn read_embedded_collection(&mut self) -> Result<Vec<Option<Value>>> {
        self.enter()?;
        let count = self.read_count()?;
        // Collection-wide type; always ANY in practice.
        DataType::from_id(self.input.read_byte()? as u8)?;
        let mut items = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let item_type = DataType::from_id(self.input.read_byte()? as u8)?;
            items.push(self.read_value(item_type)?);
        }
        self.depth -= 1;
        Ok(items)
    }

    fn read_embedded_map(&mut self) -> Result<Vec<(String, Option<Value>)>> {
        self.enter()?;
        let count = self.read_count()?;
        let mut slots = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let key = self.read_map_key()?;
            let ptr = self.input.read_int()?;
            let value_type = DataType::from_id(self.input.read_byte()? as u8)?;
            slots.push((key, ptr, value_type));
        }

        let mut end = self.input.position();
        let mut entries = Vec::with_capacity(slots.len());
        for (key, ptr, value_type) in slots {
            let value = if ptr == 0 {
                None
            } else {
                self.seek_pointer(ptr)?;
                let value = self.read_value(value_type)?;
                end = end.max(self.input.position());
                value
            };
            entries.push((key, value));
        }
        self.input.seek(end)?;
        self.depth -= 1;
        Ok(entries)
    }

    fn read_link_map(&mut self) -> Result<Vec<(String, Link)>> {
        let count = self.read_count()?;
        let mut entries = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let key = self.read_map_key()?;
            entries.push((key, self.read_link()?));
        }
        Ok(entries)
    }

    fn read_map_key(&mut self) -> Result<String> {
        let key_type = DataType::from_id(self.input.read_byte()? as u8)?;
        if key_type != DataType::String {
            return Err(OrientError::Serialization(format!(
                "map keys must be STRING, found {}",
                key_type
            )));
        }
        self.input.read_varint_string()
    }

    fn read_links(&mut self) -> Result<Vec<Link>> {
        let count = self.read_count()?;
        let mut links = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            links.push(self.read_link()?);
        }
        Ok(links)
    }

    fn read_link(&mut self) -> Result<Link> {
        let cluster_id = self.read_varint_as(DataType::Link)?;
        let cluster_position = self.input.read_varint()?;
        Ok(Link::new(Rid::new(cluster_id, cluster_position)))
    }

    fn read_date(&mut self) -> Result<NaiveDate> {
        let days = self.input.read_varint()?;
        let epoch = NaiveDate::default();
        let date = if days >= 0 {
            epoch.checked_add_days(Days::new(days as u64))
        } else {
            epoch.checked_sub_days(Days::new(days.unsigned_abs()))
        };
        date.ok_or_else(|| OrientError::CorruptStream(format!("date out of range: {} days", days)))
    }

    fn read_count(&mut self) -> Result<usize> {
        let count = self.input.read_varint()?;
        usize::try_from(count)
            .map_err(|_| OrientError::CorruptStream(format!("negative count: {}", count)))
    }

    fn read_varint_as<T: TryFrom<i64>>(&mut self, data_type: DataType) -> Result<T> {
        let v = self.input.read_varint()?;
        T::try_from(v).map_err(|_| {
            OrientError::CorruptStream(format!("{} value {} out of range", data_type, v))
        })
    }

    fn seek_pointer(&mut self, ptr: i32) -> Result<()> {
        if ptr < 1 {
            return Err(OrientError::CorruptStream(format!(
                "invalid data pointer {}",
                ptr
            )));
        }
        self.input.seek(ptr as usize - 1)
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(OrientError::CorruptStream(format!(
                "nesting deeper than {} levels",
                MAX_DEPTH
            )));
        }
        Ok(())
    }
}
