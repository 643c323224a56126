//! Documents: class-tagged collections of typed fields.

use std::collections::HashMap;

use crate::record::{DataType, Rid, Value};

/// One field of a document: a name, its declared type and an optional value.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    data_type: DataType,
    value: Option<Value>,
}

impl Field {
    /// Creates a field.
    pub fn new(name: impl Into<String>, data_type: DataType, value: Option<Value>) -> Self {
        Self {
            name: name.into(),
            data_type,
            value,
        }
    }

    /// Returns the field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared type.
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Returns the value, or `None` for a null field.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Consumes the field, returning its value.
    pub fn into_value(self) -> Option<Value> {
        self.value
    }
}

/// A record document.
///
/// Fields keep their insertion order, which is also the order they are
/// serialized in; lookups by name go through an index. Setting an existing
/// field replaces it in place.
///
/// Two documents are equal when they have the same class and the same set of
/// fields with equal types and values. The record id, version and field
/// order are not compared.
///
/// # Example
///
/// ```
/// use orientdb_core::record::{DataType, Document, Value};
///
/// let doc = Document::with_class("Person")
///     .with_field("name", "Linus")
///     .with_field("age", 54i32);
///
/// assert_eq!(doc.class_name(), Some("Person"));
/// assert_eq!(doc.get("name"), Some(&Value::String("Linus".into())));
/// assert_eq!(doc.field("age").map(|f| f.data_type()), Some(DataType::Integer));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Document {
    class_name: Option<String>,
    fields: Vec<Field>,
    index: HashMap<String, usize>,
    rid: Option<Rid>,
    version: i32,
}

impl Document {
    /// Creates an empty document without a class.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty document of the given class.
    pub fn with_class(class_name: impl Into<String>) -> Self {
        let mut doc = Self::new();
        doc.set_class_name(class_name);
        doc
    }

    /// Returns the class name, if any.
    pub fn class_name(&self) -> Option<&str> {
        self.class_name.as_deref()
    }

    /// Sets the class name. An empty name clears it.
    pub fn set_class_name(&mut self, class_name: impl Into<String>) {
        let class_name = class_name.into();
        self.class_name = if class_name.is_empty() {
            None
        } else {
            Some(class_name)
        };
    }

    /// Returns the record id, for documents loaded from or saved to a server.
    pub fn rid(&self) -> Option<Rid> {
        self.rid
    }

    /// Sets the record id.
    pub fn set_rid(&mut self, rid: Rid) {
        self.rid = Some(rid);
    }

    /// Returns the record version.
    pub fn version(&self) -> i32 {
        self.version
    }

    /// Sets the record version.
    pub fn set_version(&mut self, version: i32) {
        self.version = version;
    }

    /// Sets a field, typed after its value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let value = value.into();
        let data_type = value.data_type();
        self.put(Field::new(name, data_type, Some(value)));
    }

    /// Sets a field with an explicit declared type.
    ///
    /// The value is checked against the type when the document is serialized,
    /// not here.
    pub fn set_typed(
        &mut self,
        name: impl Into<String>,
        data_type: DataType,
        value: Option<Value>,
    ) {
        self.put(Field::new(name, data_type, value));
    }

    /// Sets a null field of the given type.
    pub fn set_null(&mut self, name: impl Into<String>, data_type: DataType) {
        self.put(Field::new(name, data_type, None));
    }

    /// Builder form of [`set`](Self::set).
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Inserts or replaces a field.
    pub fn put(&mut self, field: Field) {
        match self.index.get(field.name()) {
            Some(&i) => self.fields[i] = field,
            None => {
                self.index.insert(field.name.clone(), self.fields.len());
                self.fields.push(field);
            }
        }
    }

    /// Returns the field with the given name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    /// Returns the value of a field; `None` if absent or null.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.field(name).and_then(Field::value)
    }

    /// Returns true if the document has a field (possibly null) with this name.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Removes a field and returns it.
    pub fn remove(&mut self, name: &str) -> Option<Field> {
        let i = self.index.remove(name)?;
        let field = self.fields.remove(i);
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        Some(field)
    }

    /// Iterates the fields in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    /// Returns the field names in insertion order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(Field::name)
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the document has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Consumes the document, returning its fields in insertion order.
    pub fn into_fields(self) -> Vec<Field> {
        self.fields
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.class_name == other.class_name
            && self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .all(|field| other.field(field.name()) == Some(field))
    }
}
