//! Record format selection and the version-byte envelope.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{OrientError, Result};
use crate::record::binary::BinaryFormatV0;
use crate::record::{Document, PropertyResolver, SchemaRefresher, Value};
use crate::serialization::{DataOutput, ObjectDataOutput};

/// A record payload encoding.
pub trait RecordFormat: Send + Sync {
    /// Serializer name the server knows this format by.
    fn name(&self) -> &'static str;

    /// Version byte that prefixes records in this format.
    fn version(&self) -> u8;

    /// Appends `doc` to `out`, which already holds the version byte.
    fn write_document(&self, out: &mut ObjectDataOutput, doc: &Document) -> Result<()>;

    /// Decodes a document from a record whose version byte was stripped.
    fn read_document(&self, data: &[u8], properties: &dyn PropertyResolver) -> Result<Document>;
}

/// Known record formats, looked up by serializer name or version byte.
pub struct FormatRegistry {
    by_name: HashMap<&'static str, Arc<dyn RecordFormat>>,
    by_version: HashMap<u8, Arc<dyn RecordFormat>>,
}

impl FormatRegistry {
    /// Creates a registry with no formats.
    pub fn empty() -> Self {
        Self {
            by_name: HashMap::new(),
            by_version: HashMap::new(),
        }
    }

    /// Creates a registry holding the binary format.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(BinaryFormatV0));
        registry
    }

    /// Registers a format. A name maps to its highest registered version.
    pub fn register(&mut self, format: Arc<dyn RecordFormat>) {
        let newer = self
            .by_name
            .get(format.name())
            .map_or(true, |existing| existing.version() <= format.version());
        if newer {
            self.by_name.insert(format.name(), Arc::clone(&format));
        }
        self.by_version.insert(format.version(), format);
    }

    /// Returns the format registered under a serializer name.
    pub fn by_name(&self, name: &str) -> Result<Arc<dyn RecordFormat>> {
        self.by_name
            .get(name)
            .cloned()
            .ok_or_else(|| OrientError::Configuration(format!("unknown record format: {}", name)))
    }

    /// Returns the format for a record version byte.
    pub fn by_version(&self, version: u8) -> Result<Arc<dyn RecordFormat>> {
        self.by_version.get(&version).cloned().ok_or_else(|| {
            OrientError::Serialization(format!("unsupported record format version {}", version))
        })
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.by_name.keys().collect();
        names.sort();
        f.debug_struct("FormatRegistry")
            .field("formats", &names)
            .finish()
    }
}

/// Serializes documents with a chosen format and decodes any registered one.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use orientdb_core::record::{Document, FormatRegistry, GlobalProperties, RecordSerializer};
///
/// let serializer = RecordSerializer::new(
///     Arc::new(FormatRegistry::new()),
///     "ORecordSerializerBinary",
///     Arc::new(GlobalProperties::new()),
/// )
/// .unwrap();
///
/// let doc = Document::new().with_field("name", "Linus");
/// let bytes = serializer.serialize(&doc).unwrap();
/// assert_eq!(serializer.deserialize(&bytes).unwrap(), doc);
/// ```
#[derive(Clone)]
pub struct RecordSerializer {
    formats: Arc<FormatRegistry>,
    format: Arc<dyn RecordFormat>,
    properties: Arc<dyn PropertyResolver>,
}

impl RecordSerializer {
    /// Creates a serializer writing the format registered as `format_name`.
    pub fn new(
        formats: Arc<FormatRegistry>,
        format_name: &str,
        properties: Arc<dyn PropertyResolver>,
    ) -> Result<Self> {
        let format = formats.by_name(format_name)?;
        Ok(Self {
            formats,
            format,
            properties,
        })
    }

    /// Returns the serializer name of the write format.
    pub fn format_name(&self) -> &'static str {
        self.format.name()
    }

    /// Serializes a document, prefixed with the format version byte.
    pub fn serialize(&self, doc: &Document) -> Result<Vec<u8>> {
        let mut out = ObjectDataOutput::with_capacity(64);
        out.write_byte(self.format.version() as i8)?;
        self.format.write_document(&mut out, doc)?;
        Ok(out.into_bytes())
    }

    /// Deserializes a record, picking the format from its version byte.
    pub fn deserialize(&self, bytes: &[u8]) -> Result<Document> {
        let (&version, body) = bytes
            .split_first()
            .ok_or_else(|| OrientError::Serialization("empty record".to_string()))?;
        self.formats
            .by_version(version)?
            .read_document(body, self.properties.as_ref())
    }

    /// Deserializes a record into a plain field map.
    pub fn to_map(&self, bytes: &[u8]) -> Result<HashMap<String, Option<Value>>> {
        let doc = self.deserialize(bytes)?;
        Ok(doc
            .into_fields()
            .into_iter()
            .map(|field| (field.name().to_string(), field.into_value()))
            .collect())
    }

    /// Deserializes a record, refreshing the schema once if the record
    /// references a global property the cache does not know.
    ///
    /// Fails with [`OrientError::StaleGlobalProperties`] if the refresh fails
    /// or the property is still unknown afterwards.
    pub async fn deserialize_with_refresh(
        &self,
        bytes: &[u8],
        refresher: &dyn SchemaRefresher,
    ) -> Result<Document> {
        let id = match self.deserialize(bytes) {
            Err(OrientError::UnknownGlobalProperty(id)) => id,
            other => return other,
        };

        debug!(property_id = id, "unknown global property, refreshing schema");
        if let Err(e) = refresher.refresh_global_properties().await {
            warn!(property_id = id, error = %e, "schema refresh failed");
            return Err(OrientError::StaleGlobalProperties(id));
        }

        match self.deserialize(bytes) {
            Err(OrientError::UnknownGlobalProperty(id)) => {
                Err(OrientError::StaleGlobalProperties(id))
            }
            other => other,
        }
    }
}

impl std::fmt::Debug for RecordSerializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordSerializer")
            .field("format", &self.format.name())
            .field("version", &self.format.version())
            .finish()
    }
}
