//! Main OrientDB client implementation.

use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use orientdb_core::protocol::{
    LAST_DATABASE_TYPE_VERSION, MIN_TOKEN_SESSION_VERSION, MODE_SYNC, PAYLOAD_END,
    PAYLOAD_PREFETCHED, PAYLOAD_RECORD, RECORD_TYPE_DOCUMENT, REQUEST_CONNECT, REQUEST_DB_CLOSE,
    REQUEST_DB_OPEN, REQUEST_RECORD_CREATE, REQUEST_RECORD_DELETE, REQUEST_RECORD_LOAD,
    ROOT_SESSION_ID,
};
use orientdb_core::record::{
    FormatRegistry, GlobalProperties, GlobalProperty, PropertyResolver, RecordSerializer,
    SchemaRefresher,
};
use orientdb_core::{DataOutput, DataType, Document, ObjectDataOutput, OrientError, Result, Rid};
use tracing::{debug, info, instrument};

use crate::config::ClientConfig;
use crate::connection::{Connection, ResponseReader, Session};

/// Database type sent with open requests by servers that still expect one.
const DATABASE_TYPE: &str = "graph";

/// Storage configuration record, which names the schema record.
const STORAGE_CONFIG_RID: Rid = Rid {
    cluster_id: 0,
    cluster_position: 0,
};

/// Schema record used when the storage configuration does not name one.
const DEFAULT_SCHEMA_RID: Rid = Rid {
    cluster_id: 0,
    cluster_position: 1,
};

/// Position of the schema RID in the `|`-separated storage configuration.
const SCHEMA_RID_FIELD: usize = 2;

/// Prefetched entry markers for a null record and a bare RID.
const PREFETCH_NULL: i16 = -2;
const PREFETCH_RID_ONLY: i16 = -3;

/// Load responses list the record type before the content from this version on.
const TYPE_FIRST_LOAD_VERSION: i16 = 28;

/// Open responses stop listing cluster type and data segment from this version on.
const SHORT_CLUSTER_LIST_VERSION: i16 = 24;

/// The main entry point for talking to an OrientDB server.
///
/// `OrientClient` owns one [`Connection`]. Server-level and database-level
/// sessions are multiplexed over it.
///
/// # Example
///
/// ```ignore
/// use orientdb_client::{ClientConfig, OrientClient};
///
/// let client = OrientClient::connect(ClientConfig::default()).await?;
/// let db = client.open_database("demo", "admin", "admin").await?;
/// if let Some(doc) = db.load_record("#9:1".parse()?).await? {
///     println!("{:?}", doc.get("name"));
/// }
/// db.close().await?;
/// ```
#[derive(Debug, Clone)]
pub struct OrientClient {
    connection: Connection,
    config: ClientConfig,
    formats: Arc<FormatRegistry>,
}

impl OrientClient {
    /// Connects to the configured server with the default record formats.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        Self::connect_with_formats(config, Arc::new(FormatRegistry::new())).await
    }

    /// Connects to the configured server using the given record formats.
    #[instrument(name = "client.connect", skip(config, formats), fields(address = %config.network().address()))]
    pub async fn connect_with_formats(
        config: ClientConfig,
        formats: Arc<FormatRegistry>,
    ) -> Result<Self> {
        let connection = Connection::connect(&config, &formats).await?;
        Ok(Self::from_connection(connection, config, formats))
    }

    /// Wraps an already established connection.
    pub fn from_connection(
        connection: Connection,
        config: ClientConfig,
        formats: Arc<FormatRegistry>,
    ) -> Self {
        Self {
            connection,
            config,
            formats,
        }
    }

    /// Returns the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Authenticates against the server itself and returns the new session.
    #[instrument(name = "client.server_connect", skip(self, password))]
    pub async fn server_connect(&self, user: &str, password: &str) -> Result<Arc<Session>> {
        let root = self.connection.new_session(ROOT_SESSION_ID);
        let (session_id, token) = self
            .connection
            .send_cmd(
                &root,
                REQUEST_CONNECT,
                |out| {
                    self.write_handshake(out)?;
                    out.write_string(user)?;
                    out.write_string(password)
                },
                |r| read_session(r).boxed(),
            )
            .await?;

        let session = self.connection.new_session(session_id);
        session.set_token(token);
        info!(session_id, "server session opened");
        Ok(session)
    }

    /// Opens a database and makes its session the active one.
    #[instrument(name = "client.open_database", skip(self, password))]
    pub async fn open_database(&self, name: &str, user: &str, password: &str) -> Result<Database> {
        let root = self.connection.new_session(ROOT_SESSION_ID);
        let protocol_version = self.connection.protocol_version();
        let opened = self
            .connection
            .send_cmd(
                &root,
                REQUEST_DB_OPEN,
                |out| {
                    self.write_handshake(out)?;
                    out.write_string(name)?;
                    if protocol_version <= LAST_DATABASE_TYPE_VERSION {
                        out.write_string(DATABASE_TYPE)?;
                    }
                    out.write_string(user)?;
                    out.write_string(password)
                },
                |r| read_open(r).boxed(),
            )
            .await?;

        let session = self.connection.new_session(opened.session_id);
        session.set_token(opened.token);
        self.connection.set_active_session(opened.session_id);

        let properties = Arc::new(GlobalProperties::new());
        let resolver: Arc<dyn PropertyResolver> = properties.clone();
        let serializer = RecordSerializer::new(
            Arc::clone(&self.formats),
            self.connection.record_format().name(),
            resolver,
        )?;

        info!(
            database = name,
            session_id = opened.session_id,
            clusters = opened.clusters.len(),
            release = %opened.release,
            "database opened"
        );

        Ok(Database {
            connection: self.connection.clone(),
            session,
            name: name.to_string(),
            clusters: opened.clusters,
            release: opened.release,
            properties,
            serializer,
        })
    }

    /// Closes the connection.
    pub async fn close(&self) {
        self.connection.close().await;
    }

    /// Writes the driver identification shared by connect and open requests.
    fn write_handshake(&self, out: &mut ObjectDataOutput) -> Result<()> {
        let protocol = self.config.protocol();
        let version = self.connection.protocol_version();
        out.write_string(protocol.driver_name())?;
        out.write_string(protocol.driver_version())?;
        out.write_short(version)?;
        out.write_nullable_string(protocol.client_id())?;
        out.write_string(self.connection.record_format().name())?;
        if version >= MIN_TOKEN_SESSION_VERSION {
            out.write_bool(false)?;
        }
        Ok(())
    }
}

/// A cluster listed by the server when a database is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterInfo {
    /// Cluster name.
    pub name: String,
    /// Cluster id.
    pub id: i16,
}

/// A record as stored, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Record type byte (`b'd'` for documents).
    pub record_type: u8,
    /// Record version.
    pub version: i32,
    /// Serialized content.
    pub content: Bytes,
}

struct Opened {
    session_id: i32,
    token: Option<Vec<u8>>,
    clusters: Vec<ClusterInfo>,
    release: String,
}

async fn read_session(r: &mut ResponseReader) -> Result<(i32, Option<Vec<u8>>)> {
    let session_id = r.read_int().await?;
    let token = if r.protocol_version() >= MIN_TOKEN_SESSION_VERSION {
        r.read_nullable_bytes().await?
    } else {
        None
    };
    Ok((session_id, token))
}

async fn read_open(r: &mut ResponseReader) -> Result<Opened> {
    let (session_id, token) = read_session(r).await?;

    let count = r.read_short().await?;
    let mut clusters = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
        let name = r.read_string().await?;
        let id = r.read_short().await?;
        if r.protocol_version() < SHORT_CLUSTER_LIST_VERSION {
            r.read_string().await?;
            r.read_short().await?;
        }
        clusters.push(ClusterInfo { name, id });
    }

    r.read_nullable_bytes().await?;
    let release = r.read_string().await?;

    Ok(Opened {
        session_id,
        token,
        clusters,
        release,
    })
}

async fn read_load(r: &mut ResponseReader) -> Result<Option<RawRecord>> {
    let mut record = None;
    loop {
        match r.read_u8().await? {
            PAYLOAD_END => return Ok(record),
            PAYLOAD_RECORD => {
                let raw = if r.protocol_version() >= TYPE_FIRST_LOAD_VERSION {
                    let record_type = r.read_u8().await?;
                    let version = r.read_int().await?;
                    let content = r.read_bytes().await?;
                    RawRecord {
                        record_type,
                        version,
                        content: Bytes::from(content),
                    }
                } else {
                    let content = r.read_bytes().await?;
                    let version = r.read_int().await?;
                    let record_type = r.read_u8().await?;
                    RawRecord {
                        record_type,
                        version,
                        content: Bytes::from(content),
                    }
                };
                record.get_or_insert(raw);
            }
            PAYLOAD_PREFETCHED => skip_prefetched(r).await?,
            other => {
                return Err(OrientError::Protocol(format!(
                    "unexpected record payload status {}",
                    other
                )))
            }
        }
    }
}

/// Skips a record the server sent along because of a fetch plan.
async fn skip_prefetched(r: &mut ResponseReader) -> Result<()> {
    match r.read_short().await? {
        PREFETCH_NULL => {}
        PREFETCH_RID_ONLY => {
            r.read_short().await?;
            r.read_long().await?;
        }
        _ => {
            r.read_u8().await?;
            r.read_short().await?;
            r.read_long().await?;
            r.read_int().await?;
            r.read_bytes().await?;
        }
    }
    Ok(())
}

async fn read_created(r: &mut ResponseReader) -> Result<(Rid, i32)> {
    let cluster_id = r.read_short().await?;
    let position = r.read_long().await?;
    let version = r.read_int().await?;

    let changes = r.read_int().await?;
    for _ in 0..changes {
        r.read_long().await?;
        r.read_long().await?;
        r.read_long().await?;
        r.read_long().await?;
        r.read_int().await?;
    }

    Ok((Rid::new(cluster_id, position), version))
}

async fn read_deleted(r: &mut ResponseReader) -> Result<bool> {
    r.read_bool().await
}

/// Extracts the global property list from a schema document.
///
/// Removed properties leave `null` holes in the list and are skipped.
pub(crate) fn parse_global_properties(schema: &Document) -> Result<Vec<GlobalProperty>> {
    let Some(items) = schema.get("globalProperties").and_then(|v| v.as_items()) else {
        return Ok(Vec::new());
    };

    let mut properties = Vec::with_capacity(items.len());
    for entry in items.iter().flatten() {
        let doc = entry.as_document().ok_or_else(|| {
            OrientError::Serialization(format!(
                "global property entry is {}, expected EMBEDDED",
                entry.data_type()
            ))
        })?;
        let id = doc
            .get("id")
            .and_then(|v| v.as_i64())
            .and_then(|id| i32::try_from(id).ok())
            .ok_or_else(|| OrientError::Serialization("global property without id".into()))?;
        let name = doc
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                OrientError::Serialization(format!("global property {} without name", id))
            })?;
        let data_type: DataType = doc
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                OrientError::Serialization(format!("global property {} without type", id))
            })?
            .parse()?;
        properties.push(GlobalProperty::new(id, name, data_type));
    }
    Ok(properties)
}

/// An open database session.
///
/// Records are decoded with this database's global property registry, which
/// is refreshed from the schema whenever a record references an unknown id.
pub struct Database {
    connection: Connection,
    session: Arc<Session>,
    name: String,
    clusters: Vec<ClusterInfo>,
    release: String,
    properties: Arc<GlobalProperties>,
    serializer: RecordSerializer,
}

impl Database {
    /// Returns the database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the database session.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Returns the clusters the server reported on open.
    pub fn clusters(&self) -> &[ClusterInfo] {
        &self.clusters
    }

    /// Returns the id of the cluster called `name`.
    pub fn cluster_id(&self, name: &str) -> Option<i16> {
        self.clusters
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .map(|c| c.id)
    }

    /// Returns the server release string.
    pub fn release(&self) -> &str {
        &self.release
    }

    /// Returns the global property registry.
    pub fn properties(&self) -> &Arc<GlobalProperties> {
        &self.properties
    }

    /// Returns the record serializer.
    pub fn serializer(&self) -> &RecordSerializer {
        &self.serializer
    }

    /// Closes the database. The server sends no response.
    pub async fn close(&self) -> Result<()> {
        self.connection
            .send_cmd(
                &self.session,
                REQUEST_DB_CLOSE,
                |_| Ok(()),
                |_| async { Ok(()) }.boxed(),
            )
            .await?;
        self.connection.close_session(self.session.id());
        info!(database = %self.name, session_id = self.session.id(), "database closed");
        Ok(())
    }

    /// Loads a record without decoding it. Returns `None` if it does not exist.
    pub async fn load_raw_record(&self, rid: Rid) -> Result<Option<RawRecord>> {
        let record = self
            .connection
            .send_cmd(
                &self.session,
                REQUEST_RECORD_LOAD,
                |out| {
                    out.write_short(rid.cluster_id)?;
                    out.write_long(rid.cluster_position)?;
                    out.write_string("")?;
                    out.write_bool(false)?;
                    out.write_bool(false)
                },
                |r| read_load(r).boxed(),
            )
            .await?;
        debug!(rid = %rid, found = record.is_some(), "record loaded");
        Ok(record)
    }

    /// Loads and decodes a document. Returns `None` if it does not exist.
    pub async fn load_record(&self, rid: Rid) -> Result<Option<Document>> {
        let Some(raw) = self.load_raw_record(rid).await? else {
            return Ok(None);
        };
        check_document(&raw, rid)?;
        let mut doc = self
            .serializer
            .deserialize_with_refresh(&raw.content, self)
            .await?;
        doc.set_rid(rid);
        doc.set_version(raw.version);
        Ok(Some(doc))
    }

    /// Loads and decodes a document without refreshing the schema.
    async fn load_document(&self, rid: Rid) -> Result<Document> {
        let raw = self
            .load_raw_record(rid)
            .await?
            .ok_or_else(|| OrientError::Serialization(format!("record {} not found", rid)))?;
        check_document(&raw, rid)?;
        self.serializer.deserialize(&raw.content)
    }

    /// Stores a new document in `cluster_id`, assigning its RID and version.
    pub async fn create_record(&self, cluster_id: i16, doc: &mut Document) -> Result<Rid> {
        let content = self.serializer.serialize(doc)?;
        let (rid, version) = self
            .connection
            .send_cmd(
                &self.session,
                REQUEST_RECORD_CREATE,
                |out| {
                    out.write_short(cluster_id)?;
                    out.write_bytes(&content)?;
                    out.write_byte(RECORD_TYPE_DOCUMENT as i8)?;
                    out.write_byte(MODE_SYNC as i8)
                },
                |r| read_created(r).boxed(),
            )
            .await?;

        doc.set_rid(rid);
        doc.set_version(version);
        debug!(rid = %rid, version, "record created");
        Ok(rid)
    }

    /// Deletes a record at the given version. Returns whether it was deleted.
    pub async fn delete_record(&self, rid: Rid, version: i32) -> Result<bool> {
        let deleted = self
            .connection
            .send_cmd(
                &self.session,
                REQUEST_RECORD_DELETE,
                |out| {
                    out.write_short(rid.cluster_id)?;
                    out.write_long(rid.cluster_position)?;
                    out.write_int(version)?;
                    out.write_byte(MODE_SYNC as i8)
                },
                |r| read_deleted(r).boxed(),
            )
            .await?;
        debug!(rid = %rid, deleted, "record delete");
        Ok(deleted)
    }

    /// Reloads the global property registry from the schema record.
    #[instrument(name = "database.reload_global_properties", skip(self), fields(database = %self.name))]
    pub async fn reload_global_properties(&self) -> Result<()> {
        let config = self
            .load_raw_record(STORAGE_CONFIG_RID)
            .await?
            .ok_or_else(|| {
                OrientError::Serialization("storage configuration record not found".to_string())
            })?;
        let schema_rid = schema_rid(&config.content);

        let schema = self.load_document(schema_rid).await?;
        let properties = parse_global_properties(&schema)?;
        self.properties.replace_all(properties);
        Ok(())
    }
}

fn check_document(raw: &RawRecord, rid: Rid) -> Result<()> {
    if raw.record_type != RECORD_TYPE_DOCUMENT {
        return Err(OrientError::Serialization(format!(
            "record {} has type '{}', expected a document",
            rid,
            char::from(raw.record_type)
        )));
    }
    Ok(())
}

/// Reads the schema RID out of the storage configuration record.
fn schema_rid(config: &[u8]) -> Rid {
    String::from_utf8_lossy(config)
        .split('|')
        .nth(SCHEMA_RID_FIELD)
        .and_then(|field| field.trim().parse().ok())
        .unwrap_or(DEFAULT_SCHEMA_RID)
}

#[async_trait::async_trait]
impl SchemaRefresher for Database {
    async fn refresh_global_properties(&self) -> Result<()> {
        self.reload_global_properties().await
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("session_id", &self.session.id())
            .field("clusters", &self.clusters.len())
            .field("release", &self.release)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orientdb_core::Value;

    fn property(id: i32, name: &str, type_name: &str) -> Option<Value> {
        Some(Value::from(
            Document::new()
                .with_field("id", id)
                .with_field("name", name)
                .with_field("type", type_name),
        ))
    }

    #[test]
    fn test_schema_rid_from_storage_config() {
        assert_eq!(schema_rid(b"4|demo|#0:1|#0:2|#0:3"), Rid::new(0, 1));
        assert_eq!(schema_rid(b"4|demo|#7:12|#0:2"), Rid::new(7, 12));
        assert_eq!(schema_rid(b"4|demo"), DEFAULT_SCHEMA_RID);
        assert_eq!(schema_rid(b"4|demo|garbage"), DEFAULT_SCHEMA_RID);
    }

    #[test]
    fn test_parse_global_properties() {
        let schema = Document::new().with_field(
            "globalProperties",
            Value::EmbeddedList(vec![
                property(0, "name", "STRING"),
                None,
                property(2, "born", "date"),
            ]),
        );

        let properties = parse_global_properties(&schema).unwrap();
        assert_eq!(
            properties,
            vec![
                GlobalProperty::new(0, "name", DataType::String),
                GlobalProperty::new(2, "born", DataType::Date),
            ]
        );
    }

    #[test]
    fn test_parse_global_properties_missing_list() {
        assert!(parse_global_properties(&Document::new()).unwrap().is_empty());
    }

    #[test]
    fn test_parse_global_properties_bad_type() {
        let schema = Document::new().with_field(
            "globalProperties",
            Value::EmbeddedList(vec![property(0, "name", "NOPE")]),
        );
        assert!(parse_global_properties(&schema).is_err());
    }

    #[test]
    fn test_check_document() {
        let raw = RawRecord {
            record_type: b'b',
            version: 1,
            content: Bytes::new(),
        };
        assert!(check_document(&raw, Rid::new(0, 0)).is_err());
    }
}
