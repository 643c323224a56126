//! Client facade tests: server connect, database open, record operations and
//! schema refresh, against a scripted mock server.

mod common;

use std::sync::Arc;

use orientdb_client::{Database, Document, OrientClient, OrientError, Rid, Value};
use orientdb_core::protocol::{
    BINARY_SERIALIZER_NAME, REQUEST_CONNECT, REQUEST_DB_CLOSE, REQUEST_DB_OPEN,
    REQUEST_RECORD_CREATE, REQUEST_RECORD_DELETE, REQUEST_RECORD_LOAD,
};
use orientdb_core::record::{
    encode_field_id, FormatRegistry, GlobalProperties, RecordSerializer,
};
use orientdb_core::serialization::{DataOutput, ObjectDataOutput, VarIntOutput};

use common::{Frame, MockServer, ServerSide};

const DB_SESSION: i32 = 5;

fn serializer() -> RecordSerializer {
    RecordSerializer::new(
        Arc::new(FormatRegistry::new()),
        BINARY_SERIALIZER_NAME,
        Arc::new(GlobalProperties::new()),
    )
    .unwrap()
}

struct Handshake {
    driver_name: String,
    protocol: i16,
    client_id: Option<String>,
    serializer: String,
    token_sessions: Option<u8>,
}

async fn read_handshake(side: &mut ServerSide, version: i16) -> Handshake {
    let driver_name = side.read_string().await.unwrap();
    let _driver_version = side.read_string().await.unwrap();
    let protocol = side.read_i16().await;
    let client_id = side.read_string().await;
    let serializer = side.read_string().await.unwrap();
    let token_sessions = if version >= 26 {
        Some(side.read_u8().await)
    } else {
        None
    };
    Handshake {
        driver_name,
        protocol,
        client_id,
        serializer,
        token_sessions,
    }
}

/// Serves a database open for "demo" as admin/admin.
async fn serve_open(side: &mut ServerSide, version: i16) {
    assert_eq!(side.read_header().await, (REQUEST_DB_OPEN, -1));
    let handshake = read_handshake(side, version).await;
    assert_eq!(handshake.protocol, version);
    assert_eq!(side.read_string().await.as_deref(), Some("demo"));
    assert_eq!(side.read_string().await.as_deref(), Some("graph"));
    assert_eq!(side.read_string().await.as_deref(), Some("admin"));
    assert_eq!(side.read_string().await.as_deref(), Some("admin"));

    let mut frame = Frame::ok(-1).int(DB_SESSION);
    if version >= 26 {
        frame = frame.bytes(b"token");
    }
    frame = frame.short(2);
    for (name, id) in [("internal", 0), ("person", 9)] {
        frame = frame.string(name).short(id);
        if version < 24 {
            frame = frame.string("PHYSICAL").short(-1);
        }
    }
    side.send(frame.null().string("2.2.37")).await;
}

async fn open(version: i16) -> (OrientClient, Database, ServerSide) {
    let server = MockServer::start().await;
    let (conn, mut side) = common::connect(&server, version).await;
    let client = OrientClient::from_connection(
        conn,
        common::config(&server.address()),
        Arc::new(FormatRegistry::new()),
    );
    let (db, ()) = tokio::join!(
        client.open_database("demo", "admin", "admin"),
        serve_open(&mut side, version)
    );
    (client, db.unwrap(), side)
}

async fn expect_load(side: &mut ServerSide, rid: Rid) {
    assert_eq!(side.read_header().await, (REQUEST_RECORD_LOAD, DB_SESSION));
    assert_eq!(side.read_i16().await, rid.cluster_id);
    assert_eq!(side.read_i64().await, rid.cluster_position);
    assert_eq!(side.read_string().await.as_deref(), Some(""));
    assert_eq!(side.read_u8().await, 0);
    assert_eq!(side.read_u8().await, 0);
}

fn record_frame(record_type: u8, version: i32, content: &[u8]) -> Frame {
    Frame::ok(DB_SESSION)
        .byte(1)
        .byte(record_type)
        .int(version)
        .bytes(content)
        .byte(0)
}

/// A record whose single field references global property 0.
fn record_with_global_property() -> Vec<u8> {
    let mut out = ObjectDataOutput::new();
    out.write_byte(0).unwrap();
    out.write_varint_string("").unwrap();
    out.write_varint(encode_field_id(0)).unwrap();
    let slot = out.alloc(4);
    out.write_varint(0).unwrap();
    let position = out.len();
    out.write_varint_string("Linus").unwrap();
    out.patch_int(slot, position as i32).unwrap();
    out.into_bytes()
}

fn schema_record(properties: &[(i32, &str, &str)]) -> Vec<u8> {
    let entries = properties
        .iter()
        .map(|(id, name, type_name)| {
            Some(Value::from(
                Document::new()
                    .with_field("id", *id)
                    .with_field("name", *name)
                    .with_field("type", *type_name),
            ))
        })
        .collect();
    let schema = Document::new()
        .with_field("schemaVersion", 4i32)
        .with_field("globalProperties", Value::EmbeddedList(entries));
    serializer().serialize(&schema).unwrap()
}

#[tokio::test]
async fn test_server_connect() {
    let server = MockServer::start().await;
    let (conn, mut side) = common::connect(&server, 28).await;
    let config = orientdb_client::ClientConfig::builder()
        .address(server.address())
        .protocol(|p| p.client_id("tests"))
        .build()
        .unwrap();
    let client = OrientClient::from_connection(conn, config, Arc::new(FormatRegistry::new()));

    let (session, handshake) = tokio::join!(client.server_connect("root", "secret"), async {
        assert_eq!(side.read_header().await, (REQUEST_CONNECT, -1));
        let handshake = read_handshake(&mut side, 28).await;
        assert_eq!(side.read_string().await.as_deref(), Some("root"));
        assert_eq!(side.read_string().await.as_deref(), Some("secret"));
        side.send(Frame::ok(-1).int(77).bytes(&[1, 2, 3])).await;
        handshake
    });

    let session = session.unwrap();
    assert_eq!(session.id(), 77);
    assert_eq!(session.token(), Some(vec![1, 2, 3]));
    assert_eq!(handshake.protocol, 28);
    assert_eq!(handshake.client_id.as_deref(), Some("tests"));
    assert_eq!(handshake.serializer, BINARY_SERIALIZER_NAME);
    assert_eq!(handshake.token_sessions, Some(0));
    assert!(!handshake.driver_name.is_empty());
}

#[tokio::test]
async fn test_server_connect_before_token_sessions() {
    let server = MockServer::start().await;
    let (conn, mut side) = common::connect(&server, 24).await;
    let client = OrientClient::from_connection(
        conn,
        common::config(&server.address()),
        Arc::new(FormatRegistry::new()),
    );

    let (session, ()) = tokio::join!(client.server_connect("root", "secret"), async {
        side.read_header().await;
        let handshake = read_handshake(&mut side, 24).await;
        assert_eq!(handshake.token_sessions, None);
        assert_eq!(handshake.client_id, None);
        side.read_string().await;
        side.read_string().await;
        side.send(Frame::ok(-1).int(12)).await;
    });

    let session = session.unwrap();
    assert_eq!(session.id(), 12);
    assert_eq!(session.token(), None);
}

#[tokio::test]
async fn test_open_database() {
    let (client, db, _side) = open(28).await;

    assert_eq!(db.name(), "demo");
    assert_eq!(db.session().id(), DB_SESSION);
    assert_eq!(db.session().token(), Some(b"token".to_vec()));
    assert_eq!(db.release(), "2.2.37");
    assert_eq!(db.clusters().len(), 2);
    assert_eq!(db.cluster_id("PERSON"), Some(9));
    assert_eq!(db.cluster_id("missing"), None);
    assert_eq!(client.connection().active_session(), Some(DB_SESSION));
}

#[tokio::test]
async fn test_server_error_on_open() {
    let server = MockServer::start().await;
    let (conn, mut side) = common::connect(&server, 28).await;
    let client = OrientClient::from_connection(
        conn,
        common::config(&server.address()),
        Arc::new(FormatRegistry::new()),
    );

    let (result, ()) = tokio::join!(client.open_database("demo", "admin", "wrong"), async {
        side.read_header().await;
        read_handshake(&mut side, 28).await;
        for _ in 0..4 {
            side.read_string().await;
        }
        side.send(Frame::error(
            -1,
            &[(
                "com.orientechnologies.orient.core.exception.OSecurityAccessException",
                "User or password not valid",
            )],
        ))
        .await;
    });

    match result {
        Err(OrientError::Server(e)) => {
            assert!(e.exceptions()[0].message.contains("password not valid"))
        }
        other => panic!("expected server error, got {:?}", other),
    }
    assert_eq!(client.connection().active_session(), None);
}

#[tokio::test]
async fn test_record_lifecycle() {
    let (_client, db, mut side) = open(28).await;

    let mut doc = Document::with_class("Person")
        .with_field("name", "Linus")
        .with_field("age", 54i32);
    let expected = doc.clone();

    let (rid, sent) = tokio::join!(db.create_record(9, &mut doc), async {
        assert_eq!(
            side.read_header().await,
            (REQUEST_RECORD_CREATE, DB_SESSION)
        );
        assert_eq!(side.read_i16().await, 9);
        let content = side.read_bytes().await.unwrap();
        assert_eq!(side.read_u8().await, b'd');
        assert_eq!(side.read_u8().await, 0);
        side.send(
            Frame::ok(DB_SESSION)
                .short(9)
                .long(1)
                .int(1)
                .int(1)
                .long(11)
                .long(12)
                .long(13)
                .long(14)
                .int(15),
        )
        .await;
        content
    });

    let rid = rid.unwrap();
    assert_eq!(rid, Rid::new(9, 1));
    assert_eq!(doc.rid(), Some(rid));
    assert_eq!(doc.version(), 1);
    assert_eq!(serializer().deserialize(&sent).unwrap(), expected);

    let (loaded, ()) = tokio::join!(db.load_record(rid), async {
        expect_load(&mut side, rid).await;
        side.send(record_frame(b'd', 1, &sent)).await;
    });
    let loaded = loaded.unwrap().unwrap();
    assert_eq!(loaded.class_name(), Some("Person"));
    assert_eq!(loaded.get("name"), Some(&Value::String("Linus".into())));
    assert_eq!(loaded.get("age"), Some(&Value::Integer(54)));
    assert_eq!(loaded.rid(), Some(rid));
    assert_eq!(loaded.version(), 1);

    let (deleted, ()) = tokio::join!(db.delete_record(rid, 1), async {
        assert_eq!(
            side.read_header().await,
            (REQUEST_RECORD_DELETE, DB_SESSION)
        );
        assert_eq!(side.read_i16().await, 9);
        assert_eq!(side.read_i64().await, 1);
        assert_eq!(side.read_i32().await, 1);
        assert_eq!(side.read_u8().await, 0);
        side.send(Frame::ok(DB_SESSION).byte(1)).await;
    });
    assert!(deleted.unwrap());
}

#[tokio::test]
async fn test_load_missing_record() {
    let (_client, db, mut side) = open(28).await;

    let (loaded, ()) = tokio::join!(db.load_record(Rid::new(9, 404)), async {
        expect_load(&mut side, Rid::new(9, 404)).await;
        side.send(Frame::ok(DB_SESSION).byte(0)).await;
    });
    assert_eq!(loaded.unwrap(), None);
}

#[tokio::test]
async fn test_load_skips_prefetched_records() {
    let (_client, db, mut side) = open(28).await;
    let content = serializer()
        .serialize(&Document::new().with_field("n", 1i32))
        .unwrap();

    let (loaded, ()) = tokio::join!(db.load_record(Rid::new(9, 1)), async {
        expect_load(&mut side, Rid::new(9, 1)).await;
        let frame = Frame::ok(DB_SESSION)
            .byte(2)
            .short(0)
            .byte(b'd')
            .short(9)
            .long(2)
            .int(1)
            .bytes(&[0, 0, 0])
            .byte(2)
            .short(-3)
            .short(9)
            .long(3)
            .byte(1)
            .byte(b'd')
            .int(4)
            .bytes(&content)
            .byte(2)
            .short(-2)
            .byte(0);
        side.send(frame).await;
    });

    let loaded = loaded.unwrap().unwrap();
    assert_eq!(loaded.get("n"), Some(&Value::Integer(1)));
    assert_eq!(loaded.version(), 4);
}

#[tokio::test]
async fn test_load_non_document_record_fails() {
    let (_client, db, mut side) = open(28).await;

    let (loaded, ()) = tokio::join!(db.load_record(Rid::new(0, 0)), async {
        expect_load(&mut side, Rid::new(0, 0)).await;
        side.send(record_frame(b'b', 1, b"raw")).await;
    });
    assert!(matches!(loaded, Err(OrientError::Serialization(_))));
}

#[tokio::test]
async fn test_legacy_protocol_layouts() {
    let (_client, db, mut side) = open(23).await;
    assert_eq!(db.cluster_id("person"), Some(9));
    assert_eq!(db.session().token(), None);

    let content = serializer()
        .serialize(&Document::new().with_field("n", 2i32))
        .unwrap();
    let (loaded, ()) = tokio::join!(db.load_record(Rid::new(9, 2)), async {
        expect_load(&mut side, Rid::new(9, 2)).await;
        let frame = Frame::ok(DB_SESSION)
            .byte(1)
            .bytes(&content)
            .int(6)
            .byte(b'd')
            .byte(0);
        side.send(frame).await;
    });

    let loaded = loaded.unwrap().unwrap();
    assert_eq!(loaded.get("n"), Some(&Value::Integer(2)));
    assert_eq!(loaded.version(), 6);
}

#[tokio::test]
async fn test_unknown_property_triggers_schema_refresh() {
    let (_client, db, mut side) = open(28).await;
    let record = record_with_global_property();
    let schema = schema_record(&[(0, "name", "STRING")]);

    let (loaded, ()) = tokio::join!(db.load_record(Rid::new(9, 1)), async {
        expect_load(&mut side, Rid::new(9, 1)).await;
        side.send(record_frame(b'd', 3, &record)).await;
        expect_load(&mut side, Rid::new(0, 0)).await;
        side.send(record_frame(b'b', 1, b"4|demo|#0:1|#0:2|#0:3"))
            .await;
        expect_load(&mut side, Rid::new(0, 1)).await;
        side.send(record_frame(b'd', 1, &schema)).await;
    });

    let loaded = loaded.unwrap().unwrap();
    assert_eq!(loaded.get("name"), Some(&Value::String("Linus".into())));
    assert_eq!(loaded.version(), 3);
    assert_eq!(db.properties().len(), 1);
}

#[tokio::test]
async fn test_property_missing_after_refresh_is_stale() {
    let (_client, db, mut side) = open(28).await;
    let record = record_with_global_property();
    let schema = schema_record(&[(1, "other", "INTEGER")]);

    let (loaded, ()) = tokio::join!(db.load_record(Rid::new(9, 1)), async {
        expect_load(&mut side, Rid::new(9, 1)).await;
        side.send(record_frame(b'd', 3, &record)).await;
        expect_load(&mut side, Rid::new(0, 0)).await;
        side.send(record_frame(b'b', 1, b"4|demo|#0:7|#0:2"))
            .await;
        expect_load(&mut side, Rid::new(0, 7)).await;
        side.send(record_frame(b'd', 1, &schema)).await;
    });

    assert!(matches!(loaded, Err(OrientError::StaleGlobalProperties(0))));
}

#[tokio::test]
async fn test_duplicate_key_on_create() {
    let (_client, db, mut side) = open(28).await;
    let mut doc = Document::with_class("Person").with_field("name", "x");

    let (result, ()) = tokio::join!(db.create_record(9, &mut doc), async {
        side.read_header().await;
        side.read_i16().await;
        side.read_bytes().await;
        side.read_u8().await;
        side.read_u8().await;
        side.send(Frame::error(
            DB_SESSION,
            &[(
                "com.orientechnologies.orient.core.storage.ORecordDuplicatedException",
                "Cannot index record Person{name:x}: found duplicated key 'x' in index \
                 'Person.name' previously assigned to the record #9:1",
            )],
        ))
        .await;
    });

    match result {
        Err(OrientError::DuplicateRecord {
            index, key, rid, ..
        }) => {
            assert_eq!(index.as_deref(), Some("Person.name"));
            assert_eq!(key.as_deref(), Some("x"));
            assert_eq!(rid, Some(Rid::new(9, 1)));
        }
        other => panic!("expected duplicate record, got {:?}", other),
    }
    assert_eq!(doc.rid(), None);
}

#[tokio::test]
async fn test_database_close() {
    let (client, db, mut side) = open(28).await;

    db.close().await.unwrap();
    assert_eq!(side.read_header().await, (REQUEST_DB_CLOSE, DB_SESSION));
    assert_eq!(client.connection().active_session(), None);
}
