//! Async Rust client for the [OrientDB](https://orientdb.org/) binary protocol.
//!
//! This crate opens a single TCP connection to an OrientDB server and
//! multiplexes any number of logical sessions over it. Records travel in the
//! binary record format implemented by [`orientdb_core`]. It is built on
//! [Tokio](https://tokio.rs/) and exposes every operation as an `async fn`.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use orientdb_client::{ClientConfig, Document, OrientClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .address("127.0.0.1:2424")
//!         .build()?;
//!     let client = OrientClient::connect(config).await?;
//!
//!     let db = client.open_database("demo", "admin", "admin").await?;
//!     let mut doc = Document::with_class("Person").with_field("name", "Linus");
//!     let rid = db.create_record(9, &mut doc).await?;
//!     let loaded = db.load_record(rid).await?;
//!     println!("{:?}", loaded);
//!
//!     db.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Sessions
//!
//! Every request names a session. Requests on the same session run one at a
//! time; requests on different sessions are written concurrently and their
//! responses are routed back by session id. A single background task reads
//! the socket and does not read the next response until the current one has
//! been fully consumed, so response handlers passed to
//! [`Connection::send_cmd`] must read their whole body.
//!
//! # Configuration
//!
//! ```rust
//! use orientdb_client::ClientConfig;
//! use std::time::Duration;
//!
//! let config = ClientConfig::builder()
//!     .address("db.internal:2424")
//!     .connection_timeout(Duration::from_secs(10))
//!     .network(|n| n.session_wait(Duration::from_millis(500)))
//!     .protocol(|p| p.version_range(24, 28).client_id("reporting"))
//!     .build()
//!     .expect("invalid config");
//! ```
//!
//! `ClientConfig::from_env()` reads `ORIENTDB_*` variables; with the
//! `config-file` feature, `ClientConfig::from_toml(path)` loads a TOML file.

#![warn(missing_docs)]

mod client;
pub mod config;
pub mod config_file;
pub mod connection;

pub use client::{ClusterInfo, Database, OrientClient, RawRecord};
pub use config::{
    ClientConfig, ClientConfigBuilder, ConfigError, NetworkConfig, NetworkConfigBuilder,
    ProtocolConfig, ProtocolConfigBuilder,
};
pub use connection::{Connection, ConnectionId, ResponseReader, Session};

pub use orientdb_core as core;
pub use orientdb_core::{Document, Link, OrientError, Result, Rid, Value};
