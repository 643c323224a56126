//! Error types for OrientDB driver operations.

use std::fmt;
use std::io;
use thiserror::Error;

use crate::record::{DataType, Rid};

/// Fully qualified class name the server uses for unique-index violations.
const DUPLICATED_EXCEPTION_CLASS: &str =
    "com.orientechnologies.orient.core.storage.ORecordDuplicatedException";

/// Message fragment the server embeds in unique-index violations.
const DUPLICATED_KEY_MARKER: &str = "found duplicated key";

/// The main error type for OrientDB operations.
#[derive(Debug, Error)]
pub enum OrientError {
    /// Connection-related errors (connect failures, write failures).
    #[error("connection error: {0}")]
    Connection(String),

    /// The connection was torn down; every later request fails with this.
    #[error("connection broken: {0}")]
    ConnectionBroken(String),

    /// Protocol violations (unexpected status bytes, untracked sessions).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server speaks a protocol version outside the supported range.
    #[error("unsupported server protocol version {server} (supported {min}..={max})")]
    VersionMismatch {
        /// Version announced by the server.
        server: i16,
        /// Lowest version this client accepts.
        min: i16,
        /// Highest version this client accepts.
        max: i16,
    },

    /// Generic serialization/deserialization failures.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The byte stream is structurally invalid (negative lengths and the like).
    #[error("corrupt stream: {0}")]
    CorruptStream(String),

    /// A type byte that does not name any record data type.
    #[error("unknown data value type: {0}")]
    UnknownDataType(u8),

    /// A field's declared type does not agree with its runtime value.
    #[error("data type mismatch: expected {expected}, got {actual}")]
    DataTypeMismatch {
        /// Declared field type.
        expected: DataType,
        /// Type of the value actually supplied.
        actual: DataType,
    },

    /// The data type or wire variant is recognised but not supported.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// A header referenced a global property id missing from the local cache.
    #[error("unknown global property id {0}")]
    UnknownGlobalProperty(i32),

    /// A global property id is still unknown after refreshing the schema.
    #[error("stale global properties: property id {0} unknown after schema refresh")]
    StaleGlobalProperties(i32),

    /// Exceptions reported by the server in an error response.
    #[error("server error: {0}")]
    Server(ServerError),

    /// A unique index rejected the record.
    #[error("duplicate record: key {key:?} in index {index:?} already assigned to {rid:?}")]
    DuplicateRecord {
        /// Index that rejected the write, when it could be parsed.
        index: Option<String>,
        /// Offending key, when it could be parsed.
        key: Option<String>,
        /// Record already holding the key, when it could be parsed.
        rid: Option<Rid>,
        /// The full server exception chain.
        source: ServerError,
    },

    /// Operation timeout errors.
    #[error("timeout error: {0}")]
    Timeout(String),

    /// Configuration errors (invalid settings).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// I/O errors from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl OrientError {
    /// Builds the error for a server exception chain, recognising
    /// duplicated-key violations.
    pub fn from_server(error: ServerError) -> Self {
        if !error.is_duplicated_key() {
            return OrientError::Server(error);
        }
        let message = error
            .exceptions()
            .iter()
            .find(|e| e.message.contains(DUPLICATED_KEY_MARKER))
            .map(|e| e.message.clone())
            .unwrap_or_default();

        OrientError::DuplicateRecord {
            index: quoted_after(&message, "in index '"),
            key: quoted_after(&message, "duplicated key '"),
            rid: message
                .split("previously assigned to the record ")
                .nth(1)
                .and_then(|rest| rest.split_whitespace().next())
                .and_then(|token| token.trim_end_matches('.').parse().ok()),
            source: error,
        }
    }
}

fn quoted_after(message: &str, prefix: &str) -> Option<String> {
    let start = message.find(prefix)? + prefix.len();
    let rest = &message[start..];
    let end = rest.find('\'')?;
    Some(rest[..end].to_string())
}

/// A single exception entry from an error response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerException {
    /// Java class name of the exception.
    pub class_name: String,
    /// Exception message.
    pub message: String,
}

impl ServerException {
    /// Creates a new exception entry.
    pub fn new(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            message: message.into(),
        }
    }
}

/// The ordered exception chain carried by an error response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerError {
    exceptions: Vec<ServerException>,
}

impl ServerError {
    /// Creates a server error from its exception chain.
    pub fn new(exceptions: Vec<ServerException>) -> Self {
        Self { exceptions }
    }

    /// Returns the exceptions in the order the server sent them.
    pub fn exceptions(&self) -> &[ServerException] {
        &self.exceptions
    }

    /// Returns `true` if any exception signals a unique-index violation.
    pub fn is_duplicated_key(&self) -> bool {
        self.exceptions.iter().any(|e| {
            e.class_name == DUPLICATED_EXCEPTION_CLASS || e.message.contains(DUPLICATED_KEY_MARKER)
        })
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for e in &self.exceptions {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{}: {}", e.class_name, e.message)?;
        }
        if first {
            f.write_str("<no exception details>")?;
        }
        Ok(())
    }
}

impl std::error::Error for ServerError {}

/// A specialized `Result` type for OrientDB operations.
pub type Result<T> = std::result::Result<T, OrientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_display() {
        let err = OrientError::Connection("failed to connect to server".to_string());
        assert_eq!(
            err.to_string(),
            "connection error: failed to connect to server"
        );
    }

    #[test]
    fn test_version_mismatch_display() {
        let err = OrientError::VersionMismatch {
            server: 19,
            min: 21,
            max: 28,
        };
        assert_eq!(
            err.to_string(),
            "unsupported server protocol version 19 (supported 21..=28)"
        );
    }

    #[test]
    fn test_data_type_mismatch_names_both_types() {
        let err = OrientError::DataTypeMismatch {
            expected: DataType::DateTime,
            actual: DataType::String,
        };
        assert_eq!(
            err.to_string(),
            "data type mismatch: expected DATETIME, got STRING"
        );
    }

    #[test]
    fn test_unknown_data_type_display() {
        let err = OrientError::UnknownDataType(99);
        assert_eq!(err.to_string(), "unknown data value type: 99");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused");
        let err: OrientError = io_err.into();
        assert!(matches!(err, OrientError::Io(_)));
    }

    #[test]
    fn test_server_error_display_keeps_order() {
        let err = ServerError::new(vec![
            ServerException::new("org.foo.Blarg", "boom"),
            ServerException::new("org.foo.Wobble", "bang"),
        ]);
        assert_eq!(err.to_string(), "org.foo.Blarg: boom; org.foo.Wobble: bang");
    }

    #[test]
    fn test_from_server_plain_exception() {
        let err = OrientError::from_server(ServerError::new(vec![ServerException::new(
            "com.orientechnologies.orient.core.exception.OCommandExecutionException",
            "bad query",
        )]));
        assert!(matches!(err, OrientError::Server(_)));
    }

    #[test]
    fn test_from_server_duplicated_key_is_reclassified() {
        let message = "Cannot index record #9:3: found duplicated key 'alice' in index \
                       'User.name' previously assigned to the record #9:1";
        let err = OrientError::from_server(ServerError::new(vec![ServerException::new(
            DUPLICATED_EXCEPTION_CLASS,
            message,
        )]));

        match err {
            OrientError::DuplicateRecord {
                index,
                key,
                rid,
                source,
            } => {
                assert_eq!(index.as_deref(), Some("User.name"));
                assert_eq!(key.as_deref(), Some("alice"));
                assert_eq!(rid, Some(Rid::new(9, 1)));
                assert_eq!(source.exceptions().len(), 1);
            }
            other => panic!("expected DuplicateRecord, got {other:?}"),
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<OrientError>();
    }
}
