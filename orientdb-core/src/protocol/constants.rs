//! Protocol constants for the OrientDB binary protocol.

/// Lowest server protocol version this client understands.
pub const MIN_PROTOCOL_VERSION: i16 = 21;

/// Highest protocol version this client speaks.
pub const MAX_PROTOCOL_VERSION: i16 = 28;

/// First protocol version whose open/connect requests name the record
/// serializer, making the binary format selectable.
pub const MIN_BINARY_SERIALIZER_VERSION: i16 = 22;

/// First protocol version carrying token-based sessions.
pub const MIN_TOKEN_SESSION_VERSION: i16 = 26;

/// Last protocol version whose database-open request names the database type.
pub const LAST_DATABASE_TYPE_VERSION: i16 = 32;

/// Session id used before authentication (connect and open requests).
pub const ROOT_SESSION_ID: i32 = -1;

/// Name the server uses for the binary record serializer.
pub const BINARY_SERIALIZER_NAME: &str = "ORecordSerializerBinary";

/// Name the server uses for the legacy CSV record serializer.
pub const CSV_SERIALIZER_NAME: &str = "ORecordDocument2csv";

// Response status bytes.

/// The request succeeded; the body follows.
pub const STATUS_OK: u8 = 0;

/// The request failed; an exception chain follows.
pub const STATUS_ERROR: u8 = 1;

/// Unsolicited server push.
pub const STATUS_PUSH: u8 = 3;

// Request opcodes.

/// Shut the server down.
pub const REQUEST_SHUTDOWN: u8 = 1;

/// Authenticate against the server (not a database).
pub const REQUEST_CONNECT: u8 = 2;

/// Open a database.
pub const REQUEST_DB_OPEN: u8 = 3;

/// Create a database.
pub const REQUEST_DB_CREATE: u8 = 4;

/// Close the current database; the server sends no response.
pub const REQUEST_DB_CLOSE: u8 = 5;

/// Check whether a database exists.
pub const REQUEST_DB_EXIST: u8 = 6;

/// Drop a database.
pub const REQUEST_DB_DROP: u8 = 7;

/// Load a record by RID.
pub const REQUEST_RECORD_LOAD: u8 = 30;

/// Create a record.
pub const REQUEST_RECORD_CREATE: u8 = 31;

/// Update a record.
pub const REQUEST_RECORD_UPDATE: u8 = 32;

/// Delete a record.
pub const REQUEST_RECORD_DELETE: u8 = 33;

/// Execute a command or query.
pub const REQUEST_COMMAND: u8 = 41;

/// Reload database metadata.
pub const REQUEST_DB_RELOAD: u8 = 73;

/// List databases.
pub const REQUEST_DB_LIST: u8 = 74;

// Record load payload statuses.

/// No more records follow.
pub const PAYLOAD_END: u8 = 0;

/// The requested record follows.
pub const PAYLOAD_RECORD: u8 = 1;

/// A prefetched record (fetch plan) follows.
pub const PAYLOAD_PREFETCHED: u8 = 2;

// Record types.

/// Document record type.
pub const RECORD_TYPE_DOCUMENT: u8 = b'd';

/// Raw bytes record type.
pub const RECORD_TYPE_BYTES: u8 = b'b';

/// Flat (string) record type.
pub const RECORD_TYPE_FLAT: u8 = b'f';

/// Synchronous write mode for create/update/delete.
pub const MODE_SYNC: u8 = 0;

/// Returns a human readable name for an opcode, for logging.
pub fn opcode_name(opcode: u8) -> &'static str {
    match opcode {
        REQUEST_SHUTDOWN => "SHUTDOWN",
        REQUEST_CONNECT => "CONNECT",
        REQUEST_DB_OPEN => "DB_OPEN",
        REQUEST_DB_CREATE => "DB_CREATE",
        REQUEST_DB_CLOSE => "DB_CLOSE",
        REQUEST_DB_EXIST => "DB_EXIST",
        REQUEST_DB_DROP => "DB_DROP",
        REQUEST_RECORD_LOAD => "RECORD_LOAD",
        REQUEST_RECORD_CREATE => "RECORD_CREATE",
        REQUEST_RECORD_UPDATE => "RECORD_UPDATE",
        REQUEST_RECORD_DELETE => "RECORD_DELETE",
        REQUEST_COMMAND => "COMMAND",
        REQUEST_DB_RELOAD => "DB_RELOAD",
        REQUEST_DB_LIST => "DB_LIST",
        _ => "UNKNOWN",
    }
}

/// Returns `true` if the server sends no response to this opcode.
pub fn expects_no_response(opcode: u8) -> bool {
    opcode == REQUEST_DB_CLOSE
}
