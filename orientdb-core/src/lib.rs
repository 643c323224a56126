//! Core types for the OrientDB binary protocol: errors, wire primitives and
//! the binary record format.

#![warn(missing_docs)]

pub mod error;
pub mod protocol;
pub mod record;
pub mod serialization;

pub use error::{OrientError, Result, ServerError, ServerException};
pub use record::{DataType, Document, Link, Rid, Value};
pub use serialization::{DataInput, DataOutput, ObjectDataInput, ObjectDataOutput};
