//! Documents, record ids and the binary record format.

pub mod binary;
mod data_type;
mod document;
pub mod format;
mod link_bag;
mod properties;
mod rid;
mod value;

pub use binary::{decode_field_id, encode_field_id, BinaryFormatV0};
pub use data_type::DataType;
pub use document::{Document, Field};
pub use format::{FormatRegistry, RecordFormat, RecordSerializer};
pub use link_bag::{ChangeKind, LinkBag, LinkBagChange, TreeLinkBag};
pub use properties::{GlobalProperties, GlobalProperty, PropertyResolver, SchemaRefresher};
pub use rid::{Link, Rid};
pub use value::Value;
