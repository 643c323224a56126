//! Connection handling: handshake, session multiplexing and response dispatch.

mod connection;
mod reader;
mod session;

pub use connection::{Connection, ConnectionId};
pub use reader::ResponseReader;
pub use session::Session;
