//! OrientDB binary protocol constants.
//!
//! Every request frame is `opcode:byte, session-id:int, body`; every
//! response frame is `status:byte, session-id:int, body-or-exceptions`.

pub mod constants;

pub use constants::*;
