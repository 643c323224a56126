//! Wire primitives shared by the network frames and the record format.

mod data_input;
mod data_output;
pub mod varint;

pub use data_input::{DataInput, ObjectDataInput};
pub use data_output::{DataOutput, ObjectDataOutput};
pub use varint::{VarIntInput, VarIntOutput};
