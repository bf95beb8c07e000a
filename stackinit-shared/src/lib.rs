//! Types shared between the stackinit library and its binary.

pub mod errors;

pub use errors::{StackError, StackResult};
