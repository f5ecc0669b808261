//! Error type for binary encoding.

use thiserror::Error;

/// Failure to serialize a module into the binary format.
///
/// Encoding only fails when the in-memory representation holds something
/// the 32-bit wire format cannot carry. Modules produced by the decoder
/// always encode cleanly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Cannot encode {count} {what}: the count must fit in 32 bits")]
    TooManyItems { what: &'static str, count: usize },

    #[error("Section {id} payload of {size} bytes exceeds the 32-bit size field")]
    SectionTooLarge { id: u8, size: usize },

    #[error("Limit value {value} does not fit in the 32-bit binary format")]
    LimitOutOfRange { value: u64 },

    #[error("Element segment {index} lists function indices but declares a non-funcref type")]
    InvalidElementSegment { index: u32 },
}
