//! Error type for binary decoding.

use thiserror::Error;

/// Errors that can occur while decoding a binary module.
///
/// Decoding fails fast: the first structural problem is returned immediately,
/// since a misaligned byte stream makes everything after it unparseable. Each
/// variant carries the byte offset (into the original input) where the
/// problem was detected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Invalid magic header: expected [00, 61, 73, 6d], found {found:02x?}")]
    InvalidMagic { found: [u8; 4] },

    #[error("Unsupported version: expected {expected}, found {found}")]
    InvalidVersion { expected: u32, found: u32 },

    #[error("Unexpected end of input at offset {offset}")]
    UnexpectedEof { offset: usize },

    #[error("Invalid {bits}-bit integer encoding at offset {offset}")]
    InvalidInt { bits: u32, offset: usize },

    #[error("Invalid UTF-8 in name at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("Unknown section id {id} at offset {offset}")]
    UnknownSectionId { id: u8, offset: usize },

    #[error("Section id {id} out of order at offset {offset}")]
    SectionOutOfOrder { id: u8, offset: usize },

    #[error("Duplicate section id {id} at offset {offset}")]
    DuplicateSection { id: u8, offset: usize },

    #[error("Section id {id} declared {declared} bytes but {consumed} were consumed")]
    SectionLengthMismatch { id: u8, declared: u32, consumed: u32 },

    #[error("Unknown opcode {opcode:#04x} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },

    #[error("Unknown opcode {prefix:#04x} {sub} at offset {offset}")]
    UnknownPrefixedOpcode { prefix: u8, sub: u32, offset: usize },

    #[error("Code entry has trailing bytes after its final end at offset {offset}")]
    UnexpectedEndOfBlock { offset: usize },

    #[error("Code entry ended with unclosed blocks at offset {offset}")]
    MissingEndOfBlock { offset: usize },

    #[error("Invalid value type {byte:#04x} at offset {offset}")]
    InvalidValueType { byte: u8, offset: usize },

    #[error("Invalid {what} value {value:#04x} at offset {offset}")]
    InvalidFlag {
        what: &'static str,
        value: u32,
        offset: usize,
    },

    #[error("Function section declares {declared} functions but code section has {bodies} bodies")]
    FunctionCountMismatch { declared: u32, bodies: u32 },

    #[error("Data-count section declares {declared} segments but data section has {actual}")]
    DataCountMismatch { declared: u32, actual: u32 },

    #[error("Local declarations exceed the 32-bit count limit at offset {offset}")]
    TooManyLocals { offset: usize },

    #[error("Opcode {opcode} requires the {feature} capability at offset {offset}")]
    DisabledCapability {
        opcode: &'static str,
        feature: &'static str,
        offset: usize,
    },
}
