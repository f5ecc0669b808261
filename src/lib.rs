//! Decode, validate and encode WebAssembly binary modules.
//!
//! The crate round-trips the core binary format through an immutable
//! in-memory [`Module`]: [`decode`](fn@decode) parses bytes into one,
//! [`validate`](fn@validate) type-checks it without executing anything, and
//! [`encode`](fn@encode) serializes it back. Decoding checks structure only,
//! so tooling can load and inspect modules that would never validate;
//! validation then reports every problem it can find in a single pass rather
//! than stopping at the first.
//!
//! # Quick Start
//!
//! ```
//! use wasmod::module::{ExportKind, FunctionType, Instruction, Module, ValueType};
//!
//! let module = Module::builder()
//!     .function_type(FunctionType::new(vec![], vec![ValueType::I32]))
//!     .function(0, vec![], vec![Instruction::I32Const(42)])
//!     .export("answer", ExportKind::Func, 0)
//!     .build();
//!
//! wasmod::validate(&module)?;
//!
//! let bytes = wasmod::encode(&module)?;
//! assert_eq!(wasmod::decode(&bytes)?, module);
//! # Ok::<(), wasmod::Error>(())
//! ```
//!
//! # Modules
//!
//! - [`module`] - The in-memory representation and its [`Builder`](module::Builder)
//! - [`decode`](mod@decode) - Binary parsing with structural checks
//! - [`validate`](mod@validate) - Type checking and index resolution
//! - [`encode`](mod@encode) - Serialization back to the binary format
//! - [`leb128`] - The variable-length integers the format is built on
//!
//! # Feature Flags
//!
//! - `logging` - Emit `tracing` events while decoding, validating and
//!   encoding (consumers provide their own subscriber)

pub mod decode;
pub mod encode;
pub mod leb128;
pub mod module;
pub mod prelude;
pub mod validate;

mod error;
mod features;
mod logging;

// Re-export the unified error type
pub use error::{Error, Result};

// Re-export the pieces most callers name
pub use decode::DecodeError;
pub use encode::EncodeError;
pub use features::Features;
pub use module::Module;
pub use validate::{ValidationError, ValidationErrors};

/// Decode a binary module with the default feature set.
///
/// Structural problems (bad framing, malformed integers, out-of-order
/// sections) are reported here; dangling indices and type errors are left
/// for [`validate`](fn@validate).
pub fn decode(bytes: &[u8]) -> Result<Module> {
    decode_with_features(bytes, Features::default())
}

/// Decode a binary module, rejecting instructions outside `features`.
pub fn decode_with_features(bytes: &[u8], features: Features) -> Result<Module> {
    Ok(decode::decode_module(bytes, features)?)
}

/// Check a module against the typing and indexing rules with the default
/// feature set.
///
/// On failure the returned [`ValidationErrors`] lists every problem found,
/// module-level errors first and function bodies in index order. Retrieve
/// the list with [`Error::as_validation`].
pub fn validate(module: &Module) -> Result<()> {
    validate_with_features(module, Features::default())
}

/// Check a module against the typing and indexing rules, rejecting
/// instructions outside `features`.
pub fn validate_with_features(module: &Module, features: Features) -> Result<()> {
    Ok(validate::validate_module(module, features)?)
}

/// Serialize a module to the binary format.
///
/// Encoding is total for modules produced by [`decode`](fn@decode); modules
/// built by hand can fail on wire limits, such as a count that does not fit
/// in 32 bits.
pub fn encode(module: &Module) -> Result<Vec<u8>> {
    Ok(encode::encode_module(module)?)
}
