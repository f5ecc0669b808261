//! Convenient re-exports for common usage patterns.
//!
//! This module provides a single import to bring all commonly used types
//! into scope.
//!
//! # Example
//!
//! ```
//! use wasmod::prelude::*;
//!
//! let module = Module::builder()
//!     .function_type(FunctionType::new(vec![ValueType::I32], vec![ValueType::I32]))
//!     .function(0, vec![], vec![Instruction::LocalGet(0)])
//!     .build();
//! validate(&module)?;
//! # Ok::<(), Error>(())
//! ```

// Unified error handling
pub use crate::error::{Error, Result};

// The module representation and its building blocks
pub use crate::module::{
    BlockType, Builder, ConstExpr, CustomSection, Data, DataMode, Element, ElementItems,
    ElementMode, Export, ExportKind, Function, FunctionType, Global, GlobalType, Ieee32, Ieee64,
    Import, ImportDesc, Instruction, Limits, MemArg, MemoryType, Module, RefType, Table,
    TableType, ValueType,
};

// Per-stage errors
pub use crate::decode::DecodeError;
pub use crate::encode::EncodeError;
pub use crate::validate::{IndexSpace, Location, ValidationError, ValidationErrors};

// Feature selection and the crate-level entry points
pub use crate::features::Features;
pub use crate::{decode, decode_with_features, encode, validate, validate_with_features};
