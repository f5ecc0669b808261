//! Error types for module validation.
//!
//! Validation accumulates: it records every problem it can find rather than
//! stopping at the first, so a caller fixing a module sees the whole list at
//! once. Errors are ordered module-level checks first, then function bodies
//! in index order.

use crate::module::ValueType;
use std::fmt;
use thiserror::Error;

/// Which index space an out-of-range index referred to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSpace {
    Type,
    Function,
    Table,
    Memory,
    Global,
    Element,
    Data,
    Local,
}

impl fmt::Display for IndexSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndexSpace::Type => "type",
            IndexSpace::Function => "function",
            IndexSpace::Table => "table",
            IndexSpace::Memory => "memory",
            IndexSpace::Global => "global",
            IndexSpace::Element => "element segment",
            IndexSpace::Data => "data segment",
            IndexSpace::Local => "local",
        };
        f.write_str(name)
    }
}

/// Where in the module an error was found. Function and instruction
/// positions index the flat instruction list of the named function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Instr { func: u32, index: usize },
    Func(u32),
    Global(u32),
    Table(u32),
    Memory(u32),
    Element(u32),
    Data(u32),
    Export(u32),
    Import(u32),
    Start,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Instr { func, index } => {
                write!(f, "function {func}, instruction {index}")
            }
            Location::Func(i) => write!(f, "function {i}"),
            Location::Global(i) => write!(f, "global {i}"),
            Location::Table(i) => write!(f, "table {i}"),
            Location::Memory(i) => write!(f, "memory {i}"),
            Location::Element(i) => write!(f, "element segment {i}"),
            Location::Data(i) => write!(f, "data segment {i}"),
            Location::Export(i) => write!(f, "export {i}"),
            Location::Import(i) => write!(f, "import {i}"),
            Location::Start => f.write_str("start function"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Type mismatch at {location}: expected {expected}, found {found}")]
    TypeMismatch {
        expected: ValueType,
        found: ValueType,
        location: Location,
    },

    #[error("Stack underflow at {location}")]
    StackUnderflow { location: Location },

    #[error("Block at {location} leaves {found} values but its type expects {expected}")]
    StackHeightMismatch {
        expected: usize,
        found: usize,
        location: Location,
    },

    #[error("Unknown {space} index {index} at {location}: the module has {count}")]
    UnknownIndex {
        space: IndexSpace,
        index: u32,
        count: u32,
        location: Location,
    },

    #[error("Global {index} is immutable and cannot be written at {location}")]
    ImmutableGlobal { index: u32, location: Location },

    #[error("Duplicate export name {name:?}")]
    DuplicateExportName { name: String },

    #[error("Limits at {location} have minimum {min} above maximum {max}")]
    InvalidLimits {
        min: u64,
        max: u64,
        location: Location,
    },

    #[error("Limits at {location} reach {value}, above the ceiling of {ceiling}")]
    LimitsTooLarge {
        value: u64,
        ceiling: u64,
        location: Location,
    },

    #[error("Start function must take no parameters and return nothing")]
    InvalidStartSignature,

    #[error("Branch depth {depth} at {location} exceeds the nesting depth {max}")]
    BranchDepthOutOfRange {
        depth: u32,
        max: usize,
        location: Location,
    },

    #[error("Branch table targets at {location} have differing label types")]
    BranchTableTypeMismatch { location: Location },

    #[error("Alignment 2^{align} at {location} exceeds the natural alignment 2^{natural}")]
    InvalidAlignment {
        align: u32,
        natural: u32,
        location: Location,
    },

    #[error("Else without a matching if at {location}")]
    ElseWithoutIf { location: Location },

    #[error("If at {location} needs an else: its parameters and results differ")]
    MissingElse { location: Location },

    #[error("End without an open block at {location}")]
    UnexpectedEnd { location: Location },

    #[error("Function body at {location} ends with {depth} unclosed blocks")]
    UnclosedBlock { depth: usize, location: Location },

    #[error("Instruction at {location} is not allowed in a constant expression")]
    NonConstantInstruction { location: Location },

    #[error("Constant expression at {location} must leave exactly one value, found {found}")]
    ConstExprArity { found: usize, location: Location },

    #[error("Constant expression at {location} may only read imported globals, not global {index}")]
    ConstExprGlobalNotImported { index: u32, location: Location },

    #[error("Function {index} is referenced at {location} but never declared in a segment or export")]
    UndeclaredFunctionReference { index: u32, location: Location },

    #[error("Expected a reference type at {location}, found {found}")]
    ExpectedReference {
        found: ValueType,
        location: Location,
    },

    #[error("Select at {location} requires numeric operands, found {found}")]
    ExpectedNumeric {
        found: ValueType,
        location: Location,
    },

    #[error("Select operands at {location} disagree: {first} versus {second}")]
    SelectOperandMismatch {
        first: ValueType,
        second: ValueType,
        location: Location,
    },

    #[error("Typed select at {location} must name exactly one type, found {count}")]
    SelectArity { count: usize, location: Location },

    #[error("Declared data count {declared} does not match the {defined} data segments")]
    DataCountMismatch { declared: u32, defined: u32 },

    #[error("Instruction at {location} requires a declared data count section")]
    RequiresDataCount { location: Location },

    #[error("The module defines or imports {count} memories; only one is allowed")]
    MultipleMemories { count: u32 },

    #[error("The module defines or imports {count} tables; only one is allowed without reference types")]
    MultipleTables { count: u32 },

    #[error("Instruction {instruction} at {location} requires the {feature} capability")]
    FeatureDisabled {
        instruction: &'static str,
        feature: &'static str,
        location: Location,
    },
}

/// Every problem found in one validation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors {
    pub errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ValidationError> {
        self.errors.iter()
    }

    /// The first error in module order.
    pub fn first(&self) -> Option<&ValidationError> {
        self.errors.first()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Validation failed with {} error(s):", self.errors.len())?;
        for err in &self.errors {
            writeln!(f, "  - {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

impl IntoIterator for ValidationErrors {
    type Item = ValidationError;
    type IntoIter = std::vec::IntoIter<ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

impl<'a> IntoIterator for &'a ValidationErrors {
    type Item = &'a ValidationError;
    type IntoIter = std::slice::Iter<'a, ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}
