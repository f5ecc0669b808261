//! The type lattice of the binary module format.

use std::fmt;

/// A value type: the type of a single operand-stack slot, local, or global.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    I32,
    I64,
    F32,
    F64,
    V128,
    FuncRef,
    ExternRef,
}

impl ValueType {
    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x7f => Some(ValueType::I32),
            0x7e => Some(ValueType::I64),
            0x7d => Some(ValueType::F32),
            0x7c => Some(ValueType::F64),
            0x7b => Some(ValueType::V128),
            0x70 => Some(ValueType::FuncRef),
            0x6f => Some(ValueType::ExternRef),
            _ => None,
        }
    }

    pub(crate) fn byte(self) -> u8 {
        match self {
            ValueType::I32 => 0x7f,
            ValueType::I64 => 0x7e,
            ValueType::F32 => 0x7d,
            ValueType::F64 => 0x7c,
            ValueType::V128 => 0x7b,
            ValueType::FuncRef => 0x70,
            ValueType::ExternRef => 0x6f,
        }
    }

    /// Returns `true` for the reference kinds.
    pub fn is_ref(self) -> bool {
        matches!(self, ValueType::FuncRef | ValueType::ExternRef)
    }

    /// Returns `true` for the numeric kinds.
    pub fn is_num(self) -> bool {
        matches!(
            self,
            ValueType::I32 | ValueType::I64 | ValueType::F32 | ValueType::F64
        )
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
            ValueType::V128 => "v128",
            ValueType::FuncRef => "funcref",
            ValueType::ExternRef => "externref",
        };
        f.write_str(name)
    }
}

/// The reference subset of [`ValueType`], used where only references are
/// legal: table element types and `ref.null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefType {
    Func,
    Extern,
}

impl RefType {
    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x70 => Some(RefType::Func),
            0x6f => Some(RefType::Extern),
            _ => None,
        }
    }

    pub(crate) fn byte(self) -> u8 {
        match self {
            RefType::Func => 0x70,
            RefType::Extern => 0x6f,
        }
    }
}

impl From<RefType> for ValueType {
    fn from(ty: RefType) -> Self {
        match ty {
            RefType::Func => ValueType::FuncRef,
            RefType::Extern => ValueType::ExternRef,
        }
    }
}

impl fmt::Display for RefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        ValueType::from(*self).fmt(f)
    }
}

/// A function signature: parameter types and result types, both ordered.
///
/// Two function types are equal iff both sequences are equal element-wise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FunctionType {
    pub params: Vec<ValueType>,
    pub results: Vec<ValueType>,
}

impl FunctionType {
    pub fn new(params: Vec<ValueType>, results: Vec<ValueType>) -> Self {
        FunctionType { params, results }
    }
}

/// Size bounds for a table or memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Limits {
    pub min: u64,
    pub max: Option<u64>,
}

impl Limits {
    pub fn at_least(min: u64) -> Self {
        Limits { min, max: None }
    }

    pub fn bounded(min: u64, max: u64) -> Self {
        Limits { min, max: Some(max) }
    }
}

/// The type of a table: an element reference type plus size bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableType {
    pub element: RefType,
    pub limits: Limits,
}

/// The type of a linear memory: size bounds in page units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryType {
    pub limits: Limits,
}

/// The type of a global: a value type plus mutability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalType {
    pub value: ValueType,
    pub mutable: bool,
}

/// The type annotation of a block, loop, or if.
///
/// `Func` refers to an entry in the type section, enabling multi-value
/// parameters and results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    Empty,
    Value(ValueType),
    Func(u32),
}
