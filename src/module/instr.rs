//! Instructions and expressions.
//!
//! The instruction set is modeled as one closed sum type, one variant per
//! opcode, so decoder, validator, and encoder can match exhaustively and an
//! unhandled opcode is a compile error rather than a runtime gap. Bodies are
//! flat sequences: nested `end`/`else` delimiters are explicit variants, the
//! terminating `end` of the outermost scope is implicit.

use super::types::{BlockType, RefType, ValueType};

/// A 32-bit float constant held as its raw IEEE-754 bit pattern.
///
/// Holding bits rather than `f32` keeps NaN payloads intact across a
/// round-trip and gives instruction sequences total equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ieee32(u32);

impl Ieee32 {
    pub fn from_bits(bits: u32) -> Self {
        Ieee32(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn value(self) -> f32 {
        f32::from_bits(self.0)
    }
}

impl From<f32> for Ieee32 {
    fn from(value: f32) -> Self {
        Ieee32(value.to_bits())
    }
}

/// A 64-bit float constant held as its raw IEEE-754 bit pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ieee64(u64);

impl Ieee64 {
    pub fn from_bits(bits: u64) -> Self {
        Ieee64(bits)
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    pub fn value(self) -> f64 {
        f64::from_bits(self.0)
    }
}

impl From<f64> for Ieee64 {
    fn from(value: f64) -> Self {
        Ieee64(value.to_bits())
    }
}

/// The alignment exponent and byte offset carried by every load and store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemArg {
    /// Alignment as a power-of-two exponent (0 = byte aligned).
    pub align: u32,
    /// Constant byte offset added to the dynamic address.
    pub offset: u32,
}

/// A single instruction with its immediate operands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Instruction {
    // Control.
    Unreachable,
    Nop,
    Block(BlockType),
    Loop(BlockType),
    If(BlockType),
    Else,
    End,
    Br(u32),
    BrIf(u32),
    BrTable { targets: Vec<u32>, default: u32 },
    Return,
    Call(u32),
    CallIndirect { type_index: u32, table: u32 },

    // Parametric.
    Drop,
    Select,
    TypedSelect(Vec<ValueType>),

    // Variables.
    LocalGet(u32),
    LocalSet(u32),
    LocalTee(u32),
    GlobalGet(u32),
    GlobalSet(u32),

    // Tables.
    TableGet(u32),
    TableSet(u32),

    // Memory loads.
    I32Load(MemArg),
    I64Load(MemArg),
    F32Load(MemArg),
    F64Load(MemArg),
    I32Load8S(MemArg),
    I32Load8U(MemArg),
    I32Load16S(MemArg),
    I32Load16U(MemArg),
    I64Load8S(MemArg),
    I64Load8U(MemArg),
    I64Load16S(MemArg),
    I64Load16U(MemArg),
    I64Load32S(MemArg),
    I64Load32U(MemArg),

    // Memory stores.
    I32Store(MemArg),
    I64Store(MemArg),
    F32Store(MemArg),
    F64Store(MemArg),
    I32Store8(MemArg),
    I32Store16(MemArg),
    I64Store8(MemArg),
    I64Store16(MemArg),
    I64Store32(MemArg),

    MemorySize(u32),
    MemoryGrow(u32),

    // Constants.
    I32Const(i32),
    I64Const(i64),
    F32Const(Ieee32),
    F64Const(Ieee64),

    // i32 comparisons.
    I32Eqz,
    I32Eq,
    I32Ne,
    I32LtS,
    I32LtU,
    I32GtS,
    I32GtU,
    I32LeS,
    I32LeU,
    I32GeS,
    I32GeU,

    // i64 comparisons.
    I64Eqz,
    I64Eq,
    I64Ne,
    I64LtS,
    I64LtU,
    I64GtS,
    I64GtU,
    I64LeS,
    I64LeU,
    I64GeS,
    I64GeU,

    // f32 comparisons.
    F32Eq,
    F32Ne,
    F32Lt,
    F32Gt,
    F32Le,
    F32Ge,

    // f64 comparisons.
    F64Eq,
    F64Ne,
    F64Lt,
    F64Gt,
    F64Le,
    F64Ge,

    // i32 arithmetic and bitwise.
    I32Clz,
    I32Ctz,
    I32Popcnt,
    I32Add,
    I32Sub,
    I32Mul,
    I32DivS,
    I32DivU,
    I32RemS,
    I32RemU,
    I32And,
    I32Or,
    I32Xor,
    I32Shl,
    I32ShrS,
    I32ShrU,
    I32Rotl,
    I32Rotr,

    // i64 arithmetic and bitwise.
    I64Clz,
    I64Ctz,
    I64Popcnt,
    I64Add,
    I64Sub,
    I64Mul,
    I64DivS,
    I64DivU,
    I64RemS,
    I64RemU,
    I64And,
    I64Or,
    I64Xor,
    I64Shl,
    I64ShrS,
    I64ShrU,
    I64Rotl,
    I64Rotr,

    // f32 arithmetic.
    F32Abs,
    F32Neg,
    F32Ceil,
    F32Floor,
    F32Trunc,
    F32Nearest,
    F32Sqrt,
    F32Add,
    F32Sub,
    F32Mul,
    F32Div,
    F32Min,
    F32Max,
    F32Copysign,

    // f64 arithmetic.
    F64Abs,
    F64Neg,
    F64Ceil,
    F64Floor,
    F64Trunc,
    F64Nearest,
    F64Sqrt,
    F64Add,
    F64Sub,
    F64Mul,
    F64Div,
    F64Min,
    F64Max,
    F64Copysign,

    // Conversions.
    I32WrapI64,
    I32TruncF32S,
    I32TruncF32U,
    I32TruncF64S,
    I32TruncF64U,
    I64ExtendI32S,
    I64ExtendI32U,
    I64TruncF32S,
    I64TruncF32U,
    I64TruncF64S,
    I64TruncF64U,
    F32ConvertI32S,
    F32ConvertI32U,
    F32ConvertI64S,
    F32ConvertI64U,
    F32DemoteF64,
    F64ConvertI32S,
    F64ConvertI32U,
    F64ConvertI64S,
    F64ConvertI64U,
    F64PromoteF32,
    I32ReinterpretF32,
    I64ReinterpretF64,
    F32ReinterpretI32,
    F64ReinterpretI64,

    // Sign extension.
    I32Extend8S,
    I32Extend16S,
    I64Extend8S,
    I64Extend16S,
    I64Extend32S,

    // References.
    RefNull(RefType),
    RefIsNull,
    RefFunc(u32),

    // Saturating float-to-int truncation (0xFC prefix).
    I32TruncSatF32S,
    I32TruncSatF32U,
    I32TruncSatF64S,
    I32TruncSatF64U,
    I64TruncSatF32S,
    I64TruncSatF32U,
    I64TruncSatF64S,
    I64TruncSatF64U,

    // Bulk memory and table operations (0xFC prefix).
    MemoryInit { data: u32, memory: u32 },
    DataDrop(u32),
    MemoryCopy { dst: u32, src: u32 },
    MemoryFill(u32),
    TableInit { element: u32, table: u32 },
    ElemDrop(u32),
    TableCopy { dst: u32, src: u32 },
    TableGrow(u32),
    TableSize(u32),
    TableFill(u32),
}

/// A constant initializer expression.
///
/// Used for global initializers, element offsets and expression items, data
/// offsets, and table initializers. Structurally an ordinary expression; the
/// validator restricts it to constant instructions leaving exactly one value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ConstExpr {
    pub instructions: Vec<Instruction>,
}

impl ConstExpr {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        ConstExpr { instructions }
    }

    pub fn i32_const(value: i32) -> Self {
        ConstExpr::new(vec![Instruction::I32Const(value)])
    }

    pub fn i64_const(value: i64) -> Self {
        ConstExpr::new(vec![Instruction::I64Const(value)])
    }

    pub fn f32_const(value: f32) -> Self {
        ConstExpr::new(vec![Instruction::F32Const(value.into())])
    }

    pub fn f64_const(value: f64) -> Self {
        ConstExpr::new(vec![Instruction::F64Const(value.into())])
    }

    pub fn ref_null(ty: RefType) -> Self {
        ConstExpr::new(vec![Instruction::RefNull(ty)])
    }

    pub fn ref_func(index: u32) -> Self {
        ConstExpr::new(vec![Instruction::RefFunc(index)])
    }

    pub fn global_get(index: u32) -> Self {
        ConstExpr::new(vec![Instruction::GlobalGet(index)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ieee_bits_preserve_nan_payload() {
        let weird_nan = Ieee32::from_bits(0x7fc0_1234);
        assert!(weird_nan.value().is_nan());
        assert_eq!(Ieee32::from(weird_nan.value()).bits(), 0x7fc0_1234);

        let weird_nan64 = Ieee64::from_bits(0x7ff8_0000_dead_beef);
        assert!(weird_nan64.value().is_nan());
        assert_eq!(Ieee64::from(weird_nan64.value()).bits(), 0x7ff8_0000_dead_beef);
    }

    #[test]
    fn test_const_expr_helpers() {
        assert_eq!(
            ConstExpr::i32_const(7).instructions,
            vec![Instruction::I32Const(7)]
        );
        assert_eq!(
            ConstExpr::ref_null(RefType::Func).instructions,
            vec![Instruction::RefNull(RefType::Func)]
        );
    }
}
