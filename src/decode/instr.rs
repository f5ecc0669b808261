//! Instruction and expression decoding.
//!
//! Expressions are decoded iteratively with a depth counter rather than by
//! recursing into nested blocks, so pathological nesting depth cannot blow
//! the decoder's own stack. The `end` that closes the outermost scope is
//! consumed but not stored; nested `end` and `else` opcodes become explicit
//! [`Instruction::End`] and [`Instruction::Else`] entries.

use crate::decode::error::DecodeError;
use crate::decode::reader::Reader;
use crate::features::Features;
use crate::module::{
    BlockType, ConstExpr, Ieee32, Ieee64, Instruction, MemArg, RefType, ValueType,
};

/// Reads instructions up to and including the `end` that closes the
/// outermost scope.
pub(crate) fn read_expression(
    r: &mut Reader<'_>,
    features: Features,
) -> Result<Vec<Instruction>, DecodeError> {
    let mut instructions = Vec::new();
    let mut depth = 1u32;
    loop {
        if r.is_empty() {
            return Err(DecodeError::MissingEndOfBlock { offset: r.offset() });
        }
        let instr = read_instruction(r, features)?;
        match instr {
            Instruction::End => {
                depth -= 1;
                if depth == 0 {
                    return Ok(instructions);
                }
            }
            Instruction::Block(_) | Instruction::Loop(_) | Instruction::If(_) => {
                depth += 1;
            }
            _ => {}
        }
        instructions.push(instr);
    }
}

pub(crate) fn read_const_expr(
    r: &mut Reader<'_>,
    features: Features,
) -> Result<ConstExpr, DecodeError> {
    Ok(ConstExpr::new(read_expression(r, features)?))
}

fn read_block_type(r: &mut Reader<'_>) -> Result<BlockType, DecodeError> {
    let byte = r.peek_byte()?;
    if byte == 0x40 {
        r.read_byte()?;
        return Ok(BlockType::Empty);
    }
    if let Some(ty) = ValueType::from_byte(byte) {
        r.read_byte()?;
        return Ok(BlockType::Value(ty));
    }
    let offset = r.offset();
    let index = r.read_var_s33()?;
    u32::try_from(index)
        .map(BlockType::Func)
        .map_err(|_| DecodeError::InvalidValueType { byte, offset })
}

fn read_mem_arg(r: &mut Reader<'_>) -> Result<MemArg, DecodeError> {
    let align = r.read_var_u32()?;
    let offset = r.read_var_u32()?;
    Ok(MemArg { align, offset })
}

fn read_ref_type(r: &mut Reader<'_>) -> Result<RefType, DecodeError> {
    let offset = r.offset();
    let byte = r.read_byte()?;
    RefType::from_byte(byte).ok_or(DecodeError::InvalidValueType { byte, offset })
}

fn gate(
    enabled: bool,
    opcode: &'static str,
    feature: &'static str,
    offset: usize,
) -> Result<(), DecodeError> {
    if enabled {
        Ok(())
    } else {
        Err(DecodeError::DisabledCapability {
            opcode,
            feature,
            offset,
        })
    }
}

/// Reads one instruction, immediates included.
fn read_instruction(
    r: &mut Reader<'_>,
    features: Features,
) -> Result<Instruction, DecodeError> {
    let offset = r.offset();
    let opcode = r.read_byte()?;
    let instr = match opcode {
        0x00 => Instruction::Unreachable,
        0x01 => Instruction::Nop,
        0x02 => Instruction::Block(read_block_type(r)?),
        0x03 => Instruction::Loop(read_block_type(r)?),
        0x04 => Instruction::If(read_block_type(r)?),
        0x05 => Instruction::Else,
        0x0B => Instruction::End,
        0x0C => Instruction::Br(r.read_var_u32()?),
        0x0D => Instruction::BrIf(r.read_var_u32()?),
        0x0E => {
            let count = r.read_var_u32()?;
            let mut targets = Vec::with_capacity(count.min(1024) as usize);
            for _ in 0..count {
                targets.push(r.read_var_u32()?);
            }
            let default = r.read_var_u32()?;
            Instruction::BrTable { targets, default }
        }
        0x0F => Instruction::Return,
        0x10 => Instruction::Call(r.read_var_u32()?),
        0x11 => {
            let type_index = r.read_var_u32()?;
            let table = r.read_var_u32()?;
            Instruction::CallIndirect { type_index, table }
        }

        0x1A => Instruction::Drop,
        0x1B => Instruction::Select,
        0x1C => {
            gate(features.reference_types, "select", "reference-types", offset)?;
            let count = r.read_var_u32()?;
            let mut types = Vec::with_capacity(count.min(1024) as usize);
            for _ in 0..count {
                types.push(r.read_value_type()?);
            }
            Instruction::TypedSelect(types)
        }

        0x20 => Instruction::LocalGet(r.read_var_u32()?),
        0x21 => Instruction::LocalSet(r.read_var_u32()?),
        0x22 => Instruction::LocalTee(r.read_var_u32()?),
        0x23 => Instruction::GlobalGet(r.read_var_u32()?),
        0x24 => Instruction::GlobalSet(r.read_var_u32()?),

        0x25 => {
            gate(features.reference_types, "table.get", "reference-types", offset)?;
            Instruction::TableGet(r.read_var_u32()?)
        }
        0x26 => {
            gate(features.reference_types, "table.set", "reference-types", offset)?;
            Instruction::TableSet(r.read_var_u32()?)
        }

        0x28 => Instruction::I32Load(read_mem_arg(r)?),
        0x29 => Instruction::I64Load(read_mem_arg(r)?),
        0x2A => Instruction::F32Load(read_mem_arg(r)?),
        0x2B => Instruction::F64Load(read_mem_arg(r)?),
        0x2C => Instruction::I32Load8S(read_mem_arg(r)?),
        0x2D => Instruction::I32Load8U(read_mem_arg(r)?),
        0x2E => Instruction::I32Load16S(read_mem_arg(r)?),
        0x2F => Instruction::I32Load16U(read_mem_arg(r)?),
        0x30 => Instruction::I64Load8S(read_mem_arg(r)?),
        0x31 => Instruction::I64Load8U(read_mem_arg(r)?),
        0x32 => Instruction::I64Load16S(read_mem_arg(r)?),
        0x33 => Instruction::I64Load16U(read_mem_arg(r)?),
        0x34 => Instruction::I64Load32S(read_mem_arg(r)?),
        0x35 => Instruction::I64Load32U(read_mem_arg(r)?),

        0x36 => Instruction::I32Store(read_mem_arg(r)?),
        0x37 => Instruction::I64Store(read_mem_arg(r)?),
        0x38 => Instruction::F32Store(read_mem_arg(r)?),
        0x39 => Instruction::F64Store(read_mem_arg(r)?),
        0x3A => Instruction::I32Store8(read_mem_arg(r)?),
        0x3B => Instruction::I32Store16(read_mem_arg(r)?),
        0x3C => Instruction::I64Store8(read_mem_arg(r)?),
        0x3D => Instruction::I64Store16(read_mem_arg(r)?),
        0x3E => Instruction::I64Store32(read_mem_arg(r)?),

        0x3F => Instruction::MemorySize(r.read_var_u32()?),
        0x40 => Instruction::MemoryGrow(r.read_var_u32()?),

        0x41 => Instruction::I32Const(r.read_var_s32()?),
        0x42 => Instruction::I64Const(r.read_var_s64()?),
        0x43 => Instruction::F32Const(Ieee32::from_bits(r.read_u32_le()?)),
        0x44 => Instruction::F64Const(Ieee64::from_bits(r.read_u64_le()?)),

        0x45 => Instruction::I32Eqz,
        0x46 => Instruction::I32Eq,
        0x47 => Instruction::I32Ne,
        0x48 => Instruction::I32LtS,
        0x49 => Instruction::I32LtU,
        0x4A => Instruction::I32GtS,
        0x4B => Instruction::I32GtU,
        0x4C => Instruction::I32LeS,
        0x4D => Instruction::I32LeU,
        0x4E => Instruction::I32GeS,
        0x4F => Instruction::I32GeU,

        0x50 => Instruction::I64Eqz,
        0x51 => Instruction::I64Eq,
        0x52 => Instruction::I64Ne,
        0x53 => Instruction::I64LtS,
        0x54 => Instruction::I64LtU,
        0x55 => Instruction::I64GtS,
        0x56 => Instruction::I64GtU,
        0x57 => Instruction::I64LeS,
        0x58 => Instruction::I64LeU,
        0x59 => Instruction::I64GeS,
        0x5A => Instruction::I64GeU,

        0x5B => Instruction::F32Eq,
        0x5C => Instruction::F32Ne,
        0x5D => Instruction::F32Lt,
        0x5E => Instruction::F32Gt,
        0x5F => Instruction::F32Le,
        0x60 => Instruction::F32Ge,

        0x61 => Instruction::F64Eq,
        0x62 => Instruction::F64Ne,
        0x63 => Instruction::F64Lt,
        0x64 => Instruction::F64Gt,
        0x65 => Instruction::F64Le,
        0x66 => Instruction::F64Ge,

        0x67 => Instruction::I32Clz,
        0x68 => Instruction::I32Ctz,
        0x69 => Instruction::I32Popcnt,
        0x6A => Instruction::I32Add,
        0x6B => Instruction::I32Sub,
        0x6C => Instruction::I32Mul,
        0x6D => Instruction::I32DivS,
        0x6E => Instruction::I32DivU,
        0x6F => Instruction::I32RemS,
        0x70 => Instruction::I32RemU,
        0x71 => Instruction::I32And,
        0x72 => Instruction::I32Or,
        0x73 => Instruction::I32Xor,
        0x74 => Instruction::I32Shl,
        0x75 => Instruction::I32ShrS,
        0x76 => Instruction::I32ShrU,
        0x77 => Instruction::I32Rotl,
        0x78 => Instruction::I32Rotr,

        0x79 => Instruction::I64Clz,
        0x7A => Instruction::I64Ctz,
        0x7B => Instruction::I64Popcnt,
        0x7C => Instruction::I64Add,
        0x7D => Instruction::I64Sub,
        0x7E => Instruction::I64Mul,
        0x7F => Instruction::I64DivS,
        0x80 => Instruction::I64DivU,
        0x81 => Instruction::I64RemS,
        0x82 => Instruction::I64RemU,
        0x83 => Instruction::I64And,
        0x84 => Instruction::I64Or,
        0x85 => Instruction::I64Xor,
        0x86 => Instruction::I64Shl,
        0x87 => Instruction::I64ShrS,
        0x88 => Instruction::I64ShrU,
        0x89 => Instruction::I64Rotl,
        0x8A => Instruction::I64Rotr,

        0x8B => Instruction::F32Abs,
        0x8C => Instruction::F32Neg,
        0x8D => Instruction::F32Ceil,
        0x8E => Instruction::F32Floor,
        0x8F => Instruction::F32Trunc,
        0x90 => Instruction::F32Nearest,
        0x91 => Instruction::F32Sqrt,
        0x92 => Instruction::F32Add,
        0x93 => Instruction::F32Sub,
        0x94 => Instruction::F32Mul,
        0x95 => Instruction::F32Div,
        0x96 => Instruction::F32Min,
        0x97 => Instruction::F32Max,
        0x98 => Instruction::F32Copysign,

        0x99 => Instruction::F64Abs,
        0x9A => Instruction::F64Neg,
        0x9B => Instruction::F64Ceil,
        0x9C => Instruction::F64Floor,
        0x9D => Instruction::F64Trunc,
        0x9E => Instruction::F64Nearest,
        0x9F => Instruction::F64Sqrt,
        0xA0 => Instruction::F64Add,
        0xA1 => Instruction::F64Sub,
        0xA2 => Instruction::F64Mul,
        0xA3 => Instruction::F64Div,
        0xA4 => Instruction::F64Min,
        0xA5 => Instruction::F64Max,
        0xA6 => Instruction::F64Copysign,

        0xA7 => Instruction::I32WrapI64,
        0xA8 => Instruction::I32TruncF32S,
        0xA9 => Instruction::I32TruncF32U,
        0xAA => Instruction::I32TruncF64S,
        0xAB => Instruction::I32TruncF64U,
        0xAC => Instruction::I64ExtendI32S,
        0xAD => Instruction::I64ExtendI32U,
        0xAE => Instruction::I64TruncF32S,
        0xAF => Instruction::I64TruncF32U,
        0xB0 => Instruction::I64TruncF64S,
        0xB1 => Instruction::I64TruncF64U,
        0xB2 => Instruction::F32ConvertI32S,
        0xB3 => Instruction::F32ConvertI32U,
        0xB4 => Instruction::F32ConvertI64S,
        0xB5 => Instruction::F32ConvertI64U,
        0xB6 => Instruction::F32DemoteF64,
        0xB7 => Instruction::F64ConvertI32S,
        0xB8 => Instruction::F64ConvertI32U,
        0xB9 => Instruction::F64ConvertI64S,
        0xBA => Instruction::F64ConvertI64U,
        0xBB => Instruction::F64PromoteF32,
        0xBC => Instruction::I32ReinterpretF32,
        0xBD => Instruction::I64ReinterpretF64,
        0xBE => Instruction::F32ReinterpretI32,
        0xBF => Instruction::F64ReinterpretI64,

        0xC0 => Instruction::I32Extend8S,
        0xC1 => Instruction::I32Extend16S,
        0xC2 => Instruction::I64Extend8S,
        0xC3 => Instruction::I64Extend16S,
        0xC4 => Instruction::I64Extend32S,

        0xD0 => {
            gate(features.reference_types, "ref.null", "reference-types", offset)?;
            Instruction::RefNull(read_ref_type(r)?)
        }
        0xD1 => {
            gate(features.reference_types, "ref.is_null", "reference-types", offset)?;
            Instruction::RefIsNull
        }
        0xD2 => {
            gate(features.reference_types, "ref.func", "reference-types", offset)?;
            Instruction::RefFunc(r.read_var_u32()?)
        }

        0xFC => read_prefixed_instruction(r, features, offset)?,

        _ => return Err(DecodeError::UnknownOpcode { opcode, offset }),
    };
    Ok(instr)
}

/// The `0xFC` family: saturating truncations and bulk memory/table ops.
fn read_prefixed_instruction(
    r: &mut Reader<'_>,
    features: Features,
    offset: usize,
) -> Result<Instruction, DecodeError> {
    let sub = r.read_var_u32()?;
    if (0..=7).contains(&sub) {
        gate(
            features.saturating_float_to_int,
            "trunc_sat",
            "saturating-float-to-int",
            offset,
        )?;
    }
    let instr = match sub {
        0 => Instruction::I32TruncSatF32S,
        1 => Instruction::I32TruncSatF32U,
        2 => Instruction::I32TruncSatF64S,
        3 => Instruction::I32TruncSatF64U,
        4 => Instruction::I64TruncSatF32S,
        5 => Instruction::I64TruncSatF32U,
        6 => Instruction::I64TruncSatF64S,
        7 => Instruction::I64TruncSatF64U,
        8 => {
            gate(features.bulk_memory, "memory.init", "bulk-memory", offset)?;
            let data = r.read_var_u32()?;
            let memory = r.read_var_u32()?;
            Instruction::MemoryInit { data, memory }
        }
        9 => {
            gate(features.bulk_memory, "data.drop", "bulk-memory", offset)?;
            Instruction::DataDrop(r.read_var_u32()?)
        }
        10 => {
            gate(features.bulk_memory, "memory.copy", "bulk-memory", offset)?;
            let dst = r.read_var_u32()?;
            let src = r.read_var_u32()?;
            Instruction::MemoryCopy { dst, src }
        }
        11 => {
            gate(features.bulk_memory, "memory.fill", "bulk-memory", offset)?;
            Instruction::MemoryFill(r.read_var_u32()?)
        }
        12 => {
            gate(features.bulk_memory, "table.init", "bulk-memory", offset)?;
            let element = r.read_var_u32()?;
            let table = r.read_var_u32()?;
            Instruction::TableInit { element, table }
        }
        13 => {
            gate(features.bulk_memory, "elem.drop", "bulk-memory", offset)?;
            Instruction::ElemDrop(r.read_var_u32()?)
        }
        14 => {
            gate(features.bulk_memory, "table.copy", "bulk-memory", offset)?;
            let dst = r.read_var_u32()?;
            let src = r.read_var_u32()?;
            Instruction::TableCopy { dst, src }
        }
        15 => {
            gate(features.reference_types, "table.grow", "reference-types", offset)?;
            Instruction::TableGrow(r.read_var_u32()?)
        }
        16 => {
            gate(features.reference_types, "table.size", "reference-types", offset)?;
            Instruction::TableSize(r.read_var_u32()?)
        }
        17 => {
            gate(features.reference_types, "table.fill", "reference-types", offset)?;
            Instruction::TableFill(r.read_var_u32()?)
        }
        _ => {
            return Err(DecodeError::UnknownPrefixedOpcode {
                prefix: 0xFC,
                sub,
                offset,
            })
        }
    };
    Ok(instr)
}
