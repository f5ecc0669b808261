//! Instruction and expression encoding.

use crate::encode::error::EncodeError;
use crate::leb128;
use crate::module::{BlockType, ConstExpr, Instruction, MemArg, RefType};

pub(crate) fn write_var_u32(out: &mut Vec<u8>, value: u32) {
    leb128::write_unsigned(out, u64::from(value));
}

fn write_var_s32(out: &mut Vec<u8>, value: i32) {
    leb128::write_signed(out, i64::from(value));
}

fn write_var_s64(out: &mut Vec<u8>, value: i64) {
    leb128::write_signed(out, value);
}

pub(crate) fn write_ref_type(out: &mut Vec<u8>, ty: RefType) {
    out.push(ty.byte());
}

/// Checked conversion of an in-memory count to the 32-bit wire count.
pub(crate) fn item_count(what: &'static str, len: usize) -> Result<u32, EncodeError> {
    u32::try_from(len).map_err(|_| EncodeError::TooManyItems { what, count: len })
}

fn write_block_type(out: &mut Vec<u8>, bt: BlockType) {
    match bt {
        BlockType::Empty => out.push(0x40),
        BlockType::Value(ty) => out.push(ty.byte()),
        // A type index is a non-negative s33; its LEB bytes never collide
        // with the single-byte type forms above.
        BlockType::Func(index) => leb128::write_signed(out, i64::from(index)),
    }
}

fn write_mem_arg(out: &mut Vec<u8>, memarg: &MemArg) {
    write_var_u32(out, memarg.align);
    write_var_u32(out, memarg.offset);
}

fn write_prefixed(out: &mut Vec<u8>, sub: u32) {
    out.push(0xFC);
    write_var_u32(out, sub);
}

/// Writes an instruction sequence followed by the `end` that closes the
/// outermost scope, the exact inverse of expression decoding.
pub(crate) fn write_expression(
    out: &mut Vec<u8>,
    instructions: &[Instruction],
) -> Result<(), EncodeError> {
    for instr in instructions {
        write_instruction(out, instr)?;
    }
    out.push(0x0B);
    Ok(())
}

pub(crate) fn write_const_expr(out: &mut Vec<u8>, expr: &ConstExpr) -> Result<(), EncodeError> {
    write_expression(out, &expr.instructions)
}

fn write_instruction(out: &mut Vec<u8>, instr: &Instruction) -> Result<(), EncodeError> {
    match instr {
        Instruction::Unreachable => out.push(0x00),
        Instruction::Nop => out.push(0x01),
        Instruction::Block(bt) => {
            out.push(0x02);
            write_block_type(out, *bt);
        }
        Instruction::Loop(bt) => {
            out.push(0x03);
            write_block_type(out, *bt);
        }
        Instruction::If(bt) => {
            out.push(0x04);
            write_block_type(out, *bt);
        }
        Instruction::Else => out.push(0x05),
        Instruction::End => out.push(0x0B),
        Instruction::Br(depth) => {
            out.push(0x0C);
            write_var_u32(out, *depth);
        }
        Instruction::BrIf(depth) => {
            out.push(0x0D);
            write_var_u32(out, *depth);
        }
        Instruction::BrTable { targets, default } => {
            out.push(0x0E);
            write_var_u32(out, item_count("branch targets", targets.len())?);
            for target in targets {
                write_var_u32(out, *target);
            }
            write_var_u32(out, *default);
        }
        Instruction::Return => out.push(0x0F),
        Instruction::Call(index) => {
            out.push(0x10);
            write_var_u32(out, *index);
        }
        Instruction::CallIndirect { type_index, table } => {
            out.push(0x11);
            write_var_u32(out, *type_index);
            write_var_u32(out, *table);
        }

        Instruction::Drop => out.push(0x1A),
        Instruction::Select => out.push(0x1B),
        Instruction::TypedSelect(types) => {
            out.push(0x1C);
            write_var_u32(out, item_count("select types", types.len())?);
            for ty in types {
                out.push(ty.byte());
            }
        }

        Instruction::LocalGet(index) => {
            out.push(0x20);
            write_var_u32(out, *index);
        }
        Instruction::LocalSet(index) => {
            out.push(0x21);
            write_var_u32(out, *index);
        }
        Instruction::LocalTee(index) => {
            out.push(0x22);
            write_var_u32(out, *index);
        }
        Instruction::GlobalGet(index) => {
            out.push(0x23);
            write_var_u32(out, *index);
        }
        Instruction::GlobalSet(index) => {
            out.push(0x24);
            write_var_u32(out, *index);
        }
        Instruction::TableGet(index) => {
            out.push(0x25);
            write_var_u32(out, *index);
        }
        Instruction::TableSet(index) => {
            out.push(0x26);
            write_var_u32(out, *index);
        }

        Instruction::I32Load(m) => {
            out.push(0x28);
            write_mem_arg(out, m);
        }
        Instruction::I64Load(m) => {
            out.push(0x29);
            write_mem_arg(out, m);
        }
        Instruction::F32Load(m) => {
            out.push(0x2A);
            write_mem_arg(out, m);
        }
        Instruction::F64Load(m) => {
            out.push(0x2B);
            write_mem_arg(out, m);
        }
        Instruction::I32Load8S(m) => {
            out.push(0x2C);
            write_mem_arg(out, m);
        }
        Instruction::I32Load8U(m) => {
            out.push(0x2D);
            write_mem_arg(out, m);
        }
        Instruction::I32Load16S(m) => {
            out.push(0x2E);
            write_mem_arg(out, m);
        }
        Instruction::I32Load16U(m) => {
            out.push(0x2F);
            write_mem_arg(out, m);
        }
        Instruction::I64Load8S(m) => {
            out.push(0x30);
            write_mem_arg(out, m);
        }
        Instruction::I64Load8U(m) => {
            out.push(0x31);
            write_mem_arg(out, m);
        }
        Instruction::I64Load16S(m) => {
            out.push(0x32);
            write_mem_arg(out, m);
        }
        Instruction::I64Load16U(m) => {
            out.push(0x33);
            write_mem_arg(out, m);
        }
        Instruction::I64Load32S(m) => {
            out.push(0x34);
            write_mem_arg(out, m);
        }
        Instruction::I64Load32U(m) => {
            out.push(0x35);
            write_mem_arg(out, m);
        }

        Instruction::I32Store(m) => {
            out.push(0x36);
            write_mem_arg(out, m);
        }
        Instruction::I64Store(m) => {
            out.push(0x37);
            write_mem_arg(out, m);
        }
        Instruction::F32Store(m) => {
            out.push(0x38);
            write_mem_arg(out, m);
        }
        Instruction::F64Store(m) => {
            out.push(0x39);
            write_mem_arg(out, m);
        }
        Instruction::I32Store8(m) => {
            out.push(0x3A);
            write_mem_arg(out, m);
        }
        Instruction::I32Store16(m) => {
            out.push(0x3B);
            write_mem_arg(out, m);
        }
        Instruction::I64Store8(m) => {
            out.push(0x3C);
            write_mem_arg(out, m);
        }
        Instruction::I64Store16(m) => {
            out.push(0x3D);
            write_mem_arg(out, m);
        }
        Instruction::I64Store32(m) => {
            out.push(0x3E);
            write_mem_arg(out, m);
        }

        Instruction::MemorySize(index) => {
            out.push(0x3F);
            write_var_u32(out, *index);
        }
        Instruction::MemoryGrow(index) => {
            out.push(0x40);
            write_var_u32(out, *index);
        }

        Instruction::I32Const(value) => {
            out.push(0x41);
            write_var_s32(out, *value);
        }
        Instruction::I64Const(value) => {
            out.push(0x42);
            write_var_s64(out, *value);
        }
        Instruction::F32Const(value) => {
            out.push(0x43);
            out.extend_from_slice(&value.bits().to_le_bytes());
        }
        Instruction::F64Const(value) => {
            out.push(0x44);
            out.extend_from_slice(&value.bits().to_le_bytes());
        }

        Instruction::I32Eqz => out.push(0x45),
        Instruction::I32Eq => out.push(0x46),
        Instruction::I32Ne => out.push(0x47),
        Instruction::I32LtS => out.push(0x48),
        Instruction::I32LtU => out.push(0x49),
        Instruction::I32GtS => out.push(0x4A),
        Instruction::I32GtU => out.push(0x4B),
        Instruction::I32LeS => out.push(0x4C),
        Instruction::I32LeU => out.push(0x4D),
        Instruction::I32GeS => out.push(0x4E),
        Instruction::I32GeU => out.push(0x4F),

        Instruction::I64Eqz => out.push(0x50),
        Instruction::I64Eq => out.push(0x51),
        Instruction::I64Ne => out.push(0x52),
        Instruction::I64LtS => out.push(0x53),
        Instruction::I64LtU => out.push(0x54),
        Instruction::I64GtS => out.push(0x55),
        Instruction::I64GtU => out.push(0x56),
        Instruction::I64LeS => out.push(0x57),
        Instruction::I64LeU => out.push(0x58),
        Instruction::I64GeS => out.push(0x59),
        Instruction::I64GeU => out.push(0x5A),

        Instruction::F32Eq => out.push(0x5B),
        Instruction::F32Ne => out.push(0x5C),
        Instruction::F32Lt => out.push(0x5D),
        Instruction::F32Gt => out.push(0x5E),
        Instruction::F32Le => out.push(0x5F),
        Instruction::F32Ge => out.push(0x60),

        Instruction::F64Eq => out.push(0x61),
        Instruction::F64Ne => out.push(0x62),
        Instruction::F64Lt => out.push(0x63),
        Instruction::F64Gt => out.push(0x64),
        Instruction::F64Le => out.push(0x65),
        Instruction::F64Ge => out.push(0x66),

        Instruction::I32Clz => out.push(0x67),
        Instruction::I32Ctz => out.push(0x68),
        Instruction::I32Popcnt => out.push(0x69),
        Instruction::I32Add => out.push(0x6A),
        Instruction::I32Sub => out.push(0x6B),
        Instruction::I32Mul => out.push(0x6C),
        Instruction::I32DivS => out.push(0x6D),
        Instruction::I32DivU => out.push(0x6E),
        Instruction::I32RemS => out.push(0x6F),
        Instruction::I32RemU => out.push(0x70),
        Instruction::I32And => out.push(0x71),
        Instruction::I32Or => out.push(0x72),
        Instruction::I32Xor => out.push(0x73),
        Instruction::I32Shl => out.push(0x74),
        Instruction::I32ShrS => out.push(0x75),
        Instruction::I32ShrU => out.push(0x76),
        Instruction::I32Rotl => out.push(0x77),
        Instruction::I32Rotr => out.push(0x78),

        Instruction::I64Clz => out.push(0x79),
        Instruction::I64Ctz => out.push(0x7A),
        Instruction::I64Popcnt => out.push(0x7B),
        Instruction::I64Add => out.push(0x7C),
        Instruction::I64Sub => out.push(0x7D),
        Instruction::I64Mul => out.push(0x7E),
        Instruction::I64DivS => out.push(0x7F),
        Instruction::I64DivU => out.push(0x80),
        Instruction::I64RemS => out.push(0x81),
        Instruction::I64RemU => out.push(0x82),
        Instruction::I64And => out.push(0x83),
        Instruction::I64Or => out.push(0x84),
        Instruction::I64Xor => out.push(0x85),
        Instruction::I64Shl => out.push(0x86),
        Instruction::I64ShrS => out.push(0x87),
        Instruction::I64ShrU => out.push(0x88),
        Instruction::I64Rotl => out.push(0x89),
        Instruction::I64Rotr => out.push(0x8A),

        Instruction::F32Abs => out.push(0x8B),
        Instruction::F32Neg => out.push(0x8C),
        Instruction::F32Ceil => out.push(0x8D),
        Instruction::F32Floor => out.push(0x8E),
        Instruction::F32Trunc => out.push(0x8F),
        Instruction::F32Nearest => out.push(0x90),
        Instruction::F32Sqrt => out.push(0x91),
        Instruction::F32Add => out.push(0x92),
        Instruction::F32Sub => out.push(0x93),
        Instruction::F32Mul => out.push(0x94),
        Instruction::F32Div => out.push(0x95),
        Instruction::F32Min => out.push(0x96),
        Instruction::F32Max => out.push(0x97),
        Instruction::F32Copysign => out.push(0x98),

        Instruction::F64Abs => out.push(0x99),
        Instruction::F64Neg => out.push(0x9A),
        Instruction::F64Ceil => out.push(0x9B),
        Instruction::F64Floor => out.push(0x9C),
        Instruction::F64Trunc => out.push(0x9D),
        Instruction::F64Nearest => out.push(0x9E),
        Instruction::F64Sqrt => out.push(0x9F),
        Instruction::F64Add => out.push(0xA0),
        Instruction::F64Sub => out.push(0xA1),
        Instruction::F64Mul => out.push(0xA2),
        Instruction::F64Div => out.push(0xA3),
        Instruction::F64Min => out.push(0xA4),
        Instruction::F64Max => out.push(0xA5),
        Instruction::F64Copysign => out.push(0xA6),

        Instruction::I32WrapI64 => out.push(0xA7),
        Instruction::I32TruncF32S => out.push(0xA8),
        Instruction::I32TruncF32U => out.push(0xA9),
        Instruction::I32TruncF64S => out.push(0xAA),
        Instruction::I32TruncF64U => out.push(0xAB),
        Instruction::I64ExtendI32S => out.push(0xAC),
        Instruction::I64ExtendI32U => out.push(0xAD),
        Instruction::I64TruncF32S => out.push(0xAE),
        Instruction::I64TruncF32U => out.push(0xAF),
        Instruction::I64TruncF64S => out.push(0xB0),
        Instruction::I64TruncF64U => out.push(0xB1),
        Instruction::F32ConvertI32S => out.push(0xB2),
        Instruction::F32ConvertI32U => out.push(0xB3),
        Instruction::F32ConvertI64S => out.push(0xB4),
        Instruction::F32ConvertI64U => out.push(0xB5),
        Instruction::F32DemoteF64 => out.push(0xB6),
        Instruction::F64ConvertI32S => out.push(0xB7),
        Instruction::F64ConvertI32U => out.push(0xB8),
        Instruction::F64ConvertI64S => out.push(0xB9),
        Instruction::F64ConvertI64U => out.push(0xBA),
        Instruction::F64PromoteF32 => out.push(0xBB),
        Instruction::I32ReinterpretF32 => out.push(0xBC),
        Instruction::I64ReinterpretF64 => out.push(0xBD),
        Instruction::F32ReinterpretI32 => out.push(0xBE),
        Instruction::F64ReinterpretI64 => out.push(0xBF),

        Instruction::I32Extend8S => out.push(0xC0),
        Instruction::I32Extend16S => out.push(0xC1),
        Instruction::I64Extend8S => out.push(0xC2),
        Instruction::I64Extend16S => out.push(0xC3),
        Instruction::I64Extend32S => out.push(0xC4),

        Instruction::RefNull(ty) => {
            out.push(0xD0);
            write_ref_type(out, *ty);
        }
        Instruction::RefIsNull => out.push(0xD1),
        Instruction::RefFunc(index) => {
            out.push(0xD2);
            write_var_u32(out, *index);
        }

        Instruction::I32TruncSatF32S => write_prefixed(out, 0),
        Instruction::I32TruncSatF32U => write_prefixed(out, 1),
        Instruction::I32TruncSatF64S => write_prefixed(out, 2),
        Instruction::I32TruncSatF64U => write_prefixed(out, 3),
        Instruction::I64TruncSatF32S => write_prefixed(out, 4),
        Instruction::I64TruncSatF32U => write_prefixed(out, 5),
        Instruction::I64TruncSatF64S => write_prefixed(out, 6),
        Instruction::I64TruncSatF64U => write_prefixed(out, 7),
        Instruction::MemoryInit { data, memory } => {
            write_prefixed(out, 8);
            write_var_u32(out, *data);
            write_var_u32(out, *memory);
        }
        Instruction::DataDrop(index) => {
            write_prefixed(out, 9);
            write_var_u32(out, *index);
        }
        Instruction::MemoryCopy { dst, src } => {
            write_prefixed(out, 10);
            write_var_u32(out, *dst);
            write_var_u32(out, *src);
        }
        Instruction::MemoryFill(index) => {
            write_prefixed(out, 11);
            write_var_u32(out, *index);
        }
        Instruction::TableInit { element, table } => {
            write_prefixed(out, 12);
            write_var_u32(out, *element);
            write_var_u32(out, *table);
        }
        Instruction::ElemDrop(index) => {
            write_prefixed(out, 13);
            write_var_u32(out, *index);
        }
        Instruction::TableCopy { dst, src } => {
            write_prefixed(out, 14);
            write_var_u32(out, *dst);
            write_var_u32(out, *src);
        }
        Instruction::TableGrow(index) => {
            write_prefixed(out, 15);
            write_var_u32(out, *index);
        }
        Instruction::TableSize(index) => {
            write_prefixed(out, 16);
            write_var_u32(out, *index);
        }
        Instruction::TableFill(index) => {
            write_prefixed(out, 17);
            write_var_u32(out, *index);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{Ieee32, ValueType};

    fn bytes_of(instructions: &[Instruction]) -> Vec<u8> {
        let mut out = Vec::new();
        write_expression(&mut out, instructions).unwrap();
        out
    }

    #[test]
    fn test_empty_expression_is_single_end() {
        assert_eq!(bytes_of(&[]), vec![0x0B]);
    }

    #[test]
    fn test_nested_block_bytes() {
        let bytes = bytes_of(&[
            Instruction::Block(BlockType::Empty),
            Instruction::Nop,
            Instruction::End,
        ]);
        assert_eq!(bytes, vec![0x02, 0x40, 0x01, 0x0B, 0x0B]);
    }

    #[test]
    fn test_block_type_index_as_s33() {
        let bytes = bytes_of(&[Instruction::Block(BlockType::Func(3)), Instruction::End]);
        assert_eq!(bytes, vec![0x02, 0x03, 0x0B, 0x0B]);
        // An index whose low six bits spill into a second LEB byte.
        let bytes = bytes_of(&[Instruction::Block(BlockType::Func(64)), Instruction::End]);
        assert_eq!(bytes, vec![0x02, 0xC0, 0x00, 0x0B, 0x0B]);
    }

    #[test]
    fn test_br_table_bytes() {
        let bytes = bytes_of(&[Instruction::BrTable {
            targets: vec![0, 1],
            default: 2,
        }]);
        assert_eq!(bytes, vec![0x0E, 0x02, 0x00, 0x01, 0x02, 0x0B]);
    }

    #[test]
    fn test_memarg_align_then_offset() {
        let bytes = bytes_of(&[Instruction::I32Load(MemArg { align: 2, offset: 16 })]);
        assert_eq!(bytes, vec![0x28, 0x02, 0x10, 0x0B]);
    }

    #[test]
    fn test_f32_const_bit_pattern() {
        let bytes = bytes_of(&[Instruction::F32Const(Ieee32::from_bits(0x7FC0_0001))]);
        let mut expected = vec![0x43];
        expected.extend_from_slice(&0x7FC0_0001u32.to_le_bytes());
        expected.push(0x0B);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_negative_const_is_sleb() {
        assert_eq!(bytes_of(&[Instruction::I32Const(-1)]), vec![0x41, 0x7F, 0x0B]);
    }

    #[test]
    fn test_prefixed_opcodes() {
        assert_eq!(bytes_of(&[Instruction::I32TruncSatF32S]), vec![0xFC, 0x00, 0x0B]);
        assert_eq!(
            bytes_of(&[Instruction::TableInit { element: 2, table: 1 }]),
            vec![0xFC, 0x0C, 0x02, 0x01, 0x0B]
        );
        assert_eq!(
            bytes_of(&[Instruction::MemoryCopy { dst: 0, src: 0 }]),
            vec![0xFC, 0x0A, 0x00, 0x00, 0x0B]
        );
    }

    #[test]
    fn test_typed_select() {
        let bytes = bytes_of(&[Instruction::TypedSelect(vec![ValueType::FuncRef])]);
        assert_eq!(bytes, vec![0x1C, 0x01, 0x70, 0x0B]);
    }

    #[test]
    fn test_expression_roundtrip() {
        use crate::decode;
        let original = vec![
            Instruction::Block(BlockType::Value(ValueType::I32)),
            Instruction::I32Const(-42),
            Instruction::If(BlockType::Func(64)),
            Instruction::I64Const(1),
            Instruction::Drop,
            Instruction::Else,
            Instruction::Nop,
            Instruction::End,
            Instruction::End,
            Instruction::MemoryInit { data: 3, memory: 0 },
            Instruction::RefFunc(7),
        ];
        let bytes = bytes_of(&original);
        let mut module_bytes = vec![0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];
        // One (,)->() type, one function, one code entry with no locals.
        module_bytes.extend_from_slice(&[0x01, 0x04, 0x01, 0x60, 0x00, 0x00]);
        module_bytes.extend_from_slice(&[0x03, 0x02, 0x01, 0x00]);
        let body_len = bytes.len() + 1;
        module_bytes.extend_from_slice(&[0x0A, (body_len + 2) as u8, 0x01, body_len as u8, 0x00]);
        module_bytes.extend_from_slice(&bytes);
        let module = decode::decode_module(&module_bytes, crate::Features::default()).unwrap();
        assert_eq!(module.functions[0].body, original);
    }
}
