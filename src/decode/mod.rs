//! Binary module decoding.
//!
//! Decoding is a single linear pass over the input. It checks structure:
//! framing, integer encodings, section ordering, declared sizes and counts.
//! Index bounds and typing are left to validation, so a structurally sound
//! module with dangling indices still decodes.

mod error;
mod instr;
mod reader;

pub use error::DecodeError;

use crate::features::Features;
use crate::logging::{debug, trace};
use crate::module::{
    CustomSection, Data, DataMode, Element, ElementItems, ElementMode, Export, ExportKind,
    Function, FunctionType, Global, GlobalType, Import, ImportDesc, Instruction, Limits,
    MemoryType, Module, RefType, Table, TableType, ValueType,
};
use instr::{read_const_expr, read_expression};
use reader::Reader;

pub(crate) const MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6D];
pub(crate) const VERSION: u32 = 1;

/// Standard section ids as they appear on the wire.
pub(crate) mod section_id {
    pub const CUSTOM: u8 = 0;
    pub const TYPE: u8 = 1;
    pub const IMPORT: u8 = 2;
    pub const FUNCTION: u8 = 3;
    pub const TABLE: u8 = 4;
    pub const MEMORY: u8 = 5;
    pub const GLOBAL: u8 = 6;
    pub const EXPORT: u8 = 7;
    pub const START: u8 = 8;
    pub const ELEMENT: u8 = 9;
    pub const CODE: u8 = 10;
    pub const DATA: u8 = 11;
    pub const DATA_COUNT: u8 = 12;
}

/// Canonical position of a standard section. The data-count section sits
/// between element and code, despite its numerically larger id.
fn section_rank(id: u8) -> Option<u8> {
    match id {
        section_id::TYPE => Some(1),
        section_id::IMPORT => Some(2),
        section_id::FUNCTION => Some(3),
        section_id::TABLE => Some(4),
        section_id::MEMORY => Some(5),
        section_id::GLOBAL => Some(6),
        section_id::EXPORT => Some(7),
        section_id::START => Some(8),
        section_id::ELEMENT => Some(9),
        section_id::DATA_COUNT => Some(10),
        section_id::CODE => Some(11),
        section_id::DATA => Some(12),
        _ => None,
    }
}

pub(crate) fn decode_module(bytes: &[u8], features: Features) -> Result<Module, DecodeError> {
    debug!(len = bytes.len(), "decoding module");
    let mut r = Reader::new(bytes);

    let header = r.read_bytes(4)?;
    if header != MAGIC {
        let mut found = [0u8; 4];
        for (slot, byte) in found.iter_mut().zip(header) {
            *slot = *byte;
        }
        return Err(DecodeError::InvalidMagic { found });
    }
    let version = r.read_u32_le()?;
    if version != VERSION {
        return Err(DecodeError::InvalidVersion {
            expected: VERSION,
            found: version,
        });
    }

    let mut module = Module::default();
    // Type indices from the function section, fused with code entries below.
    let mut declared_types: Vec<u32> = Vec::new();
    let mut bodies: Vec<(Vec<ValueType>, Vec<Instruction>)> = Vec::new();
    let mut last_rank = 0u8;
    // How many standard sections re-encoding would have emitted so far; used
    // to pin custom sections back to their original positions.
    let mut emitted = 0u32;

    while !r.is_empty() {
        let sec_offset = r.offset();
        let id = r.read_byte()?;
        let size = r.read_var_u32()?;
        let mut sec = r.sub_reader(size as usize)?;
        trace!(id = id, size = size, offset = sec_offset, "reading section");

        if id == section_id::CUSTOM {
            let name = sec.read_name()?;
            let data = sec.rest().to_vec();
            module.custom_sections.push(CustomSection {
                name,
                data,
                placement: Some(emitted),
            });
            continue;
        }

        let rank = section_rank(id).ok_or(DecodeError::UnknownSectionId {
            id,
            offset: sec_offset,
        })?;
        if rank == last_rank {
            return Err(DecodeError::DuplicateSection {
                id,
                offset: sec_offset,
            });
        }
        if rank < last_rank {
            return Err(DecodeError::SectionOutOfOrder {
                id,
                offset: sec_offset,
            });
        }
        last_rank = rank;

        let emits = match id {
            section_id::TYPE => {
                module.types = read_type_section(&mut sec)?;
                !module.types.is_empty()
            }
            section_id::IMPORT => {
                module.imports = read_import_section(&mut sec)?;
                !module.imports.is_empty()
            }
            section_id::FUNCTION => {
                declared_types = read_function_section(&mut sec)?;
                !declared_types.is_empty()
            }
            section_id::TABLE => {
                module.tables = read_table_section(&mut sec, features)?;
                !module.tables.is_empty()
            }
            section_id::MEMORY => {
                module.memories = read_memory_section(&mut sec)?;
                !module.memories.is_empty()
            }
            section_id::GLOBAL => {
                module.globals = read_global_section(&mut sec, features)?;
                !module.globals.is_empty()
            }
            section_id::EXPORT => {
                module.exports = read_export_section(&mut sec)?;
                !module.exports.is_empty()
            }
            section_id::START => {
                module.start = Some(sec.read_var_u32()?);
                true
            }
            section_id::ELEMENT => {
                module.elements = read_element_section(&mut sec, features)?;
                !module.elements.is_empty()
            }
            section_id::DATA_COUNT => {
                module.data_count = Some(sec.read_var_u32()?);
                true
            }
            section_id::CODE => {
                bodies = read_code_section(&mut sec, features)?;
                !bodies.is_empty()
            }
            section_id::DATA => {
                module.data = read_data_section(&mut sec, features)?;
                !module.data.is_empty()
            }
            _ => false,
        };

        if !sec.is_empty() {
            return Err(DecodeError::SectionLengthMismatch {
                id,
                declared: size,
                consumed: size - sec.remaining() as u32,
            });
        }
        if emits {
            emitted += 1;
        }
    }

    if declared_types.len() != bodies.len() {
        return Err(DecodeError::FunctionCountMismatch {
            declared: declared_types.len() as u32,
            bodies: bodies.len() as u32,
        });
    }
    module.functions = declared_types
        .into_iter()
        .zip(bodies)
        .map(|(type_index, (locals, body))| Function {
            type_index,
            locals,
            body,
        })
        .collect();

    if let Some(declared) = module.data_count {
        let actual = module.data.len() as u32;
        if declared != actual {
            return Err(DecodeError::DataCountMismatch { declared, actual });
        }
    }

    debug!(
        types = module.types.len(),
        functions = module.functions.len(),
        exports = module.exports.len(),
        "decoded module"
    );
    Ok(module)
}

fn read_count(r: &mut Reader<'_>) -> Result<u32, DecodeError> {
    r.read_var_u32()
}

/// Caps speculative pre-allocation; hostile counts only cost what their
/// items actually decode to.
fn prealloc(count: u32) -> usize {
    count.min(1024) as usize
}

fn read_result_type(r: &mut Reader<'_>) -> Result<Vec<ValueType>, DecodeError> {
    let count = read_count(r)?;
    let mut types = Vec::with_capacity(prealloc(count));
    for _ in 0..count {
        types.push(r.read_value_type()?);
    }
    Ok(types)
}

fn read_type_section(r: &mut Reader<'_>) -> Result<Vec<FunctionType>, DecodeError> {
    let count = read_count(r)?;
    let mut types = Vec::with_capacity(prealloc(count));
    for _ in 0..count {
        let offset = r.offset();
        let form = r.read_byte()?;
        if form != 0x60 {
            return Err(DecodeError::InvalidFlag {
                what: "type form",
                value: u32::from(form),
                offset,
            });
        }
        let params = read_result_type(r)?;
        let results = read_result_type(r)?;
        types.push(FunctionType { params, results });
    }
    Ok(types)
}

fn read_limits(r: &mut Reader<'_>) -> Result<Limits, DecodeError> {
    let offset = r.offset();
    let flag = r.read_byte()?;
    match flag {
        0x00 => Ok(Limits {
            min: u64::from(r.read_var_u32()?),
            max: None,
        }),
        0x01 => Ok(Limits {
            min: u64::from(r.read_var_u32()?),
            max: Some(u64::from(r.read_var_u32()?)),
        }),
        _ => Err(DecodeError::InvalidFlag {
            what: "limits",
            value: u32::from(flag),
            offset,
        }),
    }
}

fn read_ref_type(r: &mut Reader<'_>) -> Result<RefType, DecodeError> {
    let offset = r.offset();
    let byte = r.read_byte()?;
    RefType::from_byte(byte).ok_or(DecodeError::InvalidValueType { byte, offset })
}

fn read_table_type(r: &mut Reader<'_>) -> Result<TableType, DecodeError> {
    let element = read_ref_type(r)?;
    let limits = read_limits(r)?;
    Ok(TableType { element, limits })
}

fn read_global_type(r: &mut Reader<'_>) -> Result<GlobalType, DecodeError> {
    let value = r.read_value_type()?;
    let offset = r.offset();
    let mutable = match r.read_byte()? {
        0x00 => false,
        0x01 => true,
        byte => {
            return Err(DecodeError::InvalidFlag {
                what: "mutability",
                value: u32::from(byte),
                offset,
            })
        }
    };
    Ok(GlobalType { value, mutable })
}

fn read_import_section(r: &mut Reader<'_>) -> Result<Vec<Import>, DecodeError> {
    let count = read_count(r)?;
    let mut imports = Vec::with_capacity(prealloc(count));
    for _ in 0..count {
        let module = r.read_name()?;
        let name = r.read_name()?;
        let offset = r.offset();
        let desc = match r.read_byte()? {
            0x00 => ImportDesc::Func(r.read_var_u32()?),
            0x01 => ImportDesc::Table(read_table_type(r)?),
            0x02 => ImportDesc::Memory(MemoryType {
                limits: read_limits(r)?,
            }),
            0x03 => ImportDesc::Global(read_global_type(r)?),
            byte => {
                return Err(DecodeError::InvalidFlag {
                    what: "import descriptor",
                    value: u32::from(byte),
                    offset,
                })
            }
        };
        imports.push(Import { module, name, desc });
    }
    Ok(imports)
}

fn read_function_section(r: &mut Reader<'_>) -> Result<Vec<u32>, DecodeError> {
    let count = read_count(r)?;
    let mut indices = Vec::with_capacity(prealloc(count));
    for _ in 0..count {
        indices.push(r.read_var_u32()?);
    }
    Ok(indices)
}

fn read_table_section(
    r: &mut Reader<'_>,
    features: Features,
) -> Result<Vec<Table>, DecodeError> {
    let count = read_count(r)?;
    let mut tables = Vec::with_capacity(prealloc(count));
    for _ in 0..count {
        // 0x40 0x00 introduces a table with an explicit initializer; it is
        // unambiguous because 0x40 is not a reference type byte.
        if r.peek_byte()? == 0x40 {
            r.read_byte()?;
            let offset = r.offset();
            let form = r.read_byte()?;
            if form != 0x00 {
                return Err(DecodeError::InvalidFlag {
                    what: "table initializer form",
                    value: u32::from(form),
                    offset,
                });
            }
            let ty = read_table_type(r)?;
            let init = read_const_expr(r, features)?;
            tables.push(Table {
                ty,
                init: Some(init),
            });
        } else {
            tables.push(Table {
                ty: read_table_type(r)?,
                init: None,
            });
        }
    }
    Ok(tables)
}

fn read_memory_section(r: &mut Reader<'_>) -> Result<Vec<MemoryType>, DecodeError> {
    let count = read_count(r)?;
    let mut memories = Vec::with_capacity(prealloc(count));
    for _ in 0..count {
        memories.push(MemoryType {
            limits: read_limits(r)?,
        });
    }
    Ok(memories)
}

fn read_global_section(
    r: &mut Reader<'_>,
    features: Features,
) -> Result<Vec<Global>, DecodeError> {
    let count = read_count(r)?;
    let mut globals = Vec::with_capacity(prealloc(count));
    for _ in 0..count {
        let ty = read_global_type(r)?;
        let init = read_const_expr(r, features)?;
        globals.push(Global { ty, init });
    }
    Ok(globals)
}

fn read_export_section(r: &mut Reader<'_>) -> Result<Vec<Export>, DecodeError> {
    let count = read_count(r)?;
    let mut exports = Vec::with_capacity(prealloc(count));
    for _ in 0..count {
        let name = r.read_name()?;
        let offset = r.offset();
        let byte = r.read_byte()?;
        let kind = ExportKind::from_byte(byte).ok_or(DecodeError::InvalidFlag {
            what: "export kind",
            value: u32::from(byte),
            offset,
        })?;
        let index = r.read_var_u32()?;
        exports.push(Export { name, kind, index });
    }
    Ok(exports)
}

/// Element segments come in eight binary forms, selected by a three-bit
/// flag: bit 0 picks a non-active mode, bit 1 an explicit table index (or
/// the declarative mode when non-active), bit 2 expression items over plain
/// function indices. All forms decode to the same three-field segment.
fn read_element_section(
    r: &mut Reader<'_>,
    features: Features,
) -> Result<Vec<Element>, DecodeError> {
    let count = read_count(r)?;
    let mut elements = Vec::with_capacity(prealloc(count));
    for _ in 0..count {
        let flags_offset = r.offset();
        let flags = r.read_var_u32()?;
        if flags > 7 {
            return Err(DecodeError::InvalidFlag {
                what: "element flags",
                value: flags,
                offset: flags_offset,
            });
        }
        let active = flags & 0b001 == 0;
        let explicit = flags & 0b010 != 0;
        let exprs = flags & 0b100 != 0;

        let mode = if active {
            let table = if explicit { r.read_var_u32()? } else { 0 };
            let offset = read_const_expr(r, features)?;
            ElementMode::Active { table, offset }
        } else if explicit {
            ElementMode::Declarative
        } else {
            ElementMode::Passive
        };

        let ty = if flags & 0b011 == 0 {
            // Forms 0 and 4 leave the type implicit.
            RefType::Func
        } else if exprs {
            read_ref_type(r)?
        } else {
            let offset = r.offset();
            let kind = r.read_byte()?;
            if kind != 0x00 {
                return Err(DecodeError::InvalidFlag {
                    what: "element kind",
                    value: u32::from(kind),
                    offset,
                });
            }
            RefType::Func
        };

        let items = if exprs {
            let n = read_count(r)?;
            let mut items = Vec::with_capacity(prealloc(n));
            for _ in 0..n {
                items.push(read_const_expr(r, features)?);
            }
            ElementItems::Expressions(items)
        } else {
            let n = read_count(r)?;
            let mut items = Vec::with_capacity(prealloc(n));
            for _ in 0..n {
                items.push(r.read_var_u32()?);
            }
            ElementItems::Functions(items)
        };

        elements.push(Element { ty, items, mode });
    }
    Ok(elements)
}

type LocalsAndBody = (Vec<ValueType>, Vec<Instruction>);

fn read_code_section(
    r: &mut Reader<'_>,
    features: Features,
) -> Result<Vec<LocalsAndBody>, DecodeError> {
    let count = read_count(r)?;
    let mut bodies = Vec::with_capacity(prealloc(count));
    for _ in 0..count {
        let size = r.read_var_u32()?;
        let mut body = r.sub_reader(size as usize)?;

        // Parse every run before materializing any of them, so an
        // over-limit total fails without allocating for the early runs.
        let runs = body.read_var_u32()?;
        let mut run_list = Vec::with_capacity(prealloc(runs));
        let mut total = 0u64;
        for _ in 0..runs {
            let run_offset = body.offset();
            let n = body.read_var_u32()?;
            let ty = body.read_value_type()?;
            total += u64::from(n);
            if total > u64::from(u32::MAX) {
                return Err(DecodeError::TooManyLocals { offset: run_offset });
            }
            run_list.push((n, ty));
        }
        let mut locals = Vec::with_capacity(total.min(1024) as usize);
        for (n, ty) in run_list {
            locals.extend(std::iter::repeat(ty).take(n as usize));
        }

        let instructions = read_expression(&mut body, features)?;
        if !body.is_empty() {
            return Err(DecodeError::UnexpectedEndOfBlock {
                offset: body.offset(),
            });
        }
        bodies.push((locals, instructions));
    }
    Ok(bodies)
}

fn read_data_section(
    r: &mut Reader<'_>,
    features: Features,
) -> Result<Vec<Data>, DecodeError> {
    let count = read_count(r)?;
    let mut segments = Vec::with_capacity(prealloc(count));
    for _ in 0..count {
        let flags_offset = r.offset();
        let flags = r.read_var_u32()?;
        let mode = match flags {
            0 => DataMode::Active {
                memory: 0,
                offset: read_const_expr(r, features)?,
            },
            1 => DataMode::Passive,
            2 => {
                let memory = r.read_var_u32()?;
                DataMode::Active {
                    memory,
                    offset: read_const_expr(r, features)?,
                }
            }
            _ => {
                return Err(DecodeError::InvalidFlag {
                    what: "data flags",
                    value: flags,
                    offset: flags_offset,
                })
            }
        };
        let len = r.read_var_u32()?;
        let bytes = r.read_bytes(len as usize)?.to_vec();
        segments.push(Data { bytes, mode });
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{BlockType, ConstExpr};

    const HEADER: [u8; 8] = [0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];

    fn decode(bytes: &[u8]) -> Result<Module, DecodeError> {
        decode_module(bytes, Features::default())
    }

    /// Header plus raw section bytes.
    fn build(sections: &[&[u8]]) -> Vec<u8> {
        let mut bytes = HEADER.to_vec();
        for s in sections {
            bytes.extend_from_slice(s);
        }
        bytes
    }

    #[test]
    fn test_minimal_module() {
        let module = decode(&HEADER).unwrap();
        assert_eq!(module, Module::default());
    }

    #[test]
    fn test_bad_magic() {
        let err = decode(&[0x00, 0x61, 0x73, 0x6E, 0x01, 0x00, 0x00, 0x00]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::InvalidMagic {
                found: [0x00, 0x61, 0x73, 0x6E]
            }
        );
    }

    #[test]
    fn test_bad_version() {
        let err = decode(&[0x00, 0x61, 0x73, 0x6D, 0x02, 0x00, 0x00, 0x00]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::InvalidVersion {
                expected: 1,
                found: 2
            }
        );
    }

    #[test]
    fn test_truncated_header() {
        for len in 0..8 {
            let err = decode(&HEADER[..len]).unwrap_err();
            assert!(
                matches!(err, DecodeError::UnexpectedEof { .. }),
                "prefix of {len} bytes: {err:?}"
            );
        }
    }

    #[test]
    fn test_type_section() {
        // (i32, i32) -> i64
        let module = decode(&build(&[&[
            1, 0x07, 0x01, 0x60, 0x02, 0x7F, 0x7F, 0x01, 0x7E,
        ]]))
        .unwrap();
        assert_eq!(
            module.types,
            vec![FunctionType {
                params: vec![ValueType::I32, ValueType::I32],
                results: vec![ValueType::I64],
            }]
        );
    }

    #[test]
    fn test_section_length_mismatch() {
        // Type section declares 8 bytes but its body parses in 7.
        let err = decode(&build(&[&[
            1, 0x08, 0x01, 0x60, 0x02, 0x7F, 0x7F, 0x01, 0x7E, 0x00,
        ]]))
        .unwrap_err();
        assert_eq!(
            err,
            DecodeError::SectionLengthMismatch {
                id: 1,
                declared: 8,
                consumed: 7,
            }
        );
    }

    #[test]
    fn test_section_size_past_end_of_input() {
        let err = decode(&build(&[&[1, 0x7F, 0x01]])).unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedEof { .. }));
    }

    #[test]
    fn test_unknown_section_id() {
        let err = decode(&build(&[&[13, 0x00]])).unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnknownSectionId { id: 13, offset: 8 }
        );
    }

    #[test]
    fn test_duplicate_section() {
        let err = decode(&build(&[&[5, 0x01, 0x00], &[5, 0x01, 0x00]])).unwrap_err();
        assert_eq!(err, DecodeError::DuplicateSection { id: 5, offset: 11 });
    }

    #[test]
    fn test_section_out_of_order() {
        // Memory section after export section.
        let err = decode(&build(&[&[7, 0x01, 0x00], &[5, 0x01, 0x00]])).unwrap_err();
        assert_eq!(err, DecodeError::SectionOutOfOrder { id: 5, offset: 11 });
    }

    #[test]
    fn test_data_count_between_element_and_code() {
        let bytes = build(&[
            &[9, 0x01, 0x00],  // element, zero segments
            &[12, 0x01, 0x00], // data count of zero
            &[11, 0x01, 0x00], // data, zero segments
        ]);
        let module = decode(&bytes).unwrap();
        assert_eq!(module.data_count, Some(0));
    }

    #[test]
    fn test_data_count_after_code_rejected() {
        let err = decode(&build(&[&[10, 0x01, 0x00], &[12, 0x01, 0x00]])).unwrap_err();
        assert_eq!(err, DecodeError::SectionOutOfOrder { id: 12, offset: 11 });
    }

    #[test]
    fn test_import_section() {
        let bytes = build(&[&[
            2, 0x0C, 0x01, 0x03, b'e', b'n', b'v', 0x03, b'm', b'e', b'm', 0x02, 0x00, 0x01,
        ]]);
        let module = decode(&bytes).unwrap();
        assert_eq!(
            module.imports,
            vec![Import {
                module: "env".to_string(),
                name: "mem".to_string(),
                desc: ImportDesc::Memory(MemoryType {
                    limits: Limits { min: 1, max: None },
                }),
            }]
        );
    }

    #[test]
    fn test_function_and_code_sections() {
        let bytes = build(&[
            &[1, 0x05, 0x01, 0x60, 0x00, 0x01, 0x7F], // () -> i32
            &[3, 0x02, 0x01, 0x00],
            &[10, 0x08, 0x01, 0x06, 0x01, 0x02, 0x7F, 0x41, 0x2A, 0x0B],
        ]);
        let module = decode(&bytes).unwrap();
        assert_eq!(module.functions.len(), 1);
        let f = &module.functions[0];
        assert_eq!(f.type_index, 0);
        assert_eq!(f.locals, vec![ValueType::I32, ValueType::I32]);
        assert_eq!(f.body, vec![Instruction::I32Const(42)]);
    }

    #[test]
    fn test_function_count_mismatch() {
        let bytes = build(&[
            &[1, 0x04, 0x01, 0x60, 0x00, 0x00],
            &[3, 0x03, 0x02, 0x00, 0x00],
            &[10, 0x04, 0x01, 0x02, 0x00, 0x0B],
        ]);
        let err = decode(&bytes).unwrap_err();
        assert_eq!(
            err,
            DecodeError::FunctionCountMismatch {
                declared: 2,
                bodies: 1,
            }
        );
    }

    #[test]
    fn test_code_entry_with_trailing_bytes() {
        let bytes = build(&[
            &[1, 0x04, 0x01, 0x60, 0x00, 0x00],
            &[3, 0x02, 0x01, 0x00],
            // entry declares 4 bytes; the expression ends after 3
            &[10, 0x06, 0x01, 0x04, 0x00, 0x01, 0x0B, 0x01],
        ]);
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedEndOfBlock { .. }));
    }

    #[test]
    fn test_data_count_mismatch() {
        let bytes = build(&[
            &[12, 0x01, 0x02],
            &[11, 0x05, 0x01, 0x01, 0x02, 0xAA, 0xBB],
        ]);
        // one passive segment of two bytes, count claims two
        let err = decode(&bytes).unwrap_err();
        assert_eq!(
            err,
            DecodeError::DataCountMismatch {
                declared: 2,
                actual: 1,
            }
        );
    }

    #[test]
    fn test_table_section_with_init() {
        let bytes = build(&[&[
            4, 0x09, 0x01, 0x40, 0x00, 0x70, 0x00, 0x02, 0xD0, 0x70, 0x0B,
        ]]);
        let module = decode(&bytes).unwrap();
        assert_eq!(module.tables.len(), 1);
        assert_eq!(module.tables[0].ty.element, RefType::Func);
        assert_eq!(
            module.tables[0].init,
            Some(ConstExpr::ref_null(RefType::Func))
        );
    }

    #[test]
    fn test_global_section() {
        let bytes = build(&[&[6, 0x06, 0x01, 0x7F, 0x01, 0x41, 0x2A, 0x0B]]);
        let module = decode(&bytes).unwrap();
        assert_eq!(
            module.globals,
            vec![Global {
                ty: GlobalType {
                    value: ValueType::I32,
                    mutable: true,
                },
                init: ConstExpr::i32_const(42),
            }]
        );
    }

    #[test]
    fn test_export_and_start_sections() {
        let bytes = build(&[
            &[1, 0x04, 0x01, 0x60, 0x00, 0x00],
            &[3, 0x02, 0x01, 0x00],
            &[7, 0x05, 0x01, 0x01, b'f', 0x00, 0x00],
            &[8, 0x01, 0x00],
            &[10, 0x04, 0x01, 0x02, 0x00, 0x0B],
        ]);
        let module = decode(&bytes).unwrap();
        assert_eq!(
            module.exports,
            vec![Export {
                name: "f".to_string(),
                kind: ExportKind::Func,
                index: 0,
            }]
        );
        assert_eq!(module.start, Some(0));
    }

    #[test]
    fn test_element_form_zero() {
        let bytes = build(&[
            &[1, 0x04, 0x01, 0x60, 0x00, 0x00],
            &[3, 0x02, 0x01, 0x00],
            &[4, 0x04, 0x01, 0x70, 0x00, 0x01],
            &[9, 0x07, 0x01, 0x00, 0x41, 0x00, 0x0B, 0x01, 0x00],
            &[10, 0x04, 0x01, 0x02, 0x00, 0x0B],
        ]);
        let module = decode(&bytes).unwrap();
        assert_eq!(
            module.elements,
            vec![Element {
                ty: RefType::Func,
                items: ElementItems::Functions(vec![0]),
                mode: ElementMode::Active {
                    table: 0,
                    offset: ConstExpr::i32_const(0),
                },
            }]
        );
    }

    #[test]
    fn test_element_form_five_passive_exprs() {
        let bytes = build(&[&[
            9, 0x07, 0x01, 0x05, 0x70, 0x01, 0xD0, 0x70, 0x0B,
        ]]);
        let module = decode(&bytes).unwrap();
        assert_eq!(
            module.elements,
            vec![Element {
                ty: RefType::Func,
                items: ElementItems::Expressions(vec![ConstExpr::ref_null(RefType::Func)]),
                mode: ElementMode::Passive,
            }]
        );
    }

    #[test]
    fn test_element_form_three_declarative() {
        let bytes = build(&[
            &[1, 0x04, 0x01, 0x60, 0x00, 0x00],
            &[3, 0x02, 0x01, 0x00],
            &[9, 0x05, 0x01, 0x03, 0x00, 0x01, 0x00],
            &[10, 0x04, 0x01, 0x02, 0x00, 0x0B],
        ]);
        let module = decode(&bytes).unwrap();
        assert_eq!(
            module.elements,
            vec![Element {
                ty: RefType::Func,
                items: ElementItems::Functions(vec![0]),
                mode: ElementMode::Declarative,
            }]
        );
    }

    #[test]
    fn test_element_invalid_flags() {
        let err = decode(&build(&[&[9, 0x02, 0x01, 0x08]])).unwrap_err();
        assert_eq!(
            err,
            DecodeError::InvalidFlag {
                what: "element flags",
                value: 8,
                offset: 11,
            }
        );
    }

    #[test]
    fn test_data_form_two_explicit_memory() {
        let bytes = build(&[
            &[5, 0x03, 0x01, 0x00, 0x01],
            &[11, 0x08, 0x01, 0x02, 0x00, 0x41, 0x08, 0x0B, 0x01, 0xFF],
        ]);
        let module = decode(&bytes).unwrap();
        assert_eq!(
            module.data,
            vec![Data {
                bytes: vec![0xFF],
                mode: DataMode::Active {
                    memory: 0,
                    offset: ConstExpr::i32_const(8),
                },
            }]
        );
    }

    #[test]
    fn test_custom_section_placement() {
        let bytes = build(&[
            &[0, 0x03, 0x01, b'a', 0x01],        // before any standard section
            &[1, 0x04, 0x01, 0x60, 0x00, 0x00],  // type
            &[0, 0x03, 0x01, b'b', 0x02],        // after one emitted section
        ]);
        let module = decode(&bytes).unwrap();
        assert_eq!(module.custom_sections.len(), 2);
        assert_eq!(module.custom_sections[0].name, "a");
        assert_eq!(module.custom_sections[0].data, vec![0x01]);
        assert_eq!(module.custom_sections[0].placement, Some(0));
        assert_eq!(module.custom_sections[1].placement, Some(1));
    }

    #[test]
    fn test_custom_section_after_empty_section_keeps_placement() {
        // An empty function section is not re-emitted, so the custom
        // section that follows it still sits at position zero.
        let bytes = build(&[
            &[3, 0x01, 0x00],
            &[0, 0x03, 0x01, b'c', 0x09],
        ]);
        let module = decode(&bytes).unwrap();
        assert_eq!(module.custom_sections[0].placement, Some(0));
    }

    #[test]
    fn test_locals_over_limit() {
        let bytes = build(&[
            &[1, 0x04, 0x01, 0x60, 0x00, 0x00],
            &[3, 0x02, 0x01, 0x00],
            &[
                10, 0x0C, 0x01, 0x0A, 0x02, // two runs
                0xFF, 0xFF, 0xFF, 0xFF, 0x0F, 0x7F, // u32::MAX of i32
                0x01, 0x7E, // one more
                0x0B,
            ],
        ]);
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, DecodeError::TooManyLocals { .. }));
    }

    #[test]
    fn test_start_without_code_is_structural_only() {
        // A dangling start index decodes fine; validation owns bounds.
        let module = decode(&build(&[&[8, 0x01, 0x07]])).unwrap();
        assert_eq!(module.start, Some(7));
    }
}
