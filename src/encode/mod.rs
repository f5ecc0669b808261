//! Binary module encoding.
//!
//! Sections are emitted in canonical order with exact size prefixes; item
//! sections with nothing in them are skipped entirely. Custom sections are
//! re-interleaved by their recorded placement, so a decoded module encodes
//! back to its original section layout. Segments and code entries always
//! use the most compact binary form that can express them.

mod error;
mod instr;

pub use error::EncodeError;

use crate::decode::{MAGIC, VERSION, section_id};
use crate::logging::{debug, trace};
use crate::module::{
    ConstExpr, CustomSection, DataMode, ElementItems, ElementMode, GlobalType, ImportDesc,
    Limits, Module, RefType, TableType, ValueType,
};
use instr::{item_count, write_const_expr, write_expression, write_ref_type, write_var_u32};

pub(crate) fn encode_module(module: &Module) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());

    let mut standard: Vec<(u8, Vec<u8>)> = Vec::new();
    if !module.types.is_empty() {
        standard.push((section_id::TYPE, encode_type_section(module)?));
    }
    if !module.imports.is_empty() {
        standard.push((section_id::IMPORT, encode_import_section(module)?));
    }
    if !module.functions.is_empty() {
        standard.push((section_id::FUNCTION, encode_function_section(module)?));
    }
    if !module.tables.is_empty() {
        standard.push((section_id::TABLE, encode_table_section(module)?));
    }
    if !module.memories.is_empty() {
        standard.push((section_id::MEMORY, encode_memory_section(module)?));
    }
    if !module.globals.is_empty() {
        standard.push((section_id::GLOBAL, encode_global_section(module)?));
    }
    if !module.exports.is_empty() {
        standard.push((section_id::EXPORT, encode_export_section(module)?));
    }
    if let Some(start) = module.start {
        let mut payload = Vec::new();
        write_var_u32(&mut payload, start);
        standard.push((section_id::START, payload));
    }
    if !module.elements.is_empty() {
        standard.push((section_id::ELEMENT, encode_element_section(module)?));
    }
    if let Some(count) = module.data_count {
        let mut payload = Vec::new();
        write_var_u32(&mut payload, count);
        standard.push((section_id::DATA_COUNT, payload));
    }
    if !module.functions.is_empty() {
        standard.push((section_id::CODE, encode_code_section(module)?));
    }
    if !module.data.is_empty() {
        standard.push((section_id::DATA, encode_data_section(module)?));
    }

    // Stable order for custom sections sharing a placement; unplaced ones
    // sort to the end.
    let mut customs: Vec<&CustomSection> = module.custom_sections.iter().collect();
    customs.sort_by_key(|c| c.placement.unwrap_or(u32::MAX));
    let mut cursor = 0usize;

    let mut emitted = 0u32;
    for (id, payload) in &standard {
        flush_customs(&mut out, &customs, &mut cursor, emitted)?;
        write_section(&mut out, *id, payload)?;
        emitted += 1;
    }
    while let Some(custom) = customs.get(cursor) {
        write_custom_section(&mut out, custom)?;
        cursor += 1;
    }

    debug!(len = out.len(), sections = standard.len(), "encoded module");
    Ok(out)
}

/// Writes the custom sections due before the standard section about to be
/// emitted after `emitted` others.
fn flush_customs(
    out: &mut Vec<u8>,
    customs: &[&CustomSection],
    cursor: &mut usize,
    emitted: u32,
) -> Result<(), EncodeError> {
    while let Some(custom) = customs.get(*cursor) {
        if custom.placement.is_some_and(|p| p <= emitted) {
            write_custom_section(out, custom)?;
            *cursor += 1;
        } else {
            break;
        }
    }
    Ok(())
}

fn write_section(out: &mut Vec<u8>, id: u8, payload: &[u8]) -> Result<(), EncodeError> {
    let size = u32::try_from(payload.len()).map_err(|_| EncodeError::SectionTooLarge {
        id,
        size: payload.len(),
    })?;
    trace!(id = id, size = size, "writing section");
    out.push(id);
    write_var_u32(out, size);
    out.extend_from_slice(payload);
    Ok(())
}

fn write_custom_section(out: &mut Vec<u8>, custom: &CustomSection) -> Result<(), EncodeError> {
    let mut payload = Vec::with_capacity(custom.name.len() + custom.data.len() + 1);
    write_name(&mut payload, &custom.name)?;
    payload.extend_from_slice(&custom.data);
    write_section(out, section_id::CUSTOM, &payload)
}

fn write_name(out: &mut Vec<u8>, name: &str) -> Result<(), EncodeError> {
    write_var_u32(out, item_count("name bytes", name.len())?);
    out.extend_from_slice(name.as_bytes());
    Ok(())
}

fn limit_u32(value: u64) -> Result<u32, EncodeError> {
    u32::try_from(value).map_err(|_| EncodeError::LimitOutOfRange { value })
}

fn write_limits(out: &mut Vec<u8>, limits: &Limits) -> Result<(), EncodeError> {
    let min = limit_u32(limits.min)?;
    match limits.max {
        Some(max) => {
            let max = limit_u32(max)?;
            out.push(0x01);
            write_var_u32(out, min);
            write_var_u32(out, max);
        }
        None => {
            out.push(0x00);
            write_var_u32(out, min);
        }
    }
    Ok(())
}

fn write_table_type(out: &mut Vec<u8>, ty: &TableType) -> Result<(), EncodeError> {
    write_ref_type(out, ty.element);
    write_limits(out, &ty.limits)
}

fn write_global_type(out: &mut Vec<u8>, ty: &GlobalType) {
    out.push(ty.value.byte());
    out.push(u8::from(ty.mutable));
}

fn write_result_type(out: &mut Vec<u8>, types: &[ValueType]) -> Result<(), EncodeError> {
    write_var_u32(out, item_count("value types", types.len())?);
    for ty in types {
        out.push(ty.byte());
    }
    Ok(())
}

fn encode_type_section(module: &Module) -> Result<Vec<u8>, EncodeError> {
    let mut payload = Vec::new();
    write_var_u32(&mut payload, item_count("types", module.types.len())?);
    for ty in &module.types {
        payload.push(0x60);
        write_result_type(&mut payload, &ty.params)?;
        write_result_type(&mut payload, &ty.results)?;
    }
    Ok(payload)
}

fn encode_import_section(module: &Module) -> Result<Vec<u8>, EncodeError> {
    let mut payload = Vec::new();
    write_var_u32(&mut payload, item_count("imports", module.imports.len())?);
    for import in &module.imports {
        write_name(&mut payload, &import.module)?;
        write_name(&mut payload, &import.name)?;
        match &import.desc {
            ImportDesc::Func(type_index) => {
                payload.push(0x00);
                write_var_u32(&mut payload, *type_index);
            }
            ImportDesc::Table(ty) => {
                payload.push(0x01);
                write_table_type(&mut payload, ty)?;
            }
            ImportDesc::Memory(ty) => {
                payload.push(0x02);
                write_limits(&mut payload, &ty.limits)?;
            }
            ImportDesc::Global(ty) => {
                payload.push(0x03);
                write_global_type(&mut payload, ty);
            }
        }
    }
    Ok(payload)
}

fn encode_function_section(module: &Module) -> Result<Vec<u8>, EncodeError> {
    let mut payload = Vec::new();
    write_var_u32(&mut payload, item_count("functions", module.functions.len())?);
    for function in &module.functions {
        write_var_u32(&mut payload, function.type_index);
    }
    Ok(payload)
}

fn encode_table_section(module: &Module) -> Result<Vec<u8>, EncodeError> {
    let mut payload = Vec::new();
    write_var_u32(&mut payload, item_count("tables", module.tables.len())?);
    for table in &module.tables {
        match &table.init {
            Some(init) => {
                payload.push(0x40);
                payload.push(0x00);
                write_table_type(&mut payload, &table.ty)?;
                write_const_expr(&mut payload, init)?;
            }
            None => write_table_type(&mut payload, &table.ty)?,
        }
    }
    Ok(payload)
}

fn encode_memory_section(module: &Module) -> Result<Vec<u8>, EncodeError> {
    let mut payload = Vec::new();
    write_var_u32(&mut payload, item_count("memories", module.memories.len())?);
    for memory in &module.memories {
        write_limits(&mut payload, &memory.limits)?;
    }
    Ok(payload)
}

fn encode_global_section(module: &Module) -> Result<Vec<u8>, EncodeError> {
    let mut payload = Vec::new();
    write_var_u32(&mut payload, item_count("globals", module.globals.len())?);
    for global in &module.globals {
        write_global_type(&mut payload, &global.ty);
        write_const_expr(&mut payload, &global.init)?;
    }
    Ok(payload)
}

fn encode_export_section(module: &Module) -> Result<Vec<u8>, EncodeError> {
    let mut payload = Vec::new();
    write_var_u32(&mut payload, item_count("exports", module.exports.len())?);
    for export in &module.exports {
        write_name(&mut payload, &export.name)?;
        payload.push(export.kind.byte());
        write_var_u32(&mut payload, export.index);
    }
    Ok(payload)
}

/// Picks the lowest-numbered form each element segment fits: active
/// funcref segments on table 0 use the compact MVP forms, everything else
/// spells out its mode, table and type.
fn encode_element_section(module: &Module) -> Result<Vec<u8>, EncodeError> {
    let mut payload = Vec::new();
    write_var_u32(&mut payload, item_count("element segments", module.elements.len())?);
    for (i, element) in module.elements.iter().enumerate() {
        match &element.items {
            ElementItems::Functions(indices) => {
                if element.ty != RefType::Func {
                    return Err(EncodeError::InvalidElementSegment { index: i as u32 });
                }
                match &element.mode {
                    ElementMode::Active { table: 0, offset } => {
                        write_var_u32(&mut payload, 0);
                        write_const_expr(&mut payload, offset)?;
                        write_function_indices(&mut payload, indices)?;
                    }
                    ElementMode::Active { table, offset } => {
                        write_var_u32(&mut payload, 2);
                        write_var_u32(&mut payload, *table);
                        write_const_expr(&mut payload, offset)?;
                        payload.push(0x00);
                        write_function_indices(&mut payload, indices)?;
                    }
                    ElementMode::Passive => {
                        write_var_u32(&mut payload, 1);
                        payload.push(0x00);
                        write_function_indices(&mut payload, indices)?;
                    }
                    ElementMode::Declarative => {
                        write_var_u32(&mut payload, 3);
                        payload.push(0x00);
                        write_function_indices(&mut payload, indices)?;
                    }
                }
            }
            ElementItems::Expressions(exprs) => match &element.mode {
                ElementMode::Active { table: 0, offset } if element.ty == RefType::Func => {
                    write_var_u32(&mut payload, 4);
                    write_const_expr(&mut payload, offset)?;
                    write_element_exprs(&mut payload, exprs)?;
                }
                ElementMode::Active { table, offset } => {
                    write_var_u32(&mut payload, 6);
                    write_var_u32(&mut payload, *table);
                    write_const_expr(&mut payload, offset)?;
                    write_ref_type(&mut payload, element.ty);
                    write_element_exprs(&mut payload, exprs)?;
                }
                ElementMode::Passive => {
                    write_var_u32(&mut payload, 5);
                    write_ref_type(&mut payload, element.ty);
                    write_element_exprs(&mut payload, exprs)?;
                }
                ElementMode::Declarative => {
                    write_var_u32(&mut payload, 7);
                    write_ref_type(&mut payload, element.ty);
                    write_element_exprs(&mut payload, exprs)?;
                }
            },
        }
    }
    Ok(payload)
}

fn write_function_indices(out: &mut Vec<u8>, indices: &[u32]) -> Result<(), EncodeError> {
    write_var_u32(out, item_count("element items", indices.len())?);
    for index in indices {
        write_var_u32(out, *index);
    }
    Ok(())
}

fn write_element_exprs(out: &mut Vec<u8>, exprs: &[ConstExpr]) -> Result<(), EncodeError> {
    write_var_u32(out, item_count("element items", exprs.len())?);
    for expr in exprs {
        write_const_expr(out, expr)?;
    }
    Ok(())
}

fn encode_code_section(module: &Module) -> Result<Vec<u8>, EncodeError> {
    let mut payload = Vec::new();
    write_var_u32(&mut payload, item_count("code entries", module.functions.len())?);
    for function in &module.functions {
        let mut body = Vec::new();
        write_locals(&mut body, &function.locals)?;
        write_expression(&mut body, &function.body)?;
        write_var_u32(&mut payload, item_count("function body bytes", body.len())?);
        payload.extend_from_slice(&body);
    }
    Ok(payload)
}

/// Run-length compression of the locals list, the inverse of the decoder's
/// expansion.
fn write_locals(out: &mut Vec<u8>, locals: &[ValueType]) -> Result<(), EncodeError> {
    let mut runs: Vec<(u32, ValueType)> = Vec::new();
    for ty in locals {
        match runs.last_mut() {
            Some((count, last)) if last == ty && *count < u32::MAX => *count += 1,
            _ => runs.push((1, *ty)),
        }
    }
    write_var_u32(out, item_count("local declarations", runs.len())?);
    for (count, ty) in runs {
        write_var_u32(out, count);
        out.push(ty.byte());
    }
    Ok(())
}

fn encode_data_section(module: &Module) -> Result<Vec<u8>, EncodeError> {
    let mut payload = Vec::new();
    write_var_u32(&mut payload, item_count("data segments", module.data.len())?);
    for data in &module.data {
        match &data.mode {
            DataMode::Active { memory: 0, offset } => {
                write_var_u32(&mut payload, 0);
                write_const_expr(&mut payload, offset)?;
            }
            DataMode::Passive => {
                write_var_u32(&mut payload, 1);
            }
            DataMode::Active { memory, offset } => {
                write_var_u32(&mut payload, 2);
                write_var_u32(&mut payload, *memory);
                write_const_expr(&mut payload, offset)?;
            }
        }
        write_var_u32(&mut payload, item_count("data bytes", data.bytes.len())?);
        payload.extend_from_slice(&data.bytes);
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode_module;
    use crate::features::Features;
    use crate::module::{
        ConstExpr, Data, Element, ExportKind, FunctionType, Instruction, MemoryType,
    };

    fn roundtrip(module: &Module) -> Module {
        let bytes = encode_module(module).unwrap();
        decode_module(&bytes, Features::default()).unwrap()
    }

    /// Section ids in file order, skipping over payloads.
    fn section_ids(bytes: &[u8]) -> Vec<u8> {
        let mut ids = Vec::new();
        let mut pos = 8;
        while pos < bytes.len() {
            let id = bytes[pos];
            ids.push(id);
            let mut p = pos + 1;
            let size = crate::leb128::read_unsigned(bytes, &mut p, 32).unwrap();
            pos = p + size as usize;
        }
        ids
    }

    #[test]
    fn test_empty_module_is_header_only() {
        let bytes = encode_module(&Module::default()).unwrap();
        assert_eq!(bytes, vec![0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_sections_in_canonical_order() {
        let module = Module::builder()
            .function_type(FunctionType::new(vec![], vec![]))
            .function(0, vec![], vec![])
            .memory(Limits { min: 1, max: None })
            .element(Element {
                ty: RefType::Func,
                items: ElementItems::Functions(vec![0]),
                mode: ElementMode::Passive,
            })
            .data_count()
            .data(Data {
                bytes: vec![1],
                mode: DataMode::Passive,
            })
            .export("f", ExportKind::Func, 0)
            .start(0)
            .build();
        let bytes = encode_module(&module).unwrap();
        assert_eq!(
            section_ids(&bytes),
            vec![
                section_id::TYPE,
                section_id::FUNCTION,
                section_id::MEMORY,
                section_id::EXPORT,
                section_id::START,
                section_id::ELEMENT,
                section_id::DATA_COUNT,
                section_id::CODE,
                section_id::DATA,
            ]
        );
    }

    #[test]
    fn test_roundtrip_function_module() {
        let module = Module::builder()
            .function_type(FunctionType::new(vec![ValueType::I32], vec![ValueType::I32]))
            .function(
                0,
                vec![ValueType::I64, ValueType::I64, ValueType::F32],
                vec![Instruction::LocalGet(0)],
            )
            .export("id", ExportKind::Func, 0)
            .build();
        assert_eq!(roundtrip(&module), module);
    }

    #[test]
    fn test_roundtrip_all_segment_forms() {
        let active = |table| ElementMode::Active {
            table,
            offset: ConstExpr::i32_const(0),
        };
        let module = Module::builder()
            .table(TableType {
                element: RefType::Func,
                limits: Limits { min: 4, max: Some(8) },
            })
            .table(TableType {
                element: RefType::Extern,
                limits: Limits { min: 0, max: None },
            })
            .element(Element {
                ty: RefType::Func,
                items: ElementItems::Functions(vec![]),
                mode: active(0),
            })
            .element(Element {
                ty: RefType::Func,
                items: ElementItems::Functions(vec![]),
                mode: ElementMode::Passive,
            })
            .element(Element {
                ty: RefType::Func,
                items: ElementItems::Functions(vec![]),
                mode: active(1),
            })
            .element(Element {
                ty: RefType::Func,
                items: ElementItems::Functions(vec![]),
                mode: ElementMode::Declarative,
            })
            .element(Element {
                ty: RefType::Func,
                items: ElementItems::Expressions(vec![ConstExpr::ref_null(RefType::Func)]),
                mode: active(0),
            })
            .element(Element {
                ty: RefType::Extern,
                items: ElementItems::Expressions(vec![ConstExpr::ref_null(RefType::Extern)]),
                mode: ElementMode::Passive,
            })
            .element(Element {
                ty: RefType::Extern,
                items: ElementItems::Expressions(vec![ConstExpr::ref_null(RefType::Extern)]),
                mode: active(1),
            })
            .element(Element {
                ty: RefType::Func,
                items: ElementItems::Expressions(vec![ConstExpr::ref_null(RefType::Func)]),
                mode: ElementMode::Declarative,
            })
            .build();
        assert_eq!(roundtrip(&module), module);
    }

    #[test]
    fn test_lowest_element_form_chosen() {
        let module = Module::builder()
            .element(Element {
                ty: RefType::Func,
                items: ElementItems::Functions(vec![1, 2]),
                mode: ElementMode::Active {
                    table: 0,
                    offset: ConstExpr::i32_const(0),
                },
            })
            .build();
        let bytes = encode_module(&module).unwrap();
        // section id, size, count, then flags 0 for the MVP form
        assert_eq!(bytes[8], section_id::ELEMENT);
        assert_eq!(bytes[11], 0x00);
    }

    #[test]
    fn test_function_items_require_funcref() {
        let module = Module::builder()
            .element(Element {
                ty: RefType::Extern,
                items: ElementItems::Functions(vec![0]),
                mode: ElementMode::Passive,
            })
            .build();
        assert_eq!(
            encode_module(&module).unwrap_err(),
            EncodeError::InvalidElementSegment { index: 0 }
        );
    }

    #[test]
    fn test_roundtrip_data_forms() {
        let module = Module::builder()
            .memory(Limits { min: 1, max: None })
            .data(Data {
                bytes: vec![1, 2, 3],
                mode: DataMode::Active {
                    memory: 0,
                    offset: ConstExpr::i32_const(16),
                },
            })
            .data(Data {
                bytes: vec![],
                mode: DataMode::Passive,
            })
            .data(Data {
                bytes: vec![9],
                mode: DataMode::Active {
                    memory: 3,
                    offset: ConstExpr::i32_const(0),
                },
            })
            .build();
        assert_eq!(roundtrip(&module), module);
    }

    #[test]
    fn test_locals_run_compression() {
        let module = Module::builder()
            .function_type(FunctionType::new(vec![], vec![]))
            .function(
                0,
                vec![
                    ValueType::I32,
                    ValueType::I32,
                    ValueType::F64,
                    ValueType::I32,
                ],
                vec![],
            )
            .build();
        let bytes = encode_module(&module).unwrap();
        let code_start = bytes
            .iter()
            .position(|&b| b == section_id::CODE)
            .unwrap();
        // id, size, count, body size, then 3 runs: 2x i32, 1x f64, 1x i32
        assert_eq!(
            &bytes[code_start + 4..code_start + 12],
            &[0x03, 0x02, 0x7F, 0x01, 0x7C, 0x01, 0x7F, 0x0B]
        );
        assert_eq!(roundtrip(&module), module);
    }

    #[test]
    fn test_limits_beyond_u32_rejected() {
        let module = Module::builder()
            .memory(Limits {
                min: u64::from(u32::MAX) + 1,
                max: None,
            })
            .build();
        assert_eq!(
            encode_module(&module).unwrap_err(),
            EncodeError::LimitOutOfRange {
                value: u64::from(u32::MAX) + 1,
            }
        );
    }

    #[test]
    fn test_custom_sections_keep_placement() {
        let mut module = Module::default();
        module.types.push(FunctionType::new(vec![], vec![]));
        module.memories.push(MemoryType {
            limits: Limits { min: 1, max: None },
        });
        module.custom_sections.push(CustomSection {
            name: "first".to_string(),
            data: vec![0xAA],
            placement: Some(0),
        });
        module.custom_sections.push(CustomSection {
            name: "between".to_string(),
            data: vec![0xBB],
            placement: Some(1),
        });
        module.custom_sections.push(CustomSection {
            name: "trailing".to_string(),
            data: vec![0xCC],
            placement: None,
        });
        let bytes = encode_module(&module).unwrap();
        assert_eq!(
            section_ids(&bytes),
            vec![
                section_id::CUSTOM,
                section_id::TYPE,
                section_id::CUSTOM,
                section_id::MEMORY,
                section_id::CUSTOM,
            ]
        );
        // Decoding pins the builder's unplaced trailing section to its
        // concrete position.
        let decoded = decode_module(&bytes, Features::default()).unwrap();
        assert_eq!(decoded.custom_sections[2].placement, Some(2));
    }

    #[test]
    fn test_decode_encode_is_identity_on_bytes() {
        // A module exercising interleaved customs, the paired function and
        // code sections, and a data-count section.
        let mut bytes = vec![0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];
        bytes.extend_from_slice(&[0x00, 0x03, 0x01, 0x61, 0xEE]); // custom "a"
        bytes.extend_from_slice(&[0x01, 0x04, 0x01, 0x60, 0x00, 0x00]); // types
        bytes.extend_from_slice(&[0x00, 0x03, 0x01, 0x62, 0xFF]); // custom "b"
        bytes.extend_from_slice(&[0x03, 0x02, 0x01, 0x00]); // functions
        bytes.extend_from_slice(&[0x0C, 0x01, 0x01]); // data count
        bytes.extend_from_slice(&[0x0A, 0x04, 0x01, 0x02, 0x00, 0x0B]); // code
        bytes.extend_from_slice(&[0x0B, 0x04, 0x01, 0x01, 0x01, 0xAB]); // data
        let module = decode_module(&bytes, Features::default()).unwrap();
        assert_eq!(encode_module(&module).unwrap(), bytes);
    }

    #[test]
    fn test_roundtrip_table_with_init() {
        let module = Module::builder()
            .table_with_init(
                TableType {
                    element: RefType::Func,
                    limits: Limits { min: 2, max: Some(2) },
                },
                ConstExpr::ref_null(RefType::Func),
            )
            .build();
        assert_eq!(roundtrip(&module), module);
    }
}
